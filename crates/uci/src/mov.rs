//! Moves in UCI long algebraic notation.

use crate::UciError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A move as it appears on the wire: `e2e4`, `e7e8q`, `e1g1`.
///
/// Only the shape is checked (squares in range, optional promotion piece).
/// Legality belongs to whatever owns the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UciMove(String);

impl UciMove {
    /// Returns the move text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_square(file: u8, rank: u8) -> bool {
    (b'a'..=b'h').contains(&file) && (b'1'..=b'8').contains(&rank)
}

impl FromStr for UciMove {
    type Err = UciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let valid = match bytes.len() {
            4 | 5 => {
                is_square(bytes[0], bytes[1])
                    && is_square(bytes[2], bytes[3])
                    && bytes
                        .get(4)
                        .map_or(true, |p| matches!(p, b'q' | b'r' | b'b' | b'n'))
            }
            _ => false,
        };
        if valid {
            Ok(UciMove(s.to_string()))
        } else {
            Err(UciError::InvalidMove(s.to_string()))
        }
    }
}

impl TryFrom<String> for UciMove {
    type Error = UciError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UciMove> for String {
    fn from(mv: UciMove) -> Self {
        mv.0
    }
}

impl fmt::Display for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
