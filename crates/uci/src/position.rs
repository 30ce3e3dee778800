//! Position descriptions sent with the `position` command.

use crate::UciMove;

/// FEN of the standard chess starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// The position an engine should search.
///
/// Callers pick the variant; the command shape follows from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionSpec {
    /// A bare FEN.
    Fen(String),
    /// A FEN plus the moves played from it, in order.
    FenWithMoves { fen: String, moves: Vec<UciMove> },
}

impl PositionSpec {
    /// The standard starting position.
    pub fn startpos() -> Self {
        PositionSpec::Fen(STARTING_FEN.to_string())
    }

    /// Builds the spec for `fen` after `moves` were played.
    ///
    /// An empty history yields [`PositionSpec::Fen`].
    pub fn from_history(fen: &str, moves: &[UciMove]) -> Self {
        if moves.is_empty() {
            PositionSpec::Fen(fen.to_string())
        } else {
            PositionSpec::FenWithMoves {
                fen: fen.to_string(),
                moves: moves.to_vec(),
            }
        }
    }

    /// The FEN the position starts from.
    pub fn fen(&self) -> &str {
        match self {
            PositionSpec::Fen(fen) | PositionSpec::FenWithMoves { fen, .. } => fen,
        }
    }

    /// Moves applied on top of [`fen`](Self::fen).
    pub fn moves(&self) -> &[UciMove] {
        match self {
            PositionSpec::Fen(_) => &[],
            PositionSpec::FenWithMoves { moves, .. } => moves,
        }
    }

    /// Formats the `position` command.
    pub fn to_uci(&self) -> String {
        match self {
            PositionSpec::Fen(fen) => format!("position fen {}", fen.trim()),
            PositionSpec::FenWithMoves { fen, moves } if moves.is_empty() => {
                format!("position fen {}", fen.trim())
            }
            PositionSpec::FenWithMoves { fen, moves } => {
                let moves: Vec<&str> = moves.iter().map(UciMove::as_str).collect();
                format!("position fen {} moves {}", fen.trim(), moves.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(s: &str) -> UciMove {
        s.parse().unwrap()
    }

    #[test]
    fn bare_fen_command() {
        assert_eq!(
            PositionSpec::startpos().to_uci(),
            format!("position fen {}", STARTING_FEN)
        );
    }

    #[test]
    fn fen_with_moves_command() {
        let spec = PositionSpec::from_history(STARTING_FEN, &[mv("e2e4"), mv("e7e5")]);
        assert_eq!(
            spec.to_uci(),
            format!("position fen {} moves e2e4 e7e5", STARTING_FEN)
        );
        assert_eq!(spec.moves().len(), 2);
        assert_eq!(spec.fen(), STARTING_FEN);
    }

    #[test]
    fn empty_history_is_bare_fen() {
        let spec = PositionSpec::from_history(STARTING_FEN, &[]);
        assert_eq!(spec, PositionSpec::Fen(STARTING_FEN.to_string()));

        let explicit = PositionSpec::FenWithMoves {
            fen: STARTING_FEN.to_string(),
            moves: vec![],
        };
        assert!(!explicit.to_uci().contains("moves"));
    }

    #[test]
    fn trailing_newline_in_fen_is_dropped() {
        let spec = PositionSpec::Fen(format!("{}\n", STARTING_FEN));
        assert!(!spec.to_uci().ends_with('\n'));
    }
}
