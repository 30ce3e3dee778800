//! Decoding of `info` search-progress lines.

use crate::{UciError, UciMove};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit of an evaluation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    /// Centipawns (100 = 1 pawn advantage).
    #[default]
    #[serde(rename = "cp")]
    Centipawn,
    /// Mate in N moves (positive = side to move mates).
    Mate,
}

/// The engine's current view of the position.
///
/// A decoded line replaces every field at once; a line that fails to
/// decode leaves the previous value untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score from the side to move's point of view.
    pub score: i32,
    /// Unit of `score`.
    pub kind: ScoreKind,
    /// Search depth, 0 when the engine did not report it.
    pub depth: u32,
    /// Nodes per second, 0 when the engine did not report it.
    pub nps: u64,
    /// Principal variation (best line found).
    pub pv: Vec<UciMove>,
}

impl Evaluation {
    /// Decodes an `info` line.
    ///
    /// Returns `Ok(None)` for lines that carry no score: non-info chatter,
    /// `info string`, `info currmove`, and so on. A `score` token that is not
    /// followed by `cp|mate <int>` is a decode error.
    pub fn decode(line: &str) -> Result<Option<Self>, UciError> {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() != Some(&"info") {
            return Ok(None);
        }
        // `string` swallows the rest of the line.
        if let Some(at) = tokens.iter().position(|t| *t == "string") {
            tokens.truncate(at);
        }

        let Some(score_at) = tokens.iter().position(|t| *t == "score") else {
            return Ok(None);
        };

        let kind = match tokens.get(score_at + 1) {
            Some(&"cp") => ScoreKind::Centipawn,
            Some(&"mate") => ScoreKind::Mate,
            other => {
                return Err(UciError::Decode(format!(
                    "expected 'cp' or 'mate' after 'score', got {:?}",
                    other
                )))
            }
        };
        let score = tokens
            .get(score_at + 2)
            .and_then(|t| t.parse::<i32>().ok())
            .ok_or_else(|| {
                UciError::Decode(format!("score value is not an integer in '{}'", line.trim()))
            })?;

        let depth = optional_field(&tokens, "depth")?;
        let nps = optional_field(&tokens, "nps")?;

        let pv = match tokens.iter().position(|t| *t == "pv") {
            Some(at) => tokens[at + 1..]
                .iter()
                .map_while(|t| t.parse::<UciMove>().ok())
                .collect(),
            None => Vec::new(),
        };

        Ok(Some(Evaluation {
            score,
            kind,
            depth,
            nps,
            pv,
        }))
    }
}

/// Decodes an `info` line; see [`Evaluation::decode`].
pub fn decode_info_line(line: &str) -> Result<Option<Evaluation>, UciError> {
    Evaluation::decode(line)
}

fn optional_field<T: FromStr + Default>(tokens: &[&str], keyword: &str) -> Result<T, UciError> {
    match tokens.iter().position(|t| *t == keyword) {
        Some(at) => tokens
            .get(at + 1)
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| UciError::Decode(format!("'{}' is not followed by a number", keyword))),
        None => Ok(T::default()),
    }
}

impl fmt::Display for Evaluation {
    /// `+0.35` for centipawns, `#3` / `#-3` for mates.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScoreKind::Centipawn => write!(f, "{:+.2}", f64::from(self.score) / 100.0),
            ScoreKind::Mate => write!(f, "#{}", self.score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_minimal_engine_line() {
        let line = "info depth 1 seldepth 1 score cp 0 nps 0 time 0 nodes 0 pv e2e4";
        let eval = decode_info_line(line).unwrap().unwrap();

        assert_eq!(eval.score, 0);
        assert_eq!(eval.kind, ScoreKind::Centipawn);
        assert_eq!(eval.nps, 0);
        assert_eq!(eval.depth, 1);
        assert_eq!(eval.pv, vec!["e2e4".parse::<UciMove>().unwrap()]);
    }

    #[test]
    fn decode_info() {
        let line = "info depth 12 score cp 30 nodes 125000 nps 500000 pv e2e4 e7e5 g1f3";
        let eval = Evaluation::decode(line).unwrap().unwrap();

        assert_eq!(eval.depth, 12);
        assert_eq!(eval.score, 30);
        assert_eq!(eval.nps, 500000);
        let pv: Vec<&str> = eval.pv.iter().map(UciMove::as_str).collect();
        assert_eq!(pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn decode_mate_score() {
        let line = "info depth 20 score mate -3 nps 10 pv e2e4";
        let eval = Evaluation::decode(line).unwrap().unwrap();

        assert_eq!(eval.kind, ScoreKind::Mate);
        assert_eq!(eval.score, -3);
    }

    #[test]
    fn lines_without_score_are_not_evaluations() {
        assert_eq!(Evaluation::decode("info depth 5 currmove e2e4").unwrap(), None);
        assert_eq!(Evaluation::decode("readyok").unwrap(), None);
        assert_eq!(Evaluation::decode("").unwrap(), None);
        assert_eq!(
            Evaluation::decode("info string best score cp 10 so far").unwrap(),
            None
        );
    }

    #[test]
    fn malformed_score_is_a_decode_error() {
        assert!(Evaluation::decode("info depth 3 score cp abc").is_err());
        assert!(Evaluation::decode("info depth 3 score").is_err());
        assert!(Evaluation::decode("info depth 3 score wdl 10").is_err());
        assert!(Evaluation::decode("info score cp 5 nps fast").is_err());
    }

    #[test]
    fn missing_nps_defaults_to_zero() {
        let eval = Evaluation::decode("info score cp 12").unwrap().unwrap();
        assert_eq!(eval.nps, 0);
        assert!(eval.pv.is_empty());
    }

    #[test]
    fn pv_stops_at_first_non_move() {
        let eval = Evaluation::decode("info score cp 5 pv e2e4 e7e5 hashfull 10")
            .unwrap()
            .unwrap();
        assert_eq!(eval.pv.len(), 2);
    }

    #[test]
    fn bound_markers_are_tolerated() {
        let eval = Evaluation::decode("info depth 9 score cp 41 lowerbound nps 1 pv d2d4")
            .unwrap()
            .unwrap();
        assert_eq!(eval.score, 41);
        assert_eq!(eval.pv.len(), 1);
    }

    #[test]
    fn display_formats() {
        let cp = Evaluation {
            score: 35,
            ..Evaluation::default()
        };
        assert_eq!(cp.to_string(), "+0.35");

        let mate = Evaluation {
            score: -2,
            kind: ScoreKind::Mate,
            ..Evaluation::default()
        };
        assert_eq!(mate.to_string(), "#-2");
    }
}
