//! UCI (Universal Chess Interface) protocol codec for engine controllers.
//!
//! This crate builds the commands a controller sends to a chess engine and
//! decodes the lines the engine writes back. It performs no I/O.
//!
//! # Outbound commands
//!
//! - `uci` - Initialize engine, get id and options
//! - `isready` / `readyok` - Synchronization
//! - `setoption name <k> value <v>` - Configure the engine
//! - `position fen <fen> [moves <move>...]` - Set position
//! - `go [depth D] [nodes N] [movetime T] [wtime T] [btime T] [infinite] [ponder]` - Start search
//! - `stop` - Stop search
//! - `quit` - Exit engine
//!
//! # Inbound lines
//!
//! - `id name <name>`, `uciok`, `readyok`
//! - `info ... score (cp|mate) <n> ... nps <n> ... pv <moves>`
//! - `bestmove <move|(none)> [ponder <move>]`

mod command;
mod info;
mod mov;
mod position;

pub use command::{format_search_options, GuiCommand, SearchOptions};
pub use info::{decode_info_line, Evaluation, ScoreKind};
pub use mov::UciMove;
pub use position::{PositionSpec, STARTING_FEN};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UciError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Invalid move: {0}")]
    InvalidMove(String),
}

/// Result of a finished search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMove {
    /// The chosen move; `None` when the engine reported `(none)` (no legal move).
    pub mv: Option<UciMove>,
    /// Move the engine expects in reply.
    pub ponder: Option<UciMove>,
}

/// Decodes a `bestmove` line.
///
/// `bestmove (none)` (and the null move `0000`) decode to a [`BestMove`]
/// without a move. Anything that is not a well-formed `bestmove` line is an error.
pub fn decode_best_move(line: &str) -> Result<BestMove, UciError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["bestmove", mv, rest @ ..] => {
            let mv = match *mv {
                "(none)" | "0000" => None,
                other => Some(other.parse()?),
            };
            let ponder = match rest {
                [] => None,
                ["ponder", p, ..] => p.parse().ok(),
                _ => {
                    return Err(UciError::Decode(format!(
                        "unexpected tokens after bestmove: '{}'",
                        line.trim()
                    )))
                }
            };
            Ok(BestMove { mv, ponder })
        }
        _ => Err(UciError::Decode(format!(
            "not a bestmove line: '{}'",
            line.trim()
        ))),
    }
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id { name: Option<String>, author: Option<String> },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search progress carrying a score.
    Info(Evaluation),
    /// Best move found.
    BestMove(BestMove),
    /// Anything else: option declarations, `info string`, debug chatter.
    Other(String),
}

impl EngineMessage {
    /// Classify and decode one engine output line.
    pub fn parse(line: &str) -> Result<Self, UciError> {
        let line = line.trim();
        let keyword = line.split_whitespace().next().unwrap_or("");

        match keyword {
            "uciok" => Ok(EngineMessage::UciOk),
            "readyok" => Ok(EngineMessage::ReadyOk),
            "bestmove" => decode_best_move(line).map(EngineMessage::BestMove),
            "info" => Ok(match Evaluation::decode(line)? {
                Some(eval) => EngineMessage::Info(eval),
                None => EngineMessage::Other(line.to_string()),
            }),
            "id" => {
                if let Some(name) = line.strip_prefix("id name ") {
                    Ok(EngineMessage::Id {
                        name: Some(name.trim().to_string()),
                        author: None,
                    })
                } else if let Some(author) = line.strip_prefix("id author ") {
                    Ok(EngineMessage::Id {
                        name: None,
                        author: Some(author.trim().to_string()),
                    })
                } else {
                    Ok(EngineMessage::Other(line.to_string()))
                }
            }
            _ => Ok(EngineMessage::Other(line.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bestmove_with_move() {
        let best = decode_best_move("bestmove e2e4").unwrap();
        assert_eq!(best.mv.unwrap().as_str(), "e2e4");
        assert_eq!(best.ponder, None);
    }

    #[test]
    fn bestmove_none_is_no_move() {
        assert_eq!(decode_best_move("bestmove (none)").unwrap().mv, None);
        assert_eq!(decode_best_move("bestmove 0000").unwrap().mv, None);
    }

    #[test]
    fn bestmove_with_ponder() {
        let best = decode_best_move("bestmove g1f3 ponder g8f6\n").unwrap();
        assert_eq!(best.mv.unwrap().as_str(), "g1f3");
        assert_eq!(best.ponder.unwrap().as_str(), "g8f6");
    }

    #[test]
    fn malformed_bestmove_is_an_error() {
        assert!(decode_best_move("bestmove").is_err());
        assert!(decode_best_move("bestmove xyz").is_err());
        assert!(decode_best_move("bestmove e2e4 garbage").is_err());
        assert!(decode_best_move("info depth 1").is_err());
    }

    #[test]
    fn parse_handshake_messages() {
        assert_eq!(EngineMessage::parse("uciok").unwrap(), EngineMessage::UciOk);
        assert_eq!(EngineMessage::parse("readyok\n").unwrap(), EngineMessage::ReadyOk);
        assert_eq!(
            EngineMessage::parse("id name CEngine v30").unwrap(),
            EngineMessage::Id {
                name: Some("CEngine v30".to_string()),
                author: None
            }
        );
    }

    #[test]
    fn parse_info_messages() {
        match EngineMessage::parse("info depth 3 score cp -20 nps 5 pv d7d5").unwrap() {
            EngineMessage::Info(eval) => assert_eq!(eval.score, -20),
            other => panic!("Expected Info, got {:?}", other),
        }
        assert!(matches!(
            EngineMessage::parse("info string hello").unwrap(),
            EngineMessage::Other(_)
        ));
        assert!(EngineMessage::parse("info score mate x").is_err());
    }

    #[test]
    fn parse_unknown_lines() {
        assert!(matches!(
            EngineMessage::parse("option name Hash type spin default 16").unwrap(),
            EngineMessage::Other(_)
        ));
    }
}
