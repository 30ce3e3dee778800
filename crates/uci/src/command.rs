//! Commands sent from the controller to an engine.

use crate::{PositionSpec, UciError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Check if engine is ready.
    IsReady,
    /// Announce that the next search belongs to a new game.
    UciNewGame,
    /// Set an engine option.
    SetOption { name: String, value: String },
    /// Set up position.
    Position(PositionSpec),
    /// Start calculating.
    Go(SearchOptions),
    /// Stop calculating.
    Stop,
    /// Quit the engine.
    Quit,
}

impl GuiCommand {
    /// Format command for the wire (no trailing newline).
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            GuiCommand::Position(spec) => spec.to_uci(),
            GuiCommand::Go(opts) => {
                let args = opts.to_string();
                if args.is_empty() {
                    "go".to_string()
                } else {
                    format!("go {}", args)
                }
            }
            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
        }
    }
}

/// Options for the `go` command.
///
/// Zero and `false` mean "not set": such fields are never written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Search to this depth.
    pub depth: u32,
    /// Search this many nodes.
    pub nodes: u64,
    /// Search for exactly this time in milliseconds.
    pub movetime: u64,
    /// White time remaining in milliseconds.
    pub wtime: u64,
    /// Black time remaining in milliseconds.
    pub btime: u64,
    /// Search indefinitely until `stop`.
    pub infinite: bool,
    /// Search in pondering mode.
    pub ponder: bool,
}

impl SearchOptions {
    /// Fixed time per move.
    pub fn movetime(ms: u64) -> Self {
        Self {
            movetime: ms,
            ..Self::default()
        }
    }

    /// Fixed depth.
    pub fn depth(depth: u32) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    /// True when no field is set, i.e. a bare `go`.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Formats the argument list of `go` in fixed field order.
pub fn format_search_options(opts: &SearchOptions) -> String {
    opts.to_string()
}

impl fmt::Display for SearchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();

        if self.depth != 0 {
            parts.push(format!("depth {}", self.depth));
        }
        if self.nodes != 0 {
            parts.push(format!("nodes {}", self.nodes));
        }
        if self.movetime != 0 {
            parts.push(format!("movetime {}", self.movetime));
        }
        if self.wtime != 0 {
            parts.push(format!("wtime {}", self.wtime));
        }
        if self.btime != 0 {
            parts.push(format!("btime {}", self.btime));
        }
        if self.infinite {
            parts.push("infinite".to_string());
        }
        if self.ponder {
            parts.push("ponder".to_string());
        }

        f.write_str(&parts.join(" "))
    }
}

fn number<T: FromStr>(keyword: &str, value: Option<&&str>) -> Result<T, UciError> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| UciError::InvalidCommand(format!("'{}' needs a numeric value", keyword)))
}

impl FromStr for SearchOptions {
    type Err = UciError;

    /// Parses `go` arguments, with or without the leading `go`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut opts = SearchOptions::default();
        let parts: Vec<&str> = s.split_whitespace().collect();
        let mut i = usize::from(parts.first() == Some(&"go"));

        while i < parts.len() {
            match parts[i] {
                "depth" => {
                    i += 1;
                    opts.depth = number("depth", parts.get(i))?;
                }
                "nodes" => {
                    i += 1;
                    opts.nodes = number("nodes", parts.get(i))?;
                }
                "movetime" => {
                    i += 1;
                    opts.movetime = number("movetime", parts.get(i))?;
                }
                "wtime" => {
                    i += 1;
                    opts.wtime = number("wtime", parts.get(i))?;
                }
                "btime" => {
                    i += 1;
                    opts.btime = number("btime", parts.get(i))?;
                }
                "infinite" => opts.infinite = true,
                "ponder" => opts.ponder = true,
                other => {
                    return Err(UciError::InvalidCommand(format!(
                        "unknown search option '{}'",
                        other
                    )))
                }
            }
            i += 1;
        }

        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn simple_commands() {
        assert_eq!(GuiCommand::Uci.to_uci(), "uci");
        assert_eq!(GuiCommand::IsReady.to_uci(), "isready");
        assert_eq!(GuiCommand::UciNewGame.to_uci(), "ucinewgame");
        assert_eq!(GuiCommand::Stop.to_uci(), "stop");
        assert_eq!(GuiCommand::Quit.to_uci(), "quit");
    }

    #[test]
    fn setoption_command() {
        let cmd = GuiCommand::SetOption {
            name: "Hash".to_string(),
            value: "64".to_string(),
        };
        assert_eq!(cmd.to_uci(), "setoption name Hash value 64");
    }

    #[test]
    fn go_omits_unset_fields() {
        assert_eq!(GuiCommand::Go(SearchOptions::default()).to_uci(), "go");
        assert_eq!(
            GuiCommand::Go(SearchOptions::movetime(200)).to_uci(),
            "go movetime 200"
        );
    }

    #[test]
    fn go_uses_fixed_field_order() {
        let opts = SearchOptions {
            depth: 8,
            nodes: 1000,
            movetime: 50,
            wtime: 60000,
            btime: 59000,
            infinite: true,
            ponder: true,
        };
        assert_eq!(
            format_search_options(&opts),
            "depth 8 nodes 1000 movetime 50 wtime 60000 btime 59000 infinite ponder"
        );
    }

    #[test]
    fn parse_accepts_leading_go() {
        let opts: SearchOptions = "go depth 10 infinite".parse().unwrap();
        assert_eq!(opts.depth, 10);
        assert!(opts.infinite);
        assert_eq!(opts.movetime, 0);
    }

    #[test]
    fn parse_rejects_missing_value() {
        assert!("movetime".parse::<SearchOptions>().is_err());
        assert!("depth ten".parse::<SearchOptions>().is_err());
        assert!("searchmoves e2e4".parse::<SearchOptions>().is_err());
    }

    #[test]
    fn empty_options() {
        assert!(SearchOptions::default().is_empty());
        assert!(!SearchOptions::depth(1).is_empty());
    }

    fn any_options() -> impl Strategy<Value = SearchOptions> {
        (
            prop_oneof![Just(0u32), 1..64u32],
            prop_oneof![Just(0u64), 1..1_000_000u64],
            prop_oneof![Just(0u64), 1..100_000u64],
            prop_oneof![Just(0u64), 1..100_000u64],
            prop_oneof![Just(0u64), 1..100_000u64],
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(
                |(depth, nodes, movetime, wtime, btime, infinite, ponder)| SearchOptions {
                    depth,
                    nodes,
                    movetime,
                    wtime,
                    btime,
                    infinite,
                    ponder,
                },
            )
    }

    proptest! {
        #[test]
        fn formatting_never_emits_defaults(opts in any_options()) {
            let text = format_search_options(&opts);
            let tokens: Vec<&str> = text.split_whitespace().collect();
            prop_assert!(!tokens.contains(&"0"));
            prop_assert_eq!(tokens.contains(&"infinite"), opts.infinite);
            prop_assert_eq!(tokens.contains(&"ponder"), opts.ponder);
            prop_assert_eq!(tokens.contains(&"depth"), opts.depth != 0);
            prop_assert_eq!(tokens.contains(&"movetime"), opts.movetime != 0);

            let decoded: SearchOptions = text.parse().unwrap();
            prop_assert_eq!(decoded, opts);
        }
    }
}
