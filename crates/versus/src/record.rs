//! Persistence of finished games and of the running results summary.
//!
//! [`GameRecordWriter`] owns the output lock. Every [`append`](GameRecordWriter::append)
//! first rewrites the small summary file from a counters snapshot and then
//! appends one game block to the record log. Blocks land in completion order,
//! which is not the order of the openings file.

use crate::counters::MatchCounters;
use crate::game_runner::{AbortReason, Ending, GameRecord, MatchResult, MoveRecord};
use crate::referee::Outcome;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Line width of PGN move text.
const PGN_LINE_WIDTH: usize = 80;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize game: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialization of the game log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Portable Game Notation, moves in UCI notation.
    #[default]
    Pgn,
    /// One JSON object per game.
    Json,
}

impl RecordFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RecordFormat::Pgn => "pgn",
            RecordFormat::Json => "json",
        }
    }
}

/// Where a match writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub records: PathBuf,
    pub summary: PathBuf,
}

impl OutputPaths {
    /// `<white>_vs_<black>[_<match>].<ext>` and `..._results.txt` inside `dir`.
    ///
    /// The match postfix is only added for match numbers other than 1.
    pub fn new(dir: &Path, white: &str, black: &str, format: RecordFormat, match_number: u32) -> Self {
        let postfix = if match_number == 1 {
            String::new()
        } else {
            format!("_{}", match_number)
        };
        let stem = format!("{}_vs_{}{}", white, black, postfix);
        Self {
            records: dir.join(format!("{}.{}", stem, format.extension())),
            summary: dir.join(format!("{}_results.txt", stem)),
        }
    }
}

struct WriterState {
    /// `None` when record output is suppressed.
    log: Option<File>,
    /// Newest snapshot seen, by `games_started`.
    latest: MatchCounters,
}

/// Serialized writer for the game log and the results summary.
pub struct GameRecordWriter {
    paths: OutputPaths,
    format: RecordFormat,
    /// Names of the first and second engine, in command-line order.
    first: String,
    second: String,
    state: Mutex<WriterState>,
}

impl GameRecordWriter {
    /// Creates `dir` if needed, opens the log for appending and writes an
    /// empty summary.
    ///
    /// With `write_records == false` only the summary is maintained.
    pub fn create(
        paths: OutputPaths,
        first: &str,
        second: &str,
        format: RecordFormat,
        write_records: bool,
    ) -> Result<Self, RecordError> {
        if let Some(dir) = paths.summary.parent() {
            std::fs::create_dir_all(dir).map_err(|source| RecordError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let log = if write_records {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&paths.records)
                .map_err(|source| RecordError::Io {
                    path: paths.records.clone(),
                    source,
                })?;
            Some(file)
        } else {
            None
        };

        let writer = Self {
            paths,
            format,
            first: first.to_string(),
            second: second.to_string(),
            state: Mutex::new(WriterState {
                log,
                latest: MatchCounters::default(),
            }),
        };
        writer.write_summary(&MatchCounters::default())?;
        Ok(writer)
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Commits one finished game.
    ///
    /// Snapshots may arrive out of order; the summary always shows the
    /// newest one seen.
    pub fn append(&self, record: GameRecord, snapshot: &MatchCounters) -> Result<(), RecordError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if snapshot.games_started >= state.latest.games_started {
            state.latest = *snapshot;
        }
        self.write_summary(&state.latest)?;

        if let Some(log) = state.log.as_mut() {
            let block = match self.format {
                RecordFormat::Pgn => render_pgn(&record, &Local::now().format("%Y.%m.%d").to_string()),
                RecordFormat::Json => render_json(&record)?,
            };
            log.write_all(block.as_bytes())
                .and_then(|_| log.flush())
                .map_err(|source| RecordError::Io {
                    path: self.paths.records.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Writes the final summary after all workers joined.
    pub fn finish(&self, totals: &MatchCounters) -> Result<(), RecordError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.latest = *totals;
        self.write_summary(totals)
    }

    fn write_summary(&self, counters: &MatchCounters) -> Result<(), RecordError> {
        std::fs::write(
            &self.paths.summary,
            render_summary(&self.first, &self.second, counters),
        )
        .map_err(|source| RecordError::Io {
            path: self.paths.summary.clone(),
            source,
        })
    }
}

/// Human-readable results summary.
pub fn render_summary(first: &str, second: &str, counters: &MatchCounters) -> String {
    format!(
        "Results:\n{}: {}\n{}: {}\nDraw: {}\nAborted: {}\nGames: {}\n",
        first,
        counters.white_wins,
        second,
        counters.black_wins,
        counters.draws,
        counters.aborted,
        counters.games_started
    )
}

/// Renders one PGN game block, terminated by a blank line.
pub fn render_pgn(record: &GameRecord, date: &str) -> String {
    let result = record.result.as_pgn();
    let mut out = String::new();

    let mut tag = |name: &str, value: &str| {
        out.push_str(&format!("[{} \"{}\"]\n", name, value.replace('"', "'")));
    };
    tag("Event", "Versus Match");
    tag("Site", "Local");
    tag("Date", date);
    tag("Round", &record.round.to_string());
    tag("White", &record.white);
    tag("Black", &record.black);
    tag("Result", result);
    if record.starting_fen != uci::STARTING_FEN {
        tag("SetUp", "1");
        tag("FEN", &record.starting_fen);
    }
    if record.result == MatchResult::Aborted {
        tag("Termination", "abandoned");
    }
    out.push('\n');

    let (mut number, black_first) = move_number(&record.starting_fen);
    let mut tokens: Vec<String> = Vec::new();
    for (i, mv) in record.moves.iter().enumerate() {
        let white_move = (i % 2 == 0) != black_first;
        if white_move {
            tokens.push(format!("{}.", number));
        } else if i == 0 {
            tokens.push(format!("{}...", number));
        }
        tokens.push(mv.uci.to_string());
        if !white_move {
            number += 1;
        }
    }
    if let Ending::Aborted(reason) = &record.ending {
        tokens.push(format!("{{{}}}", reason));
    }
    tokens.push(result.to_string());

    out.push_str(&wrap(&tokens, PGN_LINE_WIDTH));
    out.push_str("\n\n");
    out
}

/// Full-move number and side to move of a FEN; `(1, false)` if absent.
fn move_number(fen: &str) -> (u32, bool) {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let black_first = fields.get(1) == Some(&"b");
    let number = fields
        .get(5)
        .and_then(|n| n.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1);
    (number, black_first)
}

fn wrap(tokens: &[String], width: usize) -> String {
    let mut text = String::new();
    let mut line_len = 0;
    for token in tokens {
        if line_len > 0 && line_len + 1 + token.len() > width {
            text.push('\n');
            line_len = 0;
        } else if line_len > 0 {
            text.push(' ');
            line_len += 1;
        }
        text.push_str(token);
        line_len += token.len();
    }
    text
}

#[derive(Serialize)]
struct JsonGame<'a> {
    round: u64,
    white: &'a str,
    black: &'a str,
    starting_fen: &'a str,
    result: MatchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    termination: Option<String>,
    moves: &'a [MoveRecord],
}

/// Renders one compact JSON object followed by a blank line.
pub fn render_json(record: &GameRecord) -> Result<String, RecordError> {
    let termination = match &record.ending {
        Ending::Finished(Outcome::Draw(reason)) => Some(reason.to_string()),
        Ending::Finished(Outcome::Winner(_)) => Some("checkmate".to_string()),
        Ending::Aborted(reason) => Some(abort_label(reason)),
    };
    let game = JsonGame {
        round: record.round,
        white: &record.white,
        black: &record.black,
        starting_fen: &record.starting_fen,
        result: record.result,
        termination,
        moves: &record.moves,
    };
    Ok(format!("{}\n\n", serde_json::to_string(&game)?))
}

fn abort_label(reason: &AbortReason) -> String {
    format!("abandoned: {}", reason)
}
