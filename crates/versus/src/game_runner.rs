//! Game execution logic for running one game between two engines.
//!
//! [`GameRunner`] alternates between two [`Player`]s, asks the [`Referee`]
//! after every move whether the game is over, and enforces the ply ceiling.
//! Whatever goes wrong inside a game ends up as [`MatchResult::Aborted`] with
//! an [`AbortReason`]; the runner itself never fails and never touches shared
//! state or files.

use crate::client::EngineClient;
use crate::process::EngineError;
use crate::referee::{Outcome, Referee, Side};
use serde::{Deserialize, Serialize};
use std::fmt;
use uci::{Evaluation, PositionSpec, SearchOptions, UciMove};

/// What a player answered for one position.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    /// `None` when the engine reported no legal move.
    pub mv: Option<UciMove>,
    /// The last evaluation of the search, if the engine reported one.
    pub evaluation: Option<Evaluation>,
}

/// Something that picks moves.
pub trait Player {
    fn name(&self) -> &str;

    /// Searches `position` and returns the chosen move.
    fn think(&mut self, position: &PositionSpec, options: &SearchOptions)
        -> Result<Reply, EngineError>;
}

impl Player for EngineClient {
    fn name(&self) -> &str {
        EngineClient::name(self)
    }

    fn think(
        &mut self,
        position: &PositionSpec,
        options: &SearchOptions,
    ) -> Result<Reply, EngineError> {
        self.set_position(position)?;
        self.go(options)?;
        let mv = self.wait_for_best_move()?;
        Ok(Reply {
            mv,
            evaluation: self.last_evaluation().cloned(),
        })
    }
}

/// A single move with the evaluation the engine reported for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub uci: UciMove,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

/// The outcome of a chess game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchResult {
    WhiteWins,
    BlackWins,
    Draw,
    /// The game did not reach a legal conclusion; see [`AbortReason`].
    Aborted,
}

impl MatchResult {
    /// PGN result token.
    pub fn as_pgn(self) -> &'static str {
        match self {
            MatchResult::WhiteWins => "1-0",
            MatchResult::BlackWins => "0-1",
            MatchResult::Draw => "1/2-1/2",
            MatchResult::Aborted => "*",
        }
    }
}

/// Why a game was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// The starting FEN was rejected.
    InvalidStart(String),
    /// The ply ceiling was reached without a result.
    MoveCeiling(usize),
    /// An engine answered `bestmove (none)` in a position that is not over.
    NoMove(Side),
    /// An engine answered a move that is not legal.
    IllegalMove(Side, UciMove),
    /// An engine died or broke the protocol.
    Engine(String),
    /// The worker process playing the game went away.
    WorkerLost(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::InvalidStart(fen) => write!(f, "invalid starting position '{}'", fen),
            AbortReason::MoveCeiling(plies) => write!(f, "no result after {} plies", plies),
            AbortReason::NoMove(side) => write!(f, "{:?} returned no move", side),
            AbortReason::IllegalMove(side, mv) => write!(f, "{:?} played illegal move {}", side, mv),
            AbortReason::Engine(e) => write!(f, "engine failure: {}", e),
            AbortReason::WorkerLost(e) => write!(f, "worker failure: {}", e),
        }
    }
}

/// How a game ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ending {
    Finished(Outcome),
    Aborted(AbortReason),
}

/// Settings for every game of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Options of every `go`.
    pub search: SearchOptions,
    /// Plies after which an unfinished game is abandoned.
    pub max_plies: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            search: SearchOptions::movetime(200),
            max_plies: 500,
        }
    }
}

/// A finished game, not yet numbered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayedGame {
    pub starting_fen: String,
    pub moves: Vec<MoveRecord>,
    pub ending: Ending,
}

impl PlayedGame {
    pub fn result(&self) -> MatchResult {
        match &self.ending {
            Ending::Finished(Outcome::Winner(Side::White)) => MatchResult::WhiteWins,
            Ending::Finished(Outcome::Winner(Side::Black)) => MatchResult::BlackWins,
            Ending::Finished(Outcome::Draw(_)) => MatchResult::Draw,
            Ending::Aborted(_) => MatchResult::Aborted,
        }
    }

    /// Attaches round number and player names.
    pub fn into_record(self, round: u64, white: &str, black: &str) -> GameRecord {
        let result = self.result();
        GameRecord {
            round,
            white: white.to_string(),
            black: black.to_string(),
            starting_fen: self.starting_fen,
            moves: self.moves,
            result,
            ending: self.ending,
        }
    }
}

/// A completed game as handed to the record writer.
#[derive(Debug, Clone)]
pub struct GameRecord {
    /// Completion order within the match, starting at 1.
    pub round: u64,
    pub white: String,
    pub black: String,
    pub starting_fen: String,
    pub moves: Vec<MoveRecord>,
    pub result: MatchResult,
    pub ending: Ending,
}

/// Plays games under one set of rules and settings.
///
/// # Example
///
/// ```ignore
/// let mut runner = GameRunner::new(StandardReferee::new(), RunnerConfig::default());
/// let game = runner.play(&mut white, &mut black, uci::STARTING_FEN);
/// println!("{:?}", game.result());
/// ```
pub struct GameRunner<R: Referee> {
    referee: R,
    config: RunnerConfig,
}

impl<R: Referee> GameRunner<R> {
    pub fn new(referee: R, config: RunnerConfig) -> Self {
        Self { referee, config }
    }

    /// Plays one game from `fen` to its end.
    ///
    /// The position sent for every move is the starting FEN plus the full
    /// move history.
    pub fn play(
        &mut self,
        white: &mut dyn Player,
        black: &mut dyn Player,
        fen: &str,
    ) -> PlayedGame {
        let starting_fen = fen.trim().to_string();
        let mut moves: Vec<MoveRecord> = Vec::new();
        let ending = self.play_moves(white, black, &starting_fen, &mut moves);

        if let Ending::Aborted(reason) = &ending {
            tracing::warn!(
                white = white.name(),
                black = black.name(),
                plies = moves.len(),
                %reason,
                "game aborted"
            );
        }

        PlayedGame {
            starting_fen,
            moves,
            ending,
        }
    }

    fn play_moves(
        &mut self,
        white: &mut dyn Player,
        black: &mut dyn Player,
        fen: &str,
        moves: &mut Vec<MoveRecord>,
    ) -> Ending {
        if let Err(e) = self.referee.reset(fen) {
            return Ending::Aborted(AbortReason::InvalidStart(e.to_string()));
        }
        let mut history: Vec<UciMove> = Vec::new();

        loop {
            if let Some(outcome) = self.referee.outcome() {
                return Ending::Finished(outcome);
            }
            if moves.len() >= self.config.max_plies {
                return Ending::Aborted(AbortReason::MoveCeiling(moves.len()));
            }

            let side = self.referee.side_to_move();
            let player: &mut dyn Player = match side {
                Side::White => &mut *white,
                Side::Black => &mut *black,
            };

            let position = PositionSpec::from_history(fen, &history);
            let reply = match player.think(&position, &self.config.search) {
                Ok(reply) => reply,
                Err(e) => return Ending::Aborted(AbortReason::Engine(e.to_string())),
            };
            let Some(mv) = reply.mv else {
                return Ending::Aborted(AbortReason::NoMove(side));
            };
            if self.referee.play(&mv).is_err() {
                return Ending::Aborted(AbortReason::IllegalMove(side, mv));
            }

            history.push(mv.clone());
            moves.push(MoveRecord {
                uci: mv,
                evaluation: reply.evaluation,
            });
        }
    }
}
