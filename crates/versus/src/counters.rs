//! Match-wide counters shared by all workers.
//!
//! One mutex guards the whole record so that the increment of
//! `games_started` and of the matching outcome slot happen together.

use crate::game_runner::MatchResult;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Which engine sits on which side during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seating {
    /// The first engine plays white.
    Original,
    /// Colors swapped for the return pass.
    Swapped,
}

/// Cumulative results of a match.
///
/// `white_wins` and `black_wins` belong to the engines as they were given on
/// the command line (first and second), not to whichever color they played
/// in a particular game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchCounters {
    pub games_started: u64,
    pub white_wins: u64,
    pub black_wins: u64,
    pub draws: u64,
    pub aborted: u64,
}

impl MatchCounters {
    /// Counts one finished game.
    pub fn tally(&mut self, result: MatchResult, seating: Seating) {
        self.games_started += 1;
        match (result, seating) {
            (MatchResult::WhiteWins, Seating::Original) | (MatchResult::BlackWins, Seating::Swapped) => {
                self.white_wins += 1
            }
            (MatchResult::BlackWins, Seating::Original) | (MatchResult::WhiteWins, Seating::Swapped) => {
                self.black_wins += 1
            }
            (MatchResult::Draw, _) => self.draws += 1,
            (MatchResult::Aborted, _) => self.aborted += 1,
        }
    }

    /// Sum of all outcome slots; equals `games_started` whenever no game is in flight.
    pub fn outcomes(&self) -> u64 {
        self.white_wins + self.black_wins + self.draws + self.aborted
    }
}

/// Position of the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }

    /// Remaining time, extrapolated from the average time per completed game.
    pub fn eta(&self) -> Duration {
        if self.completed == 0 {
            return Duration::ZERO;
        }
        let remaining = self.total.saturating_sub(self.completed);
        let per_game = self.elapsed.as_secs_f64() / self.completed as f64;
        Duration::from_secs_f64(per_game * remaining as f64)
    }
}

/// Formats a duration as `1h 2m 3s`, leaving out zero hours and minutes.
pub fn format_eta(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, mins, secs) = (total / 3600, total / 60 % 60, total % 60);

    let mut text = String::new();
    if hours > 0 {
        text.push_str(&format!("{}h ", hours));
    }
    if hours > 0 || mins > 0 {
        text.push_str(&format!("{}m ", mins));
    }
    text.push_str(&format!("{}s", secs));
    text
}

/// What a worker learns when it records a game.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    /// Round number for the game record; completion order across the match.
    pub round: u64,
    /// Counters including this game.
    pub snapshot: MatchCounters,
    pub progress: Progress,
}

#[derive(Debug)]
struct CounterState {
    totals: MatchCounters,
    pass_completed: u64,
    pass_total: u64,
    pass_started: Instant,
}

/// [`MatchCounters`] behind the counter lock, plus progress of the current pass.
#[derive(Debug)]
pub struct SharedCounters {
    state: Mutex<CounterState>,
}

impl Default for SharedCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedCounters {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CounterState {
                totals: MatchCounters::default(),
                pass_completed: 0,
                pass_total: 0,
                pass_started: Instant::now(),
            }),
        }
    }

    // A worker that panicked mid-game never held this lock across the game,
    // so the data behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a pass of `total` games. Resets the progress counter, keeps the results.
    pub fn begin_pass(&self, total: u64) {
        let mut state = self.lock();
        state.pass_completed = 0;
        state.pass_total = total;
        state.pass_started = Instant::now();
    }

    /// Records one finished game.
    pub fn record(&self, result: MatchResult, seating: Seating) -> Completion {
        let mut state = self.lock();
        state.totals.tally(result, seating);
        state.pass_completed += 1;
        Completion {
            round: state.totals.games_started,
            snapshot: state.totals,
            progress: Progress {
                completed: state.pass_completed,
                total: state.pass_total,
                elapsed: state.pass_started.elapsed(),
            },
        }
    }

    pub fn snapshot(&self) -> MatchCounters {
        self.lock().totals
    }
}
