//! Parallel match execution.
//!
//! [`MatchOrchestrator`] plays every starting position of a [`MatchPlan`] on a
//! pool of worker processes (see [`crate::worker`]). Each worker owns one pair
//! of engine processes for the whole pass. A driver thread per worker claims
//! positions from a shared queue, sends them to its worker and commits the
//! games that come back.
//!
//! Drivers share exactly one [`SharedContext`]: the counters (lock one), the
//! record writer (lock two, inside the writer) and the queue cursor (atomic).
//! A driver releases the counter lock before it calls the writer, so the two
//! locks are never held together.

use crate::client::EngineSettings;
use crate::counters::{format_eta, Completion, MatchCounters, Seating, SharedCounters};
use crate::game_runner::{AbortReason, Ending, PlayedGame, RunnerConfig};
use crate::record::{GameRecordWriter, OutputPaths, RecordError, RecordFormat};
use crate::worker::{WorkerCommand, WorkerProcess, WorkerSetup};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that stop a match before any game is played.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Engine binary not found: {0}")]
    MissingEngine(PathBuf),
    #[error("No starting positions to play")]
    NoPositions,
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// An engine binary taking part in the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSpec {
    pub path: PathBuf,
    /// Display name, the file stem of `path`.
    pub name: String,
}

impl EngineSpec {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }
}

/// Everything needed to run one match.
#[derive(Debug, Clone)]
pub struct MatchPlan {
    /// Plays white in the first pass.
    pub first: EngineSpec,
    /// Plays black in the first pass.
    pub second: EngineSpec,
    /// Starting FENs, one game each per pass.
    pub openings: Vec<String>,
    pub workers: usize,
    /// Replay every position with colors swapped.
    pub both_sides: bool,
    pub runner: RunnerConfig,
    pub engine: EngineSettings,
    /// Directory for the game log and summary.
    pub output_dir: PathBuf,
    pub format: RecordFormat,
    pub write_records: bool,
    pub match_number: u32,
    /// Added to the completed count on the progress line.
    pub progress_offset: u64,
    /// Starts one worker process.
    pub worker: WorkerCommand,
}

/// Result of a finished match.
#[derive(Debug, Clone)]
pub struct MatchSummary {
    pub totals: MatchCounters,
    /// Positions no worker could play because engines or workers failed to start.
    pub unplayed: usize,
    pub elapsed: Duration,
    pub paths: OutputPaths,
}

/// Queue of starting positions for one pass.
struct WorkQueue<'a> {
    positions: &'a [String],
    next: AtomicUsize,
}

impl<'a> WorkQueue<'a> {
    fn new(positions: &'a [String]) -> Self {
        Self {
            positions,
            next: AtomicUsize::new(0),
        }
    }

    fn claim(&self) -> Option<&'a str> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.positions.get(index).map(String::as_str)
    }

    fn unclaimed(&self) -> usize {
        self.positions
            .len()
            .saturating_sub(self.next.load(Ordering::Relaxed))
    }
}

/// State shared by all workers of a match.
pub struct SharedContext {
    pub counters: SharedCounters,
    pub writer: GameRecordWriter,
    progress_offset: u64,
}

impl SharedContext {
    /// Counts a game, prints progress and hands the record to the writer.
    fn commit(&self, game: PlayedGame, seating: Seating, white: &str, black: &str) {
        let completion = self.counters.record(game.result(), seating);
        self.report_progress(&completion);

        let record = game.into_record(completion.round, white, black);
        if let Err(e) = self.writer.append(record, &completion.snapshot) {
            tracing::error!(error = %e, round = completion.round, "failed to write game record");
        }
    }

    fn report_progress(&self, completion: &Completion) {
        let progress = &completion.progress;
        let mut out = std::io::stdout().lock();
        let _ = writeln!(
            out,
            "{:4} {:5.1}% | ETA: {}",
            progress.completed + self.progress_offset,
            progress.percent(),
            format_eta(progress.eta())
        );
        let _ = out.flush();
    }
}

/// Runs matches.
pub struct MatchOrchestrator {
    plan: MatchPlan,
}

impl MatchOrchestrator {
    pub fn new(plan: MatchPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &MatchPlan {
        &self.plan
    }

    /// Checks that the match can start at all.
    pub fn preflight(&self) -> Result<(), MatchError> {
        for engine in [&self.plan.first, &self.plan.second] {
            if !engine.path.exists() {
                return Err(MatchError::MissingEngine(engine.path.clone()));
            }
        }
        if self.plan.openings.is_empty() {
            return Err(MatchError::NoPositions);
        }
        Ok(())
    }

    /// Plays the whole match and blocks until every worker has finished.
    ///
    /// # Errors
    ///
    /// Only configuration-time failures are errors: a missing engine binary,
    /// an empty position list, or an output directory that cannot be created.
    /// Failures inside games become aborted games.
    pub fn run(&self) -> Result<MatchSummary, MatchError> {
        self.preflight()?;
        let plan = &self.plan;
        let started = Instant::now();

        let paths = OutputPaths::new(
            &plan.output_dir,
            &plan.first.name,
            &plan.second.name,
            plan.format,
            plan.match_number,
        );
        let writer = GameRecordWriter::create(
            paths,
            &plan.first.name,
            &plan.second.name,
            plan.format,
            plan.write_records,
        )?;
        let context = SharedContext {
            counters: SharedCounters::new(),
            writer,
            progress_offset: plan.progress_offset,
        };

        let mut passes = vec![Seating::Original];
        if plan.both_sides {
            passes.push(Seating::Swapped);
        }

        let mut unplayed = 0;
        for seating in passes {
            unplayed += self.run_pass(&context, seating);
        }

        let totals = context.counters.snapshot();
        context.writer.finish(&totals)?;

        if unplayed > 0 {
            tracing::warn!(unplayed, "some positions were not played");
        }
        Ok(MatchSummary {
            totals,
            unplayed,
            elapsed: started.elapsed(),
            paths: context.writer.paths().clone(),
        })
    }

    /// Plays every position once with the given seating; returns the number
    /// of positions left unplayed.
    fn run_pass(&self, context: &SharedContext, seating: Seating) -> usize {
        let plan = &self.plan;
        let (white, black) = match seating {
            Seating::Original => (&plan.first, &plan.second),
            Seating::Swapped => (&plan.second, &plan.first),
        };
        let queue = WorkQueue::new(&plan.openings);
        let workers = plan.workers.clamp(1, plan.openings.len().max(1));

        context.counters.begin_pass(plan.openings.len() as u64);
        tracing::info!(
            white = %white.name,
            black = %black.name,
            games = plan.openings.len(),
            workers,
            "starting pass"
        );

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    let queue = &queue;
                    let setup = WorkerSetup {
                        id,
                        white: white.clone(),
                        black: black.clone(),
                        runner: plan.runner,
                        engine: plan.engine.clone(),
                    };
                    scope.spawn(move || drive(&plan.worker, &setup, seating, context, queue))
                })
                .collect();

            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("worker driver panicked");
                }
            }
        });

        queue.unclaimed()
    }
}

/// Feeds positions to one worker process until the queue is empty or the
/// worker can no longer play.
///
/// A worker that fails to start claims nothing. A worker that dies mid-game
/// costs that game, which is recorded as aborted.
fn drive(
    command: &WorkerCommand,
    setup: &WorkerSetup,
    seating: Seating,
    context: &SharedContext,
    queue: &WorkQueue<'_>,
) {
    let (white, black) = (&setup.white.name, &setup.black.name);
    let mut worker = match WorkerProcess::start(command, setup) {
        Ok(worker) => worker,
        Err(e) => {
            tracing::error!(worker = setup.id, error = %e, "worker failed to start");
            return;
        }
    };

    while let Some(fen) = queue.claim() {
        match worker.play(fen) {
            Ok((game, healthy)) => {
                context.commit(game, seating, white, black);
                if !healthy {
                    tracing::error!(worker = setup.id, "worker lost its engines, no more games");
                    return;
                }
            }
            Err(e) => {
                tracing::error!(worker = setup.id, error = %e, "worker process failed");
                let game = PlayedGame {
                    starting_fen: fen.trim().to_string(),
                    moves: Vec::new(),
                    ending: Ending::Aborted(AbortReason::WorkerLost(e.to_string())),
                };
                context.commit(game, seating, white, black);
                return;
            }
        }
    }
}
