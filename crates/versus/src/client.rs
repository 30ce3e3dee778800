//! UCI client for communicating with chess engines.
//!
//! [`EngineClient`] layers the protocol on top of an [`EngineProcess`]: the
//! handshake, readiness probes, position loading, search control, and a live
//! [`EvaluationStream`] that can be polled once per tick by a render or
//! decision loop without ever blocking it.
//!
//! # Example
//!
//! ```no_run
//! use uci::{PositionSpec, SearchOptions};
//! use versus::client::{EngineClient, EngineSettings};
//!
//! let mut client = EngineClient::launch("/usr/bin/stockfish", &EngineSettings::default())?;
//! client.set_position(&PositionSpec::startpos())?;
//! client.go(&SearchOptions::movetime(1000))?;
//! for evaluation in client.stream_evaluation().take(1000) {
//!     println!("{}", evaluation?);
//! }
//! let best = client.wait_for_best_move()?;
//! println!("Best move: {:?}", best);
//! client.shutdown();
//! # Ok::<(), versus::process::EngineError>(())
//! ```

use crate::process::{EngineError, EngineProcess, EngineState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use uci::{BestMove, EngineMessage, Evaluation, GuiCommand, PositionSpec, SearchOptions, UciMove};

/// Settings applied to every engine a match starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Upper bound for `uciok` and `readyok` during startup.
    pub handshake_timeout: Duration,
    /// How long `quit` may take before the process is killed.
    pub quit_timeout: Duration,
    /// `setoption` pairs sent after the handshake.
    pub options: BTreeMap<String, String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            quit_timeout: Duration::from_secs(1),
            options: BTreeMap::new(),
        }
    }
}

/// A client for one UCI engine process.
///
/// # Lifecycle
///
/// 1. Start with [`EngineClient::launch`] (or [`EngineClient::start`] + [`EngineClient::initialize`])
/// 2. Load a position with [`EngineClient::set_position`] and search with [`EngineClient::go`]
/// 3. Follow the search with [`EngineClient::stream_evaluation`] and/or
///    collect the result with [`EngineClient::wait_for_best_move`]
/// 4. Clean up with [`EngineClient::shutdown`] (or rely on [`Drop`])
pub struct EngineClient {
    process: EngineProcess,
    settings: EngineSettings,
    /// Name reported by `id name`, if any.
    id_name: Option<String>,
    /// Latest evaluation of the current search.
    evaluation: Evaluation,
    /// Whether `evaluation` was decoded during the current search.
    evaluated: bool,
    /// `bestmove` observed but not yet handed to the caller.
    pending: Option<BestMove>,
}

impl EngineClient {
    /// Spawns the engine without talking to it.
    pub fn start<P: AsRef<Path>>(path: P, settings: &EngineSettings) -> Result<Self, EngineError> {
        Ok(Self {
            process: EngineProcess::start(path)?,
            settings: settings.clone(),
            id_name: None,
            evaluation: Evaluation::default(),
            evaluated: false,
            pending: None,
        })
    }

    /// Spawns the engine, runs the handshake and applies the configured options.
    pub fn launch<P: AsRef<Path>>(path: P, settings: &EngineSettings) -> Result<Self, EngineError> {
        let mut client = Self::start(path, settings)?;
        client.initialize()?;
        Ok(client)
    }

    /// Name from the executable path.
    pub fn name(&self) -> &str {
        self.process.name()
    }

    /// Name the engine reported during the handshake.
    pub fn id_name(&self) -> Option<&str> {
        self.id_name.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.process.state()
    }

    fn send(&mut self, command: &GuiCommand) -> Result<(), EngineError> {
        self.process.write_line(&command.to_uci())
    }

    /// Folds one engine line into the client state.
    ///
    /// Malformed `info` lines are tolerated and leave the evaluation as it
    /// was; a malformed `bestmove` is an error.
    fn absorb(&mut self, line: &str) -> Result<Option<EngineMessage>, EngineError> {
        match EngineMessage::parse(line) {
            Ok(EngineMessage::Info(eval)) => {
                self.evaluation = eval;
                self.evaluated = true;
                Ok(None)
            }
            Ok(EngineMessage::BestMove(best)) => {
                self.pending = Some(best);
                self.process.set_state(EngineState::Ready);
                Ok(None)
            }
            Ok(EngineMessage::Id {
                name: Some(name), ..
            }) => {
                self.id_name = Some(name);
                Ok(None)
            }
            Ok(message) => Ok(Some(message)),
            Err(source) if line.starts_with("bestmove") => Err(EngineError::Protocol {
                name: self.name().to_string(),
                source,
            }),
            Err(e) => {
                tracing::debug!(engine = %self.name(), error = %e, "ignoring undecodable line");
                Ok(None)
            }
        }
    }

    /// Reads until `wanted` arrives, giving up after `timeout`.
    fn expect_within(&mut self, wanted: EngineMessage, timeout: Duration) -> Result<(), EngineError> {
        let deadline = Instant::now() + timeout;
        loop {
            // A chatty engine must not keep the deadline from firing.
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = if remaining.is_zero() {
                None
            } else {
                self.process.read_line_timeout(remaining)?
            };
            let Some(line) = line else {
                return Err(EngineError::StartupFailure {
                    name: self.name().to_string(),
                    reason: format!("no '{}' within {:?}", wanted_token(&wanted), timeout),
                });
            };
            if self.absorb(&line)?.as_ref() == Some(&wanted) {
                return Ok(());
            }
        }
    }

    /// Performs the `uci`/`uciok` handshake, sends the configured options
    /// and waits for `readyok`.
    ///
    /// # Errors
    ///
    /// [`EngineError::ProcessNotRunning`] if the process dies during startup,
    /// [`EngineError::StartupFailure`] if an acknowledgement does not arrive
    /// within the handshake timeout.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        let timeout = self.settings.handshake_timeout;
        self.send(&GuiCommand::Uci)?;
        self.expect_within(EngineMessage::UciOk, timeout)?;

        let options = self.settings.options.clone();
        for (name, value) in options {
            self.set_option(&name, &value)?;
        }

        self.send(&GuiCommand::IsReady)?;
        self.expect_within(EngineMessage::ReadyOk, timeout)?;
        self.process.set_state(EngineState::Ready);

        tracing::debug!(
            engine = %self.name(),
            id = self.id_name.as_deref().unwrap_or("?"),
            "engine initialized"
        );
        Ok(())
    }

    /// Sends `setoption name <name> value <value>`.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.send(&GuiCommand::SetOption {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Sends `isready` and blocks until `readyok`.
    ///
    /// Search output that arrives meanwhile is absorbed as usual.
    pub fn is_ready(&mut self) -> Result<bool, EngineError> {
        self.send(&GuiCommand::IsReady)?;
        loop {
            let line = self.process.read_line_blocking()?;
            if self.absorb(&line)? == Some(EngineMessage::ReadyOk) {
                return Ok(true);
            }
        }
    }

    /// Prepares the engine for an unrelated game: `ucinewgame` then a readiness probe.
    pub fn new_game(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::UciNewGame)?;
        self.is_ready()?;
        Ok(())
    }

    /// Sends exactly one `position` command.
    pub fn set_position(&mut self, position: &PositionSpec) -> Result<(), EngineError> {
        self.send(&GuiCommand::Position(position.clone()))
    }

    /// Starts a search.
    ///
    /// Resets the evaluation and any unclaimed best move. If a previous search
    /// was stopped but its `bestmove` not yet read, that output is drained
    /// first so it cannot leak into this search. Calling `go` while a search
    /// is still running is the caller's mistake; the client does not stop it.
    pub fn go(&mut self, options: &SearchOptions) -> Result<(), EngineError> {
        if self.state() == EngineState::Stopped {
            self.wait_for_best_move()?;
        }
        self.evaluation = Evaluation::default();
        self.evaluated = false;
        self.pending = None;

        self.send(&GuiCommand::Go(*options))?;
        self.process.set_state(EngineState::Searching);
        Ok(())
    }

    /// Live view of the running search; see [`EvaluationStream`].
    pub fn stream_evaluation(&mut self) -> EvaluationStream<'_> {
        EvaluationStream {
            client: self,
            done: false,
        }
    }

    /// The latest evaluation decoded during the current search, if any.
    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.evaluated.then_some(&self.evaluation)
    }

    /// Blocks until the search reports `bestmove`.
    ///
    /// Returns `None` for `bestmove (none)`.
    pub fn wait_for_best_move(&mut self) -> Result<Option<UciMove>, EngineError> {
        loop {
            if let Some(best) = self.pending.take() {
                return Ok(best.mv);
            }
            let line = self.process.read_line_blocking()?;
            self.absorb(&line)?;
        }
    }

    /// Checks for a `bestmove` without waiting.
    ///
    /// Consumes every line already buffered. `Ok(None)` means the search is
    /// still going.
    pub fn try_best_move(&mut self) -> Result<Option<BestMove>, EngineError> {
        while self.pending.is_none() {
            match self.process.try_read_line()? {
                Some(line) => {
                    self.absorb(&line)?;
                }
                None => break,
            }
        }
        Ok(self.pending.take())
    }

    /// Sends `stop`. The `bestmove` that follows is collected by the next
    /// [`wait_for_best_move`](Self::wait_for_best_move) or [`go`](Self::go).
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::Stop)?;
        if self.state() == EngineState::Searching {
            self.process.set_state(EngineState::Stopped);
        }
        Ok(())
    }

    /// Sends `quit` and waits a bounded time for the process to exit.
    pub fn shutdown(&mut self) {
        let grace = self.settings.quit_timeout;
        self.process.terminate(grace);
    }
}

fn wanted_token(message: &EngineMessage) -> &'static str {
    match message {
        EngineMessage::UciOk => "uciok",
        EngineMessage::ReadyOk => "readyok",
        _ => "acknowledgement",
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pull-based view of a running search.
///
/// Every `next()` performs one non-blocking read. With no new output it
/// yields the last known evaluation again (the default evaluation before the
/// first `info` line); it never waits. The stream ends, without yielding it,
/// once `bestmove` is read; the best move stays available through
/// [`EngineClient::wait_for_best_move`]. Dropping or [`close`](Self::close)-ing
/// the stream leaves the engine searching.
pub struct EvaluationStream<'a> {
    client: &'a mut EngineClient,
    done: bool,
}

impl EvaluationStream<'_> {
    /// Releases the stream. The engine is not told anything.
    pub fn close(self) {}
}

impl Iterator for EvaluationStream<'_> {
    type Item = Result<Evaluation, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let searching = matches!(
            self.client.state(),
            EngineState::Searching | EngineState::Stopped
        );
        if self.client.pending.is_some() || !searching {
            self.done = true;
            return None;
        }

        match self.client.process.try_read_line() {
            Ok(None) => Some(Ok(self.client.evaluation.clone())),
            Ok(Some(line)) => match self.client.absorb(&line) {
                Ok(_) if self.client.pending.is_some() => {
                    self.done = true;
                    None
                }
                Ok(_) => Some(Ok(self.client.evaluation.clone())),
                Err(e) => {
                    self.done = true;
                    Some(Err(e))
                }
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
