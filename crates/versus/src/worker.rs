//! Worker processes.
//!
//! Every worker of a pass is its own OS process: the `versus` binary started
//! again with [`WORKER_FLAG`]. The worker owns one pair of engines and plays
//! whatever positions it is sent. Counters and the record writer stay in the
//! parent, so a stuck or crashing worker can only lose its own game.
//!
//! Parent and worker exchange one JSON document per line over the worker's
//! stdin and stdout:
//!
//! ```text
//! parent -> worker   {"setup":{...}}                     once
//! worker -> parent   "ready" | {"startup_failed":{...}}
//! parent -> worker   {"play":{"fen":"..."}}              per game
//! worker -> parent   {"played":{"game":{...},"healthy":true}}
//! ```
//!
//! Closing the worker's stdin ends it: it shuts its engines down and exits.

use crate::client::{EngineClient, EngineSettings};
use crate::game_runner::{AbortReason, Ending, GameRunner, PlayedGame, RunnerConfig};
use crate::orchestrator::EngineSpec;
use crate::process::EngineError;
use crate::referee::StandardReferee;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Lines, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use thiserror::Error;

/// Command-line flag that turns the binary into a worker.
pub const WORKER_FLAG: &str = "--worker";

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to start worker process {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Worker I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed worker message: {0}")]
    Message(#[from] serde_json::Error),
    #[error("Worker closed its pipe")]
    Closed,
    #[error("Worker engines failed to start: {0}")]
    StartupFailed(String),
    #[error("Unexpected worker message: {0}")]
    Unexpected(String),
}

/// How to start a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// `program --worker`.
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: vec![WORKER_FLAG.to_string()],
        }
    }

    /// The running executable, passing `verbose` on as repeated `-v`.
    pub fn current(verbose: u8) -> std::io::Result<Self> {
        let mut command = Self::new(std::env::current_exe()?);
        command.args.extend((0..verbose).map(|_| "-v".to_string()));
        Ok(command)
    }
}

/// Everything a worker needs before its first game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSetup {
    /// Worker number within the pass, for logs.
    pub id: usize,
    pub white: EngineSpec,
    pub black: EngineSpec,
    pub runner: RunnerConfig,
    pub engine: EngineSettings,
}

/// Parent to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Setup(WorkerSetup),
    Play { fen: String },
}

/// Worker to parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Report {
    /// Both engines passed the handshake.
    Ready,
    /// An engine did not start; the worker exits after sending this.
    StartupFailed { reason: String },
    /// One game finished. With `healthy == false` the worker could not
    /// restart a lost engine and exits after sending this.
    Played { game: PlayedGame, healthy: bool },
}

fn send<W: Write, T: Serialize>(out: &mut W, message: &T) -> Result<(), WorkerError> {
    serde_json::to_writer(&mut *out, message)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn receive<B: BufRead, T: DeserializeOwned>(lines: &mut Lines<B>) -> Result<Option<T>, WorkerError> {
    match lines.next() {
        Some(line) => Ok(Some(serde_json::from_str(&line?)?)),
        None => Ok(None),
    }
}

fn launch_pair(setup: &WorkerSetup) -> Result<(EngineClient, EngineClient), EngineError> {
    let white = EngineClient::launch(&setup.white.path, &setup.engine)?;
    let black = EngineClient::launch(&setup.black.path, &setup.engine)?;
    Ok((white, black))
}

fn play_one(
    runner: &mut GameRunner<StandardReferee>,
    white: &mut EngineClient,
    black: &mut EngineClient,
    fen: &str,
) -> PlayedGame {
    match white.new_game().and_then(|_| black.new_game()) {
        Ok(()) => runner.play(white, black, fen),
        Err(e) => PlayedGame {
            starting_fen: fen.trim().to_string(),
            moves: Vec::new(),
            ending: Ending::Aborted(AbortReason::Engine(e.to_string())),
        },
    }
}

/// Runs the worker side of the protocol until the parent closes `input`.
///
/// The engine pair is started once and reused for every game. When a game
/// leaves an engine dead, the pair is restarted before the next one.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> Result<(), WorkerError> {
    let mut requests = input.lines();
    let setup = match receive(&mut requests)? {
        Some(Request::Setup(setup)) => setup,
        Some(other) => return Err(WorkerError::Unexpected(format!("{:?}", other))),
        None => return Ok(()),
    };

    let (mut white, mut black) = match launch_pair(&setup) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(worker = setup.id, error = %e, "engine failed to start");
            return send(&mut output, &Report::StartupFailed { reason: e.to_string() });
        }
    };
    send(&mut output, &Report::Ready)?;
    let mut runner = GameRunner::new(StandardReferee::new(), setup.runner);

    while let Some(request) = receive(&mut requests)? {
        let fen = match request {
            Request::Play { fen } => fen,
            other => return Err(WorkerError::Unexpected(format!("{:?}", other))),
        };
        let game = play_one(&mut runner, &mut white, &mut black, &fen);

        let mut healthy = true;
        if white.state().is_terminal() || black.state().is_terminal() {
            tracing::warn!(worker = setup.id, "engine went away, restarting the pair");
            white.shutdown();
            black.shutdown();
            match launch_pair(&setup) {
                Ok((w, b)) => {
                    white = w;
                    black = b;
                }
                Err(e) => {
                    tracing::error!(worker = setup.id, error = %e, "engine failed to restart");
                    healthy = false;
                }
            }
        }

        send(&mut output, &Report::Played { game, healthy })?;
        if !healthy {
            return Ok(());
        }
    }

    white.shutdown();
    black.shutdown();
    tracing::debug!(worker = setup.id, "worker finished");
    Ok(())
}

/// Parent-side handle of one worker process.
///
/// Dropping the handle closes the worker's stdin and waits for it to exit.
pub struct WorkerProcess {
    id: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    reports: Lines<BufReader<ChildStdout>>,
}

impl WorkerProcess {
    /// Starts a worker, sends it `setup` and waits until its engines are up.
    pub fn start(command: &WorkerCommand, setup: &WorkerSetup) -> Result<Self, WorkerError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                path: command.program.clone(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(WorkerError::Closed);
            }
        };
        tracing::debug!(worker = setup.id, pid = child.id(), "worker process started");

        let mut worker = Self {
            id: setup.id,
            child,
            stdin: Some(stdin),
            reports: BufReader::new(stdout).lines(),
        };
        worker.request(&Request::Setup(setup.clone()))?;
        match worker.report()? {
            Report::Ready => Ok(worker),
            Report::StartupFailed { reason } => Err(WorkerError::StartupFailed(reason)),
            other => Err(WorkerError::Unexpected(format!("{:?}", other))),
        }
    }

    fn request(&mut self, request: &Request) -> Result<(), WorkerError> {
        let stdin = self.stdin.as_mut().ok_or(WorkerError::Closed)?;
        send(stdin, request)
    }

    fn report(&mut self) -> Result<Report, WorkerError> {
        receive(&mut self.reports)?.ok_or(WorkerError::Closed)
    }

    /// Plays one game from `fen`.
    ///
    /// Returns the game and whether the worker can take another one.
    pub fn play(&mut self, fen: &str) -> Result<(PlayedGame, bool), WorkerError> {
        self.request(&Request::Play {
            fen: fen.to_string(),
        })?;
        match self.report()? {
            Report::Played { game, healthy } => Ok((game, healthy)),
            other => Err(WorkerError::Unexpected(format!("{:?}", other))),
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.stdin.take();
        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!(worker = self.id, %status, "worker process exited with failure");
            }
            Ok(_) => tracing::debug!(worker = self.id, "worker process exited"),
            Err(e) => tracing::warn!(worker = self.id, error = %e, "failed to wait for worker process"),
        }
    }
}
