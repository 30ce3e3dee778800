//! Ownership of one external engine process.
//!
//! [`EngineProcess`] spawns the engine with piped stdin/stdout and moves
//! stdout onto a reader thread, so that the owner can choose per call between
//! a blocking read, a bounded read, and an immediate "is there a line?" poll.
//! Lines the engine printed before exiting are still delivered; only after
//! they are drained does a read report [`EngineError::ProcessNotRunning`].

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Poll interval while waiting for a process to exit after `quit`.
const EXIT_POLL: Duration = Duration::from_millis(10);

/// Errors that can occur when talking to an engine process.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to spawn the engine process.
    #[error("Failed to spawn engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// A read or write was attempted on a process that exited or was killed.
    #[error("[{0}] Engine is not running")]
    ProcessNotRunning(String),
    /// The handshake or readiness probe never completed.
    #[error("[{name}] Engine startup failed: {reason}")]
    StartupFailure { name: String, reason: String },
    /// The engine wrote a line that violates the protocol.
    #[error("[{name}] Protocol error: {source}")]
    Protocol {
        name: String,
        #[source]
        source: uci::UciError,
    },
    /// Any other pipe failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of an engine process.
///
/// `Starting → Ready → Searching → (Stopped) → Ready`, with `Killed` after an
/// explicit quit and `Crashed` when the process went away on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Spawned, handshake not finished.
    Starting,
    /// Idle and accepting commands.
    Ready,
    /// A `go` was sent and its `bestmove` not yet seen.
    Searching,
    /// `stop` was sent; the `bestmove` is still pending.
    Stopped,
    /// Terminated by us.
    Killed,
    /// Exited unexpectedly.
    Crashed,
}

impl EngineState {
    /// True for `Killed` and `Crashed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::Killed | EngineState::Crashed)
    }
}

/// One external engine process and its pipes.
pub struct EngineProcess {
    name: String,
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    state: EngineState,
}

impl EngineProcess {
    /// Spawns the engine at `path`.
    ///
    /// The process name used in errors and logs is the file stem of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Spawn`] if the executable cannot be started.
    pub fn start<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: path.display().to_string(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::StartupFailure {
                    name,
                    reason: "engine pipes unavailable".to_string(),
                });
            }
        };

        let (tx, rx) = mpsc::channel::<String>();
        std::thread::Builder::new()
            .name(format!("{}-stdout", name))
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            if tx.send(l).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })?;

        tracing::debug!(engine = %name, pid = child.id(), "engine process started");

        Ok(Self {
            name,
            child,
            stdin,
            lines: rx,
            state: EngineState::Starting,
        })
    }

    /// Name derived from the executable path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Protocol-level transitions are driven by the client.
    pub(crate) fn set_state(&mut self, state: EngineState) {
        if !self.state.is_terminal() {
            self.state = state;
        }
    }

    /// Checks whether the process is still running, marking it crashed if not.
    pub fn is_alive(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::warn!(engine = %self.name, %status, "engine exited unexpectedly");
                self.state = EngineState::Crashed;
                false
            }
            Err(_) => {
                self.state = EngineState::Crashed;
                false
            }
        }
    }

    fn not_running(&self) -> EngineError {
        EngineError::ProcessNotRunning(self.name.clone())
    }

    /// Writes one command line to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ProcessNotRunning`] if the process exited or was killed.
    pub fn write_line(&mut self, command: &str) -> Result<(), EngineError> {
        if !self.is_alive() {
            return Err(self.not_running());
        }

        tracing::trace!(engine = %self.name, ">> {}", command);
        let written = writeln!(self.stdin, "{}", command).and_then(|_| self.stdin.flush());
        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                self.state = EngineState::Crashed;
                Err(self.not_running())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn received(&mut self, line: String) -> String {
        let line = line.trim().to_string();
        tracing::trace!(engine = %self.name, "<< {}", line);
        line
    }

    fn disconnected(&mut self) -> EngineError {
        if !self.state.is_terminal() {
            self.state = EngineState::Crashed;
        }
        self.not_running()
    }

    /// Blocks until the engine writes a line.
    pub fn read_line_blocking(&mut self) -> Result<String, EngineError> {
        match self.lines.recv() {
            Ok(line) => Ok(self.received(line)),
            Err(_) => Err(self.disconnected()),
        }
    }

    /// Waits at most `timeout` for a line; `Ok(None)` on timeout.
    pub fn read_line_timeout(&mut self, timeout: Duration) -> Result<Option<String>, EngineError> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => Ok(Some(self.received(line))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(self.disconnected()),
        }
    }

    /// Returns a buffered line if there is one, without waiting.
    pub fn try_read_line(&mut self) -> Result<Option<String>, EngineError> {
        match self.lines.try_recv() {
            Ok(line) => Ok(Some(self.received(line))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.disconnected()),
        }
    }

    /// Sends `quit`, waits up to `grace` for the process to exit, then kills it.
    ///
    /// Safe to call more than once.
    pub fn terminate(&mut self, grace: Duration) {
        if self.state == EngineState::Killed {
            return;
        }
        if self.is_alive() {
            let _ = self.write_line("quit");
            let deadline = Instant::now() + grace;
            while Instant::now() < deadline {
                if let Ok(Some(_)) = self.child.try_wait() {
                    break;
                }
                std::thread::sleep(EXIT_POLL);
            }
            if let Ok(None) = self.child.try_wait() {
                tracing::warn!(engine = %self.name, "engine ignored quit, killing it");
            }
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.state = EngineState::Killed;
        tracing::debug!(engine = %self.name, "engine process terminated");
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.terminate(Duration::from_millis(300));
    }
}
