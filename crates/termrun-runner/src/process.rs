//! Process spawning and the handle used to control a running interpreter.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use termrun_core::{Error, Invocation, OutputEvent, Result};

/// ETX, the byte a terminal line discipline turns into SIGINT.
pub const INTERRUPT_BYTE: u8 = 0x03;

/// How the interpreter's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    /// Separate stdin/stdout/stderr pipes
    Piped,
    /// One pseudo-terminal for all three streams (Unix only; other
    /// platforms fall back to pipes)
    Pty,
}

/// Options for one spawn.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Working directory
    pub cwd: PathBuf,
    /// Stream wiring
    pub mode: SpawnMode,
    /// TERM value inside a PTY
    pub term: String,
    /// Maximum wait for output readers after the process has exited
    pub drain_timeout: Duration,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            cwd: default_working_directory(),
            mode: SpawnMode::Piped,
            term: "xterm-256color".to_string(),
            drain_timeout: Duration::from_millis(500),
        }
    }
}

/// The invoking user's home directory, or the current directory if unknown.
pub fn default_working_directory() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Something that happened to a spawned process, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A decoded chunk of output
    Output(OutputEvent),
    /// The process exited and its output readers have drained. Always the
    /// last event on the channel.
    Exited {
        /// Exit code, if one could be determined
        code: Option<i32>,
    },
}

/// Signals routed to the task that owns the OS child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Ask the process to stop (SIGTERM on Unix)
    Terminate,
    /// Stop the process unconditionally
    Kill,
}

/// Exclusive handle to a running interpreter.
///
/// The OS child itself is owned by a supervisor task; the handle only
/// holds the channels into it, so a handle can never act on a process that
/// has already been reaped.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    terminal: bool,
    input: mpsc::UnboundedSender<Vec<u8>>,
    control: mpsc::UnboundedSender<ProcessSignal>,
}

impl ProcessHandle {
    pub(crate) fn new(
        pid: Option<u32>,
        terminal: bool,
        input: mpsc::UnboundedSender<Vec<u8>>,
        control: mpsc::UnboundedSender<ProcessSignal>,
    ) -> Self {
        Self {
            pid,
            terminal,
            input,
            control,
        }
    }

    /// OS process id.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process runs inside a pseudo-terminal.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Whether the input stream still accepts bytes.
    pub fn input_open(&self) -> bool {
        !self.input.is_closed()
    }

    /// Queue bytes for the process's input stream.
    pub fn write_input(&self, data: &[u8]) -> Result<()> {
        debug!(pid = ?self.pid, bytes = data.len(), "Queueing process input");
        self.input
            .send(data.to_vec())
            .map_err(|_| Error::Io(std::io::ErrorKind::BrokenPipe.into()))
    }

    /// Graceful interrupt.
    ///
    /// Inside a terminal the interrupt byte is written to the input stream
    /// and the line discipline delivers SIGINT. A pipe would pass the byte
    /// through as data, so piped processes get a termination signal instead.
    pub fn interrupt(&self) -> Result<()> {
        if self.terminal && self.input_open() {
            debug!(pid = ?self.pid, "Writing interrupt byte");
            self.write_input(&[INTERRUPT_BYTE])
        } else {
            self.terminate()
        }
    }

    /// Request graceful termination.
    pub fn terminate(&self) -> Result<()> {
        self.signal(ProcessSignal::Terminate)
    }

    /// Kill the process without a grace period.
    pub fn kill(&self) -> Result<()> {
        self.signal(ProcessSignal::Kill)
    }

    fn signal(&self, signal: ProcessSignal) -> Result<()> {
        debug!(pid = ?self.pid, ?signal, "Signalling process");
        self.control
            .send(signal)
            .map_err(|_| Error::Other(format!("process {:?} already exited", self.pid)))
    }
}

/// Spawn `invocation` running `code` as a single argument.
///
/// Must be called from within a tokio runtime. On success the returned
/// receiver yields output events in arrival order followed by exactly one
/// [`ProcessEvent::Exited`].
pub fn spawn(
    invocation: &Invocation,
    code: &str,
    options: &SpawnOptions,
) -> Result<(ProcessHandle, mpsc::UnboundedReceiver<ProcessEvent>)> {
    match options.mode {
        SpawnMode::Piped => crate::piped::spawn(invocation, code, options),
        #[cfg(unix)]
        SpawnMode::Pty => crate::pty::spawn(invocation, code, options),
        #[cfg(not(unix))]
        SpawnMode::Pty => {
            warn!("PTY wrapping is not available on this platform, using pipes");
            crate::piped::spawn(invocation, code, options)
        }
    }
}

/// Send `signal` to `pid`, returning whether it was delivered.
#[cfg(unix)]
pub(crate) fn send_signal(pid: Option<u32>, signal: libc::c_int) -> bool {
    match pid {
        Some(pid) => {
            // SAFETY: kill(2) has no memory-safety preconditions.
            let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
            if rc != 0 {
                warn!(pid, signal, error = %std::io::Error::last_os_error(), "Signal delivery failed");
            }
            rc == 0
        }
        None => false,
    }
}
