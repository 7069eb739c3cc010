//! PTY process spawning with portable-pty.
//!
//! The interpreter runs as `/bin/sh -c 'exec <command line>'` inside a
//! pseudo-terminal, so it sees an interactive terminal on all three
//! streams and the shell wrapper is replaced by the interpreter itself.

use std::ffi::CStr;
use std::io::{Read, Write};

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, ExitStatus, PtySize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use termrun_core::{Error, Invocation, OutputEvent, Result, StreamKind};

use crate::decode::Utf8Decoder;
use crate::piped::drain;
use crate::process::{ProcessEvent, ProcessHandle, ProcessSignal, SpawnOptions};
use crate::quote::command_line;

const SHELL: &str = "/bin/sh";
const READ_CHUNK: usize = 4096;

/// Rows and columns of the pseudo-terminal.
const PTY_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 80,
    pixel_width: 0,
    pixel_height: 0,
};

pub(crate) fn spawn(
    invocation: &Invocation,
    code: &str,
    options: &SpawnOptions,
) -> Result<(ProcessHandle, mpsc::UnboundedReceiver<ProcessEvent>)> {
    // The wrapper shell would report a missing interpreter as exit 127 with
    // a message on the terminal; resolve it up front so it is a launch error.
    let program = which::which(&invocation.command).map_err(|e| {
        error!("Failed to resolve command '{}': {}", invocation.command, e);
        Error::Spawn(format!("{}: {e}", invocation.command))
    })?;
    let resolved = Invocation {
        command: program.to_string_lossy().into_owned(),
        arg_prefix: invocation.arg_prefix.clone(),
    };
    let script = format!("exec {}", command_line(&resolved, code));

    info!(
        "Spawning PTY: command='{}' args={:?} cwd={}",
        resolved.command,
        resolved.arg_prefix,
        options.cwd.display()
    );

    let pair = native_pty_system().openpty(PTY_SIZE).map_err(|e| {
        error!("Failed to open PTY: {}", e);
        Error::Pty(format!("Failed to open PTY: {e}"))
    })?;

    let mut cmd = CommandBuilder::new(SHELL);
    cmd.arg("-c");
    cmd.arg(&script);
    cmd.cwd(&options.cwd);
    cmd.env("TERM", &options.term);

    debug!("Spawning child process: {}", script);
    let mut child = pair.slave.spawn_command(cmd).map_err(|e| {
        error!("Failed to spawn command '{}': {}", resolved.command, e);
        Error::Spawn(format!("{}: {e}", resolved.command))
    })?;
    // Only the child may hold the slave end, otherwise the master never
    // sees end-of-file.
    drop(pair.slave);

    let pid = child.process_id();
    let mut killer = child.clone_killer();

    let writer = match pair.master.take_writer() {
        Ok(writer) => writer,
        Err(e) => {
            let _ = killer.kill();
            return Err(Error::Pty(format!("Failed to take writer: {e}")));
        }
    };
    let reader = match pair.master.try_clone_reader() {
        Ok(reader) => reader,
        Err(e) => {
            let _ = killer.kill();
            return Err(Error::Pty(format!("Failed to clone reader: {e}")));
        }
    };

    // Blocking PTY I/O runs on plain threads: a reader stuck behind a
    // grandchild that inherited the terminal must not hold up runtime
    // shutdown the way a blocking-pool task would.
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (read_done_tx, read_done_rx) = oneshot::channel::<()>();
    {
        let events = event_tx.clone();
        std::thread::spawn(move || {
            read_terminal(reader, events);
            let _ = read_done_tx.send(());
        });
    }
    let reader_task = tokio::spawn(async move {
        let _ = read_done_rx.await;
    });

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || write_terminal(writer, input_rx));

    let (status_tx, mut status_rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = status_tx.send(child.wait());
    });

    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ProcessSignal>();
    let drain_timeout = options.drain_timeout;
    let master = pair.master;
    tokio::spawn(async move {
        let status = loop {
            tokio::select! {
                status = &mut status_rx => break status,
                Some(signal) = control_rx.recv() => match signal {
                    ProcessSignal::Terminate => {
                        crate::process::send_signal(pid, libc::SIGTERM);
                    }
                    ProcessSignal::Kill => {
                        if !crate::process::send_signal(pid, libc::SIGKILL) {
                            if let Err(e) = killer.kill() {
                                warn!(pid = ?pid, error = %e, "Kill failed");
                            }
                        }
                    }
                },
            }
        };

        let code = match status {
            Ok(Ok(status)) => Some(exit_code(&status)),
            Ok(Err(e)) => {
                warn!(pid = ?pid, error = %e, "Failed to wait for PTY child");
                None
            }
            Err(_) => {
                warn!(pid = ?pid, "PTY wait thread ended without a status");
                None
            }
        };
        info!(pid = ?pid, exit_code = ?code, "PTY process exited");

        drain(vec![reader_task], drain_timeout).await;
        drop(master);
        let _ = event_tx.send(ProcessEvent::Exited { code });
    });

    debug!(pid = ?pid, "PTY process spawned");
    Ok((
        ProcessHandle::new(pid, true, input_tx, control_tx),
        event_rx,
    ))
}

/// Exit code in the same form the piped runner reports: 128+N for a
/// process killed by signal N.
///
/// portable-pty keeps only the signal's description, so it is matched back
/// against `strsignal` to recover the number.
fn exit_code(status: &ExitStatus) -> i32 {
    let display = status.to_string();
    let signal = display.strip_prefix("Terminated by ").and_then(|name| {
        name.strip_prefix("Signal ")
            .and_then(|n| n.parse().ok())
            .or_else(|| signal_number(name))
    });
    match signal {
        Some(signal) => 128 + signal,
        None => status.exit_code() as i32,
    }
}

fn signal_number(description: &str) -> Option<i32> {
    (1..65).find(|&signal| signal_description(signal).as_deref() == Some(description))
}

fn signal_description(signal: libc::c_int) -> Option<String> {
    // SAFETY: strsignal returns null or a pointer to a NUL-terminated string
    // that stays valid until the next call on this thread.
    let name = unsafe { libc::strsignal(signal) };
    if name.is_null() {
        return None;
    }
    // SAFETY: checked non-null above.
    Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
}

fn read_terminal(mut reader: Box<dyn Read + Send>, events: mpsc::UnboundedSender<ProcessEvent>) {
    let mut decoder = Utf8Decoder::new();
    let mut buffer = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buffer[..n]);
                if !text.is_empty() && events.send(stdout(text)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the last slave descriptor closes
            Err(e) => {
                debug!(error = %e, "PTY read ended");
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = events.send(stdout(tail));
    }
}

fn stdout(data: String) -> ProcessEvent {
    ProcessEvent::Output(OutputEvent {
        kind: StreamKind::Stdout,
        data,
    })
}

fn write_terminal(mut writer: Box<dyn Write + Send>, mut input: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = input.blocking_recv() {
        if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
            debug!(error = %e, "PTY input closed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::process::SpawnMode;

    fn options() -> SpawnOptions {
        SpawnOptions {
            mode: SpawnMode::Pty,
            ..SpawnOptions::default()
        }
    }

    async fn collect(mut events: mpsc::UnboundedReceiver<ProcessEvent>) -> (String, Option<i32>) {
        let mut text = String::new();
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Output(out) => {
                    assert_eq!(out.kind, StreamKind::Stdout);
                    text.push_str(&out.data);
                }
                ProcessEvent::Exited { code } => return (text, code),
            }
        }
        panic!("channel closed without Exited");
    }

    #[tokio::test]
    async fn test_pty_output_and_exit() {
        let inv = Invocation::new("sh", ["-c"]);
        let (handle, events) = spawn(&inv, "echo hi; exit 4", &options()).unwrap();
        assert!(handle.is_terminal());
        let (text, code) = collect(events).await;
        assert_eq!(text, "hi\r\n");
        assert_eq!(code, Some(4));
    }

    #[tokio::test]
    async fn test_pty_is_a_terminal() {
        let inv = Invocation::new("sh", ["-c"]);
        let (_handle, events) = spawn(&inv, "test -t 0 && test -t 1 && echo tty", &options()).unwrap();
        let (text, _) = collect(events).await;
        assert!(text.contains("tty"));
    }

    #[tokio::test]
    async fn test_pty_quoting_survives_wrapper() {
        let inv = Invocation::new("sh", ["-c"]);
        let (_handle, events) = spawn(&inv, "echo \"it's\"", &options()).unwrap();
        let (text, _) = collect(events).await;
        assert_eq!(text, "it's\r\n");
    }

    #[tokio::test]
    async fn test_pty_interrupt_byte_stops_process() {
        let inv = Invocation::new("sh", ["-c"]);
        let started = Instant::now();
        let (handle, events) = spawn(&inv, "sleep 10", &options()).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.interrupt().unwrap();
        let (_, code) = collect(events).await;
        assert_ne!(code, Some(0));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pty_kill() {
        let inv = Invocation::new("sh", ["-c"]);
        let (handle, events) = spawn(&inv, "trap '' INT TERM; sleep 10", &options()).unwrap();
        handle.kill().unwrap();
        let (_, code) = collect(events).await;
        assert_eq!(code, Some(128 + libc::SIGKILL));
    }

    #[test]
    fn test_exit_code_matches_piped_convention() {
        assert_eq!(exit_code(&ExitStatus::with_exit_code(3)), 3);

        let interrupt = signal_description(libc::SIGINT).unwrap();
        assert_eq!(
            exit_code(&ExitStatus::with_signal(&interrupt)),
            128 + libc::SIGINT
        );
        assert_eq!(
            exit_code(&ExitStatus::with_signal("Signal 63")),
            128 + 63
        );
    }

    #[tokio::test]
    async fn test_pty_missing_interpreter() {
        let inv = Invocation::new("definitely-not-a-real-interpreter", ["-c"]);
        assert!(matches!(spawn(&inv, "1", &options()), Err(Error::Spawn(_))));
    }
}
