//! Piped process spawning with tokio.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use termrun_core::{Error, Invocation, OutputEvent, Result, StreamKind};

use crate::decode::Utf8Decoder;
use crate::process::{ProcessEvent, ProcessHandle, ProcessSignal, SpawnOptions};

const READ_CHUNK: usize = 4096;

pub(crate) fn spawn(
    invocation: &Invocation,
    code: &str,
    options: &SpawnOptions,
) -> Result<(ProcessHandle, mpsc::UnboundedReceiver<ProcessEvent>)> {
    info!(
        "Spawning piped process: command='{}' args={:?} cwd={}",
        invocation.command,
        invocation.arg_prefix,
        options.cwd.display()
    );

    let mut command = Command::new(&invocation.command);
    command
        .args(&invocation.arg_prefix)
        .arg(code)
        .current_dir(&options.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        error!("Failed to spawn command '{}': {}", invocation.command, e);
        Error::Spawn(format!("{}: {e}", invocation.command))
    })?;

    let pid = child.id();
    let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take())
    {
        (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
        _ => {
            let _ = child.start_kill();
            return Err(Error::Spawn("child streams were not captured".to_string()));
        }
    };

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let readers = vec![
        tokio::spawn(read_stream(stdout, StreamKind::Stdout, event_tx.clone())),
        tokio::spawn(read_stream(stderr, StreamKind::Stderr, event_tx.clone())),
    ];

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    tokio::spawn(write_input(stdin, input_rx));

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    tokio::spawn(supervise(
        child,
        pid,
        control_rx,
        readers,
        event_tx,
        options.drain_timeout,
    ));

    debug!(pid = ?pid, "Piped process spawned");
    Ok((
        ProcessHandle::new(pid, false, input_tx, control_tx),
        event_rx,
    ))
}

async fn read_stream<R>(mut reader: R, kind: StreamKind, events: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = Utf8Decoder::new();
    let mut buffer = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.push(&buffer[..n]);
                if !text.is_empty() && events.send(output(kind, text)).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(?kind, error = %e, "Output stream closed with error");
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = events.send(output(kind, tail));
    }
}

fn output(kind: StreamKind, data: String) -> ProcessEvent {
    ProcessEvent::Output(OutputEvent { kind, data })
}

async fn write_input(mut stdin: ChildStdin, mut input: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = input.recv().await {
        if let Err(e) = stdin.write_all(&data).await {
            debug!(error = %e, "Process stdin closed");
            break;
        }
        if let Err(e) = stdin.flush().await {
            debug!(error = %e, "Process stdin flush failed");
            break;
        }
    }
}

async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    mut control: mpsc::UnboundedReceiver<ProcessSignal>,
    readers: Vec<JoinHandle<()>>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    drain_timeout: Duration,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = control.recv() => apply_signal(&mut child, pid, signal),
        }
    };

    let code = match status {
        Ok(status) => exit_code(&status),
        Err(e) => {
            warn!(pid = ?pid, error = %e, "Failed to wait for process");
            None
        }
    };
    info!(pid = ?pid, exit_code = ?code, "Process exited");

    drain(readers, drain_timeout).await;
    let _ = events.send(ProcessEvent::Exited { code });
}

fn apply_signal(child: &mut Child, pid: Option<u32>, signal: ProcessSignal) {
    match signal {
        #[cfg(unix)]
        ProcessSignal::Terminate => {
            crate::process::send_signal(pid, libc::SIGTERM);
        }
        #[cfg(not(unix))]
        ProcessSignal::Terminate => {
            if let Err(e) = child.start_kill() {
                warn!(pid = ?pid, error = %e, "Terminate failed");
            }
        }
        ProcessSignal::Kill => {
            if let Err(e) = child.start_kill() {
                warn!(pid = ?pid, error = %e, "Kill failed");
            }
        }
    }
}

/// Wait for readers to hit EOF, abandoning them after `timeout` so a
/// grandchild holding the pipes open cannot delay completion forever.
pub(crate) async fn drain(readers: Vec<JoinHandle<()>>, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    for reader in readers {
        let abort = reader.abort_handle();
        if tokio::time::timeout_at(deadline, reader).await.is_err() {
            warn!("Output reader still open after process exit, detaching");
            abort.abort();
        }
    }
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|sig| 128 + sig))
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> Option<i32> {
    status.code()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh() -> Invocation {
        Invocation::new("sh", ["-c"])
    }

    async fn collect(
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    ) -> (Vec<OutputEvent>, Option<i32>) {
        let mut outputs = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Output(out) => outputs.push(out),
                ProcessEvent::Exited { code } => return (outputs, code),
            }
        }
        panic!("channel closed without Exited");
    }

    fn joined(outputs: &[OutputEvent], kind: StreamKind) -> String {
        outputs
            .iter()
            .filter(|o| o.kind == kind)
            .map(|o| o.data.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_stdout_and_exit_code() {
        let (_handle, events) = spawn(&sh(), "echo hello; exit 3", &SpawnOptions::default()).unwrap();
        let (outputs, code) = collect(events).await;
        assert_eq!(joined(&outputs, StreamKind::Stdout), "hello\n");
        assert_eq!(code, Some(3));
    }

    #[tokio::test]
    async fn test_stderr_is_tagged() {
        let (_handle, events) = spawn(&sh(), "echo oops >&2", &SpawnOptions::default()).unwrap();
        let (outputs, code) = collect(events).await;
        assert_eq!(joined(&outputs, StreamKind::Stderr), "oops\n");
        assert_eq!(joined(&outputs, StreamKind::Stdout), "");
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn test_input_reaches_process() {
        let (handle, events) = spawn(&sh(), "read line; echo got:$line", &SpawnOptions::default()).unwrap();
        handle.write_input(b"abc\n").unwrap();
        let (outputs, code) = collect(events).await;
        assert_eq!(joined(&outputs, StreamKind::Stdout), "got:abc\n");
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn test_working_directory() {
        let options = SpawnOptions {
            cwd: std::path::PathBuf::from("/"),
            ..SpawnOptions::default()
        };
        let (_handle, events) = spawn(&sh(), "pwd", &options).unwrap();
        let (outputs, _) = collect(events).await;
        assert_eq!(joined(&outputs, StreamKind::Stdout), "/\n");
    }

    #[tokio::test]
    async fn test_terminate_stops_process() {
        let started = Instant::now();
        let (handle, events) = spawn(&sh(), "sleep 10", &SpawnOptions::default()).unwrap();
        handle.terminate().unwrap();
        let (_, code) = collect(events).await;
        assert_eq!(code, Some(128 + libc::SIGTERM));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_kill_stops_process() {
        let (handle, events) = spawn(&sh(), "trap '' TERM; sleep 10", &SpawnOptions::default()).unwrap();
        handle.kill().unwrap();
        let (_, code) = collect(events).await;
        assert_eq!(code, Some(128 + libc::SIGKILL));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let inv = Invocation::new("definitely-not-a-real-interpreter", ["-c"]);
        let err = spawn(&inv, "1", &SpawnOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Spawn(ref msg) if msg.contains("definitely-not-a-real-interpreter")));
    }

    #[tokio::test]
    async fn test_background_grandchild_does_not_block_exit() {
        let options = SpawnOptions {
            drain_timeout: Duration::from_millis(200),
            ..SpawnOptions::default()
        };
        let started = Instant::now();
        let (_handle, events) = spawn(&sh(), "sleep 5 & echo done", &options).unwrap();
        let (outputs, code) = collect(events).await;
        assert_eq!(code, Some(0));
        assert!(joined(&outputs, StreamKind::Stdout).contains("done"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
