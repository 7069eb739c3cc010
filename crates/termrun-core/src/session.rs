//! Session types shared by the runner, the session store and the transport.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Unique identifier for an execution session.
///
/// Ids are allocated from a monotonically increasing counter and are never
/// reused for the life of the host process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw integer value.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Allocated, no process started yet
    Created,
    /// A process is active
    Running,
    /// The process exited (normally, with an error code, or after an interrupt)
    Completed,
    /// Nothing could be started (unsupported language or spawn failure)
    Failed,
}

impl SessionPhase {
    /// Completed and Failed are terminal; no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }
}

/// Which output stream a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Standard output (and everything read from a pseudo-terminal)
    Stdout,
    /// Standard error
    Stderr,
}

/// One incremental chunk of process output, as delivered to a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OutputEvent {
    /// Source stream
    #[serde(rename = "type")]
    pub kind: StreamKind,
    /// UTF-8 text
    pub data: String,
}

impl OutputEvent {
    /// Chunk read from stdout.
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            kind: StreamKind::Stdout,
            data: data.into(),
        }
    }

    /// Chunk read from stderr.
    pub fn stderr(data: impl Into<String>) -> Self {
        Self {
            kind: StreamKind::Stderr,
            data: data.into(),
        }
    }
}

/// Terminal result of one execution attempt.
///
/// `stdout` and `stderr` hold the accumulated totals of everything the
/// process wrote, not just the last chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    /// Accumulated standard output
    pub stdout: String,
    /// Accumulated standard error
    pub stderr: String,
    /// Exit code; 128+N when the process was killed by signal N, `None`
    /// when indeterminate (launch failure, unknown signal)
    pub exit_code: Option<i32>,
    /// Whether the user interrupted the process
    pub was_interrupted: bool,
    /// Launch failure message, if nothing could be run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionRecord {
    /// Record for an execution that never started. The message is shown as
    /// stderr and the exit code is left indeterminate.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            stdout: String::new(),
            stderr: message.clone(),
            exit_code: None,
            was_interrupted: false,
            error: Some(message),
        }
    }

    /// Exit code 0 and no launch failure.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }
}

/// Answer to a catch-up query from a late-attaching surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BufferSnapshot {
    /// Every chunk written so far, in arrival order
    pub buffer: Vec<String>,
    /// Whether the session reached a terminal phase
    pub is_complete: bool,
    /// The completion record, present iff `is_complete`
    pub last_result: Option<CompletionRecord>,
}

impl BufferSnapshot {
    /// The buffer joined into one string.
    pub fn text(&self) -> String {
        self.buffer.concat()
    }
}

/// Listing entry for a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionSummary {
    /// Session identifier
    pub id: SessionId,
    /// Language tag of the run, once one was requested
    pub language: Option<String>,
    /// Code of the run, once one was requested
    pub code: Option<String>,
    /// Current phase
    pub phase: SessionPhase,
    /// Whether an interrupt was requested
    pub was_interrupted: bool,
    /// Number of buffered chunks
    pub buffered_chunks: usize,
    /// Creation time
    #[schemars(with = "String")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.get(), 42);
    }

    #[test]
    fn test_session_id_ordering() {
        assert!(SessionId::new(1) < SessionId::new(2));
    }

    #[test]
    fn test_session_id_serializes_as_integer() {
        let json = serde_json::to_string(&SessionId::new(5)).unwrap();
        assert_eq!(json, "5");
    }

    #[test]
    fn test_phase_terminal() {
        assert!(!SessionPhase::Created.is_terminal());
        assert!(!SessionPhase::Running.is_terminal());
        assert!(SessionPhase::Completed.is_terminal());
        assert!(SessionPhase::Failed.is_terminal());
    }

    #[test]
    fn test_output_event_wire_shape() {
        let event = OutputEvent::stderr("boom\n");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stderr");
        assert_eq!(json["data"], "boom\n");
    }

    #[test]
    fn test_completion_record_wire_shape() {
        let record = CompletionRecord {
            stdout: "hi\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            was_interrupted: false,
            error: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["exitCode"], 0);
        assert_eq!(json["wasInterrupted"], false);
        assert!(json.get("error").is_none());
        assert!(record.is_success());
    }

    #[test]
    fn test_failed_record() {
        let record = CompletionRecord::failed("Unsupported language: cobol");
        assert_eq!(record.stderr, "Unsupported language: cobol");
        assert_eq!(record.exit_code, None);
        assert!(!record.is_success());
        assert_eq!(record.error.as_deref(), Some("Unsupported language: cobol"));
    }

    #[test]
    fn test_snapshot_text() {
        let snapshot = BufferSnapshot {
            buffer: vec!["$ echo hi\r\n".to_string(), "hi\r\n".to_string()],
            is_complete: false,
            last_result: None,
        };
        assert_eq!(snapshot.text(), "$ echo hi\r\nhi\r\n");
    }
}
