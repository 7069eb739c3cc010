//! MCP Tool Types
//!
//! Parameter and response types for every tool the server exposes. The
//! JSON schemas advertised to clients are derived from these definitions.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use termrun_core::{BufferSnapshot, CompletionRecord, Invocation, SessionId, SessionSummary};

fn default_true() -> bool {
    true
}

// =============================================================================
// Execution Tools
// =============================================================================

/// Parameters for code_execute
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CodeExecuteParams {
    /// Source code to run
    pub code: String,

    /// Language tag (e.g. "python", "node", "bash")
    pub language: String,

    /// Run inside this idle session instead of a new one
    #[serde(default)]
    pub session_id: Option<SessionId>,

    /// Wait for the run to finish (default: true). When false the call
    /// returns as soon as the process has started.
    #[serde(default = "default_true")]
    pub wait: bool,
}

/// Response for code_execute
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CodeExecuteResponse {
    /// Session the code runs in; absent for one-shot runs, whose session is
    /// discarded after completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Completion record, present when the call waited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CompletionRecord>,

    /// Human-readable status
    pub message: String,
}

// =============================================================================
// Session Management Tools
// =============================================================================

/// Parameters for session_open
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionOpenParams {}

/// Response for session_open
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionOpenResponse {
    /// Identifier of the new idle session
    pub session_id: SessionId,

    /// Success message
    pub message: String,
}

/// Parameters for session_send_input
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionSendInputParams {
    /// Target session
    pub session_id: SessionId,

    /// Text to write to the process. A carriage return is delivered as a
    /// newline, so "yes\r" answers a prompt.
    pub text: String,
}

/// Parameters for session_interrupt
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionInterruptParams {
    /// Target session
    pub session_id: SessionId,
}

/// Parameters for session_close
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionCloseParams {
    /// Session to close
    pub session_id: SessionId,
}

/// Response for the fire-and-forget control tools
/// (session_send_input, session_interrupt, session_close)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlResponse {
    /// Target session
    pub session_id: SessionId,

    /// Whether the request had any effect. Requests for unknown or finished
    /// sessions are ignored.
    pub accepted: bool,

    /// Human-readable status
    pub message: String,
}

/// Parameters for session_get_buffer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionGetBufferParams {
    /// Target session
    pub session_id: SessionId,
}

/// Response for session_get_buffer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionGetBufferResponse {
    /// Target session
    pub session_id: SessionId,

    /// Everything written so far, plus the completion state
    #[serde(flatten)]
    pub snapshot: BufferSnapshot,
}

/// Parameters for session_wait
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionWaitParams {
    /// Target session
    pub session_id: SessionId,

    /// Give up after this many milliseconds (default: 30000)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Response for session_wait
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionWaitResponse {
    /// Target session
    pub session_id: SessionId,

    /// Whether the session completed before the timeout
    pub completed: bool,

    /// Completion record, present iff `completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CompletionRecord>,

    /// Time spent waiting in milliseconds
    pub elapsed_ms: u64,
}

/// Parameters for session_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionListParams {}

/// Response for session_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionListResponse {
    /// Live sessions, ordered by id
    pub sessions: Vec<SessionSummary>,

    /// Number of live sessions
    pub count: usize,
}

// =============================================================================
// Language Tools
// =============================================================================

/// Parameters for language_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LanguageListParams {}

/// Response for language_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LanguageListResponse {
    /// Platform the interpreters were resolved for
    pub platform: String,

    /// Supported tags and the invocation each resolves to
    pub languages: BTreeMap<String, Invocation>,
}
