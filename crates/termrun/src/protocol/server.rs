//! termrun MCP Server Implementation
//!
//! This module implements the MCP server using rmcp 0.9's #[tool_router] pattern.
//! It routes MCP tool calls to the session controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use termrun_core::{Error, ServerConfig, SessionId};
use termrun_session::{ChannelSurface, RenderingSurface, SessionController};

use crate::surface::spawn_event_logger;
use crate::tools::*;

/// How long session_wait blocks when the caller gives no timeout.
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Map a controller error onto a JSON-RPC error.
///
/// Errors the caller can fix (bad ids, busy sessions, limits) are reported
/// as invalid params; everything else is internal.
fn to_mcp_error(err: Error) -> McpError {
    let code = match err {
        Error::SessionNotFound(_)
        | Error::SessionBusy(_)
        | Error::SessionLimitReached(_)
        | Error::UnsupportedLanguage(_)
        | Error::InvalidInput(_) => ErrorCode(-32602), // Invalid params
        _ => ErrorCode(-32603), // Internal error
    };
    McpError::new(code, err.to_string(), None)
}

fn not_found(session_id: SessionId) -> McpError {
    to_mcp_error(Error::SessionNotFound(session_id))
}

/// Serialize a response as pretty JSON text content.
fn json_result<T: Serialize>(response: &T, fallback: impl FnOnce() -> String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(response).unwrap_or_else(|_| fallback()),
    )])
}

/// termrun MCP Server
///
/// Exposes execution sessions via MCP tools. Sessions started by the server
/// are routed to its rendering surface; clients catch up on output with
/// `session_get_buffer`.
#[derive(Clone)]
pub struct TermrunServer {
    /// Session controller shared by all tool calls
    controller: Arc<SessionController>,
    /// Surface attached to sessions the server starts
    surface: Arc<dyn RenderingSurface>,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TermrunServer {
    /// Create a server from configuration.
    ///
    /// Session events are logged by a background task, so this must be
    /// called inside a tokio runtime.
    pub fn from_config(config: &ServerConfig) -> termrun_core::Result<Self> {
        let controller = SessionController::new(config)?;
        let (surface, events) = ChannelSurface::channel();
        spawn_event_logger(events);
        Ok(Self::with_controller(Arc::new(controller), Arc::new(surface)))
    }

    /// Create a server around an existing controller and surface.
    pub fn with_controller(
        controller: Arc<SessionController>,
        surface: Arc<dyn RenderingSurface>,
    ) -> Self {
        Self {
            controller,
            surface,
            tool_router: Self::tool_router(),
        }
    }

    /// The session controller behind the tools.
    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// Run code in a new or existing session
    #[tool(
        description = "Run code in an interpreter. Waits for completion by default; with wait=false returns a session_id to poll with session_get_buffer, feed with session_send_input or stop with session_interrupt"
    )]
    #[instrument(skip_all)]
    async fn code_execute(
        &self,
        Parameters(params): Parameters<CodeExecuteParams>,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "Executing code: language='{}', session={:?}, wait={}",
            params.language, params.session_id, params.wait
        );

        let response = match (params.session_id, params.wait) {
            (None, true) => {
                let record = self
                    .controller
                    .execute(&params.code, &params.language)
                    .await
                    .map_err(|e| {
                        error!("Execution failed: {}", e);
                        to_mcp_error(e)
                    })?;
                CodeExecuteResponse {
                    session_id: None,
                    message: format!("Finished with exit code {:?}", record.exit_code),
                    result: Some(record),
                }
            }
            (None, false) => {
                let session_id = self
                    .controller
                    .begin_session(
                        &params.language,
                        &params.code,
                        Some(Arc::clone(&self.surface)),
                    )
                    .map_err(to_mcp_error)?;
                CodeExecuteResponse {
                    session_id: Some(session_id),
                    result: None,
                    message: format!("Started in session {session_id}"),
                }
            }
            (Some(session_id), true) => {
                let record = self
                    .controller
                    .execute_in(session_id, &params.code, &params.language)
                    .await
                    .map_err(to_mcp_error)?;
                CodeExecuteResponse {
                    session_id: Some(session_id),
                    message: format!("Finished with exit code {:?}", record.exit_code),
                    result: Some(record),
                }
            }
            (Some(session_id), false) => {
                self.controller
                    .run_in(session_id, &params.code, &params.language)
                    .map_err(to_mcp_error)?;
                CodeExecuteResponse {
                    session_id: Some(session_id),
                    result: None,
                    message: format!("Started in session {session_id}"),
                }
            }
        };

        Ok(json_result(&response, || response.message.clone()))
    }

    /// Open an idle session
    #[tool(description = "Open an idle session. Run code in it with code_execute and session_id")]
    #[instrument(skip_all)]
    async fn session_open(
        &self,
        Parameters(_params): Parameters<SessionOpenParams>,
    ) -> Result<CallToolResult, McpError> {
        let session_id = self
            .controller
            .open_session(Some(Arc::clone(&self.surface)))
            .map_err(|e| {
                warn!("Failed to open session: {}", e);
                to_mcp_error(e)
            })?;

        info!("Session opened: session_id={}", session_id);
        let response = SessionOpenResponse {
            session_id,
            message: format!("Session {session_id} opened"),
        };
        Ok(json_result(&response, || session_id.to_string()))
    }

    /// Send input to a running session
    #[tool(
        description = "Send text to a running session's standard input. A carriage return is delivered as a newline"
    )]
    #[instrument(skip_all)]
    async fn session_send_input(
        &self,
        Parameters(params): Parameters<SessionSendInputParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(
            "Sending input: session_id={}, bytes={}",
            params.session_id,
            params.text.len()
        );

        let accepted = self.controller.send_input(params.session_id, &params.text);
        let response = ControlResponse {
            session_id: params.session_id,
            accepted,
            message: if accepted {
                format!("Sent {} bytes", params.text.len())
            } else {
                "Session is not running; input dropped".to_string()
            },
        };
        Ok(json_result(&response, || response.message.clone()))
    }

    /// Interrupt a running session
    #[tool(
        description = "Interrupt a running session. The process is asked to stop and killed if it is still running after the grace period"
    )]
    #[instrument(skip_all)]
    async fn session_interrupt(
        &self,
        Parameters(params): Parameters<SessionInterruptParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Interrupting session: session_id={}", params.session_id);

        let accepted = self.controller.interrupt(params.session_id);
        let response = ControlResponse {
            session_id: params.session_id,
            accepted,
            message: if accepted {
                format!(
                    "Interrupt sent; forced kill after {}ms",
                    self.controller.settings().grace_period_ms
                )
            } else {
                "Session is not running; nothing to interrupt".to_string()
            },
        };
        Ok(json_result(&response, || response.message.clone()))
    }

    /// Close a session
    #[tool(description = "Close a session, killing its process if one is still running")]
    #[instrument(skip_all)]
    async fn session_close(
        &self,
        Parameters(params): Parameters<SessionCloseParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Closing session: session_id={}", params.session_id);

        let accepted = self.controller.close_session(params.session_id);
        let response = ControlResponse {
            session_id: params.session_id,
            accepted,
            message: if accepted {
                format!("Session {} closed", params.session_id)
            } else {
                format!("Session {} not found", params.session_id)
            },
        };
        Ok(json_result(&response, || response.message.clone()))
    }

    /// Read a session's buffered output
    #[tool(
        description = "Get everything a session has written so far, whether it has completed, and its completion record"
    )]
    #[instrument(skip_all)]
    async fn session_get_buffer(
        &self,
        Parameters(params): Parameters<SessionGetBufferParams>,
    ) -> Result<CallToolResult, McpError> {
        let snapshot = self
            .controller
            .get_buffer(params.session_id)
            .ok_or_else(|| not_found(params.session_id))?;

        debug!(
            "Buffer read: session_id={}, chunks={}, complete={}",
            params.session_id,
            snapshot.buffer.len(),
            snapshot.is_complete
        );
        let response = SessionGetBufferResponse {
            session_id: params.session_id,
            snapshot,
        };
        Ok(json_result(&response, || response.snapshot.text()))
    }

    /// Wait for a session to complete
    #[tool(description = "Wait until a session completes or the timeout expires")]
    #[instrument(skip_all)]
    async fn session_wait(
        &self,
        Parameters(params): Parameters<SessionWaitParams>,
    ) -> Result<CallToolResult, McpError> {
        let timeout_ms = params.timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
        debug!(
            "Waiting for session: session_id={}, timeout_ms={}",
            params.session_id, timeout_ms
        );

        let started = Instant::now();
        let waited = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.controller.wait_for_completion(params.session_id),
        )
        .await;

        let result = match waited {
            Ok(Some(record)) => Some(record),
            Ok(None) => return Err(not_found(params.session_id)),
            Err(_) => None,
        };
        let response = SessionWaitResponse {
            session_id: params.session_id,
            completed: result.is_some(),
            result,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        Ok(json_result(&response, || {
            format!("completed: {}", response.completed)
        }))
    }

    /// List live sessions
    #[tool(description = "List all live sessions")]
    #[instrument(skip_all)]
    async fn session_list(
        &self,
        Parameters(_params): Parameters<SessionListParams>,
    ) -> Result<CallToolResult, McpError> {
        let sessions = self.controller.list_sessions();
        let count = sessions.len();
        info!("Found {} live session(s)", count);

        let response = SessionListResponse { sessions, count };
        Ok(json_result(&response, || format!("{count} sessions live")))
    }

    /// List supported languages
    #[tool(description = "List supported language tags and the interpreter each one runs")]
    #[instrument(skip_all)]
    async fn language_list(
        &self,
        Parameters(_params): Parameters<LanguageListParams>,
    ) -> Result<CallToolResult, McpError> {
        let registry = self.controller.registry();
        let response = LanguageListResponse {
            platform: registry.platform().name().to_string(),
            languages: registry.describe(),
        };
        Ok(json_result(&response, || registry.tags().join(", ")))
    }
}

// Implement the ServerHandler trait to define server capabilities
#[tool_handler]
impl rmcp::ServerHandler for TermrunServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "termrun - Run code in interpreters with streamed terminal output. \
                 Use code_execute to run code (wait=false to keep it running in a session), \
                 session_send_input to answer prompts, session_interrupt to stop a run, \
                 session_get_buffer to read output and session_close to discard a session. \
                 language_list shows the supported languages."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
