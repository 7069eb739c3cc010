//! The server's rendering surface.
//!
//! MCP has no push channel for session output in this server, so the
//! surface the server attaches to its sessions forwards events to a task
//! that logs them. Clients catch up through `session_get_buffer`.

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use termrun_session::SurfaceEvent;

/// Consume surface events and log them under the `termrun::surface` target.
pub fn spawn_event_logger(mut events: UnboundedReceiver<SurfaceEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SurfaceEvent::Output { session, event } => {
                    debug!(
                        target: "termrun::surface",
                        session = %session,
                        stream = ?event.kind,
                        bytes = event.data.len(),
                        data = %event.data.escape_debug(),
                        "output"
                    );
                }
                SurfaceEvent::Completion { session, record } => {
                    info!(
                        target: "termrun::surface",
                        session = %session,
                        exit_code = ?record.exit_code,
                        was_interrupted = record.was_interrupted,
                        error = ?record.error,
                        "completion"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use termrun_core::{CompletionRecord, OutputEvent, SessionId};
    use termrun_session::{ChannelSurface, RenderingSurface};

    #[tokio::test]
    async fn test_logger_drains_until_surface_dropped() {
        let (surface, rx) = ChannelSurface::channel();
        let task = spawn_event_logger(rx);

        surface.on_output(SessionId::new(1), &OutputEvent::stdout("hi\r\n"));
        surface.on_completion(SessionId::new(1), &CompletionRecord::default());
        drop(surface);

        task.await.unwrap();
    }
}
