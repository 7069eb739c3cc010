//! Execution session state.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use termrun_core::{
    BufferSnapshot, CompletionRecord, OutputEvent, SessionId, SessionPhase, SessionSummary,
    StreamKind,
};
use termrun_runner::ProcessHandle;

use crate::dispatch::{SurfaceId, SurfaceRegistry};
use crate::output::OutputBuffer;

/// An execution session.
///
/// All mutable state sits behind one mutex. Output is appended and
/// delivered to the surface while that mutex is held, so a catch-up
/// snapshot taken under the same mutex is always consistent with what the
/// surface has seen.
#[derive(Debug)]
pub struct Session {
    /// Session identifier
    id: SessionId,

    /// Session creation time
    created_at: DateTime<Utc>,

    /// Mutable state
    state: Mutex<SessionState>,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) phase: SessionPhase,
    pub(crate) buffer: OutputBuffer,
    pub(crate) active: Option<ProcessHandle>,
    pub(crate) last_result: Option<CompletionRecord>,
    pub(crate) was_interrupted: bool,
    pub(crate) surface: Option<SurfaceId>,
    pub(crate) language: Option<String>,
    pub(crate) code: Option<String>,
    stdout: String,
    stderr: String,
    waiters: Vec<oneshot::Sender<CompletionRecord>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, surface: Option<SurfaceId>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                phase: SessionPhase::Created,
                buffer: OutputBuffer::new(),
                active: None,
                last_result: None,
                was_interrupted: false,
                surface,
                language: None,
                code: None,
                stdout: String::new(),
                stderr: String::new(),
                waiters: Vec::new(),
            }),
        }
    }

    /// Get the session ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    /// Whether the session has a completion record.
    pub fn is_complete(&self) -> bool {
        self.lock().last_result.is_some()
    }

    /// Whether an interrupt was requested.
    pub fn was_interrupted(&self) -> bool {
        self.lock().was_interrupted
    }

    /// Whether a process is currently running.
    pub fn has_active_process(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Surface events are routed to, if any.
    pub fn surface(&self) -> Option<SurfaceId> {
        self.lock().surface
    }

    /// Catch-up view of everything written so far.
    pub fn snapshot(&self) -> BufferSnapshot {
        self.lock().snapshot()
    }

    /// Listing entry.
    pub fn summary(&self) -> SessionSummary {
        let state = self.lock();
        SessionSummary {
            id: self.id,
            language: state.language.clone(),
            code: state.code.clone(),
            phase: state.phase,
            was_interrupted: state.was_interrupted,
            buffered_chunks: state.buffer.len(),
            created_at: self.created_at,
        }
    }

    /// Wait until the session completes and return its record.
    ///
    /// Resolves immediately for a completed session.
    pub async fn wait_for_completion(&self) -> CompletionRecord {
        let rx = {
            let mut state = self.lock();
            if let Some(record) = &state.last_result {
                return record.clone();
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };
        rx.await
            .unwrap_or_else(|_| CompletionRecord::failed("Session dropped before completion"))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap the routing surface and snapshot the buffer in one step.
    ///
    /// Returns the snapshot and the surface that was replaced.
    pub(crate) fn attach_surface(&self, surface: SurfaceId) -> (BufferSnapshot, Option<SurfaceId>) {
        let mut state = self.lock();
        let previous = state.surface.replace(surface);
        (state.snapshot(), previous)
    }

    /// Stop routing events to any surface.
    pub(crate) fn detach_surface(&self) -> Option<SurfaceId> {
        self.lock().surface.take()
    }

    /// Append a process output chunk and deliver it.
    pub(crate) fn record_output(&self, event: OutputEvent, surfaces: &SurfaceRegistry) {
        let mut state = self.lock();
        if state.last_result.is_some() {
            warn!(session = %self.id, "Dropping output after completion");
            return;
        }
        match event.kind {
            StreamKind::Stdout => state.stdout.push_str(&event.data),
            StreamKind::Stderr => state.stderr.push_str(&event.data),
        }
        state.emit(self.id, event, surfaces);
    }

    /// Build the completion record for the finished run.
    pub(crate) fn finish_run(&self, exit_code: Option<i32>, surfaces: &SurfaceRegistry) {
        let mut state = self.lock();
        let record = CompletionRecord {
            stdout: std::mem::take(&mut state.stdout),
            stderr: std::mem::take(&mut state.stderr),
            exit_code,
            was_interrupted: state.was_interrupted,
            error: None,
        };
        state.complete(self.id, record, SessionPhase::Completed, surfaces);
    }

    /// Kill the active process, if any. Returns whether one was signalled.
    pub(crate) fn kill_active(&self) -> bool {
        let state = self.lock();
        match &state.active {
            Some(handle) => {
                if let Err(e) = handle.kill() {
                    debug!(session = %self.id, error = %e, "Kill found the process already gone");
                }
                true
            }
            None => false,
        }
    }
}

impl SessionState {
    pub(crate) fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            buffer: self.buffer.chunks().to_vec(),
            is_complete: self.last_result.is_some(),
            last_result: self.last_result.clone(),
        }
    }

    /// Buffer an event and hand it to the live surface.
    pub(crate) fn emit(&mut self, id: SessionId, event: OutputEvent, surfaces: &SurfaceRegistry) {
        if !self.buffer.append(event.data.as_str()) {
            return;
        }
        if let Some(surface) = self.surface.and_then(|sid| surfaces.get(sid)) {
            surface.on_output(id, &event);
        }
    }

    /// Record the terminal result. Only the first call has any effect.
    pub(crate) fn complete(
        &mut self,
        id: SessionId,
        record: CompletionRecord,
        phase: SessionPhase,
        surfaces: &SurfaceRegistry,
    ) -> bool {
        if self.last_result.is_some() {
            return false;
        }

        info!(
            session = %id,
            ?phase,
            exit_code = ?record.exit_code,
            was_interrupted = record.was_interrupted,
            "Session complete"
        );

        self.phase = phase;
        self.active = None;
        self.buffer.freeze();
        self.last_result = Some(record.clone());

        if let Some(surface) = self.surface.and_then(|sid| surfaces.get(sid)) {
            surface.on_completion(id, &record);
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(record.clone());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::dispatch::{ChannelSurface, SurfaceEvent};

    fn attached() -> (
        Session,
        SurfaceRegistry,
        tokio::sync::mpsc::UnboundedReceiver<SurfaceEvent>,
    ) {
        let surfaces = SurfaceRegistry::new();
        let (surface, rx) = ChannelSurface::channel();
        let sid = surfaces.register(Arc::new(surface));
        (Session::new(SessionId::new(1), Some(sid)), surfaces, rx)
    }

    #[test]
    fn test_new_session_is_created() {
        let session = Session::new(SessionId::new(3), None);
        assert_eq!(session.id(), SessionId::new(3));
        assert_eq!(session.phase(), SessionPhase::Created);
        assert!(!session.is_complete());
        assert!(!session.has_active_process());
        assert!(session.snapshot().buffer.is_empty());
    }

    #[test]
    fn test_output_is_buffered_and_delivered_in_order() {
        let (session, surfaces, mut rx) = attached();
        session.record_output(OutputEvent::stdout("a"), &surfaces);
        session.record_output(OutputEvent::stderr("b"), &surfaces);
        session.record_output(OutputEvent::stdout("c"), &surfaces);

        assert_eq!(session.snapshot().buffer, vec!["a", "b", "c"]);
        let mut delivered = Vec::new();
        while let Ok(SurfaceEvent::Output { event, .. }) = rx.try_recv() {
            delivered.push(event.data);
        }
        assert_eq!(delivered, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_finish_uses_accumulated_totals() {
        let (session, surfaces, _rx) = attached();
        session.record_output(OutputEvent::stdout("one\n"), &surfaces);
        session.record_output(OutputEvent::stderr("warn\n"), &surfaces);
        session.record_output(OutputEvent::stdout("two\n"), &surfaces);
        session.finish_run(Some(0), &surfaces);

        let snapshot = session.snapshot();
        let record = snapshot.last_result.unwrap();
        assert_eq!(record.stdout, "one\ntwo\n");
        assert_eq!(record.stderr, "warn\n");
        assert_eq!(record.exit_code, Some(0));
        assert!(snapshot.is_complete);
        assert_eq!(session.phase(), SessionPhase::Completed);
    }

    #[test]
    fn test_completion_delivered_once_and_buffer_frozen() {
        let (session, surfaces, mut rx) = attached();
        session.finish_run(Some(1), &surfaces);
        session.finish_run(Some(2), &surfaces);
        session.record_output(OutputEvent::stdout("late"), &surfaces);

        let completions: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, SurfaceEvent::Completion { .. }))
            .collect();
        assert_eq!(completions.len(), 1);
        assert_eq!(session.snapshot().last_result.unwrap().exit_code, Some(1));
        assert!(session.snapshot().buffer.is_empty());
    }

    #[test]
    fn test_detached_surface_gets_nothing() {
        let (session, surfaces, mut rx) = attached();
        let sid = session.detach_surface().unwrap();
        assert!(surfaces.unregister(sid));
        session.record_output(OutputEvent::stdout("x"), &surfaces);
        assert!(rx.try_recv().is_err());
        assert_eq!(session.snapshot().buffer, vec!["x"]);
    }

    #[test]
    fn test_attach_surface_replaces_previous() {
        let (session, surfaces, _rx) = attached();
        let old = session.surface().unwrap();
        let (surface, _rx2) = ChannelSurface::channel();
        let new = surfaces.register(Arc::new(surface));
        let (snapshot, previous) = session.attach_surface(new);
        assert_eq!(previous, Some(old));
        assert_eq!(session.surface(), Some(new));
        assert!(!snapshot.is_complete);
    }

    #[tokio::test]
    async fn test_wait_for_completion() {
        let session = Arc::new(Session::new(SessionId::new(9), None));
        let surfaces = SurfaceRegistry::new();

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.wait_for_completion().await })
        };
        tokio::task::yield_now().await;
        session.finish_run(Some(42), &surfaces);

        assert_eq!(waiter.await.unwrap().exit_code, Some(42));
        // Already complete: resolves immediately.
        assert_eq!(session.wait_for_completion().await.exit_code, Some(42));
    }
}
