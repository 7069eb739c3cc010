//! Streaming dispatch between sessions and rendering surfaces.
//!
//! A session never owns its surface. It stores a [`SurfaceId`] and looks the
//! surface up in the [`SurfaceRegistry`] on every delivery, so once a surface
//! is unregistered nothing can reach it again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use termrun_core::{CompletionRecord, OutputEvent, SessionId};
use termrun_runner::ProcessEvent;

use crate::session::Session;

/// A display that renders session output.
///
/// Both callbacks run while the session's state is locked, so they must
/// not block and must not call back into the controller.
pub trait RenderingSurface: Send + Sync {
    /// One chunk of output, in production order.
    fn on_output(&self, session: SessionId, event: &OutputEvent);

    /// The session's completion record. Called at most once per session.
    fn on_completion(&self, session: SessionId, record: &CompletionRecord);
}

/// Lookup key for a registered surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Table of live surfaces.
pub struct SurfaceRegistry {
    next_id: AtomicU64,
    surfaces: RwLock<HashMap<SurfaceId, Arc<dyn RenderingSurface>>>,
}

impl SurfaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            surfaces: RwLock::new(HashMap::new()),
        }
    }

    /// Register a surface under a fresh id.
    pub fn register(&self, surface: Arc<dyn RenderingSurface>) -> SurfaceId {
        let id = SurfaceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.surfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, surface);
        debug!(surface = %id, "Surface registered");
        id
    }

    /// Remove a surface. Returns false if it was not registered.
    pub fn unregister(&self, id: SurfaceId) -> bool {
        let removed = self
            .surfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(surface = %id, "Surface unregistered");
        }
        removed
    }

    /// Look up a live surface.
    pub fn get(&self, id: SurfaceId) -> Option<Arc<dyn RenderingSurface>> {
        self.surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Whether `id` is still registered.
    pub fn is_live(&self, id: SurfaceId) -> bool {
        self.surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Number of registered surfaces.
    pub fn len(&self) -> usize {
        self.surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no surface is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SurfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SurfaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceRegistry")
            .field("surfaces", &self.len())
            .finish_non_exhaustive()
    }
}

/// Event forwarded by a [`ChannelSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Output chunk
    Output {
        /// Originating session
        session: SessionId,
        /// The chunk
        event: OutputEvent,
    },
    /// Completion record
    Completion {
        /// Originating session
        session: SessionId,
        /// The record
        record: CompletionRecord,
    },
}

impl SurfaceEvent {
    /// Session the event belongs to.
    pub fn session(&self) -> SessionId {
        match self {
            SurfaceEvent::Output { session, .. } | SurfaceEvent::Completion { session, .. } => {
                *session
            }
        }
    }
}

/// Surface that forwards every event into an unbounded channel.
///
/// Lets a surface living in another task (or behind a transport) consume
/// events without ever blocking the dispatcher.
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    tx: mpsc::UnboundedSender<SurfaceEvent>,
}

impl ChannelSurface {
    /// Create a surface and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RenderingSurface for ChannelSurface {
    fn on_output(&self, session: SessionId, event: &OutputEvent) {
        let _ = self.tx.send(SurfaceEvent::Output {
            session,
            event: event.clone(),
        });
    }

    fn on_completion(&self, session: SessionId, record: &CompletionRecord) {
        let _ = self.tx.send(SurfaceEvent::Completion {
            session,
            record: record.clone(),
        });
    }
}

/// Normalise terminal Enter keys for a process input stream.
///
/// Terminal widgets send `\r` for Enter; interpreters expect `\n`. Both
/// `\r\n` and a lone `\r` become a single `\n`; everything else passes
/// through untouched.
pub fn normalize_input(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(ch);
        }
    }
    out
}

/// Drive one run: consume the runner's events in order, recording and
/// delivering each, then complete the session exactly once.
pub(crate) async fn dispatch_run(
    session: Arc<Session>,
    surfaces: Arc<SurfaceRegistry>,
    mut events: mpsc::UnboundedReceiver<ProcessEvent>,
) {
    let mut exit_code = None;
    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Output(output) => {
                trace!(session = %session.id(), bytes = output.data.len(), "Dispatching output");
                session.record_output(output, &surfaces);
            }
            ProcessEvent::Exited { code } => {
                exit_code = code;
                break;
            }
        }
    }
    session.finish_run(exit_code, &surfaces);
}
