//! Session lifecycle controller.
//!
//! Owns the language registry, the session store and the surface registry,
//! and drives each session through `Created -> Running -> Completed`, or
//! `Created -> Failed` when nothing could be started.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use termrun_core::{
    BufferSnapshot, CompletionRecord, Error, ExecutionSettings, LanguageRegistry, OutputEvent,
    Platform, PtyPolicy, Result, ServerConfig, SessionId, SessionPhase, SessionSummary,
};
use termrun_runner::{command_line, default_working_directory, SpawnMode, SpawnOptions};

use crate::dispatch::{dispatch_run, normalize_input, RenderingSurface, SurfaceRegistry};
use crate::session::Session;
use crate::store::{SessionStore, SessionStoreConfig};

/// Creates, drives and tears down execution sessions.
///
/// Control operations that reach the runner (`begin_session`, `execute*`,
/// `interrupt`) spawn tokio tasks and must be called inside a runtime.
#[derive(Debug)]
pub struct SessionController {
    registry: LanguageRegistry,
    store: SessionStore,
    surfaces: Arc<SurfaceRegistry>,
    settings: ExecutionSettings,
    platform: Platform,
}

impl SessionController {
    /// Create a controller from a validated server configuration.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let registry = LanguageRegistry::from_config(&config.languages)?;
        Ok(Self::with_parts(
            registry,
            config.execution.clone(),
            config.server.max_sessions,
        ))
    }

    /// Create a controller from its parts.
    pub fn with_parts(
        registry: LanguageRegistry,
        settings: ExecutionSettings,
        max_sessions: usize,
    ) -> Self {
        let platform = registry.platform();
        Self {
            registry,
            store: SessionStore::with_config(SessionStoreConfig { max_sessions }),
            surfaces: Arc::new(SurfaceRegistry::new()),
            settings,
            platform,
        }
    }

    /// Language registry used to resolve tags.
    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Surface registry.
    pub fn surfaces(&self) -> &SurfaceRegistry {
        &self.surfaces
    }

    /// Execution settings.
    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Run `code` without a surface and return its completion record.
    ///
    /// Uses a transient session that is deleted once the run completes, or
    /// when the returned future is dropped, killing the process if it is
    /// still running.
    /// Unsupported languages and spawn failures come back as failed records.
    pub async fn execute(&self, code: &str, language: &str) -> Result<CompletionRecord> {
        let session = self.store.create(None)?;
        let _transient = TransientSession {
            store: &self.store,
            id: session.id(),
        };
        debug!(session = %session.id(), language, "Transient execution");

        self.start_run(&session, language, code)?;
        Ok(session.wait_for_completion().await)
    }

    /// Allocate an idle session, optionally routed to `surface`.
    pub fn open_session(&self, surface: Option<Arc<dyn RenderingSurface>>) -> Result<SessionId> {
        let surface_id = surface.map(|s| self.surfaces.register(s));
        match self.store.create(surface_id) {
            Ok(session) => {
                info!(session = %session.id(), ?surface_id, "Session opened");
                Ok(session.id())
            }
            Err(e) => {
                if let Some(sid) = surface_id {
                    self.surfaces.unregister(sid);
                }
                Err(e)
            }
        }
    }

    /// Allocate a session, attach `surface` and start running `code`.
    ///
    /// Returns as soon as the process is spawned. An unsupported language or
    /// spawn failure still yields an id: the session is `Failed` and its
    /// completion record carries the error.
    pub fn begin_session(
        &self,
        language: &str,
        code: &str,
        surface: Option<Arc<dyn RenderingSurface>>,
    ) -> Result<SessionId> {
        let id = self.open_session(surface)?;
        let session = self.store.require(id)?;
        self.start_run(&session, language, code)?;
        Ok(id)
    }

    /// Run `code` in an existing idle session and wait for completion.
    ///
    /// Fails with `SessionNotFound` for an unknown id and `SessionBusy` for
    /// a session that already ran; neither spawns anything.
    pub async fn execute_in(
        &self,
        id: SessionId,
        code: &str,
        language: &str,
    ) -> Result<CompletionRecord> {
        let session = self.store.require(id)?;
        self.start_run(&session, language, code)?;
        Ok(session.wait_for_completion().await)
    }

    /// Start `code` in an existing idle session without waiting.
    ///
    /// Same errors as [`execute_in`](Self::execute_in).
    pub fn run_in(&self, id: SessionId, code: &str, language: &str) -> Result<()> {
        let session = self.store.require(id)?;
        self.start_run(&session, language, code)
    }

    /// Wait for a session's completion record.
    pub async fn wait_for_completion(&self, id: SessionId) -> Option<CompletionRecord> {
        let session = self.store.get(id)?;
        Some(session.wait_for_completion().await)
    }

    /// Relay surface input to the session's process.
    ///
    /// Returns false when the session is unknown or has no active process;
    /// the input is dropped in both cases.
    pub fn send_input(&self, id: SessionId, text: &str) -> bool {
        let Some(session) = self.store.get(id) else {
            debug!(session = %id, "Input for unknown session dropped");
            return false;
        };
        let state = session.lock();
        let Some(handle) = &state.active else {
            debug!(session = %id, "Input for idle session dropped");
            return false;
        };
        match handle.write_input(normalize_input(text).as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                debug!(session = %id, error = %e, "Input dropped");
                false
            }
        }
    }

    /// Interrupt a running session.
    ///
    /// Marks the session interrupted and asks the process to stop; if it is
    /// still running when the grace period ends it is killed. Returns false
    /// for unknown sessions and sessions that are not running.
    pub fn interrupt(&self, id: SessionId) -> bool {
        let Some(session) = self.store.get(id) else {
            return false;
        };

        {
            let mut guard = session.lock();
            let state = &mut *guard;
            let Some(handle) = &state.active else {
                debug!(session = %id, phase = ?state.phase, "Nothing to interrupt");
                return false;
            };
            state.was_interrupted = true;
            info!(session = %id, pid = ?handle.pid(), "Interrupting session");
            if let Err(e) = handle.interrupt() {
                warn!(session = %id, error = %e, "Graceful interrupt failed");
            }
        }

        let grace = self.settings.grace_period();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if session.kill_active() {
                warn!(session = %session.id(), ?grace, "Process outlived grace period, killed");
            }
        });
        true
    }

    /// Close a session: kill any running process without grace, stop
    /// routing to its surface and delete it. Returns false if unknown.
    pub fn close_session(&self, id: SessionId) -> bool {
        let Some(session) = self.store.delete(id) else {
            return false;
        };
        if let Some(sid) = session.detach_surface() {
            self.surfaces.unregister(sid);
        }
        info!(session = %id, "Session closed");
        true
    }

    /// Catch-up query.
    pub fn get_buffer(&self, id: SessionId) -> Option<BufferSnapshot> {
        self.store.get(id).map(|s| s.snapshot())
    }

    /// Route a session's events to `surface` and return the catch-up
    /// snapshot.
    ///
    /// Swapping the surface and taking the snapshot happen atomically, so
    /// every chunk is seen exactly once: either in the snapshot or as a
    /// live event. A previously attached surface is unregistered.
    pub fn attach(
        &self,
        id: SessionId,
        surface: Arc<dyn RenderingSurface>,
    ) -> Option<BufferSnapshot> {
        let session = self.store.get(id)?;
        let surface_id = self.surfaces.register(surface);
        let (snapshot, previous) = session.attach_surface(surface_id);
        if let Some(previous) = previous {
            self.surfaces.unregister(previous);
        }
        debug!(session = %id, surface = %surface_id, chunks = snapshot.buffer.len(), "Surface attached");
        Some(snapshot)
    }

    /// Summaries of all live sessions, ordered by id.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.store.list().iter().map(|s| s.summary()).collect()
    }

    /// Close every session. Returns how many were closed.
    pub fn shutdown(&self) -> usize {
        let closed = self.store.close_all();
        for session in &closed {
            if let Some(sid) = session.detach_surface() {
                self.surfaces.unregister(sid);
            }
        }
        info!(sessions = closed.len(), "All sessions closed");
        closed.len()
    }

    /// Move an idle session into Running (or Failed).
    ///
    /// The session lock is held across the spawn so no control operation
    /// can observe a Running session without its process handle.
    fn start_run(&self, session: &Arc<Session>, language: &str, code: &str) -> Result<()> {
        let id = session.id();
        let mut state = session.lock();
        if state.phase != SessionPhase::Created {
            return Err(Error::SessionBusy(id));
        }
        state.language = Some(language.trim().to_string());
        state.code = Some(code.to_string());

        let launch = self.registry.resolve(language).and_then(|invocation| {
            let options = self.spawn_options(state.surface.is_some());
            termrun_runner::spawn(&invocation, code, &options).map(|spawned| (invocation, spawned))
        });

        match launch {
            Ok((invocation, (handle, events))) => {
                info!(session = %id, language, pid = ?handle.pid(), terminal = handle.is_terminal(), "Session running");
                state.phase = SessionPhase::Running;
                if self.settings.echo_command {
                    let echo = format!("$ {}\r\n", command_line(&invocation, code));
                    state.emit(id, OutputEvent::stdout(echo), &self.surfaces);
                }
                state.active = Some(handle);
                tokio::spawn(dispatch_run(
                    Arc::clone(session),
                    Arc::clone(&self.surfaces),
                    events,
                ));
            }
            Err(e) if e.is_launch_failure() => {
                warn!(session = %id, language, error = %e, "Session failed to start");
                state.complete(
                    id,
                    CompletionRecord::failed(e.to_string()),
                    SessionPhase::Failed,
                    &self.surfaces,
                );
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn spawn_options(&self, attached: bool) -> SpawnOptions {
        let mode = if attached && self.settings.pty == PtyPolicy::Auto && self.platform.is_unix() {
            SpawnMode::Pty
        } else {
            SpawnMode::Piped
        };
        SpawnOptions {
            cwd: self.working_directory(),
            mode,
            term: self.settings.term.clone(),
            drain_timeout: self.settings.drain_timeout(),
        }
    }

    fn working_directory(&self) -> PathBuf {
        self.settings
            .working_directory
            .clone()
            .unwrap_or_else(default_working_directory)
    }
}

/// Deletes a transient session when dropped.
struct TransientSession<'a> {
    store: &'a SessionStore,
    id: SessionId,
}

impl Drop for TransientSession<'_> {
    fn drop(&mut self) {
        self.store.delete(self.id);
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::with_parts(
            LanguageRegistry::new(),
            ExecutionSettings::default(),
            SessionStoreConfig::default().max_sessions,
        )
    }
}
