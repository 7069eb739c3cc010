//! # termrun-session
//!
//! Session lifecycle management for termrun.
//!
//! This crate provides:
//! - The session store (monotonic ids, concurrency-safe table)
//! - Append-only replay buffers with catch-up snapshots
//! - Streaming dispatch of output and completion events to rendering surfaces
//! - Input relay with carriage-return normalisation
//! - Interrupt handling with a grace period before a forceful kill
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on termrun-core and
//! termrun-runner. Each run gets one dispatch task that consumes the
//! runner's event channel in order, so per-session ordering never depends
//! on task scheduling.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod dispatch;
pub mod output;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use controller::SessionController;
pub use dispatch::{
    normalize_input, ChannelSurface, RenderingSurface, SurfaceEvent, SurfaceId, SurfaceRegistry,
};
pub use output::OutputBuffer;
pub use session::Session;
pub use store::{SessionStore, SessionStoreConfig};
