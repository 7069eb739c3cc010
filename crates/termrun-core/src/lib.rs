//! # termrun-core
//!
//! Core types for termrun.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other termrun crates. It provides:
//!
//! - Session types (SessionId, SessionPhase, OutputEvent, CompletionRecord)
//! - The language registry mapping language tags to interpreter invocations
//! - Platform detection for per-platform interpreter overrides
//! - YAML configuration
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other termrun crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod language;
pub mod platform;
pub mod session;

// Re-export commonly used types
pub use config::{
    ExecutionSettings, LanguageConfig, LanguageOverride, PlatformOverrides, PtyPolicy,
    ServerConfig, ServerSettings,
};
pub use error::{Error, Result};
pub use language::{Invocation, LanguageRegistry};
pub use platform::Platform;
pub use session::{
    BufferSnapshot, CompletionRecord, OutputEvent, SessionId, SessionPhase, SessionSummary,
    StreamKind,
};
