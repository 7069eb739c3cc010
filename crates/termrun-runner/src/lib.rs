//! # termrun-runner
//!
//! Process runner for termrun.
//!
//! This crate provides:
//! - Command-line construction and single-quote shell escaping
//! - Incremental UTF-8 decoding of process output
//! - Piped process spawning (separate stdout/stderr)
//! - PTY process spawning, so interpreters see an interactive terminal
//! - [`ProcessHandle`] for input, interrupt, terminate and kill
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on termrun-core and
//! knows nothing about sessions. Every spawned process reports through one
//! ordered channel of [`ProcessEvent`]s ending in exactly one
//! [`ProcessEvent::Exited`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decode;
mod piped;
pub mod process;
#[cfg(unix)]
mod pty;
pub mod quote;

// Re-export commonly used types
pub use decode::Utf8Decoder;
pub use process::{
    default_working_directory, spawn, ProcessEvent, ProcessHandle, ProcessSignal, SpawnMode,
    SpawnOptions, INTERRUPT_BYTE,
};
pub use quote::{command_line, shell_quote};
