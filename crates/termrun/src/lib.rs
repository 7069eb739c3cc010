//! termrun MCP server library
//!
//! This library contains the command-line handling, the MCP protocol layer
//! and its tool types. The actual server binary is in main.rs.

pub mod cli;
pub mod protocol;
pub mod surface;
pub mod tools;

// Re-export commonly used types
pub use cli::CliArgs;
pub use protocol::TermrunServer;
pub use surface::spawn_event_logger;
pub use tools::*;
