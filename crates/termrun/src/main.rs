//! # termrun
//!
//! Model Context Protocol server that runs code in interpreters and streams
//! their terminal output.
//!
//! ## Overview
//!
//! This server provides MCP tools for:
//! - Execution (run code, one-shot or in a session)
//! - Session management (open, list, close)
//! - Interaction (send input, interrupt)
//! - Catch-up (read a session's buffered output, wait for completion)
//!
//! ## Architecture
//!
//! This is Layer 3 - the MCP server binary that ties together:
//! - termrun-core: Core types, language registry and configuration
//! - termrun-runner: Process spawning (pipes or PTY)
//! - termrun-session: Session store, streaming and lifecycle

use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use termrun::{CliArgs, TermrunServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = CliArgs::parse();
    let config = args.load_config()?;

    // Initialize logging. stdout carries the MCP protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "termrun v{} starting (max_sessions={}, grace_period_ms={})",
        env!("CARGO_PKG_VERSION"),
        config.server.max_sessions,
        config.execution.grace_period_ms
    );

    let server = TermrunServer::from_config(&config)?;
    let controller = server.controller().clone();

    tracing::info!("Server initialized, starting stdio transport...");

    // Serve the MCP server over stdio
    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("termrun running on stdio");

    // Wait for the service to complete
    service.waiting().await?;

    let closed = controller.shutdown();
    tracing::info!("termrun shutting down ({} session(s) closed)", closed);

    Ok(())
}
