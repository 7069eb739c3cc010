//! Integration tests for the termrun server.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rmcp::ServerHandler;
use termrun::{CliArgs, CodeExecuteParams, TermrunServer};
use termrun_core::{ServerConfig, SessionPhase};
use termrun_session::{ChannelSurface, SessionController, SurfaceEvent};

#[test]
fn test_cli_and_config_produce_server_settings() {
    let path = std::env::temp_dir().join(format!("termrun-it-{}.yaml", std::process::id()));
    std::fs::write(
        &path,
        concat!(
            "server:\n",
            "  max_sessions: 4\n",
            "execution:\n",
            "  grace_period_ms: 1500\n",
            "languages:\n",
            "  - tag: deno\n",
            "    command: deno\n",
            "    args: [eval]\n",
        ),
    )
    .unwrap();

    let args = CliArgs::try_parse_from([
        "termrun".to_string(),
        "--config".to_string(),
        path.display().to_string(),
    ])
    .unwrap();
    let config = args.load_config().unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.server.max_sessions, 4);
    assert_eq!(config.execution.grace_period_ms, 1500);

    let controller = SessionController::new(&config).unwrap();
    assert!(controller.registry().supports("deno"));
    assert!(controller.registry().supports("python"));
}

#[tokio::test]
async fn test_server_info_advertises_tools() {
    let server = TermrunServer::from_config(&ServerConfig::default()).unwrap();
    let info = server.get_info();

    assert!(info.capabilities.tools.is_some());
    assert!(info
        .instructions
        .as_deref()
        .unwrap_or_default()
        .contains("code_execute"));
}

#[test]
fn test_execute_params_schema_lists_fields() {
    let schema = schemars::schema_for!(CodeExecuteParams);
    let json = serde_json::to_value(&schema).unwrap();
    let properties = &json["properties"];

    for field in ["code", "language", "session_id", "wait"] {
        assert!(properties.get(field).is_some(), "missing {field}");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_server_sessions_stream_to_its_surface() {
    let controller = Arc::new(SessionController::default());
    let (surface, mut rx) = ChannelSurface::channel();
    let server = TermrunServer::with_controller(Arc::clone(&controller), Arc::new(surface));

    let id = server
        .controller()
        .begin_session("sh", "printf 'a\\nb\\n'", None)
        .unwrap();
    let record = controller.wait_for_completion(id).await.unwrap();
    assert_eq!(record.stdout, "a\nb\n");

    // Sessions started directly on the controller are not routed to the
    // server's surface.
    assert!(rx.try_recv().is_err());

    let summary = &controller.list_sessions()[0];
    assert_eq!(summary.phase, SessionPhase::Completed);
    assert_eq!(controller.shutdown(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_attached_session_delivers_completion_once() {
    let controller = SessionController::default();
    let (surface, mut rx) = ChannelSurface::channel();
    let id = controller
        .begin_session("sh", "echo one; echo two >&2; exit 2", Some(Arc::new(surface)))
        .unwrap();

    let mut completions = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        if let SurfaceEvent::Completion { session, record } = event {
            assert_eq!(session, id);
            assert_eq!(record.exit_code, Some(2));
            completions += 1;
            break;
        }
    }
    assert_eq!(completions, 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}
