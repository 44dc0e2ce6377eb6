//! Whole-daemon lifecycle: PID file, replay of persisted bans, restart exit.

use std::sync::Arc;
use std::time::Duration;

use warden_ban_guard::{BlockAction, StoreHandle, StoreOptions};
use warden_core::config::WardenConfig;
use warden_core::lifecycle::ExitAction;
use warden_daemon::orchestrator::Orchestrator;

use crate::helpers::config::daemon_config;
use crate::helpers::fixture::ip;
use crate::helpers::mock_blocker::RecordingBlocker;

async fn wait_for(path: &std::path::Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never appeared", path.display());
}

#[tokio::test]
async fn persisted_bans_are_replayed_and_restart_exits_with_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = daemon_config(dir.path());

    {
        let store = StoreHandle::open(config.store_path(), StoreOptions::default()).unwrap();
        store.insert_ban("203.0.113.8", 1_700_000_000).await.unwrap();
        store.commit().await.unwrap();
    }
    // let the store thread release the file
    tokio::time::sleep(Duration::from_millis(100)).await;

    let orchestrator = Arc::new(Orchestrator::build_from_config(config.clone()).unwrap());
    let blocker = Arc::new(RecordingBlocker::default());

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let blocker = Arc::clone(&blocker);
        async move { orchestrator.run_with(blocker).await }
    });

    let pid_file = dir.path().join("warden.pid");
    wait_for(&pid_file).await;
    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pid, std::process::id());

    // profile directory is created on first load
    wait_for(&dir.path().join("profiles")).await;

    orchestrator.lifecycle().request_restart();
    let action = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("daemon stops")
        .unwrap()
        .unwrap();

    assert_eq!(action, ExitAction::Restart);
    assert_eq!(action.exit_code(), 42);
    assert!(!pid_file.exists());
    assert_eq!(
        blocker.calls(),
        vec![
            (BlockAction::Init, None),
            (BlockAction::Block, Some(ip("203.0.113.8"))),
        ]
    );
}

#[tokio::test]
async fn shutdown_request_exits_normally() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = daemon_config(dir.path());
    config.blocker.init_on_start = false;

    let orchestrator = Arc::new(Orchestrator::build_from_config(config).unwrap());
    let blocker = Arc::new(RecordingBlocker::default());
    // stop before the daemon even starts; it still opens and closes cleanly
    orchestrator.lifecycle().request_shutdown();

    let action = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run_with(Arc::clone(&blocker)),
    )
    .await
    .expect("daemon stops")
    .unwrap();

    assert_eq!(action, ExitAction::Shutdown);
    assert!(blocker.calls().is_empty());
    assert!(!dir.path().join("warden.pid").exists());
}

#[test]
fn invalid_config_is_rejected_before_start() {
    let mut config = WardenConfig::default();
    config.scanner.skip_ips = vec!["localhost".to_owned()];
    assert!(Orchestrator::build_from_config(config).is_err());
}
