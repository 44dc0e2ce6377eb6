//! Building the daemon from a config file, with environment overrides.

use serial_test::serial;

use warden_daemon::orchestrator::Orchestrator;

use crate::helpers::config::{daemon_config, write_config};

#[tokio::test]
#[serial]
async fn daemon_builds_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = daemon_config(dir.path());
    config.scanner.skip_ips = vec!["192.0.2.10".to_owned()];
    config.scanner.unban_after_secs = 86_400;
    let path = write_config(dir.path(), &config);

    let orchestrator = Orchestrator::build(&path).await.unwrap();

    let loaded = orchestrator.config();
    assert_eq!(loaded.scanner.skip_ips, vec!["192.0.2.10"]);
    assert_eq!(loaded.scanner.unban_after_secs, 86_400);
    assert_eq!(loaded.store_path(), dir.path().join("warden.db"));
}

#[tokio::test]
#[serial]
async fn environment_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &daemon_config(dir.path()));

    // SAFETY: serialized with every other test touching the environment
    unsafe { std::env::set_var("WARDEN_SCANNER_SCAN_INTERVAL_SECS", "7") };
    let result = Orchestrator::build(&path).await;
    unsafe { std::env::remove_var("WARDEN_SCANNER_SCAN_INTERVAL_SECS") };

    assert_eq!(result.unwrap().config().scanner.scan_interval_secs, 7);
}

#[tokio::test]
#[serial]
async fn remote_without_credentials_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = daemon_config(dir.path());
    config.remote.enabled = true;
    config.remote.server_url = "https://controller.example".to_owned();
    let path = write_config(dir.path(), &config);

    let err = Orchestrator::build(&path).await.err().expect("build fails");
    assert!(err.to_string().contains("remote.device_id"));
}

#[tokio::test]
#[serial]
async fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Orchestrator::build(&dir.path().join("absent.toml")).await.is_err());
}
