//! Daemon configs rooted in a temp directory.

use std::path::{Path, PathBuf};

use warden_core::config::WardenConfig;

/// Config with every path under `dir`, remote control and metrics off.
pub fn daemon_config(dir: &Path) -> WardenConfig {
    let mut config = WardenConfig::default();
    config.general.data_dir = dir.display().to_string();
    config.general.pid_file = dir.join("warden.pid").display().to_string();
    config.scanner.profiles_dir = dir.join("profiles").display().to_string();
    config.store.path = dir.join("warden.db").display().to_string();
    config.blocker.init_on_start = true;
    config.remote.enabled = false;
    config.metrics.enabled = false;
    config
}

/// Writes `config` as `warden.toml` under `dir`.
///
/// # Panics
///
/// Panics if serialization or file writing fails.
pub fn write_config(dir: &Path, config: &WardenConfig) -> PathBuf {
    let body = toml::to_string_pretty(config).expect("serialize config");
    let path = dir.join("warden.toml");
    std::fs::write(&path, body).expect("write config");
    path
}
