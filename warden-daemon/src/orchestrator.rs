//! Service assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `warden-daemon`. It opens the
//! store, prepares the blocker, replays persisted bans, loads profiles and then runs
//! the long-lived tasks until shutdown or a restart request.
//!
//! # Startup Order
//!
//! 1. PID file
//! 2. Store (single-writer thread)
//! 3. Blocker `init`, then replay of every persisted ban
//! 4. Profile table
//! 5. Scan scheduler task
//! 6. Remote channel task (when enabled)
//!
//! # Shutdown
//!
//! `SIGTERM`/`SIGINT` or a remote `restart` cancels the shared [`Lifecycle`]. The
//! scheduler finishes its current cycle, the remote channel says goodbye to the
//! controller, pending writes are committed and the PID file is removed.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use warden_ban_guard::{BanCoordinator, Blocker, CommandBlocker, StoreHandle, StoreOptions};
use warden_core::config::WardenConfig;
use warden_core::lifecycle::{ExitAction, Lifecycle};
use warden_log_scanner::{ProfileDefaults, ProfileTable};
use warden_remote_channel::{ChannelSettings, HttpTransport, RemoteChannel};

use crate::handlers::{HandlerSettings, RemoteHandlers};
use crate::metrics_server;
use crate::scheduler::{ScanScheduler, SchedulerSettings};

/// Upper bound for a single POST to the controller
const REMOTE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: WardenConfig,
    /// Shared running flag and terminal action.
    lifecycle: Lifecycle,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read, parsed or validated,
    /// or if the metrics endpoint cannot be installed.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = WardenConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(config: WardenConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        Ok(Self {
            config,
            lifecycle: Lifecycle::new(),
        })
    }

    /// Shared lifecycle (request shutdown/restart from outside).
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Runs the daemon with the configured command blocker.
    ///
    /// Returns the terminal action the process should exit with.
    pub async fn run(&self) -> Result<ExitAction> {
        let blocker = Arc::new(CommandBlocker::new(
            &self.config.blocker.command,
            Duration::from_secs(self.config.blocker.timeout_secs),
        ));
        self.run_with(blocker).await
    }

    /// Runs the daemon with the given blocker.
    pub async fn run_with<B: Blocker>(&self, blocker: Arc<B>) -> Result<ExitAction> {
        let pid_file = (!self.config.general.pid_file.is_empty())
            .then(|| Path::new(&self.config.general.pid_file));

        if let Some(path) = pid_file {
            write_pid_file(path)?;
        }

        let result = self.serve(blocker).await;

        if let Some(path) = pid_file {
            remove_pid_file(path);
        }
        result
    }

    async fn serve<B: Blocker>(&self, blocker: Arc<B>) -> Result<ExitAction> {
        let config = &self.config;

        let store_path = config.store_path();
        let store = StoreHandle::open(&store_path, StoreOptions::from(&config.store))
            .with_context(|| format!("failed to open store {}", store_path.display()))?;

        let coordinator = Arc::new(BanCoordinator::new(
            blocker,
            store,
            allow_list(&config.scanner.skip_ips),
        ));

        if config.blocker.init_on_start && coordinator.init().await.is_err() {
            tracing::warn!("continuing without blocker init");
        }
        let replayed = coordinator
            .block_all_banned()
            .await
            .context("failed to replay persisted bans")?;
        coordinator.refresh_active_bans().await?;
        tracing::info!(replayed, "persisted bans applied");

        let defaults = ProfileDefaults {
            scan_range: config.scanner.default_scan_range_secs,
            max_attempts: config.scanner.default_max_attempts,
        };
        let profiles = ProfileTable::default();
        let loaded = profiles
            .reload(&config.scanner.profiles_dir, defaults)
            .await
            .with_context(|| format!("failed to load profiles from {}", config.scanner.profiles_dir))?;
        tracing::info!(profiles = loaded, "profiles loaded");

        let scheduler = ScanScheduler::new(
            profiles.clone(),
            Arc::clone(&coordinator),
            SchedulerSettings::from(&config.scanner),
        );
        let scheduler_task = tokio::spawn(scheduler.run(self.lifecycle.clone()));

        let remote_task = if config.remote.enabled {
            let transport = HttpTransport::new(
                &config.remote.server_url,
                Duration::from_secs(config.remote.poll_timeout_secs),
                REMOTE_REQUEST_TIMEOUT,
            )?;
            let mut channel = RemoteChannel::new(transport, ChannelSettings::from(&config.remote));
            let handlers = Arc::new(RemoteHandlers::new(
                channel.emitter(),
                Arc::clone(&coordinator),
                profiles,
                self.lifecycle.clone(),
                HandlerSettings::from(config),
            ));
            handlers.register(&mut channel);

            let token = self.lifecycle.token().clone();
            Some(tokio::spawn(async move {
                if let Err(e) = channel.run(token).await {
                    tracing::error!(error = %e, "remote control disabled until restart");
                }
            }))
        } else {
            tracing::info!("remote control disabled");
            None
        };

        tokio::select! {
            signal = wait_for_shutdown_signal() => {
                let signal = signal?;
                tracing::info!(signal, "shutdown signal received");
                self.lifecycle.request_shutdown();
            }
            () = self.lifecycle.stopped() => {}
        }

        if let Err(e) = scheduler_task.await {
            tracing::error!(error = %e, "scan scheduler task failed");
        }
        if let Some(task) = remote_task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "remote channel task failed");
            }
        }

        if coordinator.store().commit().await? {
            tracing::info!("pending writes committed on shutdown");
        }

        let action = self.lifecycle.exit_action();
        tracing::info!(exit_code = action.exit_code(), "warden stopped");
        Ok(action)
    }
}

/// Parsed allow-list; entries were checked by config validation.
fn allow_list(entries: &[String]) -> Vec<IpAddr> {
    entries
        .iter()
        .filter_map(|entry| entry.trim().parse().ok())
        .collect()
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file (prevents symlink attacks)
/// - Creates parent directory with restrictive permissions (0o700)
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}
