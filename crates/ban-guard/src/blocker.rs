//! External blocker abstraction for testability.
//!
//! The [`Blocker`] trait abstracts the privileged process that manipulates firewall
//! state. Production code uses [`CommandBlocker`], which runs the configured
//! executable as `<command> init`, `<command> block <address>` or
//! `<command> unblock <address>`. Tests use `MockBlocker`.
//!
//! A zero exit status is success. Everything else (non-zero exit, spawn failure,
//! timeout) is reported as [`BanError::Blocker`] and never panics.

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::BanError;

/// Blocker invocation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockAction {
    Init,
    Block,
    Unblock,
}

impl BlockAction {
    /// Subcommand passed to the blocker; also used as the metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Block => "block",
            Self::Unblock => "unblock",
        }
    }
}

impl fmt::Display for BlockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait abstracting the external blocking collaborator.
///
/// Implementations must be `Send + Sync + 'static` so the coordinator can be shared
/// between the scan loop and remote command handlers.
pub trait Blocker: Send + Sync + 'static {
    /// Prepares firewall state (e.g. creates chains). Called once at startup.
    fn init(&self) -> impl Future<Output = Result<(), BanError>> + Send;

    /// Starts denying traffic from `address`.
    fn block(&self, address: IpAddr) -> impl Future<Output = Result<(), BanError>> + Send;

    /// Stops denying traffic from `address`.
    fn unblock(&self, address: IpAddr) -> impl Future<Output = Result<(), BanError>> + Send;
}

/// Production blocker that runs an executable.
#[derive(Debug, Clone)]
pub struct CommandBlocker {
    command: PathBuf,
    timeout: Duration,
}

impl CommandBlocker {
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Blocker executable path
    pub fn command(&self) -> &std::path::Path {
        &self.command
    }

    async fn run(&self, action: BlockAction, address: Option<IpAddr>) -> Result<(), BanError> {
        let target = address.map(|a| a.to_string()).unwrap_or_default();
        let failure = |reason: String| BanError::Blocker {
            action: action.as_str(),
            address: target.clone(),
            reason,
        };

        let mut cmd = Command::new(&self.command);
        cmd.arg(action.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(address) = address {
            cmd.arg(address.to_string());
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(failure(format!(
                    "failed to run {}: {e}",
                    self.command.display()
                )));
            }
            Err(_elapsed) => {
                return Err(failure(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            tracing::debug!(action = %action, address = %target, "blocker succeeded");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(failure(format!("{} ({})", output.status, stderr.trim())))
        }
    }
}

impl Blocker for CommandBlocker {
    async fn init(&self) -> Result<(), BanError> {
        self.run(BlockAction::Init, None).await
    }

    async fn block(&self, address: IpAddr) -> Result<(), BanError> {
        self.run(BlockAction::Block, Some(address)).await
    }

    async fn unblock(&self, address: IpAddr) -> Result<(), BanError> {
        self.run(BlockAction::Unblock, Some(address)).await
    }
}

/// Recording blocker for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockBlocker {
    /// Every invocation, in order
    pub calls: std::sync::Mutex<Vec<(BlockAction, Option<IpAddr>)>>,
    /// Addresses for which block/unblock fails
    pub failing: std::sync::Mutex<std::collections::HashSet<IpAddr>>,
}

#[cfg(test)]
impl MockBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call for `address` fail.
    pub fn fail_for(&self, address: IpAddr) {
        self.failing.lock().unwrap().insert(address);
    }

    /// Clears the failure set.
    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Recorded calls of one kind.
    pub fn calls_of(&self, action: BlockAction) -> Vec<IpAddr> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| *a == action)
            .filter_map(|(_, ip)| *ip)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, action: BlockAction, address: Option<IpAddr>) -> Result<(), BanError> {
        self.calls.lock().unwrap().push((action, address));
        match address {
            Some(ip) if self.failing.lock().unwrap().contains(&ip) => Err(BanError::Blocker {
                action: action.as_str(),
                address: ip.to_string(),
                reason: "mock failure".to_owned(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
impl Blocker for MockBlocker {
    async fn init(&self) -> Result<(), BanError> {
        self.record(BlockAction::Init, None)
    }

    async fn block(&self, address: IpAddr) -> Result<(), BanError> {
        self.record(BlockAction::Block, Some(address))
    }

    async fn unblock(&self, address: IpAddr) -> Result<(), BanError> {
        self.record(BlockAction::Unblock, Some(address))
    }
}
