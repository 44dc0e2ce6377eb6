//! Remote command handlers.
//!
//! Each controller event is routed to one method of [`RemoteHandlers`]. Replies go
//! through the [`Outbox`] seam so handlers can be exercised without a live session.
//!
//! | Event | Action | Reply |
//! |---|---|---|
//! | `connect` | send device credentials | `login {uid, secret}` |
//! | `login` | log the verdict | - |
//! | `getAttacks` | page attacks | `attacks {userSid, attacks}` |
//! | `getBans` | page bans | `bans {userSid, bans}` |
//! | `getStatisticInfo` | totals and today's counts | `statistic_data {userSid, data}` |
//! | `config` | store remote profiles, reload | - |
//! | `unblock_ip` | lift one ban | - |
//! | `blocklist` | reconcile the federation set | - |
//! | `restart` | exit with the restart code | - |

use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use serde::Deserialize;
use serde_json::{Value, json};

use warden_ban_guard::{BanCoordinator, Blocker, parse_address};
use warden_core::config::WardenConfig;
use warden_core::lifecycle::Lifecycle;
use warden_log_scanner::{ProfileDefaults, ProfileTable};
use warden_remote_channel::{CONNECT_EVENT, Emitter, RemoteChannel, RemoteError, Transport};

/// Events the daemon listens for
pub const EVENTS: [&str; 9] = [
    CONNECT_EVENT,
    "login",
    "getAttacks",
    "getBans",
    "getStatisticInfo",
    "config",
    "unblock_ip",
    "blocklist",
    "restart",
];

/// Outgoing side used by the handlers.
pub trait Outbox: Send + Sync + 'static {
    fn emit(
        &self,
        name: &str,
        data: &Value,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

impl<T: Transport> Outbox for Emitter<T> {
    async fn emit(&self, name: &str, data: &Value) -> Result<(), RemoteError> {
        Emitter::emit(self, name, data).await
    }
}

/// Handler settings taken from the config
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub device_id: String,
    pub device_secret: String,
    pub page_size: u32,
    pub profiles_dir: PathBuf,
    pub defaults: ProfileDefaults,
}

impl From<&WardenConfig> for HandlerSettings {
    fn from(config: &WardenConfig) -> Self {
        Self {
            device_id: config.remote.device_id.clone(),
            device_secret: config.remote.device_secret.clone(),
            page_size: config.remote.page_size,
            profiles_dir: PathBuf::from(&config.scanner.profiles_dir),
            defaults: ProfileDefaults {
                scan_range: config.scanner.default_scan_range_secs,
                max_attempts: config.scanner.default_max_attempts,
            },
        }
    }
}

/// Paged listing request
#[derive(Debug, Deserialize)]
struct PageRequest {
    #[serde(rename = "userSid")]
    user_sid: Value,
    #[serde(default)]
    before: Value,
}

/// Remote command handlers
pub struct RemoteHandlers<B: Blocker, O: Outbox> {
    outbox: O,
    coordinator: Arc<BanCoordinator<B>>,
    profiles: ProfileTable,
    lifecycle: Lifecycle,
    settings: HandlerSettings,
}

impl<B: Blocker, O: Outbox> RemoteHandlers<B, O> {
    pub fn new(
        outbox: O,
        coordinator: Arc<BanCoordinator<B>>,
        profiles: ProfileTable,
        lifecycle: Lifecycle,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            outbox,
            coordinator,
            profiles,
            lifecycle,
            settings,
        }
    }

    /// Registers every handled event on `channel`.
    pub fn register<T: Transport>(self: &Arc<Self>, channel: &mut RemoteChannel<T>) {
        for event in EVENTS {
            let handlers = Arc::clone(self);
            channel.on(event, move |payload| {
                let handlers = Arc::clone(&handlers);
                async move { handlers.dispatch(event, payload).await }
            });
        }
    }

    /// Runs the handler for `event`, logging failures.
    pub async fn dispatch(&self, event: &str, payload: Value) {
        if let Err(e) = self.handle(event, payload).await {
            tracing::warn!(event, error = %e, "remote command failed");
        }
    }

    /// Runs the handler for `event`.
    pub async fn handle(&self, event: &str, payload: Value) -> Result<()> {
        match event {
            CONNECT_EVENT => self.login().await,
            "login" => {
                log_login(&payload);
                Ok(())
            }
            "getAttacks" => self.send_attacks(payload).await,
            "getBans" => self.send_bans(payload).await,
            "getStatisticInfo" => self.send_statistics(&payload).await,
            "config" => self.apply_profiles(&payload).await,
            "unblock_ip" => self.unblock(&payload).await,
            "blocklist" => self.reconcile(&payload).await,
            "restart" => {
                tracing::info!("restart requested by controller");
                self.lifecycle.request_restart();
                Ok(())
            }
            other => {
                tracing::debug!(event = other, "unhandled remote event");
                Ok(())
            }
        }
    }

    async fn login(&self) -> Result<()> {
        let credentials = json!({
            "uid": self.settings.device_id,
            "secret": self.settings.device_secret,
        });
        self.outbox.emit("login", &credentials).await?;
        Ok(())
    }

    async fn send_attacks(&self, payload: Value) -> Result<()> {
        let request: PageRequest =
            serde_json::from_value(payload).context("invalid getAttacks request")?;
        let attacks = self
            .coordinator
            .store()
            .list_attacks(id_bound(&request.before), self.settings.page_size)
            .await?;

        self.outbox
            .emit(
                "attacks",
                &json!({ "userSid": request.user_sid, "attacks": attacks }),
            )
            .await?;
        Ok(())
    }

    async fn send_bans(&self, payload: Value) -> Result<()> {
        let request: PageRequest =
            serde_json::from_value(payload).context("invalid getBans request")?;
        let bans = self
            .coordinator
            .store()
            .list_bans(id_bound(&request.before), self.settings.page_size)
            .await?;

        self.outbox
            .emit("bans", &json!({ "userSid": request.user_sid, "bans": bans }))
            .await?;
        Ok(())
    }

    async fn send_statistics(&self, payload: &Value) -> Result<()> {
        let user_sid = match payload {
            Value::Object(map) => map.get("userSid").cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let stats = self
            .coordinator
            .store()
            .statistics(local_midnight(Local::now()))
            .await?;

        self.outbox
            .emit(
                "statistic_data",
                &json!({ "userSid": user_sid, "data": stats }),
            )
            .await?;
        Ok(())
    }

    async fn apply_profiles(&self, payload: &Value) -> Result<()> {
        let count = self
            .profiles
            .store_remote(&self.settings.profiles_dir, payload, self.settings.defaults)
            .await?;
        tracing::info!(profiles = count, "remote profile update applied");
        Ok(())
    }

    async fn unblock(&self, payload: &Value) -> Result<()> {
        let text = payload
            .as_str()
            .context("unblock_ip expects an address string")?;
        let address = parse_address(text)?;

        if self.coordinator.unblock(address).await? {
            self.coordinator.store().commit().await?;
            self.coordinator.refresh_active_bans().await?;
        }
        Ok(())
    }

    async fn reconcile(&self, payload: &Value) -> Result<()> {
        let entries = payload
            .as_array()
            .context("blocklist expects an array of addresses")?;

        let mut addresses: Vec<IpAddr> = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.as_str().map(parse_address) {
                Some(Ok(ip)) => addresses.push(ip),
                _ => tracing::warn!(entry = %entry, "blocklist entry ignored"),
            }
        }

        let report = self.coordinator.reconcile(addresses).await?;
        if !report.is_noop() {
            self.coordinator.refresh_active_bans().await?;
        }
        Ok(())
    }
}

fn log_login(payload: &Value) {
    let ok = match payload {
        Value::Bool(ok) => *ok,
        Value::Null => false,
        _ => true,
    };
    if ok {
        tracing::info!("controller login ok");
    } else {
        tracing::warn!("controller rejected the device credentials, login seems expired");
    }
}

/// Page bound from a number, a numeric string, or nothing.
fn id_bound(before: &Value) -> Option<i64> {
    match before {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Unix time of the most recent local midnight.
pub fn local_midnight(now: DateTime<Local>) -> i64 {
    let midnight = now.date_naive().and_time(chrono::NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| now.timestamp(), |dt| dt.timestamp())
}
