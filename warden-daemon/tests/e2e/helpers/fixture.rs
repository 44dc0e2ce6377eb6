//! Temp-dir fixture: log file, profile directory, SQLite store and coordinator.

use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use serde_json::json;
use tempfile::TempDir;

use warden_ban_guard::{BanCoordinator, StoreHandle, StoreOptions};
use warden_daemon::scheduler::{ScanScheduler, SchedulerSettings};
use warden_log_scanner::{ProfileDefaults, ProfileTable};

use super::mock_blocker::RecordingBlocker;

pub const SSH_FILTER: &str =
    "%D:M% %D:D% %TIME% %HOSTNAME% sshd[%PID%]: Failed password for %USER% from %IP% port %PORT% ssh2";

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid ip")
}

/// `Jun 10 08:01:00` local time, one minute after the test log lines start.
pub fn now() -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 6, 10, 8, 1, 0)
        .earliest()
        .expect("valid local time")
}

pub fn ssh_line(time: &str, address: &str) -> String {
    format!("Jun 10 {time} web-1 sshd[901]: Failed password for root from {address} port 40022 ssh2\n")
}

pub struct Fixture {
    pub dir: TempDir,
    pub log: PathBuf,
    pub profiles_dir: PathBuf,
    pub blocker: Arc<RecordingBlocker>,
    pub coordinator: Arc<BanCoordinator<RecordingBlocker>>,
    pub profiles: ProfileTable,
}

impl Fixture {
    pub fn new(allow: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let log = dir.path().join("auth.log");
        let profiles_dir = dir.path().join("profiles");
        std::fs::create_dir_all(&profiles_dir).expect("profiles dir");

        let store = StoreHandle::open(
            dir.path().join("warden.db"),
            StoreOptions {
                request_timeout: Duration::from_secs(5),
                queue_capacity: 16,
            },
        )
        .expect("store");
        let blocker = Arc::new(RecordingBlocker::default());
        let coordinator = Arc::new(BanCoordinator::new(
            Arc::clone(&blocker),
            store,
            allow.iter().map(|s| ip(s)).collect::<Vec<_>>(),
        ));

        Self {
            dir,
            log,
            profiles_dir,
            blocker,
            coordinator,
            profiles: ProfileTable::default(),
        }
    }

    pub fn store(&self) -> &StoreHandle {
        self.coordinator.store()
    }

    /// Writes an sshd profile watching the fixture log and reloads the table.
    pub async fn ssh_profile(&self, threshold: usize, window: u64) {
        let body = json!({
            "sshd": {
                "logFile": self.log.display().to_string(),
                "filters": [SSH_FILTER],
                "scanRange": window,
                "maxAttempts": threshold,
                "service": "ssh",
            }
        });
        std::fs::write(self.profiles_dir.join("sshd.json"), body.to_string())
            .expect("write profile");
        self.profiles
            .reload(&self.profiles_dir, ProfileDefaults::default())
            .await
            .expect("reload profiles");
    }

    pub fn append(&self, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log)
            .expect("open log");
        f.write_all(text.as_bytes()).expect("write log");
    }

    pub fn scheduler(&self, unban_after: Option<Duration>) -> ScanScheduler<RecordingBlocker> {
        ScanScheduler::new(
            self.profiles.clone(),
            Arc::clone(&self.coordinator),
            SchedulerSettings {
                interval: Duration::from_secs(1),
                unban_after,
            },
        )
    }
}
