//! Scan scheduling -- the periodic detection cycle.
//!
//! [`ScanScheduler`] drives every profile through one cycle at a time:
//!
//! 1. Release expired bans
//! 2. Snapshot the profile table
//! 3. Scan each profile's log with a window of twice its detection range
//! 4. Spread colliding timestamps, then store attacks not seen before
//! 5. Block addresses flagged as habitual offenders
//! 6. Commit once if anything was written
//! 7. Sleep, waking early on shutdown
//!
//! Profiles are processed one after another; one profile's attacks are stored in
//! log line order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use warden_ban_guard::{BanCoordinator, BanError, Blocker, parse_address};
use warden_core::config::ScannerConfig;
use warden_core::error::WardenError;
use warden_core::lifecycle::Lifecycle;
use warden_core::metrics as m;
use warden_core::types::AttackRecord;
use warden_log_scanner::{
    AttacksByAddress, LogScanner, Profile, ProfileTable, ScanError, classify, in_line_order,
};

/// Scheduler tuning
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Pause between cycles
    pub interval: Duration,
    /// Ban lifetime; `None` keeps bans forever
    pub unban_after: Option<Duration>,
}

impl From<&ScannerConfig> for SchedulerSettings {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.scan_interval_secs),
            unban_after: (config.unban_after_secs > 0)
                .then(|| Duration::from_secs(config.unban_after_secs)),
        }
    }
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scanning,
    Sleeping,
}

/// Outcome of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub profiles_scanned: usize,
    pub profiles_skipped: usize,
    pub attacks_recorded: usize,
    pub bans_applied: usize,
    pub bans_expired: usize,
    pub committed: bool,
}

impl CycleReport {
    fn has_writes(&self) -> bool {
        self.attacks_recorded + self.bans_applied + self.bans_expired > 0
    }
}

/// Scanner bound to the profile version it was built from
struct Attached {
    profile: Arc<Profile>,
    scanner: LogScanner,
}

/// Periodic detection loop
pub struct ScanScheduler<B: Blocker> {
    profiles: ProfileTable,
    coordinator: Arc<BanCoordinator<B>>,
    settings: SchedulerSettings,
    scanners: HashMap<String, Attached>,
    state: SchedulerState,
}

impl<B: Blocker> ScanScheduler<B> {
    pub fn new(
        profiles: ProfileTable,
        coordinator: Arc<BanCoordinator<B>>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            profiles,
            coordinator,
            settings,
            scanners: HashMap::new(),
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Runs cycles until shutdown is requested.
    ///
    /// A failed cycle is logged and the loop carries on with the next one.
    pub async fn run(mut self, lifecycle: Lifecycle) {
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            "scan scheduler started"
        );

        while lifecycle.is_running() {
            match self.run_cycle().await {
                Ok(report) => tracing::debug!(?report, "scan cycle finished"),
                Err(e) => tracing::error!(error = %e, "scan cycle failed"),
            }

            self.state = SchedulerState::Sleeping;
            if !lifecycle.sleep(self.settings.interval).await {
                break;
            }
        }

        self.state = SchedulerState::Idle;
        tracing::info!("scan scheduler stopped");
    }

    /// One cycle against the current wall clock.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, WardenError> {
        self.run_cycle_at(Local::now()).await
    }

    /// One cycle with `now` as the reference time.
    ///
    /// # Errors
    /// Store failures abort the cycle; uncommitted writes are picked up by the
    /// next successful commit.
    pub async fn run_cycle_at(&mut self, now: DateTime<Local>) -> Result<CycleReport, WardenError> {
        self.state = SchedulerState::Scanning;
        let started = Instant::now();
        let result = self.cycle(now).await;

        metrics::counter!(m::SCAN_CYCLES_TOTAL).increment(1);
        metrics::histogram!(m::SCAN_CYCLE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        self.state = SchedulerState::Idle;
        result
    }

    async fn cycle(&mut self, now: DateTime<Local>) -> Result<CycleReport, WardenError> {
        let mut report = CycleReport::default();

        if let Some(ttl) = self.settings.unban_after {
            report.bans_expired = self.coordinator.expire_bans(ttl, now.timestamp()).await?;
        }

        let snapshot = self.profiles.snapshot().await;
        self.attach(&snapshot);

        for profile in &snapshot {
            let Some(mut attacks) = self.scan_profile(profile, now).await else {
                report.profiles_skipped += 1;
                continue;
            };
            report.profiles_scanned += 1;

            spread_timestamps(&mut attacks);
            report.attacks_recorded += self.record_attacks(profile, &attacks).await?;
            report.bans_applied += self.ban_offenders(profile, &attacks).await?;
        }

        if report.has_writes() {
            report.committed = self.coordinator.store().commit().await?;
            self.coordinator.refresh_active_bans().await?;
            tracing::info!(
                attacks = report.attacks_recorded,
                bans = report.bans_applied,
                expired = report.bans_expired,
                "scan cycle committed"
            );
        }
        Ok(report)
    }

    /// Keeps one scanner per profile, rebuilding it when the profile was reloaded.
    fn attach(&mut self, snapshot: &[Arc<Profile>]) {
        let names: HashSet<&str> = snapshot.iter().map(|p| p.name.as_str()).collect();
        self.scanners.retain(|name, _| names.contains(name.as_str()));

        for profile in snapshot {
            let current = self
                .scanners
                .get(&profile.name)
                .is_some_and(|attached| Arc::ptr_eq(&attached.profile, profile));
            if current {
                continue;
            }
            tracing::debug!(profile = %profile.name, log = %profile.log_file.display(), "scanner attached");
            self.scanners.insert(
                profile.name.clone(),
                Attached {
                    profile: Arc::clone(profile),
                    scanner: LogScanner::new(
                        &profile.name,
                        &profile.log_file,
                        profile.rules.clone(),
                    ),
                },
            );
        }
    }

    /// `None` when the profile must be skipped this cycle.
    async fn scan_profile(
        &mut self,
        profile: &Profile,
        now: DateTime<Local>,
    ) -> Option<AttacksByAddress> {
        let attached = self.scanners.get_mut(&profile.name)?;
        let max_age = Duration::from_secs(profile.scan_window.saturating_mul(2));

        match attached.scanner.scan_at(Some(max_age), now).await {
            Ok(attacks) => Some(attacks),
            Err(ScanError::LogFileMissing { path }) => {
                tracing::debug!(profile = %profile.name, path, "log file missing, skipping");
                None
            }
            Err(e) => {
                tracing::warn!(profile = %profile.name, error = %e, "scan failed, skipping");
                None
            }
        }
    }

    async fn record_attacks(
        &self,
        profile: &Profile,
        attacks: &AttacksByAddress,
    ) -> Result<usize, WardenError> {
        let store = self.coordinator.store();
        let mut recorded = 0;

        for (address, vars) in in_line_order(attacks) {
            let exists = store
                .attack_exists(address, vars.timestamp, &profile.name)
                .await?;
            if exists {
                continue;
            }

            let record = AttackRecord {
                address: address.to_owned(),
                timestamp: vars.timestamp,
                profile: profile.name.clone(),
                user: vars.user.clone(),
                vars: vars.clone(),
            };
            store.insert_attack(&record).await?;
            tracing::debug!(attack = %record, "attack recorded");
            recorded += 1;
        }

        if recorded > 0 {
            metrics::counter!(m::ATTACKS_RECORDED_TOTAL, m::LABEL_PROFILE => profile.name.clone())
                .increment(recorded as u64);
        }
        Ok(recorded)
    }

    async fn ban_offenders(
        &self,
        profile: &Profile,
        attacks: &AttacksByAddress,
    ) -> Result<usize, WardenError> {
        let mut banned = 0;

        for address in classify(attacks, profile.threshold, profile.scan_window) {
            let ip = match parse_address(&address) {
                Ok(ip) => ip,
                Err(e) => {
                    tracing::warn!(profile = %profile.name, error = %e, "offender address unusable");
                    continue;
                }
            };

            match self.coordinator.block(ip).await {
                Ok(true) => {
                    tracing::info!(profile = %profile.name, address = %ip, "habitual offender banned");
                    banned += 1;
                }
                Ok(false) => {}
                Err(BanError::Store(e)) => return Err(e.into()),
                // already logged; the address is retried next cycle
                Err(_) => {}
            }
        }
        Ok(banned)
    }
}

/// Makes timestamps unique per address by bumping collisions one second at a time.
pub fn spread_timestamps(attacks: &mut AttacksByAddress) {
    for list in attacks.values_mut() {
        let mut seen = HashSet::with_capacity(list.len());
        for vars in list.iter_mut() {
            while !seen.insert(vars.timestamp) {
                vars.timestamp += 1;
            }
        }
    }
}
