//! Detection cycle: log lines to stored attacks to bans.

use std::time::Duration;

use warden_ban_guard::BlockAction;

use crate::helpers::fixture::{Fixture, ip, now, ssh_line};

/// Five failures within a minute, threshold 3, window 120: one ban, five attack rows.
#[tokio::test]
async fn habitual_offender_is_banned_exactly_once() {
    let fx = Fixture::new(&[]);
    fx.ssh_profile(3, 120).await;
    for second in [0, 10, 20, 30, 40] {
        fx.append(&ssh_line(&format!("08:00:{second:02}"), "203.0.113.5"));
    }

    let mut scheduler = fx.scheduler(None);
    let report = scheduler.run_cycle_at(now()).await.unwrap();

    assert_eq!(report.profiles_scanned, 1);
    assert_eq!(report.attacks_recorded, 5);
    assert_eq!(report.bans_applied, 1);
    assert!(report.committed);

    assert_eq!(fx.store().list_attacks(None, 100).await.unwrap().len(), 5);
    assert_eq!(fx.store().ban_count().await.unwrap(), 1);
    assert_eq!(
        fx.blocker.addresses(BlockAction::Block),
        vec![ip("203.0.113.5")]
    );

    // unchanged log: nothing new to store, nobody blocked again
    let report = scheduler.run_cycle_at(now()).await.unwrap();
    assert_eq!(report.attacks_recorded, 0);
    assert!(!report.committed);
    assert_eq!(fx.blocker.addresses(BlockAction::Block).len(), 1);
}

/// Below the threshold the attacks are stored but nobody is banned.
#[tokio::test]
async fn attacks_below_threshold_are_only_recorded() {
    let fx = Fixture::new(&[]);
    fx.ssh_profile(3, 120).await;
    fx.append(&ssh_line("08:00:00", "198.51.100.20"));
    fx.append(&ssh_line("08:00:30", "198.51.100.20"));

    let report = fx.scheduler(None).run_cycle_at(now()).await.unwrap();

    assert_eq!(report.attacks_recorded, 2);
    assert_eq!(report.bans_applied, 0);
    assert_eq!(fx.store().ban_count().await.unwrap(), 0);
    assert!(fx.blocker.calls().is_empty());
}

/// Attack ids follow the log, not the address grouping.
#[tokio::test]
async fn attacks_are_stored_in_log_line_order() {
    let fx = Fixture::new(&[]);
    fx.ssh_profile(10, 120).await;
    fx.append(&ssh_line("08:00:00", "203.0.113.9"));
    fx.append(&ssh_line("08:00:01", "198.51.100.1"));
    fx.append(&ssh_line("08:00:02", "203.0.113.9"));

    fx.scheduler(None).run_cycle_at(now()).await.unwrap();

    let mut rows = fx.store().list_attacks(None, 100).await.unwrap();
    rows.reverse();
    let addresses: Vec<&str> = rows.iter().map(|a| a.address.as_str()).collect();
    assert_eq!(addresses, vec!["203.0.113.9", "198.51.100.1", "203.0.113.9"]);
    assert!(rows.windows(2).all(|w| w[0].time < w[1].time));
}

/// Same-second lines get distinct timestamps and are not stored twice on later cycles.
#[tokio::test]
async fn colliding_timestamps_are_spread_and_deduplicated() {
    let fx = Fixture::new(&[]);
    fx.ssh_profile(10, 120).await;
    for _ in 0..3 {
        fx.append(&ssh_line("08:00:05", "192.0.2.44"));
    }

    let mut scheduler = fx.scheduler(None);
    scheduler.run_cycle_at(now()).await.unwrap();

    let mut times: Vec<i64> = fx
        .store()
        .list_attacks(None, 100)
        .await
        .unwrap()
        .iter()
        .map(|a| a.time)
        .collect();
    times.sort_unstable();
    assert_eq!(times.len(), 3);
    assert_eq!(times[1], times[0] + 1);
    assert_eq!(times[2], times[0] + 2);

    // new content makes the scanner return its whole window again
    fx.append(&ssh_line("08:00:50", "192.0.2.45"));
    let report = scheduler.run_cycle_at(now()).await.unwrap();
    assert_eq!(report.attacks_recorded, 1);
    assert_eq!(fx.store().list_attacks(None, 100).await.unwrap().len(), 4);
}

/// A missing log file skips the profile for this cycle only.
#[tokio::test]
async fn missing_log_file_is_retried_next_cycle() {
    let fx = Fixture::new(&[]);
    fx.ssh_profile(3, 120).await;

    let mut scheduler = fx.scheduler(None);
    let report = scheduler.run_cycle_at(now()).await.unwrap();
    assert_eq!(report.profiles_skipped, 1);
    assert_eq!(report.profiles_scanned, 0);

    fx.append(&ssh_line("08:00:00", "203.0.113.77"));
    let report = scheduler.run_cycle_at(now()).await.unwrap();
    assert_eq!(report.profiles_scanned, 1);
    assert_eq!(report.attacks_recorded, 1);
}

/// A blocker failure leaves no ban row; the next cycle tries again.
#[tokio::test]
async fn blocker_failure_is_retried_on_a_later_cycle() {
    let fx = Fixture::new(&[]);
    fx.ssh_profile(3, 120).await;
    let target = ip("203.0.113.90");
    fx.blocker.fail_for(target);
    for second in [0, 5, 10] {
        fx.append(&ssh_line(&format!("08:00:{second:02}"), "203.0.113.90"));
    }

    let mut scheduler = fx.scheduler(None);
    let report = scheduler.run_cycle_at(now()).await.unwrap();
    assert_eq!(report.attacks_recorded, 3);
    assert_eq!(report.bans_applied, 0);
    assert_eq!(fx.store().ban_count().await.unwrap(), 0);

    // another attack makes the scanner hand back the window, offender is re-evaluated
    fx.append(&ssh_line("08:00:15", "203.0.113.90"));
    scheduler.run_cycle_at(now()).await.unwrap();
    assert_eq!(fx.blocker.addresses(BlockAction::Block), vec![target, target]);
}

/// Bans older than the configured lifetime are lifted at the start of a cycle.
#[tokio::test]
async fn expired_bans_are_released() {
    let fx = Fixture::new(&[]);
    fx.store().insert_ban("198.51.100.3", 100).await.unwrap();
    fx.store().commit().await.unwrap();

    let report = fx
        .scheduler(Some(Duration::from_secs(3600)))
        .run_cycle_at(now())
        .await
        .unwrap();

    assert_eq!(report.bans_expired, 1);
    assert!(report.committed);
    assert_eq!(fx.store().ban_count().await.unwrap(), 0);
    assert_eq!(
        fx.blocker.addresses(BlockAction::Unblock),
        vec![ip("198.51.100.3")]
    );
}
