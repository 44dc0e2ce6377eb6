//! Controller commands routed through the handler table.

use std::sync::Arc;

use serde_json::{Value, json};

use warden_ban_guard::BlockAction;
use warden_core::lifecycle::{ExitAction, Lifecycle};
use warden_daemon::handlers::{HandlerSettings, RemoteHandlers};
use warden_log_scanner::{ProfileDefaults, ProfileOrigin};

use crate::helpers::fixture::{Fixture, SSH_FILTER, ip, now, ssh_line};
use crate::helpers::mock_blocker::RecordingBlocker;
use crate::helpers::outbox::RecordingOutbox;

struct Harness {
    fx: Fixture,
    outbox: RecordingOutbox,
    lifecycle: Lifecycle,
    handlers: RemoteHandlers<RecordingBlocker, RecordingOutbox>,
}

fn harness(page_size: u32) -> Harness {
    let fx = Fixture::new(&[]);
    let outbox = RecordingOutbox::default();
    let lifecycle = Lifecycle::new();
    let handlers = RemoteHandlers::new(
        outbox.clone(),
        Arc::clone(&fx.coordinator),
        fx.profiles.clone(),
        lifecycle.clone(),
        HandlerSettings {
            device_id: "device-7".to_owned(),
            device_secret: "s3cret".to_owned(),
            page_size,
            profiles_dir: fx.profiles_dir.clone(),
            defaults: ProfileDefaults::default(),
        },
    );
    Harness {
        fx,
        outbox,
        lifecycle,
        handlers,
    }
}

/// One offender with four attacks, banned by a regular cycle.
async fn seed(fx: &Fixture) {
    fx.ssh_profile(3, 120).await;
    for second in [0, 10, 20, 30] {
        fx.append(&ssh_line(&format!("08:00:{second:02}"), "203.0.113.5"));
    }
    fx.scheduler(None).run_cycle_at(now()).await.unwrap();
}

#[tokio::test]
async fn connect_sends_device_credentials() {
    let h = harness(100);

    h.handlers.handle("connect", Value::Null).await.unwrap();

    assert_eq!(
        h.outbox.last("login"),
        Some(json!({"uid": "device-7", "secret": "s3cret"}))
    );
}

#[tokio::test]
async fn attacks_are_paged_newest_first() {
    let h = harness(3);
    seed(&h.fx).await;

    h.handlers
        .handle("getAttacks", json!({"userSid": "u-1"}))
        .await
        .unwrap();
    let page = h.outbox.last("attacks").unwrap();
    assert_eq!(page["userSid"], "u-1");
    let ids: Vec<i64> = page["attacks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![4, 3, 2]);

    // the bound can arrive as a string
    h.handlers
        .handle("getAttacks", json!({"userSid": "u-1", "before": "2"}))
        .await
        .unwrap();
    let page = h.outbox.last("attacks").unwrap();
    assert_eq!(page["attacks"].as_array().unwrap().len(), 1);
    assert_eq!(page["attacks"][0]["address"], "203.0.113.5");
}

#[tokio::test]
async fn bans_carry_attack_counts() {
    let h = harness(100);
    seed(&h.fx).await;

    h.handlers
        .handle("getBans", json!({"userSid": 12}))
        .await
        .unwrap();

    let page = h.outbox.last("bans").unwrap();
    assert_eq!(page["userSid"], 12);
    assert_eq!(page["bans"][0]["address"], "203.0.113.5");
    assert_eq!(page["bans"][0]["attacksCount"], 4);
}

#[tokio::test]
async fn statistics_split_totals_and_today() {
    let h = harness(100);
    // attack lines are from 2024, the ban is made now
    seed(&h.fx).await;

    h.handlers
        .handle("getStatisticInfo", json!("u-9"))
        .await
        .unwrap();

    let reply = h.outbox.last("statistic_data").unwrap();
    assert_eq!(reply["userSid"], "u-9");
    assert_eq!(reply["data"]["attacks"]["total"], 4);
    assert_eq!(reply["data"]["attacks"]["today"], 0);
    assert_eq!(reply["data"]["bans"]["total"], 1);
    assert_eq!(reply["data"]["bans"]["today"], 1);
}

#[tokio::test]
async fn remote_profiles_are_stored_and_loaded() {
    let h = harness(100);
    let profiles = json!({
        "ftpd": {
            "logFile": h.fx.log.display().to_string(),
            "filters": [SSH_FILTER],
            "maxAttempts": 4,
        }
    });

    h.handlers.handle("config", profiles).await.unwrap();

    assert!(h.fx.profiles_dir.join("online.json").exists());
    let profile = h.fx.profiles.get("ftpd").await.unwrap();
    assert_eq!(profile.origin, ProfileOrigin::Remote);
    assert_eq!(profile.threshold, 4);
    assert_eq!(profile.scan_window, ProfileDefaults::default().scan_range);
}

#[tokio::test]
async fn unblock_lifts_ban_and_commits() {
    let h = harness(100);
    seed(&h.fx).await;

    h.handlers
        .handle("unblock_ip", json!("203.0.113.5"))
        .await
        .unwrap();

    assert_eq!(h.fx.store().ban_count().await.unwrap(), 0);
    assert!(!h.fx.store().commit().await.unwrap());
    assert_eq!(
        h.fx.blocker.addresses(BlockAction::Unblock),
        vec![ip("203.0.113.5")]
    );
}

#[tokio::test]
async fn blocklist_is_reconciled_idempotently() {
    let h = harness(100);
    let list = json!(["198.51.100.1", "not-an-ip", "2001:db8::7"]);

    h.handlers.handle("blocklist", list.clone()).await.unwrap();
    let after_first = h.fx.blocker.calls().len();
    h.handlers.handle("blocklist", list).await.unwrap();

    assert_eq!(after_first, 2);
    assert_eq!(h.fx.blocker.calls().len(), after_first);
    assert_eq!(h.fx.store().ban_count().await.unwrap(), 2);

    h.handlers
        .handle("blocklist", json!(["2001:db8::7"]))
        .await
        .unwrap();
    assert_eq!(
        h.fx.blocker.addresses(BlockAction::Unblock),
        vec![ip("198.51.100.1")]
    );
}

#[tokio::test]
async fn restart_command_sets_exit_action() {
    let h = harness(100);

    h.handlers.handle("restart", Value::Null).await.unwrap();

    assert!(!h.lifecycle.is_running());
    assert_eq!(h.lifecycle.exit_action(), ExitAction::Restart);
}

#[tokio::test]
async fn malformed_payloads_are_rejected() {
    let h = harness(100);

    assert!(h.handlers.handle("getBans", json!("oops")).await.is_err());
    assert!(h.handlers.handle("unblock_ip", json!(42)).await.is_err());
    assert!(h.handlers.handle("unblock_ip", json!("999.1.1.1")).await.is_err());
    assert!(h.handlers.handle("blocklist", json!({"a": 1})).await.is_err());
    assert!(h.handlers.handle("config", json!([1, 2])).await.is_err());
    assert!(h.outbox.sent().is_empty());
    // unknown events are ignored
    h.handlers.handle("reboot_now", Value::Null).await.unwrap();
}
