//! Allow-listed addresses are never banned, however loud they are.

use warden_ban_guard::BlockAction;

use crate::helpers::fixture::{Fixture, now, ssh_line};

#[tokio::test]
async fn allow_listed_address_never_reaches_bans_table() {
    let fx = Fixture::new(&["198.51.100.9"]);
    fx.ssh_profile(3, 120).await;
    for second in 0..10 {
        fx.append(&ssh_line(&format!("08:00:{second:02}"), "198.51.100.9"));
    }

    let report = fx.scheduler(None).run_cycle_at(now()).await.unwrap();

    // attacks are still on record
    assert_eq!(report.attacks_recorded, 10);
    assert_eq!(report.bans_applied, 0);
    assert_eq!(fx.store().ban_count().await.unwrap(), 0);
    assert!(fx.blocker.addresses(BlockAction::Block).is_empty());
}

#[tokio::test]
async fn loopback_is_always_protected() {
    let fx = Fixture::new(&[]);
    fx.ssh_profile(2, 120).await;
    for second in 0..4 {
        fx.append(&ssh_line(&format!("08:00:{second:02}"), "127.0.0.1"));
    }

    let report = fx.scheduler(None).run_cycle_at(now()).await.unwrap();

    assert_eq!(report.bans_applied, 0);
    assert_eq!(fx.store().ban_count().await.unwrap(), 0);
}
