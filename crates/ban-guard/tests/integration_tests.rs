//! 통합 테스트 -- 차단 조정자와 파일 기반 저장소의 전체 흐름 검증
//!
//! 실제 SQLite 파일과 기록용 차단기를 사용하여, 차단 행과 외부 차단 상태의
//! 일치, 재시작 후 재적용, 연합 목록 조정을 확인합니다.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use warden_ban_guard::{BanCoordinator, BanError, StoreHandle, StoreOptions};

// Recording blocker for integration tests
mod mock {
    use std::collections::HashSet;
    use std::net::IpAddr;
    use std::sync::Mutex;

    use warden_ban_guard::{BanError, BlockAction, Blocker};

    #[derive(Default)]
    pub struct RecordingBlocker {
        calls: Mutex<Vec<(BlockAction, Option<IpAddr>)>>,
        failing: Mutex<HashSet<IpAddr>>,
    }

    impl RecordingBlocker {
        pub fn fail_for(&self, address: IpAddr) {
            self.failing.lock().unwrap().insert(address);
        }

        pub fn calls(&self) -> Vec<(BlockAction, Option<IpAddr>)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, action: BlockAction, address: Option<IpAddr>) -> Result<(), BanError> {
            self.calls.lock().unwrap().push((action, address));
            match address {
                Some(ip) if self.failing.lock().unwrap().contains(&ip) => {
                    Err(BanError::Blocker {
                        action: action.as_str(),
                        address: ip.to_string(),
                        reason: "exit status: 1".to_owned(),
                    })
                }
                _ => Ok(()),
            }
        }
    }

    impl Blocker for RecordingBlocker {
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
}

use mock::RecordingBlocker;
use warden_ban_guard::BlockAction;

fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid ip")
}

fn options() -> StoreOptions {
    StoreOptions {
        request_timeout: Duration::from_secs(5),
        queue_capacity: 16,
    }
}

/// 커밋된 차단은 재시작 후 차단기에 다시 적용됨
#[tokio::test]
async fn committed_bans_survive_restart_and_are_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("warden.db");

    {
        let store = StoreHandle::open(&db, options()).unwrap();
        let coordinator =
            BanCoordinator::new(Arc::new(RecordingBlocker::default()), store, Vec::<IpAddr>::new());
        assert!(coordinator.block(ip("203.0.113.10")).await.unwrap());
        assert!(coordinator.block(ip("203.0.113.11")).await.unwrap());
        coordinator.store().commit().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 재부팅 후: 차단기 상태는 비어 있고 저장소가 기준
    let store = StoreHandle::open(&db, options()).unwrap();
    let blocker = Arc::new(RecordingBlocker::default());
    let coordinator = BanCoordinator::new(Arc::clone(&blocker), store, Vec::<IpAddr>::new());

    coordinator.init().await.unwrap();
    assert_eq!(coordinator.block_all_banned().await.unwrap(), 2);

    let calls = blocker.calls();
    assert_eq!(calls[0], (BlockAction::Init, None));
    assert_eq!(
        calls[1..],
        [
            (BlockAction::Block, Some(ip("203.0.113.10"))),
            (BlockAction::Block, Some(ip("203.0.113.11"))),
        ]
    );
}

/// 차단기가 실패하면 저장소에 행이 남지 않고, 다음 시도에서 다시 차단을 시도함
#[tokio::test]
async fn blocker_failure_leaves_no_ban_row() {
    let store = StoreHandle::open_in_memory(options()).unwrap();
    let blocker = Arc::new(RecordingBlocker::default());
    let coordinator = BanCoordinator::new(Arc::clone(&blocker), store, Vec::<IpAddr>::new());

    let target = ip("198.51.100.40");
    blocker.fail_for(target);

    let err = coordinator.block(target).await.unwrap_err();
    assert!(matches!(err, BanError::Blocker { .. }));
    assert_eq!(coordinator.store().ban_count().await.unwrap(), 0);

    // 다음 사이클에서도 같은 주소로 차단기를 다시 호출
    let _ = coordinator.block(target).await;
    assert_eq!(blocker.calls().len(), 2);
}

/// 허용 목록 주소는 어떤 경로로도 차단되지 않음
#[tokio::test]
async fn allow_listed_address_is_never_banned() {
    let store = StoreHandle::open_in_memory(options()).unwrap();
    let blocker = Arc::new(RecordingBlocker::default());
    let trusted = ip("192.0.2.200");
    let coordinator = BanCoordinator::new(Arc::clone(&blocker), store, vec![trusted]);

    for _ in 0..3 {
        assert!(!coordinator.block(trusted).await.unwrap());
    }
    let report = coordinator.reconcile(vec![trusted]).await.unwrap();

    assert!(report.is_noop());
    assert!(blocker.calls().is_empty());
    assert_eq!(coordinator.store().ban_count().await.unwrap(), 0);
}

/// 연합 목록: 같은 목록 재적용은 외부 호출 0회, 변경분만 적용
#[tokio::test]
async fn federation_reconcile_is_idempotent_and_durable() {
    let dir = tempfile::tempdir().unwrap();
    let store = StoreHandle::open(dir.path().join("warden.db"), options()).unwrap();
    let blocker = Arc::new(RecordingBlocker::default());
    let coordinator = BanCoordinator::new(Arc::clone(&blocker), store, Vec::<IpAddr>::new());

    let set = vec![ip("198.51.100.1"), ip("198.51.100.2"), ip("2001:db8::1")];
    let first = coordinator.reconcile(set.clone()).await.unwrap();
    assert_eq!(first.blocked.len(), 3);
    let after_first = blocker.calls().len();

    let second = coordinator.reconcile(set).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(blocker.calls().len(), after_first);

    // reconcile은 스스로 커밋하므로 추가 커밋할 것이 없음
    assert!(!coordinator.store().commit().await.unwrap());

    let shrink = coordinator
        .reconcile(vec![ip("2001:db8::1")])
        .await
        .unwrap();
    assert_eq!(shrink.unblocked, vec![ip("198.51.100.1"), ip("198.51.100.2")]);
    assert_eq!(
        coordinator.store().banned_addresses().await.unwrap(),
        vec!["2001:db8::1"]
    );
}

/// 만료 처리는 외부 해제가 성공한 주소만 저장소에서 지움
#[tokio::test]
async fn expiry_respects_blocker_result() {
    let store = StoreHandle::open_in_memory(options()).unwrap();
    let blocker = Arc::new(RecordingBlocker::default());
    let coordinator = BanCoordinator::new(Arc::clone(&blocker), store, Vec::<IpAddr>::new());

    coordinator.store().insert_ban("203.0.113.50", 10).await.unwrap();
    coordinator.store().insert_ban("203.0.113.51", 10).await.unwrap();
    blocker.fail_for(ip("203.0.113.51"));

    let removed = coordinator
        .expire_bans(Duration::from_secs(60), 1_000)
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(
        coordinator.store().banned_addresses().await.unwrap(),
        vec!["203.0.113.51"]
    );
}
