//! 차단 조정자 -- 저장소와 외부 차단기의 상태를 일치시킵니다.
//!
//! 차단 행은 외부 차단기가 성공을 확인한 뒤에만 기록되고, 해제 역시 차단기 성공 후에만
//! 삭제됩니다. 따라서 `bans` 테이블에 있는 주소는 곧 차단기가 막고 있는 주소입니다.
//!
//! 루프백 주소와 허용 목록(`skip_ips`)의 주소는 외부 차단기로 전달되지 않습니다.
//!
//! `block`/`unblock`은 커밋하지 않습니다. 호출 측이 여러 쓰기를 모아 한 번에
//! [`StoreHandle::commit`]을 호출합니다. [`reconcile`](BanCoordinator::reconcile)만
//! 스스로 한 번 커밋합니다.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use warden_core::metrics as m;

use crate::blocker::{BlockAction, Blocker};
use crate::error::BanError;
use crate::store::StoreHandle;

/// 현재 유닉스 시각 (초)
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// 문자열 주소를 파싱합니다.
pub fn parse_address(address: &str) -> Result<IpAddr, BanError> {
    address
        .trim()
        .parse()
        .map_err(|_| BanError::InvalidAddress(address.to_owned()))
}

/// 연합 차단 목록 조정 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// 새로 차단된 주소
    pub blocked: Vec<IpAddr>,
    /// 해제된 주소
    pub unblocked: Vec<IpAddr>,
    /// 차단기 실패 등으로 적용되지 않은 주소
    pub failed: Vec<IpAddr>,
}

impl ReconcileReport {
    /// 외부 차단기 호출 없이 끝났는지 여부
    pub fn is_noop(&self) -> bool {
        self.blocked.is_empty() && self.unblocked.is_empty() && self.failed.is_empty()
    }
}

/// 차단 조정자
pub struct BanCoordinator<B: Blocker> {
    blocker: Arc<B>,
    store: StoreHandle,
    allow_list: HashSet<IpAddr>,
    /// 마지막으로 적용한 연합 차단 목록
    federation: Mutex<HashSet<IpAddr>>,
}

impl<B: Blocker> BanCoordinator<B> {
    pub fn new(
        blocker: Arc<B>,
        store: StoreHandle,
        allow_list: impl IntoIterator<Item = IpAddr>,
    ) -> Self {
        Self {
            blocker,
            store,
            allow_list: allow_list.into_iter().collect(),
            federation: Mutex::new(HashSet::new()),
        }
    }

    /// 저장소 핸들
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// 차단기 (테스트 검증용)
    pub fn blocker(&self) -> &Arc<B> {
        &self.blocker
    }

    /// 절대 차단하지 않는 주소인지 확인합니다.
    pub fn is_protected(&self, address: IpAddr) -> bool {
        address.is_loopback() || self.allow_list.contains(&address)
    }

    /// 외부 차단기를 초기화합니다.
    pub async fn init(&self) -> Result<(), BanError> {
        self.blocker.init().await.inspect_err(|e| {
            record_failure(BlockAction::Init);
            tracing::error!(error = %e, "blocker init failed");
        })
    }

    /// 주소를 차단합니다. 새 차단 행을 기록했으면 `true`.
    ///
    /// 보호 주소이거나 이미 차단된 주소는 차단기를 부르지 않고 `false`를 반환합니다.
    pub async fn block(&self, address: IpAddr) -> Result<bool, BanError> {
        if self.is_protected(address) {
            tracing::debug!(address = %address, "address is allow-listed, not blocking");
            return Ok(false);
        }

        let key = address.to_string();
        if self.store.is_banned(&key).await? {
            return Ok(false);
        }

        if let Err(e) = self.blocker.block(address).await {
            record_failure(BlockAction::Block);
            tracing::warn!(address = %address, error = %e, "blocker refused block");
            return Err(e);
        }

        self.store.insert_ban(&key, unix_now()).await?;
        metrics::counter!(m::BANS_APPLIED_TOTAL).increment(1);
        tracing::info!(address = %address, "address blocked");
        Ok(true)
    }

    /// 주소의 차단을 해제합니다. 차단 행을 지웠으면 `true`.
    pub async fn unblock(&self, address: IpAddr) -> Result<bool, BanError> {
        if self.is_protected(address) {
            return Ok(false);
        }

        let key = address.to_string();
        if !self.store.is_banned(&key).await? {
            return Ok(false);
        }

        if let Err(e) = self.blocker.unblock(address).await {
            record_failure(BlockAction::Unblock);
            tracing::warn!(address = %address, error = %e, "blocker refused unblock");
            return Err(e);
        }

        self.store.delete_ban(&key).await?;
        metrics::counter!(m::UNBANS_TOTAL).increment(1);
        tracing::info!(address = %address, "address unblocked");
        Ok(true)
    }

    /// 저장된 모든 차단을 외부 차단기에 다시 적용합니다 (시작 시).
    ///
    /// 저장소가 기준이며 저장소는 바꾸지 않습니다. 실패한 주소는 로그만 남깁니다.
    pub async fn block_all_banned(&self) -> Result<usize, BanError> {
        let mut applied = 0;

        for key in self.store.banned_addresses().await? {
            let address = match parse_address(&key) {
                Ok(address) => address,
                Err(e) => {
                    tracing::warn!(address = %key, error = %e, "skipping unparsable ban row");
                    continue;
                }
            };
            if self.is_protected(address) {
                continue;
            }
            match self.blocker.block(address).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    record_failure(BlockAction::Block);
                    tracing::warn!(address = %address, error = %e, "failed to restore ban");
                }
            }
        }

        tracing::info!(restored = applied, "persisted bans replayed");
        Ok(applied)
    }

    /// 연합 차단 목록을 적용합니다.
    ///
    /// 이전 목록과의 차이만 처리합니다: `old - new`를 해제하고 `new - old`를 차단한 뒤
    /// 새 목록을 기억합니다. 같은 목록을 두 번 적용하면 두 번째에는 아무 호출도 없습니다.
    /// 쓰기가 있었으면 한 번 커밋합니다.
    pub async fn reconcile(
        &self,
        new_set: impl IntoIterator<Item = IpAddr>,
    ) -> Result<ReconcileReport, BanError> {
        let new_set: HashSet<IpAddr> = new_set.into_iter().collect();
        let mut current = self.federation.lock().await;

        let mut to_unblock: Vec<IpAddr> = current.difference(&new_set).copied().collect();
        let mut to_block: Vec<IpAddr> = new_set.difference(&current).copied().collect();
        to_unblock.sort();
        to_block.sort();

        let mut report = ReconcileReport::default();

        for address in to_unblock {
            match self.unblock(address).await {
                Ok(true) => report.unblocked.push(address),
                Ok(false) => {}
                Err(BanError::Store(e)) => return Err(e.into()),
                Err(_) => report.failed.push(address),
            }
        }
        for address in to_block {
            match self.block(address).await {
                Ok(true) => report.blocked.push(address),
                Ok(false) => {}
                Err(BanError::Store(e)) => return Err(e.into()),
                Err(_) => report.failed.push(address),
            }
        }

        *current = new_set;
        drop(current);

        if !report.blocked.is_empty() || !report.unblocked.is_empty() {
            self.store.commit().await?;
        }

        tracing::info!(
            blocked = report.blocked.len(),
            unblocked = report.unblocked.len(),
            failed = report.failed.len(),
            "federation blocklist reconciled"
        );
        Ok(report)
    }

    /// `ttl`보다 오래된 차단을 해제합니다. 해제한 수를 반환합니다 (커밋은 호출 측).
    pub async fn expire_bans(&self, ttl: Duration, now: i64) -> Result<usize, BanError> {
        let cutoff = now.saturating_sub(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        let mut removed = 0;

        for key in self.store.bans_older_than(cutoff).await? {
            let Ok(address) = parse_address(&key) else {
                // 차단기에 전달된 적 없는 행이므로 바로 정리
                removed += self.store.delete_ban(&key).await?;
                continue;
            };
            match self.unblock(address).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(BanError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "ban expiry deferred");
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, cutoff, "expired bans released");
        }
        Ok(removed)
    }

    /// 현재 차단 수를 조회하고 게이지를 갱신합니다.
    pub async fn refresh_active_bans(&self) -> Result<i64, BanError> {
        let count = self.store.ban_count().await?;
        metrics::gauge!(m::ACTIVE_BANS).set(count as f64);
        Ok(count)
    }
}

fn record_failure(action: BlockAction) {
    metrics::counter!(m::BLOCKER_FAILURES_TOTAL, m::LABEL_ACTION => action.as_str()).increment(1);
}
