//! 프로세스 수명주기 -- 전역 실행 플래그와 종료 동작
//!
//! [`Lifecycle`]은 시작 시 한 번 만들어져 스캔 루프, 원격 채널, 오케스트레이터에
//! 복제되어 전달됩니다. 종료 요청은 모든 복제본에서 즉시 관찰됩니다.
//!
//! 재시작은 프로세스 내부에서 수행하지 않습니다. 재시작 요청은
//! [`RESTART_EXIT_CODE`]로 종료하라는 표시일 뿐이며, 이 코드를 보고 다시
//! 띄우는 것은 외부 감독 프로세스의 몫입니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 감독 프로세스에게 재시작을 요청하는 종료 코드
pub const RESTART_EXIT_CODE: i32 = 42;

/// 대기 중 종료 신호를 확인하는 최대 간격
pub const SLEEP_INCREMENT: Duration = Duration::from_secs(1);

/// 프로세스 종료 시 수행할 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// 정상 종료
    Shutdown,
    /// 재시작 코드로 종료
    Restart,
}

impl ExitAction {
    /// 프로세스 종료 코드
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Shutdown => 0,
            Self::Restart => RESTART_EXIT_CODE,
        }
    }
}

/// 전역 실행 플래그
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    token: CancellationToken,
    restart: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 종료가 요청되지 않았으면 `true`
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// 내부 취소 토큰 (select! 용)
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 정상 종료를 요청합니다.
    pub fn request_shutdown(&self) {
        tracing::info!("shutdown requested");
        self.token.cancel();
    }

    /// 재시작 종료를 요청합니다.
    pub fn request_restart(&self) {
        tracing::info!(exit_code = RESTART_EXIT_CODE, "restart requested");
        self.restart.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    /// 요청된 종료 동작
    pub fn exit_action(&self) -> ExitAction {
        if self.restart.load(Ordering::SeqCst) {
            ExitAction::Restart
        } else {
            ExitAction::Shutdown
        }
    }

    /// 종료 요청이 올 때까지 기다립니다.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// `duration` 동안 잠들되 [`SLEEP_INCREMENT`] 단위로 종료 여부를 확인합니다.
    ///
    /// 끝까지 잤으면 `true`, 종료 요청으로 깨어났으면 `false`를 반환합니다.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let step = (deadline - now).min(SLEEP_INCREMENT);
            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = tokio::time::sleep(step) => {}
            }
        }
    }
}
