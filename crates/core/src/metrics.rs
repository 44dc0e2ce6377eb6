//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `warden_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로파일 레이블 키
pub const LABEL_PROFILE: &str = "profile";

/// 차단기 동작 레이블 키 (block, unblock, init)
pub const LABEL_ACTION: &str = "action";

/// 원격 이벤트 이름 레이블 키
pub const LABEL_EVENT: &str = "event";

// ─── 스캐너 메트릭 ────────────────────────────────────────────────

/// 완료된 스캔 사이클 수 (counter)
pub const SCAN_CYCLES_TOTAL: &str = "warden_scan_cycles_total";

/// 스캔 사이클 소요 시간 (histogram, 초)
pub const SCAN_CYCLE_DURATION_SECONDS: &str = "warden_scan_cycle_duration_seconds";

/// 전체 재스캔 횟수 (counter, label: profile)
pub const SCAN_FULL_RESCANS_TOTAL: &str = "warden_scan_full_rescans_total";

/// 새로 기록된 공격 수 (counter, label: profile)
pub const ATTACKS_RECORDED_TOTAL: &str = "warden_attacks_recorded_total";

// ─── 차단 메트릭 ──────────────────────────────────────────────────

/// 적용된 차단 수 (counter)
pub const BANS_APPLIED_TOTAL: &str = "warden_bans_applied_total";

/// 해제된 차단 수 (counter)
pub const UNBANS_TOTAL: &str = "warden_unbans_total";

/// 외부 차단기 실패 수 (counter, label: action)
pub const BLOCKER_FAILURES_TOTAL: &str = "warden_blocker_failures_total";

/// 현재 유효한 차단 수 (gauge)
pub const ACTIVE_BANS: &str = "warden_active_bans";

// ─── 원격 채널 메트릭 ─────────────────────────────────────────────

/// 수신한 원격 이벤트 수 (counter, label: event)
pub const REMOTE_EVENTS_TOTAL: &str = "warden_remote_events_total";

/// 재연결 시도 수 (counter)
pub const REMOTE_RECONNECTS_TOTAL: &str = "warden_remote_reconnects_total";

/// 큐가 가득 차서 버려진 이벤트 수 (counter, label: event)
pub const REMOTE_EVENTS_DROPPED_TOTAL: &str = "warden_remote_events_dropped_total";

// ─── 데몬 메트릭 ──────────────────────────────────────────────────

/// 빌드 정보 (gauge, label: version)
pub const DAEMON_BUILD_INFO: &str = "warden_build_info";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(SCAN_CYCLES_TOTAL, "Number of completed scan cycles");
    describe_histogram!(
        SCAN_CYCLE_DURATION_SECONDS,
        "Wall-clock duration of one scan cycle in seconds"
    );
    describe_counter!(
        SCAN_FULL_RESCANS_TOTAL,
        "Full rescans forced by truncation, rotation or in-place edits"
    );
    describe_counter!(
        ATTACKS_RECORDED_TOTAL,
        "Attack rows newly inserted into the store"
    );

    describe_counter!(BANS_APPLIED_TOTAL, "Addresses blocked by the external blocker");
    describe_counter!(UNBANS_TOTAL, "Addresses unblocked by the external blocker");
    describe_counter!(
        BLOCKER_FAILURES_TOTAL,
        "External blocker invocations that failed or timed out"
    );
    describe_gauge!(ACTIVE_BANS, "Ban rows currently present in the store");

    describe_counter!(REMOTE_EVENTS_TOTAL, "Events received from the remote controller");
    describe_counter!(
        REMOTE_RECONNECTS_TOTAL,
        "Reconnect attempts of the remote channel"
    );
    describe_counter!(
        REMOTE_EVENTS_DROPPED_TOTAL,
        "Remote events dropped because a listener queue was full"
    );

    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}
