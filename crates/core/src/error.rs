//! 에러 타입 -- 도메인별 에러 정의
//!
//! 각 크레이트는 자체 도메인 에러를 정의하고 `From<DomainError> for WardenError`를
//! 구현하여 상위 레이어에서 `?`로 전파합니다.

/// Warden 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 로그 스캔/탐지 에러
    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    /// 차단 집행 에러
    #[error("enforcement error: {0}")]
    Enforcement(#[from] EnforcementError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 원격 채널 에러
    #[error("remote channel error: {0}")]
    Remote(#[from] RemoteChannelError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 탐지 에러
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// 규칙 템플릿 에러
    #[error("rule error: {0}")]
    Rule(String),

    /// 프로파일 에러
    #[error("profile error: {0}")]
    Profile(String),

    /// 로그 스캔 실패
    #[error("scan failed: {0}")]
    Scan(String),
}

/// 차단 집행 에러
#[derive(Debug, thiserror::Error)]
pub enum EnforcementError {
    /// 외부 차단기 실행 실패
    #[error("blocker failed: {0}")]
    Blocker(String),

    /// 유효하지 않은 주소
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 요청 시간 초과
    #[error("request timed out after {0}s")]
    Timeout(u64),
}

/// 원격 채널 에러
#[derive(Debug, thiserror::Error)]
pub enum RemoteChannelError {
    /// 일시적 전송 실패 (재연결 대상)
    #[error("transport failure: {0}")]
    Transport(String),

    /// 호환되지 않는 서버 응답
    #[error("incompatible endpoint: {0}")]
    Protocol(String),
}
