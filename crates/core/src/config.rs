//! 설정 관리 -- warden.toml 파싱 및 런타임 설정
//!
//! [`WardenConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`WARDEN_SCANNER_SCAN_INTERVAL_SECS=10` 형식)
//! 3. 설정 파일 (`warden.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), warden_core::error::WardenError> {
//! use warden_core::config::WardenConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = WardenConfig::load("warden.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = WardenConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, WardenError};

/// Warden 통합 설정
///
/// `warden.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 스캐너 설정
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// 외부 차단기 설정
    #[serde(default)]
    pub blocker: BlockerConfig,
    /// 저장소 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 원격 제어 채널 설정
    #[serde(default)]
    pub remote: RemoteConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl WardenConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WardenError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, WardenError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WardenError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                WardenError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, WardenError> {
        toml::from_str(toml_str).map_err(|e| {
            WardenError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `WARDEN_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "WARDEN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "WARDEN_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "WARDEN_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "WARDEN_GENERAL_PID_FILE");

        // Scanner
        override_u64(
            &mut self.scanner.scan_interval_secs,
            "WARDEN_SCANNER_SCAN_INTERVAL_SECS",
        );
        override_string(
            &mut self.scanner.profiles_dir,
            "WARDEN_SCANNER_PROFILES_DIR",
        );
        override_u64(
            &mut self.scanner.default_scan_range_secs,
            "WARDEN_SCANNER_DEFAULT_SCAN_RANGE_SECS",
        );
        override_usize(
            &mut self.scanner.default_max_attempts,
            "WARDEN_SCANNER_DEFAULT_MAX_ATTEMPTS",
        );
        override_csv(&mut self.scanner.skip_ips, "WARDEN_SCANNER_SKIP_IPS");
        override_u64(
            &mut self.scanner.unban_after_secs,
            "WARDEN_SCANNER_UNBAN_AFTER_SECS",
        );

        // Blocker
        override_string(&mut self.blocker.command, "WARDEN_BLOCKER_COMMAND");
        override_u64(&mut self.blocker.timeout_secs, "WARDEN_BLOCKER_TIMEOUT_SECS");
        override_bool(
            &mut self.blocker.init_on_start,
            "WARDEN_BLOCKER_INIT_ON_START",
        );

        // Store
        override_string(&mut self.store.path, "WARDEN_STORE_PATH");
        override_u64(
            &mut self.store.request_timeout_secs,
            "WARDEN_STORE_REQUEST_TIMEOUT_SECS",
        );

        // Remote
        override_bool(&mut self.remote.enabled, "WARDEN_REMOTE_ENABLED");
        override_string(&mut self.remote.server_url, "WARDEN_REMOTE_SERVER_URL");
        override_string(&mut self.remote.device_id, "WARDEN_REMOTE_DEVICE_ID");
        override_string(
            &mut self.remote.device_secret,
            "WARDEN_REMOTE_DEVICE_SECRET",
        );
        override_u64(
            &mut self.remote.poll_timeout_secs,
            "WARDEN_REMOTE_POLL_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.remote.max_retry_interval_secs,
            "WARDEN_REMOTE_MAX_RETRY_INTERVAL_SECS",
        );
        override_u64(
            &mut self.remote.reconnect_delay_secs,
            "WARDEN_REMOTE_RECONNECT_DELAY_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "WARDEN_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "WARDEN_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "WARDEN_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), WardenError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.scanner.scan_interval_secs == 0 {
            return Err(invalid(
                "scanner.scan_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.scanner.default_scan_range_secs == 0 {
            return Err(invalid(
                "scanner.default_scan_range_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        // skip_ips는 모두 IP 주소여야 함
        if let Some(bad) = self
            .scanner
            .skip_ips
            .iter()
            .find(|ip| ip.parse::<IpAddr>().is_err())
        {
            return Err(invalid(
                "scanner.skip_ips",
                format!("'{bad}' is not an IP address"),
            ));
        }

        if self.blocker.command.is_empty() {
            return Err(invalid(
                "blocker.command",
                "blocker command must not be empty".to_owned(),
            ));
        }

        if self.store.request_timeout_secs == 0 {
            return Err(invalid(
                "store.request_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.remote.enabled {
            for (field, value) in [
                ("remote.server_url", &self.remote.server_url),
                ("remote.device_id", &self.remote.device_id),
                ("remote.device_secret", &self.remote.device_secret),
            ] {
                if value.is_empty() {
                    return Err(invalid(
                        field,
                        "must not be empty when remote is enabled".to_owned(),
                    ));
                }
            }

            if !(self.remote.server_url.starts_with("http://")
                || self.remote.server_url.starts_with("https://"))
            {
                return Err(invalid(
                    "remote.server_url",
                    "must start with http:// or https://".to_owned(),
                ));
            }

            if self.remote.poll_timeout_secs == 0 {
                return Err(invalid(
                    "remote.poll_timeout_secs",
                    "must be greater than 0".to_owned(),
                ));
            }

            if self.remote.max_retry_interval_secs == 0 {
                return Err(invalid(
                    "remote.max_retry_interval_secs",
                    "must be greater than 0".to_owned(),
                ));
            }

            if self.remote.listener_queue_capacity == 0 {
                return Err(invalid(
                    "remote.listener_queue_capacity",
                    "must be greater than 0".to_owned(),
                ));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must not be 0".to_owned()));
        }

        Ok(())
    }

    /// 실제 사용할 데이터베이스 경로
    ///
    /// `store.path`가 비어 있으면 `<data_dir>/warden.db`를 사용합니다.
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_empty() {
            Path::new(&self.general.data_dir).join("warden.db")
        } else {
            PathBuf::from(&self.store.path)
        }
    }
}

fn invalid(field: &str, reason: String) -> WardenError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/warden".to_owned(),
            pid_file: "/var/run/warden.pid".to_owned(),
        }
    }
}

/// 로그 스캐너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// 스캔 주기 (초)
    pub scan_interval_secs: u64,
    /// 프로파일 디렉토리
    pub profiles_dir: String,
    /// 프로파일 기본 탐지 윈도우 (초)
    pub default_scan_range_secs: u64,
    /// 프로파일 기본 공격 임계치
    pub default_max_attempts: usize,
    /// 절대 차단하지 않을 주소 목록
    pub skip_ips: Vec<String>,
    /// 차단 자동 해제 시간 (초, 0이면 해제하지 않음)
    pub unban_after_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            profiles_dir: "/etc/warden/profiles".to_owned(),
            default_scan_range_secs: 120,
            default_max_attempts: 3,
            skip_ips: Vec::new(),
            unban_after_secs: 0,
        }
    }
}

/// 외부 차단기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockerConfig {
    /// 차단기 실행 파일 경로 (`<command> block <addr>` 형식으로 호출)
    pub command: String,
    /// 호출당 제한 시간 (초)
    pub timeout_secs: u64,
    /// 시작 시 `init` 호출 여부
    pub init_on_start: bool,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            command: "/usr/lib/warden/blocker".to_owned(),
            timeout_secs: 10,
            init_on_start: true,
        }
    }
}

/// 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite 파일 경로 (비어 있으면 data_dir 아래)
    pub path: String,
    /// 요청 응답 대기 제한 (초)
    pub request_timeout_secs: u64,
    /// 요청 큐 용량
    pub queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            request_timeout_secs: 30,
            queue_capacity: 64,
        }
    }
}

/// 원격 제어 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 제어 서버 주소
    pub server_url: String,
    /// 장치 ID
    pub device_id: String,
    /// 장치 공유 비밀값
    pub device_secret: String,
    /// long-poll GET 전송 제한 시간 (초)
    pub poll_timeout_secs: u64,
    /// retry 응답 후 최대 대기 (초)
    pub max_retry_interval_secs: u64,
    /// 연결 끊김 후 재연결 지연 (초)
    pub reconnect_delay_secs: u64,
    /// 리스너별 이벤트 큐 용량
    pub listener_queue_capacity: usize,
    /// 목록 조회 응답 페이지 크기
    pub page_size: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: String::new(),
            device_id: String::new(),
            device_secret: String::new(),
            poll_timeout_secs: 10,
            max_retry_interval_secs: 10,
            reconnect_delay_secs: 30,
            listener_queue_capacity: 32,
            page_size: 100,
        }
    }
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 노출 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9109,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
