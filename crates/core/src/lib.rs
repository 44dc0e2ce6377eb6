#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    ConfigError, DetectionError, EnforcementError, RemoteChannelError, StorageError,
    WardenError,
};

// 설정
pub use config::WardenConfig;

// 수명주기
pub use lifecycle::{ExitAction, Lifecycle, RESTART_EXIT_CODE};

// 도메인 타입
pub use types::{AttackRecord, AttackVars, BanRecord, Statistics, StoredAttack, Tally};
