#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: `%NAME%` 템플릿 규칙 컴파일 및 줄 매칭
//! - [`scanner`]: 로테이션/잘림에 강한 증분 로그 스캐너
//! - [`offender`]: 전방 슬라이딩 윈도우 상습 공격자 판별
//! - [`profile`]: 프로파일 로딩과 공유 프로파일 테이블
//! - [`error`]: 도메인 에러 타입

pub mod error;
pub mod offender;
pub mod profile;
pub mod rule;
pub mod scanner;

// --- 주요 타입 re-export ---

// 에러
pub use error::ScanError;

// 규칙
pub use rule::{Rule, RuleMatch};

// 스캐너
pub use scanner::{AttacksByAddress, LogScanner, ScanCursor, TailFingerprint, in_line_order};

// 판별
pub use offender::classify;

// 프로파일
pub use profile::{
    Profile, ProfileDefaults, ProfileLoader, ProfileMap, ProfileOrigin, ProfileTable,
};
