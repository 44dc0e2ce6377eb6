//! 로그 스캐너 에러 타입
//!
//! [`ScanError`]는 템플릿 컴파일, 프로파일 로딩, 로그 파일 읽기에서 발생하는
//! 에러를 표현합니다. `From<ScanError> for WardenError` 변환이 구현되어 있습니다.

use warden_core::error::{DetectionError, WardenError};

/// 로그 스캐너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 규칙 템플릿 컴파일 실패
    #[error("invalid rule template '{template}': {reason}")]
    Template {
        /// 원본 템플릿
        template: String,
        /// 실패 사유
        reason: String,
    },

    /// 프로파일 파일 로딩 실패
    #[error("profile load error: {path}: {reason}")]
    ProfileLoad {
        /// 프로파일 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 프로파일 정의가 유효하지 않음
    #[error("invalid profile '{profile}': {reason}")]
    ProfileInvalid {
        /// 프로파일 이름
        profile: String,
        /// 실패 사유
        reason: String,
    },

    /// 감시 대상 로그 파일이 없음 (일시적, 다음 사이클에 재시도)
    #[error("log file not found: {path}")]
    LogFileMissing {
        /// 로그 파일 경로
        path: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<ScanError> for WardenError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Template { .. } | ScanError::Regex(_) => {
                WardenError::Detection(DetectionError::Rule(err.to_string()))
            }
            ScanError::ProfileLoad { .. } | ScanError::ProfileInvalid { .. } => {
                WardenError::Detection(DetectionError::Profile(err.to_string()))
            }
            ScanError::LogFileMissing { .. } => {
                WardenError::Detection(DetectionError::Scan(err.to_string()))
            }
            ScanError::Io(e) => WardenError::Io(e),
        }
    }
}
