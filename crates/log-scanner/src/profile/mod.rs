//! 프로파일 -- 이름 붙은 로그 스캔 설정
//!
//! 프로파일은 로그 파일, 규칙 목록, 탐지 윈도우, 임계치를 가집니다.
//! 설정 기본값 위에 프로파일별 값을 얹은 결과가 유효 설정(`settings`)입니다.
//!
//! # 파일 형식
//! ```json
//! {
//!   "sshd": {
//!     "logFile": "/var/log/auth.log",
//!     "filters": ["Failed password for %USER% from %IP% port %PORT% ssh2"],
//!     "scanRange": 120,
//!     "maxAttempts": 3,
//!     "service": "ssh"
//!   }
//! }
//! ```

pub mod loader;

pub use loader::{ProfileLoader, REMOTE_PROFILE_FILE};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::ScanError;
use crate::rule::{self, Rule};

/// 프로파일 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileOrigin {
    /// 로컬 프로파일 파일
    Local,
    /// 원격 제어 서버가 보낸 프로파일
    Remote,
}

/// 프로파일 기본값
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileDefaults {
    /// 탐지 윈도우 (초)
    pub scan_range: u64,
    /// 공격 임계치
    pub max_attempts: usize,
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            scan_range: 120,
            max_attempts: 3,
        }
    }
}

impl ProfileDefaults {
    /// 병합의 출발점이 되는 설정 맵
    pub fn to_settings(self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("scanRange".to_owned(), Value::from(self.scan_range));
        map.insert("maxAttempts".to_owned(), Value::from(self.max_attempts));
        map
    }
}

/// 유효 설정에서 읽는 필드
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSpec {
    log_file: PathBuf,
    #[serde(default)]
    filters: Vec<String>,
    scan_range: u64,
    max_attempts: usize,
    #[serde(default)]
    service: Option<String>,
}

/// 컴파일된 프로파일
#[derive(Debug)]
pub struct Profile {
    /// 프로파일 이름
    pub name: String,
    /// 감시할 로그 파일
    pub log_file: PathBuf,
    /// 규칙 (적용 순서)
    pub rules: Vec<Rule>,
    /// 탐지 윈도우 (초)
    pub scan_window: u64,
    /// 상습 공격자 임계치
    pub threshold: usize,
    /// 병합된 유효 설정
    pub settings: Map<String, Value>,
    /// 출처
    pub origin: ProfileOrigin,
}

impl Profile {
    /// 병합된 설정에서 프로파일을 만들고 규칙을 컴파일합니다.
    pub fn from_settings(
        name: &str,
        settings: Map<String, Value>,
        origin: ProfileOrigin,
    ) -> Result<Self, ScanError> {
        let spec: ProfileSpec = serde_json::from_value(Value::Object(settings.clone()))
            .map_err(|e| ScanError::ProfileInvalid {
                profile: name.to_owned(),
                reason: e.to_string(),
            })?;

        if spec.log_file.as_os_str().is_empty() {
            return Err(ScanError::ProfileInvalid {
                profile: name.to_owned(),
                reason: "logFile must not be empty".to_owned(),
            });
        }

        let rules = rule::compile_all(&spec.filters, spec.service.as_deref())?;

        Ok(Self {
            name: name.to_owned(),
            log_file: spec.log_file,
            rules,
            scan_window: spec.scan_range,
            threshold: spec.max_attempts,
            settings,
            origin,
        })
    }
}

/// 이름 → 프로파일
pub type ProfileMap = BTreeMap<String, Arc<Profile>>;

/// 공유 프로파일 테이블
///
/// 스캔 스케줄러는 [`snapshot`](Self::snapshot)으로 읽고, 원격 설정 핸들러는
/// [`store_remote`](Self::store_remote)로 교체합니다.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    inner: Arc<RwLock<ProfileMap>>,
}

impl ProfileTable {
    pub fn new(profiles: ProfileMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(profiles)),
        }
    }

    /// 일관된 시점의 프로파일 목록 (이름 순)
    pub async fn snapshot(&self) -> Vec<Arc<Profile>> {
        self.inner.read().await.values().cloned().collect()
    }

    /// 이름으로 조회
    pub async fn get(&self, name: &str) -> Option<Arc<Profile>> {
        self.inner.read().await.get(name).cloned()
    }

    /// 등록된 프로파일 수
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// 비어 있는지 여부
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// 테이블 전체를 교체합니다.
    pub async fn replace(&self, profiles: ProfileMap) {
        *self.inner.write().await = profiles;
    }

    /// 디렉토리에서 다시 로드합니다.
    pub async fn reload(
        &self,
        dir: impl AsRef<Path>,
        defaults: ProfileDefaults,
    ) -> Result<usize, ScanError> {
        let profiles = ProfileLoader::load_directory(dir, defaults).await?;
        let count = profiles.len();
        self.replace(profiles).await;
        Ok(count)
    }

    /// 원격 프로파일을 `online.json`으로 저장하고 테이블을 다시 로드합니다.
    ///
    /// 파일 쓰기와 재로딩은 쓰기 잠금 아래에서 수행되어 스캔 스냅샷과 섞이지 않습니다.
    pub async fn store_remote(
        &self,
        dir: impl AsRef<Path>,
        profiles: &Value,
        defaults: ProfileDefaults,
    ) -> Result<usize, ScanError> {
        let dir = dir.as_ref();
        let mut guard = self.inner.write().await;

        ProfileLoader::write_remote(dir, profiles).await?;
        let loaded = ProfileLoader::load_directory(dir, defaults).await?;
        let count = loaded.len();
        *guard = loaded;

        tracing::info!(
            dir = %dir.display(),
            count,
            "remote profiles stored and reloaded"
        );
        Ok(count)
    }
}
