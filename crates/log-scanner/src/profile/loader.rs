//! 프로파일 파일 로더 -- 프로파일 디렉토리의 JSON 파일을 로드합니다.
//!
//! 로컬 `*.json` 파일은 파일 이름 순으로 읽어 같은 이름의 프로파일 키를 누적
//! 병합합니다. 원격 파일(`online.json`)의 프로파일은 같은 이름의 로컬 프로파일을
//! 통째로 대체합니다. 개별 파일이나 프로파일의 실패는 경고 로그를 남기고 건너뜁니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ScanError;

use super::{Profile, ProfileDefaults, ProfileMap, ProfileOrigin};

/// 원격 제어 서버가 보낸 프로파일을 저장하는 파일 이름
pub const REMOTE_PROFILE_FILE: &str = "online.json";

/// 프로파일 파일 최대 크기
const MAX_PROFILE_FILE_SIZE: u64 = 4 * 1024 * 1024; // 4MB

/// 파일 하나에 담긴 `(이름, 설정 객체)` 목록
pub type ProfileDocument = Vec<(String, Map<String, Value>)>;

/// 프로파일 파일 로더
pub struct ProfileLoader;

impl ProfileLoader {
    /// 디렉토리의 모든 프로파일을 로드합니다.
    ///
    /// 디렉토리가 없으면 만들고 빈 결과를 반환합니다.
    ///
    /// # Errors
    /// - 디렉토리를 만들거나 읽을 수 없는 경우
    pub async fn load_directory(
        dir: impl AsRef<Path>,
        defaults: ProfileDefaults,
    ) -> Result<ProfileMap, ScanError> {
        let dir = dir.as_ref();

        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ScanError::ProfileLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to create directory: {e}"),
                })?;
            tracing::info!(dir = %dir.display(), "created empty profile directory");
            return Ok(ProfileMap::new());
        }

        let (local_files, remote_file) = Self::list_files(dir).await?;

        // 로컬 프로파일: 기본값 위에 파일 순서대로 키를 누적
        let mut merged: BTreeMap<String, (Map<String, Value>, ProfileOrigin)> = BTreeMap::new();
        for path in &local_files {
            let Some(document) = Self::read_document(path).await else {
                continue;
            };
            for (name, settings) in document {
                let (entry, _) = merged
                    .entry(name)
                    .or_insert_with(|| (defaults.to_settings(), ProfileOrigin::Local));
                entry.extend(settings);
            }
        }

        // 원격 프로파일: 같은 이름을 통째로 대체
        if let Some(path) = &remote_file {
            for (name, settings) in Self::read_document(path).await.unwrap_or_default() {
                let mut base = defaults.to_settings();
                base.extend(settings);
                merged.insert(name, (base, ProfileOrigin::Remote));
            }
        }

        let mut profiles = ProfileMap::new();
        for (name, (settings, origin)) in merged {
            match Profile::from_settings(&name, settings, origin) {
                Ok(profile) => {
                    profiles.insert(name, Arc::new(profile));
                }
                Err(e) => {
                    tracing::warn!(
                        profile = %name,
                        error = %e,
                        "invalid profile, skipping"
                    );
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            count = profiles.len(),
            local_files = local_files.len(),
            remote = remote_file.is_some(),
            "loaded profiles"
        );

        Ok(profiles)
    }

    /// 원격 프로파일 문서를 `online.json`으로 저장합니다.
    pub async fn write_remote(dir: impl AsRef<Path>, profiles: &Value) -> Result<(), ScanError> {
        let dir = dir.as_ref();
        let path = dir.join(REMOTE_PROFILE_FILE);

        if !profiles.is_object() {
            return Err(ScanError::ProfileLoad {
                path: path.display().to_string(),
                reason: "remote profiles must be a JSON object".to_owned(),
            });
        }

        let body = serde_json::to_string_pretty(profiles).map_err(|e| ScanError::ProfileLoad {
            path: path.display().to_string(),
            reason: format!("failed to serialize: {e}"),
        })?;

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, body).await?;
        Ok(())
    }

    /// `.json` 파일 목록을 파일 이름 순으로 (로컬, 원격)으로 나눕니다.
    async fn list_files(dir: &Path) -> Result<(Vec<PathBuf>, Option<PathBuf>), ScanError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| ScanError::ProfileLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut local = Vec::new();
        let mut remote = None;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ScanError::ProfileLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory entry: {e}"),
            })?
        {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            if path.file_name().is_some_and(|n| n == REMOTE_PROFILE_FILE) {
                remote = Some(path);
            } else {
                local.push(path);
            }
        }

        local.sort();
        Ok((local, remote))
    }

    /// 파일을 `이름 → 설정 객체` 문서로 읽습니다. 실패하면 경고 후 `None`.
    async fn read_document(path: &Path) -> Option<ProfileDocument> {
        match Self::parse_file(path).await {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "invalid profile file, skipping"
                );
                None
            }
        }
    }

    async fn parse_file(path: &Path) -> Result<ProfileDocument, ScanError> {
        let load_err = |reason: String| ScanError::ProfileLoad {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_PROFILE_FILE_SIZE {
            return Err(load_err(format!(
                "file too large: {} bytes (max: {MAX_PROFILE_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(format!("failed to read file: {e}")))?;

        Self::parse_document(&content).map_err(load_err)
    }

    /// JSON 문서를 파싱합니다. 객체가 아닌 프로파일 항목은 경고 후 제외합니다.
    pub fn parse_document(content: &str) -> Result<ProfileDocument, String> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| format!("JSON parse error: {e}"))?;

        let Value::Object(document) = value else {
            return Err("top level must be an object of profiles".to_owned());
        };

        Ok(document
            .into_iter()
            .filter_map(|(name, settings)| match settings {
                Value::Object(map) => Some((name, map)),
                _ => {
                    tracing::warn!(profile = %name, "profile entry is not an object, skipping");
                    None
                }
            })
            .collect())
    }
}
