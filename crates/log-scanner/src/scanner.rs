//! 증분 로그 스캐너
//!
//! 프로파일마다 하나의 [`LogScanner`]가 로그 파일의 스캔 커서를 유지합니다.
//! 커서는 메모리에만 있으며 프로세스 재시작 시 전체 재스캔으로 시작합니다.
//!
//! # 재스캔 판정
//! - 크기와 수정 시각이 모두 그대로면 stat 외에 아무것도 읽지 않음
//! - 크기 감소 (truncation, 로테이션) → 전체 재스캔
//! - 크기는 같은데 수정 시각 변경 (제자리 편집) → 전체 재스캔
//! - 이전에 읽은 마지막 바이트들의 지문 불일치 (크기 변화 없이 다시 쓰인 파일) → 전체 재스캔
//!
//! 그 외에는 `last_size`부터 끝까지의 새 바이트만 읽습니다.

use std::collections::BTreeMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use warden_core::metrics as m;
use warden_core::types::AttackVars;

use crate::error::ScanError;
use crate::rule::Rule;

/// 꼬리 지문에 사용하는 최대 바이트 수
pub const TAIL_FINGERPRINT_LEN: usize = 256;

/// 주소별 공격 목록 (주소 안에서는 파일 줄 순서)
pub type AttacksByAddress = BTreeMap<String, Vec<AttackVars>>;

/// 주소별 목록을 펼쳐 파일 줄 순서로 돌려줍니다.
pub fn in_line_order(attacks: &AttacksByAddress) -> Vec<(&str, &AttackVars)> {
    let mut ordered: Vec<(&str, &AttackVars)> = attacks
        .iter()
        .flat_map(|(address, list)| list.iter().map(move |vars| (address.as_str(), vars)))
        .collect();
    ordered.sort_by_key(|(_, vars)| vars.line);
    ordered
}

/// 이미 스캔한 마지막 바이트들의 지문
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailFingerprint {
    /// SHA-256 해시 (스캔 전에는 `None`)
    pub hash: Option<[u8; 32]>,
    /// 해시 대상 바이트 수
    pub len: u64,
}

impl TailFingerprint {
    /// 주어진 바이트의 지문을 만듭니다.
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            hash: Some(Sha256::digest(bytes).into()),
            len: bytes.len() as u64,
        }
    }

    fn matches(&self, bytes: &[u8]) -> bool {
        let Some(hash) = self.hash else {
            return false;
        };
        bytes.len() as u64 == self.len && hash == <[u8; 32]>::from(Sha256::digest(bytes))
    }
}

/// 스캔 커서
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanCursor {
    /// 마지막으로 스캔한 바이트 길이
    pub last_size: u64,
    /// 마지막으로 본 수정 시각
    pub last_mtime: Option<SystemTime>,
    /// 꼬리 지문
    pub tail: TailFingerprint,
}

/// 전체 재스캔 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RescanReason {
    Truncated,
    ModifiedInPlace,
    TailMismatch,
}

impl RescanReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Truncated => "truncated",
            Self::ModifiedInPlace => "modified_in_place",
            Self::TailMismatch => "tail_mismatch",
        }
    }
}

/// 프로파일 하나의 증분 스캐너
#[derive(Debug)]
pub struct LogScanner {
    profile: String,
    path: PathBuf,
    rules: Vec<Rule>,
    cursor: ScanCursor,
    cache: AttacksByAddress,
    next_line: u64,
}

impl LogScanner {
    /// 새 스캐너를 만듭니다. 첫 스캔은 항상 파일 전체를 읽습니다.
    pub fn new(profile: impl Into<String>, path: impl Into<PathBuf>, rules: Vec<Rule>) -> Self {
        Self {
            profile: profile.into(),
            path: path.into(),
            rules,
            cursor: ScanCursor::default(),
            cache: AttacksByAddress::new(),
            next_line: 0,
        }
    }

    /// 감시 중인 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 커서
    pub fn cursor(&self) -> &ScanCursor {
        &self.cursor
    }

    /// 커서와 캐시를 초기화합니다. 다음 스캔은 파일 전체를 읽습니다.
    pub fn force_rescan(&mut self) {
        self.cursor = ScanCursor::default();
        self.cache.clear();
        self.next_line = 0;
    }

    /// 현재 시각 기준으로 스캔합니다.
    pub async fn scan(&mut self, max_age: Option<Duration>) -> Result<AttacksByAddress, ScanError> {
        self.scan_at(max_age, Local::now()).await
    }

    /// `now` 기준으로 스캔하고 누적된 주소별 공격 목록을 반환합니다.
    ///
    /// 파일이 바뀌지 않았으면 빈 결과를 반환합니다. `max_age`가 주어지면
    /// `now - max_age`보다 오래된 공격은 버리며, 캐시에서도 같은 기준으로 정리합니다.
    ///
    /// # Errors
    /// - [`ScanError::LogFileMissing`]: 파일이 없음 (호출 측은 이번 사이클만 건너뜀)
    /// - [`ScanError::Io`]: 그 외 읽기 실패
    pub async fn scan_at(
        &mut self,
        max_age: Option<Duration>,
        now: DateTime<Local>,
    ) -> Result<AttacksByAddress, ScanError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.map_io(e))?;
        let size = metadata.len();
        let mtime = metadata.modified().ok();

        if size == self.cursor.last_size && mtime == self.cursor.last_mtime {
            return Ok(AttacksByAddress::new());
        }

        if size < self.cursor.last_size {
            self.rescan(RescanReason::Truncated);
        } else if size == self.cursor.last_size && self.cursor.last_mtime.is_some() {
            self.rescan(RescanReason::ModifiedInPlace);
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| self.map_io(e))?;

        if self.cursor.tail.hash.is_some() && !self.tail_unchanged(&mut file).await? {
            self.rescan(RescanReason::TailMismatch);
        }

        let start = self.cursor.last_size;
        file.seek(SeekFrom::Start(start)).await?;
        let mut content = Vec::with_capacity(size.saturating_sub(start) as usize);
        file.take(size.saturating_sub(start))
            .read_to_end(&mut content)
            .await?;

        let tail_start = content.len().saturating_sub(TAIL_FINGERPRINT_LEN);
        self.cursor.tail = TailFingerprint::of(&content[tail_start..]);
        self.cursor.last_size = start + content.len() as u64;
        self.cursor.last_mtime = mtime;

        let cutoff = max_age.map(|age| now.timestamp() - age.as_secs() as i64);
        let fresh = self.extract(&String::from_utf8_lossy(&content), cutoff, now);

        tracing::debug!(
            profile = %self.profile,
            path = %self.path.display(),
            bytes = content.len(),
            addresses = fresh.len(),
            "scanned new log content"
        );

        self.merge(fresh, cutoff);
        Ok(self.cache.clone())
    }

    /// 이전 스캔의 마지막 바이트들이 그대로인지 확인합니다.
    async fn tail_unchanged(&self, file: &mut tokio::fs::File) -> Result<bool, ScanError> {
        let len = self.cursor.tail.len;
        let Some(start) = self.cursor.last_size.checked_sub(len) else {
            return Ok(false);
        };
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = vec![0_u8; len as usize];
        match file.read_exact(&mut buf).await {
            Ok(_) => Ok(self.cursor.tail.matches(&buf)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 줄마다 규칙을 순서대로 적용하고 첫 매칭만 사용합니다.
    ///
    /// 매칭마다 스캐너 수명 동안 증가하는 줄 순번(`AttackVars::line`)을 매깁니다.
    fn extract(
        &mut self,
        content: &str,
        cutoff: Option<i64>,
        now: DateTime<Local>,
    ) -> AttacksByAddress {
        let mut attacks = AttacksByAddress::new();

        for line in content.lines() {
            let Some(mut found) = self.rules.iter().find_map(|rule| rule.match_line_at(line, now))
            else {
                continue;
            };

            if cutoff.is_some_and(|cutoff| found.vars.timestamp < cutoff) {
                continue;
            }

            let Some(address) = found.address else {
                tracing::debug!(profile = %self.profile, line, "matched line has no address, skipping");
                continue;
            };

            found.vars.line = self.next_line;
            self.next_line += 1;
            attacks.entry(address).or_default().push(found.vars);
        }

        attacks
    }

    /// 새 결과를 캐시 뒤에 이어 붙이고 만료된 항목을 정리합니다.
    fn merge(&mut self, fresh: AttacksByAddress, cutoff: Option<i64>) {
        for (address, attacks) in fresh {
            self.cache.entry(address).or_default().extend(attacks);
        }

        if let Some(cutoff) = cutoff {
            for attacks in self.cache.values_mut() {
                attacks.retain(|vars| vars.timestamp >= cutoff);
            }
            self.cache.retain(|_, attacks| !attacks.is_empty());
        }
    }

    fn rescan(&mut self, reason: RescanReason) {
        tracing::info!(
            profile = %self.profile,
            path = %self.path.display(),
            reason = reason.as_str(),
            "log file changed unexpectedly, rescanning from start"
        );
        metrics::counter!(m::SCAN_FULL_RESCANS_TOTAL, m::LABEL_PROFILE => self.profile.clone())
            .increment(1);
        self.force_rescan();
    }

    fn map_io(&self, e: std::io::Error) -> ScanError {
        if e.kind() == ErrorKind::NotFound {
            ScanError::LogFileMissing {
                path: self.path.display().to_string(),
            }
        } else {
            ScanError::Io(e)
        }
    }
}
