//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 스캐너가 만들어 내는 공격 기록, 저장소의 차단 기록, 원격 조회 응답에
//! 쓰이는 통계 구조를 정의합니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 규칙 매칭으로 캡처된 변수 레코드
///
/// 예약된 이름(`USER`, `PID`, `PORT`, `HOSTNAME`, `D:M`, `D:D`, `TIME`)은
/// 선언된 필드로, 그 외 이름은 `extra`에 담깁니다. 주소(`IP`)는 그룹 키로
/// 분리되므로 이 레코드에 포함되지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackVars {
    #[serde(rename = "USER", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "PID", default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(rename = "PORT", default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(rename = "HOSTNAME", default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "D:M", default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(rename = "D:D", default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    #[serde(rename = "TIME", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// 규칙이 선언한 서비스 태그 (템플릿에서 캡처하지 않음)
    #[serde(rename = "SERVICE", default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// 유닉스 타임스탬프 (초)
    #[serde(rename = "TIMESTAMP")]
    pub timestamp: i64,
    /// 예약되지 않은 이름으로 캡처된 값
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
    /// 스캐너가 매긴 줄 순번 (저장하지 않음)
    #[serde(skip)]
    pub line: u64,
}

impl AttackVars {
    /// 캡처된 값을 이름에 맞는 필드에 저장합니다.
    ///
    /// 같은 이름이 여러 번 나오면 마지막 값이 남습니다.
    pub fn set(&mut self, name: &str, value: String) {
        match name {
            "USER" => self.user = Some(value),
            "PID" => self.pid = Some(value),
            "PORT" => self.port = Some(value),
            "HOSTNAME" => self.hostname = Some(value),
            "D:M" => self.month = Some(value),
            "D:D" => self.day = Some(value),
            "TIME" => self.time = Some(value),
            _ => {
                self.extra.insert(name.to_owned(), value);
            }
        }
    }

    /// 이름으로 캡처 값을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "USER" => self.user.as_deref(),
            "PID" => self.pid.as_deref(),
            "PORT" => self.port.as_deref(),
            "HOSTNAME" => self.hostname.as_deref(),
            "D:M" => self.month.as_deref(),
            "D:D" => self.day.as_deref(),
            "TIME" => self.time.as_deref(),
            "SERVICE" => self.service.as_deref(),
            other => self.extra.get(other).map(String::as_str),
        }
    }
}

/// 저장 대상 공격 기록
///
/// 고유 키는 (address, timestamp, profile)입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRecord {
    /// 공격 출발지 주소
    pub address: String,
    /// 유닉스 타임스탬프 (초)
    pub timestamp: i64,
    /// 탐지한 프로파일 이름
    pub profile: String,
    /// 캡처된 사용자명
    pub user: Option<String>,
    /// 전체 캡처 변수
    pub vars: AttackVars,
}

impl fmt::Display for AttackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @{} [{}] user={}",
            self.address,
            self.timestamp,
            self.profile,
            self.user.as_deref().unwrap_or("-"),
        )
    }
}

/// 저장소에서 읽은 공격 행
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAttack {
    pub id: i64,
    pub time: i64,
    pub address: String,
    pub profile: String,
    pub user: Option<String>,
    /// 직렬화된 캡처 변수
    pub data: String,
}

/// 저장소에서 읽은 차단 행
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    pub id: i64,
    pub time: i64,
    pub address: String,
    /// 해당 주소의 누적 공격 수 (목록 조회에서만 채워짐)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacks_count: Option<i64>,
}

/// 전체/오늘 건수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub total: i64,
    pub today: i64,
}

/// 공격/차단 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub attacks: Tally,
    pub bans: Tally,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_routes_reserved_names_to_fields() {
        let mut vars = AttackVars::default();
        vars.set("USER", "root".to_owned());
        vars.set("D:M", "Jan".to_owned());
        vars.set("SESSION", "42".to_owned());

        assert_eq!(vars.user.as_deref(), Some("root"));
        assert_eq!(vars.month.as_deref(), Some("Jan"));
        assert_eq!(vars.extra.get("SESSION").map(String::as_str), Some("42"));
        assert_eq!(vars.get("SESSION"), Some("42"));
    }

    #[test]
    fn vars_serialize_with_template_names() {
        let mut vars = AttackVars {
            timestamp: 1_700_000_000,
            service: Some("ssh".to_owned()),
            ..Default::default()
        };
        vars.set("USER", "admin".to_owned());
        vars.set("METHOD", "password".to_owned());

        let json = serde_json::to_value(&vars).unwrap();
        assert_eq!(json["USER"], "admin");
        assert_eq!(json["SERVICE"], "ssh");
        assert_eq!(json["METHOD"], "password");
        assert_eq!(json["TIMESTAMP"], 1_700_000_000);
        assert!(json.get("PID").is_none());

        let back: AttackVars = serde_json::from_value(json).unwrap();
        assert_eq!(back, vars);
    }

    #[test]
    fn ban_record_uses_camel_case_count() {
        let ban = BanRecord {
            id: 3,
            time: 10,
            address: "203.0.113.9".to_owned(),
            attacks_count: Some(5),
        };
        let json = serde_json::to_value(&ban).unwrap();
        assert_eq!(json["attacksCount"], 5);
    }
}
