//! 규칙 -- `%NAME%` 템플릿 기반 줄 매처
//!
//! 규칙 하나는 템플릿 문자열 하나에서 컴파일되며, 컴파일 후에는 변경되지 않습니다.
//!
//! # 템플릿 형식
//! ```text
//! Failed password for %USER% from %IP% port %PORT% ssh2
//! %D:M% %D:D% %TIME% %HOSTNAME% sshd[%PID%]: Invalid user %USER% from %IP%
//! ```
//!
//! 예약 이름: `IP`, `USER`, `PID`, `PORT`, `HOSTNAME`, `D:M`, `D:D`, `TIME`.
//! 그 외 이름은 일반 캡처로 [`AttackVars::extra`]에 저장됩니다.
//!
//! # 아키텍처
//! - [`template`]: 템플릿 → 고정 정규식 컴파일
//! - [`timestamp`]: 날짜/시각 캡처 → 유닉스 타임스탬프

pub mod template;
pub mod timestamp;

pub use template::CompiledTemplate;

use chrono::{DateTime, Local};

use warden_core::types::AttackVars;

use crate::error::ScanError;

/// 규칙 매칭 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// `%IP%`로 캡처된 주소 (규칙에 없으면 `None`)
    pub address: Option<String>,
    /// 나머지 캡처 변수와 유도된 타임스탬프
    pub vars: AttackVars,
}

/// 컴파일된 탐지 규칙
#[derive(Debug, Clone)]
pub struct Rule {
    template: CompiledTemplate,
    service: Option<String>,
}

impl Rule {
    /// 템플릿을 컴파일하여 규칙을 만듭니다.
    pub fn compile(template: &str, service: Option<String>) -> Result<Self, ScanError> {
        Ok(Self {
            template: template::compile(template)?,
            service,
        })
    }

    /// 원본 템플릿
    pub fn template(&self) -> &str {
        &self.template.source
    }

    /// 자리표시자 이름 (등장 순서)
    pub fn variables(&self) -> &[String] {
        &self.template.names
    }

    /// 규칙에 붙은 서비스 태그
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// 줄이 규칙에 매칭되는지만 확인합니다.
    pub fn is_match(&self, line: &str) -> bool {
        self.template.pattern.is_match(line)
    }

    /// 현재 시각 기준으로 줄을 매칭합니다.
    pub fn match_line(&self, line: &str) -> Option<RuleMatch> {
        self.match_line_at(line, Local::now())
    }

    /// `now`를 기준으로 줄을 매칭하고 캡처 변수를 추출합니다.
    ///
    /// 캡처 값은 앞뒤 공백을 제거합니다. 날짜 캡처가 형식에 맞지 않으면
    /// 잘못된 형식의 줄로 보고 매칭하지 않은 것으로 취급합니다.
    pub fn match_line_at(&self, line: &str, now: DateTime<Local>) -> Option<RuleMatch> {
        let caps = self.template.pattern.captures(line)?;

        let mut address = None;
        let mut vars = AttackVars::default();

        for (idx, name) in self.template.names.iter().enumerate() {
            let Some(value) = caps.get(idx + 1) else {
                continue;
            };
            let value = value.as_str().trim().to_owned();
            if name == "IP" {
                address = Some(value);
            } else {
                vars.set(name, value);
            }
        }

        vars.service = self.service.clone();

        let Some(ts) = timestamp::derive(
            vars.month.as_deref(),
            vars.day.as_deref(),
            vars.time.as_deref(),
            now,
        ) else {
            tracing::debug!(
                template = %self.template.source,
                line,
                "date captures do not parse, ignoring line"
            );
            return None;
        };
        vars.timestamp = ts;

        Some(RuleMatch { address, vars })
    }
}

/// 템플릿 목록을 순서대로 컴파일합니다.
pub fn compile_all<S: AsRef<str>>(
    templates: &[S],
    service: Option<&str>,
) -> Result<Vec<Rule>, ScanError> {
    templates
        .iter()
        .map(|t| Rule::compile(t.as_ref(), service.map(str::to_owned)))
        .collect()
}
