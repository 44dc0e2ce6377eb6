#![no_main]

use arbitrary::Arbitrary;
use chrono::{Local, TimeZone};
use libfuzzer_sys::fuzz_target;

use warden_log_scanner::Rule;

const TEMPLATES: [&str; 3] = [
    "%D:M% %D:D% %TIME% %HOSTNAME% sshd[%PID%]: Failed password for %USER% from %IP% port %PORT% ssh2",
    "%D:M% %D:D% %TIME% %HOSTNAME% sshd[%PID%]: Invalid user %USER% from %IP%",
    "%TIME% auth failure rhost=%IP% user=%USER%",
];

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    template: u8,
    /// 기준 시각 (유닉스 초, 범위 제한)
    now: u32,
    month: String,
    day: String,
    time: String,
    address: String,
    user: String,
}

fuzz_target!(|input: FuzzInput| {
    let template = TEMPLATES[usize::from(input.template) % TEMPLATES.len()];
    let Ok(rule) = Rule::compile(template, Some("ssh".to_owned())) else {
        return;
    };
    let Some(now) = Local.timestamp_opt(i64::from(input.now), 0).earliest() else {
        return;
    };

    let line = format!(
        "{} {} {} host sshd[1]: Failed password for {} from {} port 22 ssh2",
        input.month, input.day, input.time, input.user, input.address
    );

    // 날짜가 잘못된 줄은 매칭 실패로 끝나야 함
    if let Some(found) = rule.match_line_at(&line, now) {
        let _ = found.address;
    }
});
