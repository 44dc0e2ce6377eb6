#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_log_scanner::Rule;

fuzz_target!(|data: &[u8]| {
    let Ok(template) = std::str::from_utf8(data) else {
        return;
    };

    // 컴파일 실패는 에러로, 패닉은 없어야 함
    let Ok(rule) = Rule::compile(template, None) else {
        return;
    };

    // 컴파일된 규칙은 자기 템플릿 문자열에도 크래시 없이 동작해야 함
    let _ = rule.match_line(template);
});
