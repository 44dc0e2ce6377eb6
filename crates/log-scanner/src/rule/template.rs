//! 템플릿 컴파일 -- `%NAME%` 자리표시자를 캡처 그룹으로 변환
//!
//! 자리표시자 사이의 리터럴 텍스트는 정규식 메타문자를 모두 이스케이프하고,
//! 각 자리표시자는 비탐욕 캡처 `(.+?)`로 바꿉니다. 마지막 자리표시자만
//! 탐욕 캡처 `(.+)`로 두어 줄 끝의 나머지를 통째로 가져옵니다.
//! 패턴 전체는 `^...$`로 고정되므로 자리표시자가 없는 템플릿은
//! 바이트 단위로 같은 줄에만 매칭됩니다.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ScanError;

/// 자리표시자 토큰: `%` 로 감싼 최소 구간
static PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"%([^%]*)%"));

/// 규칙이 직접 캡처할 수 없는 파생 이름
const DERIVED_NAMES: [&str; 2] = ["SERVICE", "TIMESTAMP"];

/// 비탐욕 캡처
const LAZY_CAPTURE: &str = "(.+?)";

/// 탐욕 캡처 (마지막 자리표시자)
const GREEDY_CAPTURE: &str = "(.+)";

/// 컴파일된 템플릿
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    /// 원본 템플릿
    pub source: String,
    /// 자리표시자 이름 (등장 순서, 중복 허용)
    pub names: Vec<String>,
    /// 고정된 매칭 정규식
    pub pattern: Regex,
}

/// 템플릿을 리터럴/자리표시자 조각으로 나눈 결과
enum Piece<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// 템플릿 문자열을 컴파일합니다.
///
/// # Errors
/// - 이름이 빈 자리표시자(`%%`)
/// - `SERVICE`, `TIMESTAMP` 같은 파생 이름을 자리표시자로 사용한 경우
pub fn compile(template: &str) -> Result<CompiledTemplate, ScanError> {
    let pieces = split(template)?;

    let placeholder_count = pieces
        .iter()
        .filter(|p| matches!(p, Piece::Placeholder(_)))
        .count();

    let mut pattern = String::with_capacity(template.len() * 2 + 2);
    let mut names = Vec::with_capacity(placeholder_count);
    pattern.push('^');

    for piece in pieces {
        match piece {
            Piece::Literal(text) => pattern.push_str(&regex::escape(text)),
            Piece::Placeholder(name) => {
                names.push(name.to_owned());
                if names.len() == placeholder_count {
                    pattern.push_str(GREEDY_CAPTURE);
                } else {
                    pattern.push_str(LAZY_CAPTURE);
                }
            }
        }
    }
    pattern.push('$');

    let pattern = Regex::new(&pattern)?;

    Ok(CompiledTemplate {
        source: template.to_owned(),
        names,
        pattern,
    })
}

fn split(template: &str) -> Result<Vec<Piece<'_>>, ScanError> {
    let placeholder = PLACEHOLDER.as_ref().map_err(|e| ScanError::Template {
        template: template.to_owned(),
        reason: format!("placeholder matcher unavailable: {e}"),
    })?;

    let mut pieces = Vec::new();
    let mut last = 0;

    for caps in placeholder.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();

        if name.is_empty() {
            return Err(ScanError::Template {
                template: template.to_owned(),
                reason: format!("empty placeholder name at offset {}", whole.start()),
            });
        }
        if DERIVED_NAMES.contains(&name) {
            return Err(ScanError::Template {
                template: template.to_owned(),
                reason: format!("'{name}' is derived and cannot be captured"),
            });
        }

        if whole.start() > last {
            pieces.push(Piece::Literal(&template[last..whole.start()]));
        }
        pieces.push(Piece::Placeholder(name));
        last = whole.end();
    }

    if last < template.len() {
        pieces.push(Piece::Literal(&template[last..]));
    }

    Ok(pieces)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn literal_template_matches_itself_only(text in "[^%\n]{0,64}") {
            let compiled = compile(&text).unwrap();
            prop_assert!(compiled.pattern.is_match(&text));
            let extended = format!("{text}x");
            prop_assert!(!compiled.pattern.is_match(&extended));
        }

        #[test]
        fn substituted_values_are_recovered(
            head in "[a-z ]{0,8}",
            first in "[A-Za-z0-9.]{1,16}",
            second in "[A-Za-z0-9.:]{1,16}",
            third in "[A-Za-z0-9 ]{1,16}",
        ) {
            let template = format!("{head}<%A%> | %B% | %C%");
            let compiled = compile(&template).unwrap();
            let line = format!("{head}<{first}> | {second} | {third}");

            let caps = compiled.pattern.captures(&line).unwrap();
            prop_assert_eq!(&caps[1], first.as_str());
            prop_assert_eq!(&caps[2], second.as_str());
            prop_assert_eq!(&caps[3], third.as_str());
        }

        #[test]
        fn compile_arbitrary_text_does_not_panic(text in "\\PC{0,128}") {
            let _ = compile(&text);
        }
    }
}
