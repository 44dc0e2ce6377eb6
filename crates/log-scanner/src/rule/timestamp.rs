//! 캡처 값에서 공격 시각 유도
//!
//! syslog 형식 날짜에는 연도가 없으므로 항상 현재 연도를 붙입니다.
//! 따라서 1월에 처리하는 12월 로그는 미래 시각으로 해석됩니다 (알려진 한계).

use chrono::{DateTime, Datelike, Local, NaiveDateTime, NaiveTime, TimeZone};

/// 날짜 파싱 형식
pub const DATE_FORMAT: &str = "%Y %b %d %H:%M:%S";

/// 시각 파싱 형식
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// `D:M`/`D:D`/`TIME` 캡처 값으로 유닉스 타임스탬프를 만듭니다.
///
/// - 월, 일, 시각: `"<올해> <월> <일> <시각>"`
/// - 월, 일: 시각은 `00:00:00`
/// - 시각만: 오늘 날짜와 결합
/// - 그 외: `now`
///
/// 값이 형식에 맞지 않으면 `None`.
pub fn derive(
    month: Option<&str>,
    day: Option<&str>,
    time: Option<&str>,
    now: DateTime<Local>,
) -> Option<i64> {
    match (month, day, time) {
        (Some(month), Some(day), time) => {
            let text = format!(
                "{} {} {} {}",
                now.year(),
                month,
                day,
                time.unwrap_or("00:00:00")
            );
            let naive = NaiveDateTime::parse_from_str(&text, DATE_FORMAT).ok()?;
            to_local_timestamp(naive)
        }
        (_, _, Some(time)) => {
            let time = NaiveTime::parse_from_str(time, TIME_FORMAT).ok()?;
            to_local_timestamp(now.date_naive().and_time(time))
        }
        _ => Some(now.timestamp()),
    }
}

fn to_local_timestamp(naive: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}
