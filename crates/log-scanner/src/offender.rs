//! 상습 공격자 판별
//!
//! 주소별 공격 시각 목록에서, 어떤 공격 시각 `t`부터 앞으로 `window`초 안에
//! (`0 <= t2 - t <= window`) 들어오는 공격 수가 `threshold` 이상이면 상습 공격자입니다.
//! 윈도우는 `t` 이후 방향으로만 셉니다. 주소당 O(n²)이지만 한 사이클의 공격 수는 작습니다.

use crate::scanner::AttacksByAddress;

/// 시각 목록이 상습 공격 패턴인지 판별합니다.
///
/// 카운트가 `threshold`를 넘으면 그 시작점의 계산을 일찍 멈춥니다.
pub fn is_habitual(timestamps: &[i64], threshold: usize, window: u64) -> bool {
    let window = i64::try_from(window).unwrap_or(i64::MAX);

    timestamps.iter().any(|&t| {
        let mut count = 0_usize;
        for &t2 in timestamps {
            let delta = t2.saturating_sub(t);
            if (0..=window).contains(&delta) {
                count += 1;
                if count > threshold {
                    break;
                }
            }
        }
        count >= threshold
    })
}

/// 상습 공격자 주소 목록을 반환합니다 (주소 순).
pub fn classify(attacks: &AttacksByAddress, threshold: usize, window: u64) -> Vec<String> {
    attacks
        .iter()
        .filter(|(_, list)| {
            let timestamps: Vec<i64> = list.iter().map(|vars| vars.timestamp).collect();
            is_habitual(&timestamps, threshold, window)
        })
        .map(|(address, _)| address.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use warden_core::types::AttackVars;

    use super::*;

    fn attacks_at(address: &str, times: &[i64]) -> AttacksByAddress {
        let mut map = AttacksByAddress::new();
        map.insert(
            address.to_owned(),
            times
                .iter()
                .map(|&t| AttackVars {
                    timestamp: t,
                    ..Default::default()
                })
                .collect(),
        );
        map
    }

    #[test]
    fn evenly_spaced_attacks_hit_threshold_m_not_m_plus_one() {
        let window = 120_u64;
        for m in 1..=10_usize {
            let step = window as i64 / (m as i64 + 1);
            let times: Vec<i64> = (0..m as i64).map(|i| 1_000 + i * step).collect();
            assert!(is_habitual(&times, m, window), "m={m} should be flagged");
            assert!(!is_habitual(&times, m + 1, window), "m={m} threshold+1");
        }
    }

    #[test]
    fn window_is_forward_looking_only() {
        // 두 번째 공격 기준으로는 첫 공격이 과거이므로 세지 않음
        let times = [100, 200];
        assert!(is_habitual(&times, 2, 100));
        assert!(!is_habitual(&times, 2, 99));
    }

    #[test]
    fn order_of_timestamps_does_not_matter() {
        let times = [300, 100, 200];
        assert!(is_habitual(&times, 3, 200));
        assert!(!is_habitual(&times, 3, 199));
    }

    #[test]
    fn zero_threshold_flags_any_attacker() {
        assert!(is_habitual(&[5], 0, 0));
        assert!(!is_habitual(&[], 0, 10));
    }

    #[test]
    fn duplicate_timestamps_count_each() {
        assert!(is_habitual(&[50, 50, 50], 3, 0));
    }

    #[test]
    fn classify_returns_only_offenders() {
        let mut attacks = attacks_at("10.0.0.1", &[0, 10, 20]);
        attacks.extend(attacks_at("10.0.0.2", &[0, 500]));

        let flagged = classify(&attacks, 3, 60);
        assert_eq!(flagged, vec!["10.0.0.1".to_owned()]);
    }
}
