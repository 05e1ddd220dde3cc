//! 退避时间表：纯函数式、惰性、有限的延迟序列
//!
//! 第 n 次失败后的等待时间为 `min(base * factor^(n-1), max)`。
//! 迭代器只产出「两次尝试之间」的延迟，因此共 `max_attempts - 1` 项。

use std::time::Duration;

/// 退避参数（来自 [lifecycle] 配置段）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
    /// 单次 ensure_ready 内最多尝试次数（含首次）
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            factor: 1.5,
            max_ms: 30_000,
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// 第 attempt 次（从 1 开始）失败后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let raw = self.base_ms as f64 * self.factor.powi(exp);
        let capped = if raw.is_finite() {
            raw.min(self.max_ms as f64)
        } else {
            self.max_ms as f64
        };
        Duration::from_millis(capped.round() as u64)
    }

    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            policy: *self,
            attempt: 1,
        }
    }
}

/// 惰性延迟序列
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.policy.max_attempts.saturating_sub(self.attempt) as usize;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let delays: Vec<u64> = BackoffPolicy::default()
            .schedule()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 1500]);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy {
            max_attempts: 12,
            ..BackoffPolicy::default()
        };
        let delays: Vec<Duration> = policy.schedule().collect();
        assert_eq!(delays.len(), 11);
        assert_eq!(delays[2], Duration::from_millis(2250));
        assert_eq!(*delays.last().unwrap(), Duration::from_millis(30_000));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_single_attempt_has_no_delays() {
        let policy = BackoffPolicy {
            max_attempts: 1,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.schedule().count(), 0);
    }
}
