//! 进度节流与份额映射
//!
//! 引擎回调给出的是单个模型的局部进度（0.0-1.0），这里映射为总进度中该角色的份额：
//! `role_index / total_roles * 100 + local_percent / total_roles`，并限制发布频率。

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::progress::ProgressBus;

/// 将局部进度映射为总进度（0-100）
pub fn overall_percent(role_index: usize, total_roles: usize, local_fraction: f32) -> f32 {
    let total = total_roles.max(1) as f32;
    let local_percent = (local_fraction.clamp(0.0, 1.0)) * 100.0;
    (role_index as f32 / total) * 100.0 + local_percent / total
}

/// 带节流的进度上报器：两次发布之间至少间隔 `interval`，完成帧（100%）总是放行
pub struct ThrottledReporter {
    bus: ProgressBus,
    label: String,
    role_index: usize,
    total_roles: usize,
    interval: Duration,
    last_publish: Mutex<Option<Instant>>,
}

impl ThrottledReporter {
    pub fn new(
        bus: ProgressBus,
        label: impl Into<String>,
        role_index: usize,
        total_roles: usize,
        interval: Duration,
    ) -> Self {
        Self {
            bus,
            label: label.into(),
            role_index,
            total_roles,
            interval,
            last_publish: Mutex::new(None),
        }
    }

    /// 发布本次尝试的 0% 首帧，并以此作为节流起点
    pub fn start(&self, details: Option<String>) {
        if let Ok(mut last) = self.last_publish.lock() {
            *last = Some(Instant::now());
        }
        let percent = overall_percent(self.role_index, self.total_roles, 0.0);
        self.bus.report_progress(percent, self.label.clone(), details);
    }

    /// 上报局部进度；返回本次是否真的发布到了总线
    pub fn report(&self, local_fraction: f32, details: Option<String>) -> bool {
        let now = Instant::now();
        let finished = local_fraction >= 1.0;
        let mut last = match self.last_publish.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        if let Some(prev) = *last {
            if !finished && now.duration_since(prev) < self.interval {
                return false;
            }
        }
        *last = Some(now);
        drop(last);

        let percent = overall_percent(self.role_index, self.total_roles, local_fraction);
        tracing::debug!(label = %self.label, percent, "Model load progress");
        self.bus.report_progress(percent, self.label.clone(), details);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_percent_shares() {
        assert_eq!(overall_percent(0, 2, 0.5), 25.0);
        assert_eq!(overall_percent(1, 2, 0.0), 50.0);
        assert_eq!(overall_percent(1, 2, 1.0), 100.0);
        assert!((overall_percent(0, 1, 0.3) - 30.0).abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_throttles_within_interval() {
        let bus = ProgressBus::new();
        let reporter = ThrottledReporter::new(bus.clone(), "Loading", 0, 2, Duration::from_millis(100));

        assert!(reporter.report(0.1, None));
        assert!(!reporter.report(0.2, None));
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(!reporter.report(0.3, None));
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(reporter.report(0.4, None));
        assert_eq!(bus.current().progress, 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_frame_counts_toward_interval() {
        let bus = ProgressBus::new();
        let reporter = ThrottledReporter::new(bus.clone(), "Loading", 1, 2, Duration::from_millis(100));
        reporter.start(Some("flan-t5-small".into()));
        assert_eq!(bus.current().progress, 50.0);
        assert_eq!(bus.current().details.as_deref(), Some("flan-t5-small"));

        assert!(!reporter.report(0.0, None));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(reporter.report(0.5, None));
        assert_eq!(bus.current().progress, 75.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_frame_always_passes() {
        let bus = ProgressBus::new();
        let reporter = ThrottledReporter::new(bus.clone(), "Loading", 1, 2, Duration::from_millis(100));
        assert!(reporter.report(0.5, None));
        assert!(reporter.report(1.0, None));
        assert_eq!(bus.current().progress, 100.0);
    }
}
