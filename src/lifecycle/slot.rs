//! 槽位与加载尝试状态
//!
//! ModelSlot 独占模型句柄：只有 ready 状态持有句柄，离开 ready 的每个转换都会销毁句柄。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;

use crate::core::{ErrorCategory, ModelRole, SlotState};
use crate::engine::ModelHandle;

/// 可被多个调用方共享的加载结果
pub type ReadyFuture = Shared<BoxFuture<'static, bool>>;

pub struct ModelSlot {
    role: ModelRole,
    config_id: String,
    state: SlotState,
    handle: Option<Arc<dyn ModelHandle>>,
}

impl ModelSlot {
    pub fn new(role: ModelRole, config_id: impl Into<String>) -> Self {
        Self {
            role,
            config_id: config_id.into(),
            state: SlotState::Unloaded,
            handle: None,
        }
    }

    pub fn role(&self) -> &ModelRole {
        &self.role
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn handle(&self) -> Option<Arc<dyn ModelHandle>> {
        self.handle.clone()
    }

    pub fn mark_loading(&mut self) {
        self.handle = None;
        self.state = SlotState::Loading;
    }

    pub fn mark_ready(&mut self, handle: Arc<dyn ModelHandle>) {
        self.handle = Some(handle);
        self.state = SlotState::Ready;
    }

    pub fn mark_failed(&mut self) {
        self.handle = None;
        self.state = SlotState::Failed;
    }

    pub fn mark_unloaded(&mut self) {
        self.handle = None;
        self.state = SlotState::Unloaded;
    }

    /// 切换模型变体：旧句柄随之作废
    pub fn rebind(&mut self, config_id: impl Into<String>) {
        self.config_id = config_id.into();
        self.mark_unloaded();
    }
}

/// 会话内的加载尝试状态（不持久化）
#[derive(Default)]
pub struct LoadAttemptState {
    pub in_flight: Option<ReadyFuture>,
    /// 连续失败的 ensure_ready 轮数
    pub failure_count: u32,
    pub last_attempt: Option<Instant>,
    pub last_error: Option<ErrorCategory>,
}

impl LoadAttemptState {
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn record_success(&mut self, now: Instant) {
        self.failure_count = 0;
        self.last_attempt = Some(now);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, now: Instant, category: ErrorCategory) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_attempt = Some(now);
        self.last_error = Some(category);
    }

    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.last_attempt = None;
        self.last_error = None;
    }

    /// 冷却剩余时间；未达失败阈值或冷却已过返回 None
    pub fn cooldown_remaining(&self, now: Instant, threshold: u32, window: Duration) -> Option<Duration> {
        if self.failure_count < threshold {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last_attempt?);
        (elapsed < window).then(|| window - elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InferenceInput, InferenceOutput};
    use async_trait::async_trait;

    struct Dummy;

    #[async_trait]
    impl ModelHandle for Dummy {
        async fn run(&self, _input: &InferenceInput) -> Result<InferenceOutput, String> {
            Ok(InferenceOutput::Text { text: "ok".into() })
        }
    }

    #[test]
    fn test_handle_is_dropped_when_leaving_ready() {
        let mut slot = ModelSlot::new(ModelRole::CLASSIFIER, "a");
        assert_eq!(slot.state(), SlotState::Unloaded);
        slot.mark_ready(Arc::new(Dummy));
        assert!(slot.handle().is_some());
        slot.mark_failed();
        assert!(slot.handle().is_none());

        slot.mark_ready(Arc::new(Dummy));
        slot.rebind("b");
        assert_eq!(slot.state(), SlotState::Unloaded);
        assert_eq!(slot.config_id(), "b");
        assert!(slot.handle().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_window() {
        let mut attempt = LoadAttemptState::default();
        let window = Duration::from_secs(30);
        for _ in 0..2 {
            attempt.record_failure(Instant::now(), ErrorCategory::Network);
        }
        assert!(attempt.cooldown_remaining(Instant::now(), 3, window).is_none());

        attempt.record_failure(Instant::now(), ErrorCategory::Network);
        assert_eq!(attempt.cooldown_remaining(Instant::now(), 3, window), Some(window));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(
            attempt.cooldown_remaining(Instant::now(), 3, window),
            Some(Duration::from_secs(1))
        );
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(attempt.cooldown_remaining(Instant::now(), 3, window).is_none());

        attempt.record_success(Instant::now());
        assert_eq!(attempt.failure_count, 0);
    }
}
