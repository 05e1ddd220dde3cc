//! 错误恢复引擎
//!
//! 根据 LoadError 类型与剩余退避额度返回 RecoveryAction，供加载循环决定是等待重试还是结束本轮。

use crate::core::{LoadError, RecoveryAction};

/// 语义化错误恢复：将加载错误映射为可执行动作（退避重试 / 结束本轮）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// has_budget 表示退避时间表是否还有下一项
    pub fn handle(&self, err: &LoadError, has_budget: bool) -> RecoveryAction {
        match err {
            LoadError::CapabilityUnavailable(_) => RecoveryAction::AbortCall,
            LoadError::NetworkFailure(_) => RecoveryAction::AbortCall,
            _ if !has_budget => RecoveryAction::AbortCall,
            LoadError::MemoryConstrained(_)
            | LoadError::BackendInitFailure(_)
            | LoadError::VerificationFailure(_)
            | LoadError::Unknown(_) => RecoveryAction::RetryAfterBackoff,
        }
    }
}
