//! 状态定义：模型角色、槽位状态与 ModelStatus 投影
//!
//! UI 只持有轻量的 ModelStatus（状态、配置、失败次数、冷却剩余）；句柄等内部状态由 ModelLifecycle 独占。

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

use crate::core::ErrorCategory;

/// 模型角色（classifier / generator，可按配置扩展）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModelRole(Cow<'static, str>);

impl ModelRole {
    pub const CLASSIFIER: ModelRole = ModelRole(Cow::Borrowed("classifier"));
    pub const GENERATOR: ModelRole = ModelRole(Cow::Borrowed("generator"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelRole {
    fn from(s: &str) -> Self {
        match s {
            "classifier" => ModelRole::CLASSIFIER,
            "generator" => ModelRole::GENERATOR,
            other => ModelRole::new(other),
        }
    }
}

/// 槽位状态机：unloaded → loading → {ready | failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

/// 单个角色的状态快照（用于 UI 徽标）
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub role: ModelRole,
    pub state: SlotState,
    pub config_id: String,
    pub failure_count: u32,
    pub last_error: Option<ErrorCategory>,
    /// 冷却剩余毫秒数，未处于冷却时为 None
    pub cooldown_remaining_ms: Option<u64>,
    /// 持久化的版本记录是否仍然新鲜
    pub cached: bool,
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        self.state == SlotState::Ready
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_remaining_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str_uses_well_known_constants() {
        assert_eq!(ModelRole::from("classifier"), ModelRole::CLASSIFIER);
        assert_eq!(ModelRole::from("generator"), ModelRole::GENERATOR);
        assert_eq!(ModelRole::from("embedder").as_str(), "embedder");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let status = ModelStatus {
            role: ModelRole::GENERATOR,
            state: SlotState::Failed,
            config_id: "flan-t5-small".into(),
            failure_count: 3,
            last_error: Some(ErrorCategory::Network),
            cooldown_remaining_ms: Some(1200),
            cached: false,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["role"], "generator");
        assert_eq!(json["state"], "failed");
        assert_eq!(json["last_error"], "network");
        assert!(status.in_cooldown());
    }
}
