//! 危机判定结果（每次调用即时生成，不缓存、不持久化）

use serde::Serialize;

use crate::safety::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Continue,
    ShowInfo,
    ContactSupport,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisVerdict {
    pub is_crisis: bool,
    pub severity: Severity,
    /// 去重后的命中类别（按首次命中顺序）
    pub matched_categories: Vec<String>,
    pub matched_phrases: Vec<String>,
    pub recommended_action: RecommendedAction,
}

impl CrisisVerdict {
    pub fn clear() -> Self {
        Self {
            is_crisis: false,
            severity: Severity::Low,
            matched_categories: Vec::new(),
            matched_phrases: Vec::new(),
            recommended_action: RecommendedAction::Continue,
        }
    }

    /// 是否必须跳过任何 AI 路径（只在 critical 时）
    pub fn blocks_ai(&self) -> bool {
        self.severity == Severity::Critical
    }

    pub fn has_matches(&self) -> bool {
        !self.matched_phrases.is_empty()
    }
}
