//! 生成类型与结构化上下文

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::ModelRole;

/// 需要 AI 文本的界面位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationKind {
    /// 对一篇日记的简短回应
    Reflection,
    /// 下一次书写的引导问题
    JournalPrompt,
    /// 基于心情与已有目标的小目标建议
    GoalSuggestion,
    /// 一周回顾
    WeeklySummary,
    /// 情绪倾向洞察（只需要分类模型）
    MoodInsight,
}

impl GenerationKind {
    pub const ALL: [GenerationKind; 5] = [
        GenerationKind::Reflection,
        GenerationKind::JournalPrompt,
        GenerationKind::GoalSuggestion,
        GenerationKind::WeeklySummary,
        GenerationKind::MoodInsight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Reflection => "reflection",
            GenerationKind::JournalPrompt => "journal-prompt",
            GenerationKind::GoalSuggestion => "goal-suggestion",
            GenerationKind::WeeklySummary => "weekly-summary",
            GenerationKind::MoodInsight => "mood-insight",
        }
    }

    /// 该类型依赖的模型角色
    pub fn role(&self) -> ModelRole {
        match self {
            GenerationKind::MoodInsight => ModelRole::CLASSIFIER,
            _ => ModelRole::GENERATOR,
        }
    }

    /// 模型输入只有日记正文（没有指令与上下文），正文为空时无从推理
    pub fn needs_entry(&self) -> bool {
        matches!(self, GenerationKind::MoodInsight)
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("unknown generation kind '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// 生成时可用的结构化上下文；全部可缺省
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationContext {
    /// 当前心情（如 "anxious"、"calm"）
    pub mood: Option<String>,
    /// 最近几天的心情，按时间先后
    pub recent_moods: Vec<String>,
    pub goals: Vec<String>,
    pub streak_days: u32,
    pub entry_count: u32,
    pub tags: Vec<String>,
}

impl GenerationContext {
    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    pub fn with_recent_moods<I, S>(mut self, moods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recent_moods = moods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_goals<I, S>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.goals = goals.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_streak(mut self, days: u32) -> Self {
        self.streak_days = days;
        self
    }

    pub fn with_entry_count(mut self, count: u32) -> Self {
        self.entry_count = count;
        self
    }

    /// 最近心情中出现次数最多的一个（并列取最早出现的）
    pub fn dominant_mood(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for mood in &self.recent_moods {
            let count = self.recent_moods.iter().filter(|m| *m == mood).count();
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((mood.as_str(), count));
            }
        }
        best.map(|(m, _)| m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roles() {
        assert_eq!(GenerationKind::MoodInsight.role(), ModelRole::CLASSIFIER);
        assert_eq!(GenerationKind::Reflection.role(), ModelRole::GENERATOR);
        assert_eq!(GenerationKind::WeeklySummary.role(), ModelRole::GENERATOR);
        assert!(GenerationKind::MoodInsight.needs_entry());
        assert!(!GenerationKind::WeeklySummary.needs_entry());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("journal-prompt".parse::<GenerationKind>(), Ok(GenerationKind::JournalPrompt));
        assert_eq!("Goal_Suggestion".parse::<GenerationKind>(), Ok(GenerationKind::GoalSuggestion));
        assert!("poem".parse::<GenerationKind>().is_err());
        for kind in GenerationKind::ALL {
            assert_eq!(kind.to_string().parse::<GenerationKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_dominant_mood() {
        let ctx = GenerationContext::default().with_recent_moods(["calm", "tired", "tired", "calm", "tired"]);
        assert_eq!(ctx.dominant_mood(), Some("tired"));
        let tie = GenerationContext::default().with_recent_moods(["calm", "tired"]);
        assert_eq!(tie.dominant_mood(), Some("calm"));
        assert_eq!(GenerationContext::default().dominant_mood(), None);
    }
}
