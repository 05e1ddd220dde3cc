//! 危机短语表：短语 → {类别, 严重度}
//!
//! 内置表覆盖自杀意念、自伤、对他人的风险、间接危机表达、绝望感与行为信号。
//! 可用 TOML 文件整体替换：
//!
//! ```toml
//! [[phrase]]
//! text = "kill myself"
//! category = "crisis_suicidal"
//! severity = "critical"
//! ```

use serde::{Deserialize, Serialize};

use crate::core::HavenError;

/// 有序严重度：low < moderate < high < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseEntry {
    /// 小写短语，按子串包含匹配
    pub text: String,
    pub category: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseTable {
    entries: Vec<PhraseEntry>,
}

#[derive(Deserialize)]
struct PhraseFile {
    phrase: Vec<PhraseEntry>,
}

const BUILTIN: &[(&str, &str, Severity)] = &[
    // 明确的自杀意念
    ("kill myself", "crisis_suicidal", Severity::Critical),
    ("killing myself", "crisis_suicidal", Severity::Critical),
    ("want to die", "crisis_suicidal", Severity::Critical),
    ("wanna die", "crisis_suicidal", Severity::Critical),
    ("end my life", "crisis_suicidal", Severity::Critical),
    ("ending my life", "crisis_suicidal", Severity::Critical),
    ("take my own life", "crisis_suicidal", Severity::Critical),
    ("suicide", "crisis_suicidal", Severity::Critical),
    ("suicidal", "crisis_suicidal", Severity::Critical),
    ("better off dead", "crisis_suicidal", Severity::Critical),
    ("no reason to live", "crisis_suicidal", Severity::Critical),
    ("end it all", "crisis_suicidal", Severity::Critical),
    ("don't want to be alive", "crisis_suicidal", Severity::Critical),
    // 自伤
    ("hurt myself", "crisis_self_harm", Severity::High),
    ("hurting myself", "crisis_self_harm", Severity::High),
    ("harm myself", "crisis_self_harm", Severity::High),
    ("cut myself", "crisis_self_harm", Severity::High),
    ("cutting myself", "crisis_self_harm", Severity::High),
    ("burn myself", "crisis_self_harm", Severity::High),
    ("self harm", "crisis_self_harm", Severity::High),
    ("self-harm", "crisis_self_harm", Severity::High),
    // 对他人的风险
    ("kill someone", "crisis_harm_others", Severity::Critical),
    ("hurt someone", "crisis_harm_others", Severity::High),
    ("hurt them", "crisis_harm_others", Severity::High),
    ("want to kill him", "crisis_harm_others", Severity::Critical),
    ("want to kill her", "crisis_harm_others", Severity::Critical),
    // 人身安全
    ("not safe at home", "crisis_danger", Severity::High),
    ("being abused", "crisis_danger", Severity::High),
    ("afraid for my life", "crisis_danger", Severity::High),
    // 间接表达
    ("i'm done", "crisis_indirect", Severity::Moderate),
    ("im done", "crisis_indirect", Severity::Moderate),
    ("can't go on", "crisis_indirect", Severity::Moderate),
    ("cannot go on", "crisis_indirect", Severity::Moderate),
    ("can't do this anymore", "crisis_indirect", Severity::Moderate),
    ("no way out", "crisis_indirect", Severity::Moderate),
    ("won't be around", "crisis_indirect", Severity::Moderate),
    ("disappear forever", "crisis_indirect", Severity::Moderate),
    // 绝望感
    ("hopeless", "hopelessness", Severity::Moderate),
    ("worthless", "hopelessness", Severity::Moderate),
    ("nothing matters", "hopelessness", Severity::Moderate),
    ("no point in anything", "hopelessness", Severity::Moderate),
    ("burden to everyone", "hopelessness", Severity::Moderate),
    ("a burden", "hopelessness", Severity::Moderate),
    ("giving up", "hopelessness", Severity::Moderate),
    ("trapped", "hopelessness", Severity::Moderate),
    // 行为信号
    ("giving away my", "behavioral", Severity::Moderate),
    ("saying goodbye", "behavioral", Severity::Moderate),
    ("stopped eating", "behavioral", Severity::Moderate),
    ("isolating myself", "behavioral", Severity::Moderate),
    ("haven't slept in days", "behavioral", Severity::Moderate),
    // 一般困扰
    ("overwhelmed", "distress", Severity::Low),
    ("exhausted", "distress", Severity::Low),
    ("panic attack", "distress", Severity::Low),
    ("so lonely", "distress", Severity::Low),
    ("can't cope", "distress", Severity::Low),
];

impl Default for PhraseTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PhraseTable {
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(text, category, severity)| PhraseEntry {
                    text: (*text).to_string(),
                    category: (*category).to_string(),
                    severity: *severity,
                })
                .collect(),
        }
    }

    /// 短语统一规范化为小写；空短语视为配置错误
    pub fn new(entries: Vec<PhraseEntry>) -> Result<Self, HavenError> {
        if entries.is_empty() {
            return Err(HavenError::PhraseTable("phrase table is empty".into()));
        }
        let mut normalized = Vec::with_capacity(entries.len());
        for e in entries {
            let text = super::normalize(&e.text);
            if text.is_empty() || e.category.trim().is_empty() {
                return Err(HavenError::PhraseTable(format!(
                    "invalid entry: {:?} / {:?}",
                    e.text, e.category
                )));
            }
            normalized.push(PhraseEntry { text, ..e });
        }
        Ok(Self { entries: normalized })
    }

    pub fn from_toml_str(s: &str) -> Result<Self, HavenError> {
        let file: PhraseFile =
            toml::from_str(s).map_err(|e| HavenError::PhraseTable(e.to_string()))?;
        Self::new(file.phrase)
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self, HavenError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| HavenError::PhraseTable(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&data)
    }

    pub fn entries(&self) -> &[PhraseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Low < Severity::Moderate);
        assert!(Severity::Moderate < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_builtin_phrases_are_lowercase() {
        let table = PhraseTable::builtin();
        assert!(!table.is_empty());
        assert!(table.entries().iter().all(|e| e.text == e.text.to_lowercase()));
    }

    #[test]
    fn test_toml_table_is_normalized() {
        let table = PhraseTable::from_toml_str(
            r#"
[[phrase]]
text = "Can't   Breathe"
category = "distress"
severity = "low"
"#,
        )
        .unwrap();
        assert_eq!(table.entries()[0].text, "can't breathe");
    }

    #[test]
    fn test_invalid_tables_are_rejected() {
        assert!(PhraseTable::from_toml_str("phrase = []").is_err());
        assert!(PhraseTable::from_toml_str("not toml [").is_err());
        assert!(PhraseTable::from_toml_str(
            r#"
[[phrase]]
text = "  "
category = "distress"
severity = "low"
"#
        )
        .is_err());
    }
}
