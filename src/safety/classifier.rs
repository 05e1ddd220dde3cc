//! 危机文本分类器：纯函数、同步、确定性
//!
//! 1. 文本规范化（小写、弯引号折叠、空白合并）
//! 2. 对短语表逐条做子串包含匹配：宁可误报也不漏报
//! 3. 取所有命中的最高严重度，类别去重
//! 4. 升级规则：一般风险类别与危机类别同时出现且最高仅为 moderate 时升到 high
//! 5. 动作映射：critical → emergency；high 或自伤 / 第三方风险 → contact_support；其余命中 → show_info

use crate::config::SafetySection;
use crate::safety::{normalize, CrisisVerdict, PhraseTable, RecommendedAction, Severity};

/// 共现升级规则（启发式策略参数，非临床结论）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationRule {
    /// 触发升级所需的一般风险类别（命中任一即可）
    pub general_categories: Vec<String>,
    /// 危机类别前缀
    pub crisis_prefix: String,
    /// 仅当当前最高严重度恰为该值时升级
    pub when_max_is: Severity,
    pub escalate_to: Severity,
}

impl Default for EscalationRule {
    fn default() -> Self {
        Self {
            general_categories: vec!["hopelessness".to_string(), "behavioral".to_string()],
            crisis_prefix: "crisis_".to_string(),
            when_max_is: Severity::Moderate,
            escalate_to: Severity::High,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrisisClassifier {
    table: PhraseTable,
    escalation: EscalationRule,
    support_categories: Vec<String>,
}

impl Default for CrisisClassifier {
    fn default() -> Self {
        Self::new(PhraseTable::builtin())
    }
}

impl CrisisClassifier {
    pub fn new(table: PhraseTable) -> Self {
        Self {
            table,
            escalation: EscalationRule::default(),
            support_categories: vec!["crisis_self_harm".to_string(), "crisis_harm_others".to_string()],
        }
    }

    /// 按 [safety] 配置构建；phrase_table 指向的文件无效时返回错误
    pub fn from_config(cfg: &SafetySection) -> Result<Self, crate::core::HavenError> {
        let table = match &cfg.phrase_table {
            Some(path) => PhraseTable::from_path(path)?,
            None => PhraseTable::builtin(),
        };
        Ok(Self::new(table)
            .with_escalation(EscalationRule {
                general_categories: cfg.escalation_categories.clone(),
                crisis_prefix: cfg.crisis_prefix.clone(),
                when_max_is: cfg.escalation_when_max_is,
                escalate_to: cfg.escalation_to,
            })
            .with_support_categories(cfg.support_categories.clone()))
    }

    pub fn with_escalation(mut self, rule: EscalationRule) -> Self {
        self.escalation = rule;
        self
    }

    pub fn with_support_categories(mut self, categories: Vec<String>) -> Self {
        self.support_categories = categories;
        self
    }

    pub fn classify(&self, text: &str) -> CrisisVerdict {
        let haystack = normalize(text);
        if haystack.is_empty() {
            return CrisisVerdict::clear();
        }

        let mut categories: Vec<String> = Vec::new();
        let mut phrases: Vec<String> = Vec::new();
        let mut max_severity: Option<Severity> = None;

        for entry in self.table.entries() {
            if haystack.contains(entry.text.as_str()) {
                phrases.push(entry.text.clone());
                if !categories.iter().any(|c| c == &entry.category) {
                    categories.push(entry.category.clone());
                }
                max_severity = Some(max_severity.map_or(entry.severity, |m| m.max(entry.severity)));
            }
        }

        let Some(mut severity) = max_severity else {
            return CrisisVerdict::clear();
        };

        let rule = &self.escalation;
        let has_general = categories
            .iter()
            .any(|c| rule.general_categories.iter().any(|g| g == c));
        let has_crisis = categories.iter().any(|c| c.starts_with(&rule.crisis_prefix));
        if has_general && has_crisis && severity == rule.when_max_is {
            severity = rule.escalate_to;
        }

        let needs_support = categories
            .iter()
            .any(|c| self.support_categories.iter().any(|s| s == c));
        let recommended_action = if severity == Severity::Critical {
            RecommendedAction::Emergency
        } else if severity == Severity::High || needs_support {
            RecommendedAction::ContactSupport
        } else {
            RecommendedAction::ShowInfo
        };

        CrisisVerdict {
            is_crisis: has_crisis || severity >= Severity::High,
            severity,
            matched_categories: categories,
            matched_phrases: phrases,
            recommended_action,
        }
    }
}
