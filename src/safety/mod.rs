//! 安全层：危机短语表、分类器、判定结果与固定安全文案
//!
//! 分类器不依赖任何模型，模型未就绪时同样可用。

pub mod classifier;
pub mod phrases;
pub mod verdict;

pub use classifier::{CrisisClassifier, EscalationRule};
pub use phrases::{PhraseEntry, PhraseTable, Severity};
pub use verdict::{CrisisVerdict, RecommendedAction};

/// critical 判定时直接返回给用户的文案（不经过任何模型）
pub const CRISIS_RESPONSE: &str = "It sounds like you are going through something really painful, \
and you deserve support right now. If you are in immediate danger, please call your local \
emergency number. In the US you can call or text 988 to reach the Suicide & Crisis Lifeline, \
or text HOME to 741741 to reach the Crisis Text Line. You don't have to face this alone.";

/// high 判定或需要支持时附带的提示
pub const SUPPORT_NOTE: &str = "If things feel heavy, reaching out to someone you trust or a \
support line such as 988 can help.";

/// 匹配前的文本规范化：小写、弯引号折叠为直引号、空白合并
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}
