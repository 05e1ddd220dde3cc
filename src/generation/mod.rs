//! 生成编排层：危机闸门、模型调用与规则兜底

pub mod fallback;
pub mod kind;
pub mod orchestrator;
pub mod prompt;

pub use fallback::{fallback_text, insight_from_label};
pub use kind::{GenerationContext, GenerationKind};
pub use orchestrator::{GenerationOrchestrator, GenerationOutcome, ModelGateway, OutcomeSource};
pub use prompt::build_prompt;
