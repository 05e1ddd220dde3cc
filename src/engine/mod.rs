//! 推理引擎层：不透明的引擎 / 句柄抽象与 Mock 实现

pub mod mock;
pub mod traits;

pub use mock::{HandleBehavior, LoadOutcome, MockEngine, ScriptedEngine};
pub use traits::{
    InferenceEngine, InferenceInput, InferenceOutput, LoadProgressFn, LoadRequest, ModelHandle,
    ModelTask, ScoredLabel,
};
