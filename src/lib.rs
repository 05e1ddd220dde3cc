//! Haven - 端侧 AI 可用性与安全编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与恢复、退避时间表、角色与状态、运行时构建
//! - **engine**: 推理引擎 / 模型句柄抽象与 Mock 实现
//! - **generation**: 生成编排（危机闸门、模型调用、规则兜底）
//! - **lifecycle**: 模型槽位、版本记录、实时验证与加载状态机
//! - **observability**: tracing 日志初始化
//! - **probe**: 设备能力探测与执行策略
//! - **progress**: 进度总线与回调节流
//! - **safety**: 危机短语表与分类器
//! - **storage**: 键值存储（内存 / JSON 文件）

pub mod config;
pub mod core;
pub mod engine;
pub mod generation;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod progress;
pub mod safety;
pub mod storage;

pub use crate::core::{create_runtime_builder, HavenRuntime, RuntimeBuilder};
pub use crate::generation::{GenerationContext, GenerationKind, GenerationOutcome};
pub use crate::safety::{CrisisClassifier, CrisisVerdict};
