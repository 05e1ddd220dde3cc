//! 推理引擎抽象
//!
//! 引擎本身是不透明的能力：按请求绑定一个模型（可能需要下载），返回模型句柄；
//! 句柄只做一件事：对输入文本跑一次推理。所有错误都以字符串返回，由上层按消息归类。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ModelRole;
use crate::probe::Strategy;

/// 角色对应的推理能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelTask {
    /// 轻量序列分类
    #[serde(rename = "text-classification")]
    TextClassification,
    /// 序列到序列生成
    #[serde(rename = "text2text-generation")]
    Text2TextGeneration,
}

/// 单条分类结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f32,
}

/// 一次推理的输出
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InferenceOutput {
    Labels { labels: Vec<ScoredLabel> },
    Text { text: String },
}

impl InferenceOutput {
    /// 结果是否格式正确且非空（用于加载后的实时验证）
    pub fn is_well_formed(&self) -> bool {
        match self {
            InferenceOutput::Labels { labels } => {
                !labels.is_empty()
                    && labels
                        .iter()
                        .all(|l| !l.label.trim().is_empty() && l.score.is_finite())
            }
            InferenceOutput::Text { text } => !text.trim().is_empty(),
        }
    }

    pub fn top_label(&self) -> Option<&ScoredLabel> {
        match self {
            InferenceOutput::Labels { labels } => labels
                .iter()
                .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal)),
            InferenceOutput::Text { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            InferenceOutput::Text { text } => Some(text.as_str()),
            InferenceOutput::Labels { .. } => None,
        }
    }
}

/// 推理输入：文本 + 生成上限（分类时忽略）
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceInput {
    pub text: String,
    pub max_new_tokens: Option<u32>,
}

impl InferenceInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_new_tokens: None,
        }
    }

    pub fn with_max_new_tokens(mut self, n: u32) -> Self {
        self.max_new_tokens = Some(n);
        self
    }
}

/// 绑定请求
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub role: ModelRole,
    pub task: ModelTask,
    pub config_id: String,
    /// 探测得到的执行策略，引擎据此选择量化 / 线程数 / 设备
    pub strategy: Strategy,
}

/// 引擎加载进度回调：参数为 0.0-1.0 的局部进度与可选说明（如文件名）
pub type LoadProgressFn = Arc<dyn Fn(f32, Option<String>) + Send + Sync>;

/// 已绑定的模型句柄
#[async_trait]
pub trait ModelHandle: Send + Sync {
    async fn run(&self, input: &InferenceInput) -> Result<InferenceOutput, String>;
}

/// 推理引擎
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn load(
        &self,
        request: &LoadRequest,
        on_progress: LoadProgressFn,
    ) -> Result<Arc<dyn ModelHandle>, String>;
}
