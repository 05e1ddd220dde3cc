//! 生成编排：安全检查 → 模型就绪 → 推理 → 规则兜底
//!
//! `generate` 永远返回文本，不向调用方传播模型错误。critical 判定直接返回固定安全文案，
//! 不触碰任何模型（模型加载中或完全离线时同样可达）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::GenerationSection;
use crate::core::ModelRole;
use crate::engine::{InferenceInput, InferenceOutput};
use crate::generation::fallback::{fallback_text, insight_from_label};
use crate::generation::prompt::build_prompt;
use crate::generation::{GenerationContext, GenerationKind};
use crate::lifecycle::ModelLifecycle;
use crate::safety::{CrisisClassifier, CrisisVerdict, CRISIS_RESPONSE};

/// 编排器看到的模型侧接口（生产实现为 ModelLifecycle，测试可替换为 spy）
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn ensure_ready(&self, role: &ModelRole) -> bool;

    async fn infer(&self, role: &ModelRole, input: &InferenceInput) -> Result<InferenceOutput, String>;
}

#[async_trait]
impl ModelGateway for ModelLifecycle {
    async fn ensure_ready(&self, role: &ModelRole) -> bool {
        ModelLifecycle::ensure_ready(self, role).await
    }

    async fn infer(&self, role: &ModelRole, input: &InferenceInput) -> Result<InferenceOutput, String> {
        ModelLifecycle::infer(self, role, input).await
    }
}

/// 文本来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    /// 危机安全文案，未调用任何模型
    Safety,
    Model,
    /// 规则模板
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub text: String,
    #[serde(rename = "wasAIGenerated")]
    pub was_ai_generated: bool,
    pub source: OutcomeSource,
    /// 本次请求的危机判定；界面据此决定是否附带支持信息
    pub verdict: CrisisVerdict,
}

pub struct GenerationOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    classifier: Arc<CrisisClassifier>,
    timeout: Duration,
    max_new_tokens: u32,
}

impl GenerationOrchestrator {
    pub fn new(gateway: Arc<dyn ModelGateway>, classifier: Arc<CrisisClassifier>) -> Self {
        let defaults = GenerationSection::default();
        Self {
            gateway,
            classifier,
            timeout: defaults.timeout(),
            max_new_tokens: defaults.max_new_tokens,
        }
    }

    pub fn with_settings(mut self, cfg: &GenerationSection) -> Self {
        self.timeout = cfg.timeout();
        self.max_new_tokens = cfg.max_new_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn classifier(&self) -> &CrisisClassifier {
        &self.classifier
    }

    pub async fn generate(
        &self,
        kind: GenerationKind,
        user_text: &str,
        ctx: &GenerationContext,
    ) -> GenerationOutcome {
        // 每次请求都重新判定，不缓存
        let verdict = self.classifier.classify(user_text);
        if verdict.blocks_ai() {
            tracing::warn!(
                kind = %kind,
                categories = ?verdict.matched_categories,
                "Crisis language detected; returning safety response without model"
            );
            return GenerationOutcome {
                text: CRISIS_RESPONSE.to_string(),
                was_ai_generated: false,
                source: OutcomeSource::Safety,
                verdict,
            };
        }

        let role = kind.role();
        let text = match self.try_model(kind, &role, user_text, ctx).await {
            Some(text) => {
                tracing::info!(kind = %kind, role = %role, "Generated with model");
                return GenerationOutcome {
                    text,
                    was_ai_generated: true,
                    source: OutcomeSource::Model,
                    verdict,
                };
            }
            None => fallback_text(kind, user_text, ctx),
        };
        GenerationOutcome {
            text,
            was_ai_generated: false,
            source: OutcomeSource::Fallback,
            verdict,
        }
    }

    async fn try_model(
        &self,
        kind: GenerationKind,
        role: &ModelRole,
        user_text: &str,
        ctx: &GenerationContext,
    ) -> Option<String> {
        if kind.needs_entry() && user_text.trim().is_empty() {
            tracing::debug!(kind = %kind, "Empty entry; using fallback without model");
            return None;
        }
        if !self.gateway.ensure_ready(role).await {
            tracing::info!(kind = %kind, role = %role, "Model not ready; using fallback");
            return None;
        }

        let input = InferenceInput::new(build_prompt(kind, user_text, ctx)).with_max_new_tokens(self.max_new_tokens);
        let output = match tokio::time::timeout(self.timeout, self.gateway.infer(role, &input)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(kind = %kind, role = %role, error = %e, "Inference failed; using fallback");
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    kind = %kind,
                    role = %role,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Inference timed out; using fallback"
                );
                return None;
            }
        };

        let text = match &output {
            InferenceOutput::Labels { .. } => output.top_label().map(insight_from_label),
            InferenceOutput::Text { .. } => output.text().map(|t| t.trim().to_string()),
        };
        match text {
            Some(t) if !t.is_empty() => Some(t),
            _ => {
                tracing::warn!(kind = %kind, role = %role, "Model returned empty output; using fallback");
                None
            }
        }
    }
}
