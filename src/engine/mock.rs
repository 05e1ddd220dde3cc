//! Mock 推理引擎（用于测试与演示，无需真实模型）
//!
//! - MockEngine：总能加载成功；分类按关键词给出情绪标签，生成返回一段温和的反思文本
//! - ScriptedEngine：按角色排队预设加载结果，记录加载 / 推理次数，便于驱动状态机测试

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::ModelRole;
use crate::engine::{
    InferenceEngine, InferenceInput, InferenceOutput, LoadProgressFn, LoadRequest, ModelHandle,
    ModelTask, ScoredLabel,
};

const NEGATIVE_WORDS: &[&str] = &[
    "sad", "tired", "angry", "lonely", "anxious", "stress", "worried", "hurt", "bad", "awful",
];
const POSITIVE_WORDS: &[&str] = &[
    "happy", "grateful", "calm", "proud", "good", "great", "excited", "love", "rested", "hope",
];

/// Mock 客户端：总能加载；按任务类型返回确定性的输出
#[derive(Debug, Default)]
pub struct MockEngine {
    /// 每个加载阶段的模拟耗时
    pub step_delay: Duration,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MockHandle {
    task: ModelTask,
}

#[async_trait]
impl ModelHandle for MockHandle {
    async fn run(&self, input: &InferenceInput) -> Result<InferenceOutput, String> {
        let lower = input.text.to_lowercase();
        match self.task {
            ModelTask::TextClassification => {
                let neg = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f32;
                let pos = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f32;
                let positive = (pos + 1.0) / (pos + neg + 2.0);
                Ok(InferenceOutput::Labels {
                    labels: vec![
                        ScoredLabel { label: "POSITIVE".into(), score: positive },
                        ScoredLabel { label: "NEGATIVE".into(), score: 1.0 - positive },
                    ],
                })
            }
            ModelTask::Text2TextGeneration => {
                let focus = input
                    .text
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("today")
                    .trim();
                let mut text = format!(
                    "Thank you for sharing this. What stands out when you reread \"{}\"?",
                    focus.chars().take(80).collect::<String>()
                );
                if let Some(limit) = input.max_new_tokens {
                    let words: Vec<&str> = text.split_whitespace().take(limit as usize).collect();
                    text = words.join(" ");
                }
                Ok(InferenceOutput::Text { text })
            }
        }
    }
}

#[async_trait]
impl InferenceEngine for MockEngine {
    async fn load(
        &self,
        request: &LoadRequest,
        on_progress: LoadProgressFn,
    ) -> Result<Arc<dyn ModelHandle>, String> {
        for step in 1..=4u32 {
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            on_progress(
                step as f32 / 4.0,
                Some(format!("{}/shard-{step}.bin", request.config_id)),
            );
        }
        Ok(Arc::new(MockHandle { task: request.task }))
    }
}

/// 预设的句柄行为
#[derive(Debug, Clone, PartialEq)]
pub enum HandleBehavior {
    /// 正常输出
    Healthy,
    /// 输出为空（验证失败）
    Empty,
    /// 推理报错
    Fails(String),
    /// 推理挂起直到超时
    Hangs,
}

/// 预设的一次加载结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Bind(HandleBehavior),
    Error(String),
}

struct ScriptedHandle {
    task: ModelTask,
    behavior: HandleBehavior,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl ModelHandle for ScriptedHandle {
    async fn run(&self, input: &InferenceInput) -> Result<InferenceOutput, String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            HandleBehavior::Healthy => MockHandle { task: self.task }.run(input).await,
            HandleBehavior::Empty => Ok(match self.task {
                ModelTask::TextClassification => InferenceOutput::Labels { labels: vec![] },
                ModelTask::Text2TextGeneration => InferenceOutput::Text { text: String::new() },
            }),
            HandleBehavior::Fails(msg) => Err(msg.clone()),
            HandleBehavior::Hangs => futures_util::future::pending().await,
        }
    }
}

/// 脚本化引擎：每个角色一条结果队列，队列空时使用 fallback
pub struct ScriptedEngine {
    queues: Mutex<HashMap<ModelRole, VecDeque<LoadOutcome>>>,
    fallback: LoadOutcome,
    load_delay: Duration,
    loads: Mutex<HashMap<ModelRole, usize>>,
    runs: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    /// 队列耗尽后总是成功绑定健康句柄
    pub fn healthy() -> Self {
        Self::with_fallback(LoadOutcome::Bind(HandleBehavior::Healthy))
    }

    pub fn with_fallback(fallback: LoadOutcome) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            fallback,
            load_delay: Duration::ZERO,
            loads: Mutex::new(HashMap::new()),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 每次加载前等待（模拟下载耗时）
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn push(&self, role: &ModelRole, outcome: LoadOutcome) {
        if let Ok(mut q) = self.queues.lock() {
            q.entry(role.clone()).or_default().push_back(outcome);
        }
    }

    /// 某角色累计被调用 load 的次数
    pub fn load_count(&self, role: &ModelRole) -> usize {
        self.loads
            .lock()
            .map(|l| l.get(role).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.loads.lock().map(|l| l.values().sum()).unwrap_or(0)
    }

    /// 所有句柄累计推理次数（含验证调用）
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn load(
        &self,
        request: &LoadRequest,
        on_progress: LoadProgressFn,
    ) -> Result<Arc<dyn ModelHandle>, String> {
        if let Ok(mut loads) = self.loads.lock() {
            *loads.entry(request.role.clone()).or_default() += 1;
        }
        let outcome = self
            .queues
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&request.role).and_then(|d| d.pop_front()))
            .unwrap_or_else(|| self.fallback.clone());

        on_progress(0.0, None);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }

        match outcome {
            LoadOutcome::Bind(behavior) => {
                on_progress(1.0, None);
                Ok(Arc::new(ScriptedHandle {
                    task: request.task,
                    behavior,
                    runs: Arc::clone(&self.runs),
                }))
            }
            LoadOutcome::Error(msg) => Err(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Strategy;

    fn request(task: ModelTask) -> LoadRequest {
        LoadRequest {
            role: ModelRole::CLASSIFIER,
            task,
            config_id: "test".into(),
            strategy: Strategy::Standard,
        }
    }

    #[tokio::test]
    async fn test_mock_engine_classifies_sentiment() {
        let handle = MockEngine::new()
            .load(&request(ModelTask::TextClassification), Arc::new(|_, _| {}))
            .await
            .unwrap();
        let out = handle
            .run(&InferenceInput::new("I feel calm and grateful"))
            .await
            .unwrap();
        assert_eq!(out.top_label().unwrap().label, "POSITIVE");
    }

    #[tokio::test]
    async fn test_mock_engine_reports_progress_to_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        MockEngine::new()
            .load(
                &request(ModelTask::Text2TextGeneration),
                Arc::new(move |p, _| seen_cb.lock().unwrap().push(p)),
            )
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn test_scripted_engine_pops_queue_then_falls_back() {
        let engine = ScriptedEngine::healthy();
        engine.push(&ModelRole::CLASSIFIER, LoadOutcome::Error("Failed to fetch".into()));

        let first = engine
            .load(&request(ModelTask::TextClassification), Arc::new(|_, _| {}))
            .await;
        assert!(first.is_err());
        let second = engine
            .load(&request(ModelTask::TextClassification), Arc::new(|_, _| {}))
            .await;
        assert!(second.is_ok());
        assert_eq!(engine.load_count(&ModelRole::CLASSIFIER), 2);
    }
}
