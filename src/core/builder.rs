//! 运行时构建器：每个进程一个 HavenRuntime
//!
//! 探测器、进度总线、生命周期管理器、危机分类器与生成编排器在这里统一装配，
//! 之后以显式对象注入界面层，不使用全局单例。平台、引擎与存储均可替换。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::HavenError;
use crate::engine::{InferenceEngine, MockEngine};
use crate::generation::{GenerationContext, GenerationKind, GenerationOrchestrator, GenerationOutcome};
use crate::lifecycle::ModelLifecycle;
use crate::probe::{CapabilityProbe, CompatibilityReport, NativeHost, PlatformHost};
use crate::progress::ProgressBus;
use crate::safety::{CrisisClassifier, CrisisVerdict};
use crate::storage::{FileStore, KeyValueStore};

/// 版本记录文件名（位于 data_dir 下）
pub const RECORD_FILE: &str = "model-cache.json";

pub struct RuntimeBuilder {
    config: AppConfig,
    host: Option<Arc<dyn PlatformHost>>,
    engine: Option<Arc<dyn InferenceEngine>>,
    store: Option<Arc<dyn KeyValueStore>>,
    bus: Option<ProgressBus>,
}

impl RuntimeBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            host: None,
            engine: None,
            store: None,
            bus: None,
        }
    }

    /// 平台探测接口（默认 NativeHost）
    pub fn with_host(mut self, host: Arc<dyn PlatformHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// 推理引擎（默认 MockEngine）
    pub fn with_engine(mut self, engine: Arc<dyn InferenceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// 版本记录存储（默认 data_dir/model-cache.json）
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_bus(mut self, bus: ProgressBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build(self) -> Result<HavenRuntime, HavenError> {
        self.config.validate()?;

        let host = self.host.unwrap_or_else(|| Arc::new(NativeHost::new()));
        let engine = self.engine.unwrap_or_else(|| Arc::new(MockEngine::new()));
        let store = match self.store {
            Some(s) => s,
            None => Arc::new(FileStore::new(self.config.data_dir().join(RECORD_FILE))),
        };
        let bus = self.bus.unwrap_or_default();

        let probe = Arc::new(CapabilityProbe::new(host));
        let lifecycle = ModelLifecycle::from_config(&self.config, engine, probe.clone(), store, bus.clone())?;
        let classifier = Arc::new(CrisisClassifier::from_config(&self.config.safety)?);
        let orchestrator = GenerationOrchestrator::new(Arc::new(lifecycle.clone()), classifier.clone())
            .with_settings(&self.config.generation);

        tracing::info!(
            app = %self.config.app.name,
            roles = ?lifecycle.roles().iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            "Haven runtime ready"
        );

        Ok(HavenRuntime {
            config: self.config,
            probe,
            bus,
            lifecycle,
            classifier,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

/// 装配完成的运行时：界面层持有它即可访问全部能力
#[derive(Clone)]
pub struct HavenRuntime {
    pub config: AppConfig,
    pub probe: Arc<CapabilityProbe>,
    pub bus: ProgressBus,
    pub lifecycle: ModelLifecycle,
    pub classifier: Arc<CrisisClassifier>,
    pub orchestrator: Arc<GenerationOrchestrator>,
}

impl HavenRuntime {
    /// 会话内缓存的能力报告
    pub fn report(&self) -> CompatibilityReport {
        self.probe.report()
    }

    pub fn classify(&self, text: &str) -> CrisisVerdict {
        self.classifier.classify(text)
    }

    pub async fn generate(
        &self,
        kind: GenerationKind,
        user_text: &str,
        ctx: &GenerationContext,
    ) -> GenerationOutcome {
        self.orchestrator.generate(kind, user_text, ctx).await
    }
}

/// 便捷函数：加载配置（失败时退回默认值）并创建构建器
pub fn create_runtime_builder(config_path: Option<PathBuf>) -> RuntimeBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    RuntimeBuilder::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ModelRole;
    use crate::engine::ScriptedEngine;
    use crate::generation::OutcomeSource;
    use crate::probe::FixedHost;
    use crate::storage::MemoryStore;

    fn builder(host: FixedHost) -> RuntimeBuilder {
        RuntimeBuilder::new(AppConfig::default())
            .with_host(Arc::new(host))
            .with_engine(Arc::new(ScriptedEngine::healthy()))
            .with_store(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_runtime_generates_with_models() {
        let rt = builder(FixedHost::capable()).build().unwrap();
        assert!(rt.report().can_run_inference);
        let out = rt
            .generate(GenerationKind::Reflection, "nice walk today", &GenerationContext::default())
            .await;
        assert!(out.was_ai_generated);
        assert!(rt.lifecycle.is_ready(&ModelRole::GENERATOR));
    }

    #[tokio::test]
    async fn test_runtime_without_runtime_falls_back() {
        let rt = builder(FixedHost::without_runtime()).build().unwrap();
        let out = rt
            .generate(GenerationKind::JournalPrompt, "", &GenerationContext::default())
            .await;
        assert_eq!(out.source, OutcomeSource::Fallback);
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let mut cfg = AppConfig::default();
        cfg.models.clear();
        let result = RuntimeBuilder::new(cfg)
            .with_store(Arc::new(MemoryStore::new()))
            .build();
        assert!(matches!(result, Err(HavenError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_phrase_table_fails_build() {
        let mut cfg = AppConfig::default();
        cfg.safety.phrase_table = Some(PathBuf::from("/nonexistent/phrases.toml"));
        let result = RuntimeBuilder::new(cfg)
            .with_host(Arc::new(FixedHost::capable()))
            .with_store(Arc::new(MemoryStore::new()))
            .build();
        assert!(matches!(result, Err(HavenError::PhraseTable(_))));
    }
}
