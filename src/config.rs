//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HAVEN__*` 覆盖（双下划线表示嵌套，如 `HAVEN__LIFECYCLE__COOLDOWN_SECS=60`）。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{BackoffPolicy, HavenError};
use crate::engine::ModelTask;
use crate::safety::Severity;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub lifecycle: LifecycleSection,
    /// 角色名 → 模型配置；缺省为 classifier + generator
    pub models: BTreeMap<String, ModelSection>,
    pub safety: SafetySection,
    pub generation: GenerationSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            lifecycle: LifecycleSection::default(),
            models: default_models(),
            safety: SafetySection::default(),
            generation: GenerationSection::default(),
        }
    }
}

/// [app] 段：应用名、数据目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// 版本记录等持久化文件所在目录，未设置时用 ./data
    pub data_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            data_dir: None,
        }
    }
}

fn default_app_name() -> String {
    "haven".to_string()
}

/// [lifecycle] 段：重试、退避、冷却、缓存有效期
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_call: u32,
    /// 连续失败多少轮后进入冷却
    #[serde(default = "default_cooldown_after")]
    pub cooldown_after_failures: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_progress_throttle_ms")]
    pub progress_throttle_ms: u64,
    #[serde(default = "default_cache_max_age_days")]
    pub cache_max_age_days: u64,
    /// 指定了生成模型配置时优先调度 generator
    #[serde(default)]
    pub generator_first: bool,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            max_attempts_per_call: default_max_attempts(),
            cooldown_after_failures: default_cooldown_after(),
            cooldown_secs: default_cooldown_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_max_ms: default_backoff_max_ms(),
            progress_throttle_ms: default_progress_throttle_ms(),
            cache_max_age_days: default_cache_max_age_days(),
            generator_first: false,
        }
    }
}

impl LifecycleSection {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_ms: self.backoff_base_ms,
            factor: self.backoff_factor,
            max_ms: self.backoff_max_ms,
            max_attempts: self.max_attempts_per_call,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.progress_throttle_ms)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_days * 24 * 60 * 60)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_cooldown_after() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_progress_throttle_ms() -> u64 {
    100
}

fn default_cache_max_age_days() -> u64 {
    7
}

/// [models.<role>] 段：任务类型、绑定的模型变体、验证输入与超时
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    pub task: ModelTask,
    pub config_id: String,
    /// 可切换的模型变体（为空时只允许 config_id 本身）
    #[serde(default)]
    pub available: Vec<String>,
    pub verify_input: String,
    pub verify_timeout_ms: u64,
}

impl ModelSection {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn allows(&self, config_id: &str) -> bool {
        self.config_id == config_id || self.available.iter().any(|c| c == config_id)
    }
}

fn default_models() -> BTreeMap<String, ModelSection> {
    let mut models = BTreeMap::new();
    models.insert(
        "classifier".to_string(),
        ModelSection {
            task: ModelTask::TextClassification,
            config_id: "distilbert-sst2-int8".to_string(),
            available: vec!["distilbert-sst2-int8".to_string()],
            verify_input: "I feel okay today.".to_string(),
            verify_timeout_ms: 5_000,
        },
    );
    models.insert(
        "generator".to_string(),
        ModelSection {
            task: ModelTask::Text2TextGeneration,
            config_id: "flan-t5-small".to_string(),
            available: vec!["flan-t5-small".to_string(), "flan-t5-base".to_string()],
            verify_input: "Write one short kind sentence about journaling.".to_string(),
            verify_timeout_ms: 10_000,
        },
    );
    models
}

/// [safety] 段：危机短语表覆盖与升级规则
#[derive(Debug, Clone, Deserialize)]
pub struct SafetySection {
    /// 自定义短语表 TOML 路径；未设置用内置表
    pub phrase_table: Option<PathBuf>,
    /// 与危机类别同时出现时触发升级的一般风险类别
    #[serde(default = "default_escalation_categories")]
    pub escalation_categories: Vec<String>,
    #[serde(default = "default_crisis_prefix")]
    pub crisis_prefix: String,
    /// 仅当最高严重度恰为该值时升级
    #[serde(default = "default_escalation_when_max_is")]
    pub escalation_when_max_is: Severity,
    #[serde(default = "default_escalation_to")]
    pub escalation_to: Severity,
    /// 命中后建议联系支持的类别（自伤 / 第三方风险）
    #[serde(default = "default_support_categories")]
    pub support_categories: Vec<String>,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            phrase_table: None,
            escalation_categories: default_escalation_categories(),
            crisis_prefix: default_crisis_prefix(),
            escalation_when_max_is: default_escalation_when_max_is(),
            escalation_to: default_escalation_to(),
            support_categories: default_support_categories(),
        }
    }
}

fn default_escalation_categories() -> Vec<String> {
    vec!["hopelessness".to_string(), "behavioral".to_string()]
}

fn default_crisis_prefix() -> String {
    "crisis_".to_string()
}

fn default_escalation_when_max_is() -> Severity {
    Severity::Moderate
}

fn default_escalation_to() -> Severity {
    Severity::High
}

fn default_support_categories() -> Vec<String> {
    vec!["crisis_self_harm".to_string(), "crisis_harm_others".to_string()]
}

/// [generation] 段：生成调用超时与长度上限
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_generation_timeout_secs(),
            max_new_tokens: default_max_new_tokens(),
        }
    }
}

impl GenerationSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generation_timeout_secs() -> u64 {
    30
}

fn default_max_new_tokens() -> u32 {
    96
}

impl AppConfig {
    /// 配置错误属于程序缺陷，构建运行时前统一校验
    pub fn validate(&self) -> Result<(), HavenError> {
        if self.models.is_empty() {
            return Err(HavenError::InvalidConfig("no model roles configured".into()));
        }
        for (role, m) in &self.models {
            if m.config_id.trim().is_empty() {
                return Err(HavenError::InvalidConfig(format!("[models.{role}] config_id is empty")));
            }
            if m.verify_input.trim().is_empty() {
                return Err(HavenError::InvalidConfig(format!("[models.{role}] verify_input is empty")));
            }
            if m.verify_timeout_ms == 0 {
                return Err(HavenError::InvalidConfig(format!("[models.{role}] verify_timeout_ms must be > 0")));
            }
        }
        let l = &self.lifecycle;
        if l.max_attempts_per_call == 0 {
            return Err(HavenError::InvalidConfig("max_attempts_per_call must be >= 1".into()));
        }
        if l.cooldown_after_failures == 0 {
            return Err(HavenError::InvalidConfig("cooldown_after_failures must be >= 1".into()));
        }
        if !(l.backoff_factor.is_finite() && l.backoff_factor >= 1.0) {
            return Err(HavenError::InvalidConfig("backoff_factor must be >= 1.0".into()));
        }
        if self.safety.crisis_prefix.is_empty() {
            return Err(HavenError::InvalidConfig("safety.crisis_prefix is empty".into()));
        }
        if self.safety.escalation_to < self.safety.escalation_when_max_is {
            return Err(HavenError::InvalidConfig(
                "safety.escalation_to must not be below escalation_when_max_is".into(),
            ));
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.app
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data"))
    }
}

/// 从 config 目录加载配置，环境变量 HAVEN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HAVEN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HAVEN")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.lifecycle.cooldown(), Duration::from_secs(30));
        assert_eq!(cfg.lifecycle.backoff(), BackoffPolicy::default());
        assert_eq!(cfg.models["classifier"].verify_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.models["generator"].verify_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haven.toml");
        std::fs::write(
            &path,
            r#"
[lifecycle]
cooldown_secs = 5
generator_first = true

[models.generator]
task = "text2text-generation"
config_id = "flan-t5-base"
available = ["flan-t5-small", "flan-t5-base"]
verify_input = "Say hi."
verify_timeout_ms = 2000
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.lifecycle.cooldown_secs, 5);
        assert!(cfg.lifecycle.generator_first);
        assert_eq!(cfg.lifecycle.max_attempts_per_call, 3);
        assert_eq!(cfg.models["generator"].config_id, "flan-t5-base");
        assert!(cfg.models["generator"].allows("flan-t5-small"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.models.get_mut("classifier").unwrap().config_id = " ".into();
        assert!(matches!(cfg.validate(), Err(HavenError::InvalidConfig(_))));

        let mut cfg = AppConfig::default();
        cfg.lifecycle.backoff_factor = 0.5;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.safety.escalation_to = Severity::Low;
        assert!(matches!(cfg.validate(), Err(HavenError::InvalidConfig(_))));
    }

    #[test]
    fn test_escalation_thresholds_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haven.toml");
        std::fs::write(
            &path,
            r#"
[safety]
escalation_when_max_is = "high"
escalation_to = "critical"
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.safety.escalation_when_max_is, Severity::High);
        assert_eq!(cfg.safety.escalation_to, Severity::Critical);
        assert_eq!(cfg.safety.crisis_prefix, "crisis_");
        cfg.validate().unwrap();
    }
}
