//! 模型生命周期管理器
//!
//! 每个角色一个槽位（classifier / generator / 配置中的其他角色），状态机为
//! `unloaded → loading → {ready | failed}`。核心约束：
//! - 每个槽位同时最多一个进行中的加载，并发调用 ensure_ready 拿到同一个共享 future
//! - 加载在独立的 tokio 任务中运行，调用方丢弃 future 不会中止加载
//! - 连续失败达到阈值后进入冷却，冷却期内直接返回 false；force_reload 可绕过
//! - 只有通过实时验证的句柄才能进入 ready
//!
//! 所有预期内的失败都以 `false` 结束，并通过进度总线旁路上报。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{self, FutureExt};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::{
    BackoffPolicy, HavenError, LoadError, ModelRole, ModelStatus, RecoveryAction, RecoveryEngine,
    SlotState,
};
use crate::engine::{
    InferenceEngine, InferenceInput, InferenceOutput, LoadProgressFn, LoadRequest, ModelHandle,
    ModelTask,
};
use crate::lifecycle::cache::{read_record, remove_record, write_record, CachedVersionRecord};
use crate::lifecycle::slot::{LoadAttemptState, ModelSlot, ReadyFuture};
use crate::lifecycle::verify::verify_handle;
use crate::probe::{CapabilityProbe, Strategy};
use crate::progress::{ProgressBus, ThrottledReporter};
use crate::storage::KeyValueStore;

/// 单个角色的静态定义
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub role: ModelRole,
    pub task: ModelTask,
    pub config_id: String,
    pub available: Vec<String>,
    pub verify_input: String,
    pub verify_timeout: Duration,
}

impl RoleSpec {
    fn allows(&self, config_id: &str) -> bool {
        self.config_id == config_id || self.available.iter().any(|c| c == config_id)
    }
}

/// 重试 / 冷却 / 缓存策略参数
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub backoff: BackoffPolicy,
    pub cooldown_after_failures: u32,
    pub cooldown: Duration,
    pub progress_throttle: Duration,
    pub cache_max_age: Duration,
    pub generator_first: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            cooldown_after_failures: 3,
            cooldown: Duration::from_secs(30),
            progress_throttle: Duration::from_millis(100),
            cache_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            generator_first: false,
        }
    }
}

struct SlotEntry {
    slot: ModelSlot,
    attempt: LoadAttemptState,
}

struct LifecycleInner {
    engine: Arc<dyn InferenceEngine>,
    probe: Arc<CapabilityProbe>,
    store: Arc<dyn KeyValueStore>,
    bus: ProgressBus,
    recovery: RecoveryEngine,
    settings: LifecycleSettings,
    /// 固定顺序，决定进度份额
    roles: Vec<RoleSpec>,
    slots: Mutex<HashMap<ModelRole, SlotEntry>>,
}

/// 生命周期管理器句柄（Clone 共享同一组槽位）
#[derive(Clone)]
pub struct ModelLifecycle {
    inner: Arc<LifecycleInner>,
}

fn immediate(value: bool) -> ReadyFuture {
    future::ready(value).boxed().shared()
}

/// 加载任务结束（含 panic）时清理 in_flight；若仍停在 loading 则标记失败
struct InFlightGuard {
    inner: Arc<LifecycleInner>,
    role: ModelRole,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.inner.slots.lock() {
            if let Some(entry) = slots.get_mut(&self.role) {
                entry.attempt.in_flight = None;
                if entry.slot.state() == SlotState::Loading {
                    tracing::error!(role = %self.role, "Load task ended while still loading; marking failed");
                    entry.slot.mark_failed();
                }
            }
        }
    }
}

impl ModelLifecycle {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        probe: Arc<CapabilityProbe>,
        store: Arc<dyn KeyValueStore>,
        bus: ProgressBus,
        settings: LifecycleSettings,
        roles: Vec<RoleSpec>,
    ) -> Result<Self, HavenError> {
        if roles.is_empty() {
            return Err(HavenError::InvalidConfig("no model roles configured".into()));
        }
        let mut slots = HashMap::new();
        for spec in &roles {
            if slots.contains_key(&spec.role) {
                return Err(HavenError::InvalidConfig(format!("duplicate role {}", spec.role)));
            }
            slots.insert(
                spec.role.clone(),
                SlotEntry {
                    slot: ModelSlot::new(spec.role.clone(), spec.config_id.clone()),
                    attempt: LoadAttemptState::default(),
                },
            );
        }
        Ok(Self {
            inner: Arc::new(LifecycleInner {
                engine,
                probe,
                store,
                bus,
                recovery: RecoveryEngine::new(),
                settings,
                roles,
                slots: Mutex::new(slots),
            }),
        })
    }

    /// 按 AppConfig 的 [lifecycle] 与 [models.*] 构建
    pub fn from_config(
        cfg: &AppConfig,
        engine: Arc<dyn InferenceEngine>,
        probe: Arc<CapabilityProbe>,
        store: Arc<dyn KeyValueStore>,
        bus: ProgressBus,
    ) -> Result<Self, HavenError> {
        cfg.validate()?;
        let l = &cfg.lifecycle;
        let settings = LifecycleSettings {
            backoff: l.backoff(),
            cooldown_after_failures: l.cooldown_after_failures,
            cooldown: l.cooldown(),
            progress_throttle: l.progress_throttle(),
            cache_max_age: l.cache_max_age(),
            generator_first: l.generator_first,
        };
        let roles = cfg
            .models
            .iter()
            .map(|(name, m)| RoleSpec {
                role: ModelRole::from(name.as_str()),
                task: m.task,
                config_id: m.config_id.clone(),
                available: m.available.clone(),
                verify_input: m.verify_input.clone(),
                verify_timeout: m.verify_timeout(),
            })
            .collect();
        Self::new(engine, probe, store, bus, settings, roles)
    }

    pub fn roles(&self) -> Vec<ModelRole> {
        self.inner.roles.iter().map(|s| s.role.clone()).collect()
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.inner.bus
    }

    /// 确保角色就绪：返回可共享的 future，结果为 true 当且仅当槽位持有已验证的句柄。
    ///
    /// 需要在 tokio 运行时内调用（加载在后台任务中执行）。
    pub fn ensure_ready(&self, role: &ModelRole) -> ReadyFuture {
        let mut slots = match self.inner.lock_slots() {
            Some(s) => s,
            None => return immediate(false),
        };
        let Some(entry) = slots.get_mut(role) else {
            tracing::error!(role = %role, "ensure_ready called for unknown role");
            return immediate(false);
        };
        if let Some(in_flight) = &entry.attempt.in_flight {
            tracing::debug!(role = %role, "Joining in-flight load");
            return in_flight.clone();
        }
        if let Some(remaining) = entry.attempt.cooldown_remaining(
            Instant::now(),
            self.inner.settings.cooldown_after_failures,
            self.inner.settings.cooldown,
        ) {
            tracing::info!(
                role = %role,
                failures = entry.attempt.failure_count,
                remaining_ms = remaining.as_millis() as u64,
                "Model load in cooldown, skipping"
            );
            return immediate(false);
        }
        self.inner.start_cycle(entry, role.clone())
    }

    /// 清除缓存与句柄、重置失败计数并重新完整加载（绕过冷却）
    pub fn force_reload(&self, role: &ModelRole) -> ReadyFuture {
        let mut slots = match self.inner.lock_slots() {
            Some(s) => s,
            None => return immediate(false),
        };
        let Some(entry) = slots.get_mut(role) else {
            tracing::error!(role = %role, "force_reload called for unknown role");
            return immediate(false);
        };
        entry.attempt.reset();
        if let Some(in_flight) = &entry.attempt.in_flight {
            tracing::info!(role = %role, "Force reload requested during load; joining in-flight load");
            return in_flight.clone();
        }
        remove_record(self.inner.store.as_ref(), role);
        entry.slot.mark_unloaded();
        tracing::info!(role = %role, "Force reloading model");
        self.inner.start_cycle(entry, role.clone())
    }

    /// 显式清除：删除版本记录、销毁句柄、回到 unloaded（不重置失败计数）
    pub fn clear_cache(&self, role: &ModelRole) {
        remove_record(self.inner.store.as_ref(), role);
        if let Some(mut slots) = self.inner.lock_slots() {
            if let Some(entry) = slots.get_mut(role) {
                if entry.attempt.is_loading() {
                    tracing::warn!(role = %role, "Cache cleared during load; slot state left to the load task");
                } else {
                    entry.slot.mark_unloaded();
                }
            }
        }
        tracing::info!(role = %role, "Model cache cleared");
    }

    /// 切换角色绑定的模型变体；旧记录因 config_id 不符自然过期
    pub fn select_config(&self, role: &ModelRole, config_id: &str) -> Result<(), HavenError> {
        let spec = self
            .inner
            .spec(role)
            .ok_or_else(|| HavenError::UnknownRole(role.to_string()))?;
        if !spec.allows(config_id) {
            return Err(HavenError::InvalidConfig(format!(
                "config '{config_id}' is not available for role {role}"
            )));
        }
        let mut slots = self
            .inner
            .lock_slots()
            .ok_or_else(|| HavenError::InvalidConfig("slot table unavailable".into()))?;
        let entry = slots
            .get_mut(role)
            .ok_or_else(|| HavenError::UnknownRole(role.to_string()))?;
        if entry.slot.config_id() == config_id {
            return Ok(());
        }
        if entry.attempt.is_loading() {
            return Err(HavenError::LoadInProgress(role.to_string()));
        }
        tracing::info!(role = %role, from = entry.slot.config_id(), to = config_id, "Selecting model config");
        entry.slot.rebind(config_id);
        Ok(())
    }

    /// 并发预热所有角色；generator_first 时先调度 generator
    pub async fn preload(&self) -> Vec<(ModelRole, bool)> {
        let mut order = self.roles();
        if self.inner.settings.generator_first {
            order.sort_by_key(|r| *r != ModelRole::GENERATOR);
        }
        let futures: Vec<ReadyFuture> = order.iter().map(|r| self.ensure_ready(r)).collect();
        let results = future::join_all(futures).await;
        order.into_iter().zip(results).collect()
    }

    pub fn is_ready(&self, role: &ModelRole) -> bool {
        self.inner
            .with_entry(role, |e| e.slot.state() == SlotState::Ready)
            .unwrap_or(false)
    }

    pub fn is_loading(&self, role: &ModelRole) -> bool {
        self.inner
            .with_entry(role, |e| e.attempt.is_loading())
            .unwrap_or(false)
    }

    pub fn state(&self, role: &ModelRole) -> Option<SlotState> {
        self.inner.with_entry(role, |e| e.slot.state())
    }

    pub fn status(&self, role: &ModelRole) -> Option<ModelStatus> {
        let now = Instant::now();
        let settings = &self.inner.settings;
        let (state, config_id, failure_count, last_error, cooldown) = self.inner.with_entry(role, |e| {
            (
                e.slot.state(),
                e.slot.config_id().to_string(),
                e.attempt.failure_count,
                e.attempt.last_error,
                e.attempt
                    .cooldown_remaining(now, settings.cooldown_after_failures, settings.cooldown),
            )
        })?;
        let cached = read_record(self.inner.store.as_ref(), role)
            .map(|r| r.is_fresh(&config_id, settings.cache_max_age))
            .unwrap_or(false);
        Some(ModelStatus {
            role: role.clone(),
            state,
            config_id,
            failure_count,
            last_error,
            cooldown_remaining_ms: cooldown.map(|d| d.as_millis() as u64),
            cached,
        })
    }

    pub fn statuses(&self) -> Vec<ModelStatus> {
        self.roles().iter().filter_map(|r| self.status(r)).collect()
    }

    /// 用已就绪的句柄跑一次推理；句柄不外借，调用期间只在内部临时持有
    pub async fn infer(&self, role: &ModelRole, input: &InferenceInput) -> Result<InferenceOutput, String> {
        let handle = self
            .inner
            .with_entry(role, |e| e.slot.handle())
            .flatten()
            .ok_or_else(|| format!("{role} model is not ready"))?;
        handle.run(input).await
    }
}

impl LifecycleInner {
    fn lock_slots(&self) -> Option<MutexGuard<'_, HashMap<ModelRole, SlotEntry>>> {
        match self.slots.lock() {
            Ok(g) => Some(g),
            Err(_) => {
                tracing::error!("Model slot table lock poisoned");
                None
            }
        }
    }

    fn with_entry<T>(&self, role: &ModelRole, f: impl FnOnce(&mut SlotEntry) -> T) -> Option<T> {
        let mut slots = self.lock_slots()?;
        slots.get_mut(role).map(f)
    }

    fn spec(&self, role: &ModelRole) -> Option<&RoleSpec> {
        self.roles.iter().find(|s| &s.role == role)
    }

    fn role_index(&self, role: &ModelRole) -> usize {
        self.roles.iter().position(|s| &s.role == role).unwrap_or(0)
    }

    /// 在持锁状态下启动一轮加载并登记为 in_flight
    fn start_cycle(self: &Arc<Self>, entry: &mut SlotEntry, role: ModelRole) -> ReadyFuture {
        let inner = Arc::clone(self);
        let task_role = role.clone();
        let task = tokio::spawn(async move { inner.run_cycle(task_role).await });
        let shared = async move {
            match task.await {
                Ok(ready) => ready,
                Err(e) => {
                    tracing::error!(role = %role, error = %e, "Model load task aborted");
                    false
                }
            }
        }
        .boxed()
        .shared();
        entry.attempt.in_flight = Some(shared.clone());
        shared
    }

    async fn run_cycle(self: Arc<Self>, role: ModelRole) -> bool {
        let _guard = InFlightGuard {
            inner: Arc::clone(&self),
            role: role.clone(),
        };
        let attempt_id = Uuid::new_v4();
        let Some(spec) = self.spec(&role).cloned() else {
            return false;
        };
        let Some((config_id, existing)) =
            self.with_entry(&role, |e| (e.slot.config_id().to_string(), e.slot.handle()))
        else {
            return false;
        };

        // (1) 能力探测：运行时缺失直接失败，不重试
        let report = self.probe.report();
        if !report.can_run_inference {
            let err = LoadError::CapabilityUnavailable(report.issues.join("; "));
            tracing::warn!(%attempt_id, role = %role, "Inference unavailable on this device");
            self.finish_failure(&role, &err);
            return false;
        }

        // (2) 已有句柄且记录新鲜：重新验证后直接就绪
        let fresh = read_record(self.store.as_ref(), &role)
            .map(|r| r.is_fresh(&config_id, self.settings.cache_max_age))
            .unwrap_or(false);
        if let Some(handle) = existing {
            if fresh {
                match verify_handle(handle.as_ref(), spec.task, &spec.verify_input, spec.verify_timeout).await {
                    Ok(_) => {
                        tracing::debug!(%attempt_id, role = %role, "Cached model re-verified");
                        if let Some(mut slots) = self.lock_slots() {
                            if let Some(e) = slots.get_mut(&role) {
                                e.attempt.record_success(Instant::now());
                            }
                        }
                        return true;
                    }
                    Err(e) => {
                        tracing::warn!(%attempt_id, role = %role, error = %e, "Cached model failed re-verification; reloading");
                    }
                }
            } else {
                tracing::info!(%attempt_id, role = %role, "Model cache record stale; reloading");
            }
        }

        // (3)-(5) 绑定 + 验证，按退避时间表重试
        let mut schedule = self.settings.backoff.schedule();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.with_entry(&role, |e| e.slot.mark_loading());
            tracing::info!(%attempt_id, role = %role, attempt, config = %config_id, strategy = %report.strategy, "Loading model");

            match self.attempt_once(&spec, &config_id, report.strategy).await {
                Ok(handle) => {
                    self.finish_success(&role, handle, &config_id);
                    return true;
                }
                Err(err) => {
                    tracing::warn!(
                        %attempt_id,
                        role = %role,
                        attempt,
                        category = %err.category(),
                        error = %err,
                        "Model load attempt failed"
                    );
                    let next = schedule.next();
                    match (self.recovery.handle(&err, next.is_some()), next) {
                        (RecoveryAction::RetryAfterBackoff, Some(delay)) => {
                            self.bus.report_progress(
                                self.bus.current().progress,
                                format!("Retrying {role} model"),
                                Some(format!("attempt {} in {}ms", attempt + 1, delay.as_millis())),
                            );
                            tokio::time::sleep(delay).await;
                        }
                        _ => {
                            self.finish_failure(&role, &err);
                            return false;
                        }
                    }
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        spec: &RoleSpec,
        config_id: &str,
        strategy: Strategy,
    ) -> Result<Arc<dyn ModelHandle>, LoadError> {
        let index = self.role_index(&spec.role);
        let total = self.roles.len();
        let reporter = Arc::new(ThrottledReporter::new(
            self.bus.clone(),
            format!("Loading {} model", spec.role),
            index,
            total,
            self.settings.progress_throttle,
        ));
        reporter.start(Some(config_id.to_string()));
        let on_progress: LoadProgressFn = Arc::new(move |fraction, details| {
            reporter.report(fraction, details);
        });

        let request = LoadRequest {
            role: spec.role.clone(),
            task: spec.task,
            config_id: config_id.to_string(),
            strategy,
        };
        let handle = self
            .engine
            .load(&request, on_progress)
            .await
            .map_err(LoadError::from_engine_message)?;

        verify_handle(handle.as_ref(), spec.task, &spec.verify_input, spec.verify_timeout).await?;
        Ok(handle)
    }

    fn finish_success(&self, role: &ModelRole, handle: Arc<dyn ModelHandle>, config_id: &str) {
        if let Some(mut slots) = self.lock_slots() {
            if let Some(e) = slots.get_mut(role) {
                e.slot.mark_ready(handle);
                e.attempt.record_success(Instant::now());
            }
        }
        write_record(self.store.as_ref(), role, &CachedVersionRecord::now(config_id));
        tracing::info!(role = %role, config = config_id, "Model verified and ready");
        self.bus
            .report_success(Some(format!("{role} model ready")), Some(config_id.to_string()));
    }

    fn finish_failure(&self, role: &ModelRole, err: &LoadError) {
        let failures = self
            .with_entry(role, |e| {
                e.slot.mark_failed();
                e.attempt.record_failure(Instant::now(), err.category());
                e.attempt.failure_count
            })
            .unwrap_or(0);
        tracing::warn!(role = %role, failures, category = %err.category(), "Model unavailable");
        self.bus.report_error(
            Some(format!("{role} model unavailable")),
            Some(format!("{} ({})", err, err.category())),
        );
    }
}
