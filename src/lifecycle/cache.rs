//! 版本记录：每个角色一条 `{timestamp_ms, config_id}`
//!
//! 只用于判断能否跳过重复下载，从不单独决定模型是否可用（验证总会重新执行）。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ModelRole;
use crate::storage::KeyValueStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedVersionRecord {
    pub timestamp_ms: i64,
    pub config_id: String,
}

impl CachedVersionRecord {
    pub fn now(config_id: impl Into<String>) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            config_id: config_id.into(),
        }
    }

    /// 超过 max_age 或配置变更即视为过期；时间戳在未来（时钟回拨）同样视为过期
    pub fn is_fresh_at(&self, now_ms: i64, config_id: &str, max_age: Duration) -> bool {
        let age_ms = now_ms - self.timestamp_ms;
        self.config_id == config_id && age_ms >= 0 && (age_ms as u128) <= max_age.as_millis()
    }

    pub fn is_fresh(&self, config_id: &str, max_age: Duration) -> bool {
        self.is_fresh_at(chrono::Utc::now().timestamp_millis(), config_id, max_age)
    }
}

pub fn record_key(role: &ModelRole) -> String {
    format!("model-cache:{}", role)
}

/// 读取记录；内容损坏时记录日志并当作不存在
pub fn read_record(store: &dyn KeyValueStore, role: &ModelRole) -> Option<CachedVersionRecord> {
    let raw = store.get(&record_key(role))?;
    match serde_json::from_str(&raw) {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::warn!(role = %role, error = %e, "Ignoring corrupt model cache record");
            None
        }
    }
}

pub fn write_record(store: &dyn KeyValueStore, role: &ModelRole, record: &CachedVersionRecord) {
    let result = serde_json::to_string(record)
        .map_err(anyhow::Error::from)
        .and_then(|json| store.set(&record_key(role), &json));
    if let Err(e) = result {
        tracing::warn!(role = %role, error = %e, "Failed to persist model cache record");
    }
}

pub fn remove_record(store: &dyn KeyValueStore, role: &ModelRole) {
    if let Err(e) = store.remove(&record_key(role)) {
        tracing::warn!(role = %role, error = %e, "Failed to remove model cache record");
    }
}
