//! 加载错误分类与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 LoadError 决定本轮是退避重试还是立即结束。
//! 推理引擎只返回字符串错误，这里用消息启发式归类（网络 / 内存 / WASM / 后端）。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// 模型加载过程中可能出现的错误（能力缺失、网络、后端初始化、验证失败等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// 数值运行时缺失：致命，不重试
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// 内存紧张：软错误，仅降级策略；若引擎加载时报出内存错误也归入此类
    #[error("Memory constrained: {0}")]
    MemoryConstrained(String),

    /// 无网络连接：一旦识别立即结束本轮重试
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Backend init failure: {0}")]
    BackendInitFailure(String),

    /// 模型已绑定但无法产出可用结果，视为完整的加载失败
    #[error("Verification failure: {0}")]
    VerificationFailure(String),

    #[error("Unknown load error: {0}")]
    Unknown(String),
}

/// 用于诊断展示的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Memory,
    Network,
    Wasm,
    Backend,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Memory => "memory",
            ErrorCategory::Network => "network",
            ErrorCategory::Wasm => "wasm",
            ErrorCategory::Backend => "backend",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

fn network_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(failed to fetch|fetch failed|networkerror|network error|network request failed|err_internet_disconnected|err_network|offline|connection (refused|reset|closed|failed)|could not connect|dns|no route to host|unreachable)",
        )
        .expect("valid network regex")
    })
}

fn memory_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(out of memory|\boom\b|allocation failed|memory access out of bounds|cannot allocate|insufficient memory|array buffer allocation)")
            .expect("valid memory regex")
    })
}

fn wasm_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(wasm|webassembly|simd|instantiate|compile ?error)")
            .expect("valid wasm regex")
    })
}

fn backend_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(backend|onnx|execution provider|session|webgpu|gpu adapter|no available backend)")
            .expect("valid backend regex")
    })
}

impl LoadError {
    /// 根据引擎返回的错误消息归类；顺序固定：网络 > 内存 > WASM > 后端 > 未知
    pub fn from_engine_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if network_pattern().is_match(&message) {
            LoadError::NetworkFailure(message)
        } else if memory_pattern().is_match(&message) {
            LoadError::MemoryConstrained(message)
        } else if wasm_pattern().is_match(&message) || backend_pattern().is_match(&message) {
            LoadError::BackendInitFailure(message)
        } else {
            LoadError::Unknown(message)
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            LoadError::CapabilityUnavailable(_) => ErrorCategory::Wasm,
            LoadError::MemoryConstrained(_) => ErrorCategory::Memory,
            LoadError::NetworkFailure(_) => ErrorCategory::Network,
            LoadError::BackendInitFailure(msg) => {
                if wasm_pattern().is_match(msg) {
                    ErrorCategory::Wasm
                } else {
                    ErrorCategory::Backend
                }
            }
            LoadError::VerificationFailure(_) => ErrorCategory::Backend,
            LoadError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// 在同一次 ensure_ready 内是否值得再试
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LoadError::CapabilityUnavailable(_) | LoadError::NetworkFailure(_)
        )
    }
}

/// 配置或调用方式错误（程序缺陷，而非环境问题），允许直接返回给调用方
#[derive(Error, Debug)]
pub enum HavenError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown model role: {0}")]
    UnknownRole(String),

    #[error("Model load in progress for role: {0}")]
    LoadInProgress(String),

    #[error("Phrase table error: {0}")]
    PhraseTable(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 按退避时间表等待后再试
    RetryAfterBackoff,
    /// 结束本轮 ensure_ready（无网络、能力缺失或重试耗尽）
    AbortCall,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_messages_short_circuit() {
        for msg in [
            "TypeError: Failed to fetch",
            "net::ERR_INTERNET_DISCONNECTED",
            "NetworkError when attempting to fetch resource.",
            "connection refused by host",
        ] {
            let err = LoadError::from_engine_message(msg);
            assert_eq!(err.category(), ErrorCategory::Network, "{msg}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_memory_message() {
        let err = LoadError::from_engine_message("RangeError: Array buffer allocation failed");
        assert_eq!(err.category(), ErrorCategory::Memory);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_wasm_and_backend_messages() {
        let wasm = LoadError::from_engine_message("WebAssembly.instantiate(): aborted");
        assert_eq!(wasm.category(), ErrorCategory::Wasm);
        let backend = LoadError::from_engine_message("no available backend found");
        assert_eq!(backend.category(), ErrorCategory::Backend);
        assert!(backend.is_retryable());
    }

    #[test]
    fn test_unknown_message() {
        let err = LoadError::from_engine_message("something odd happened");
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_capability_unavailable_is_fatal() {
        let err = LoadError::CapabilityUnavailable("no runtime".into());
        assert_eq!(err.category(), ErrorCategory::Wasm);
        assert!(!err.is_retryable());
    }
}
