//! CompatibilityReport：每次会话重新计算、从不持久化的能力报告
//!
//! 策略推导是有序的，后面的规则只能降级不能升级：
//! standard → single-threaded（无共享内存）→ low-memory（内存不足）→ cpu-only（无 GPU）；
//! 数值运行时缺失则强制 unavailable，覆盖一切。

use serde::Serialize;

use crate::probe::DeviceClass;

/// 推导出的执行策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Standard,
    SingleThreaded,
    LowMemory,
    CpuOnly,
    Unavailable,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Strategy::Standard => "standard",
            Strategy::SingleThreaded => "single-threaded",
            Strategy::LowMemory => "low-memory",
            Strategy::CpuOnly => "cpu-only",
            Strategy::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// 原始能力信号（探测结果，尚未推导策略）
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilitySignals {
    pub shared_memory_available: bool,
    pub cross_origin_isolated: bool,
    pub gpu_available: bool,
    pub numeric_runtime_available: bool,
    pub estimated_memory_mb: Option<u64>,
    pub device_class: DeviceClass,
    pub browser: String,
    pub os: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    pub shared_memory_available: bool,
    pub cross_origin_isolated: bool,
    pub gpu_available: bool,
    pub numeric_runtime_available: bool,
    pub estimated_memory_mb: Option<u64>,
    pub device_class: DeviceClass,
    pub browser: String,
    pub os: String,
    pub can_run_inference: bool,
    pub strategy: Strategy,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

const LOW_MEMORY_HARD_MB: u64 = 1024;
const LOW_MEMORY_SOFT_MB: u64 = 2048;

impl CompatibilityReport {
    /// 按固定顺序从原始信号推导策略、问题与建议
    pub fn derive(signals: CapabilitySignals) -> Self {
        let mut strategy = Strategy::Standard;
        let mut can_run_inference = true;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if !signals.shared_memory_available {
            strategy = Strategy::SingleThreaded;
            issues.push("Shared memory is unavailable; inference will run single-threaded".to_string());
            if !signals.cross_origin_isolated {
                recommendations.push(
                    "Serve the app with cross-origin isolation to enable multi-threaded inference"
                        .to_string(),
                );
            }
        }

        if let Some(mb) = signals.estimated_memory_mb {
            if mb < LOW_MEMORY_HARD_MB {
                strategy = Strategy::LowMemory;
                issues.push(format!("Very limited memory detected (~{mb} MB)"));
                recommendations.push("Close other apps or tabs before loading AI features".to_string());
            } else if mb < LOW_MEMORY_SOFT_MB && strategy == Strategy::Standard {
                strategy = Strategy::LowMemory;
                issues.push(format!("Limited memory detected (~{mb} MB)"));
                recommendations.push("Smaller model variants will be preferred".to_string());
            }
        }

        if !signals.gpu_available {
            if strategy == Strategy::Standard {
                strategy = Strategy::CpuOnly;
            }
            issues.push("No GPU compute binding; inference runs on CPU".to_string());
        }

        if !signals.numeric_runtime_available {
            strategy = Strategy::Unavailable;
            can_run_inference = false;
            issues.push("Numeric runtime is not supported on this device".to_string());
            recommendations.push(
                "Use a recent browser or device; journaling works without AI features".to_string(),
            );
        }

        Self {
            shared_memory_available: signals.shared_memory_available,
            cross_origin_isolated: signals.cross_origin_isolated,
            gpu_available: signals.gpu_available,
            numeric_runtime_available: signals.numeric_runtime_available,
            estimated_memory_mb: signals.estimated_memory_mb,
            device_class: signals.device_class,
            browser: signals.browser,
            os: signals.os,
            can_run_inference,
            strategy,
            issues,
            recommendations,
        }
    }

    /// 简短摘要（日志 / 状态栏用）
    pub fn summary(&self) -> String {
        let memory = self
            .estimated_memory_mb
            .map(|mb| format!("{mb}MB"))
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{} on {} ({:?}), memory {}, strategy {}",
            self.browser, self.os, self.device_class, memory, self.strategy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> CapabilitySignals {
        CapabilitySignals {
            shared_memory_available: true,
            cross_origin_isolated: true,
            gpu_available: true,
            numeric_runtime_available: true,
            estimated_memory_mb: Some(8192),
            device_class: DeviceClass::Desktop,
            browser: "Chrome".into(),
            os: "Linux".into(),
        }
    }

    #[test]
    fn test_full_capabilities_are_standard() {
        let r = CompatibilityReport::derive(signals());
        assert_eq!(r.strategy, Strategy::Standard);
        assert!(r.can_run_inference);
        assert!(r.issues.is_empty());
    }

    #[test]
    fn test_no_shared_memory_is_single_threaded_but_runnable() {
        let r = CompatibilityReport::derive(CapabilitySignals {
            shared_memory_available: false,
            cross_origin_isolated: false,
            ..signals()
        });
        assert_eq!(r.strategy, Strategy::SingleThreaded);
        assert!(r.can_run_inference);
        assert!(!r.recommendations.is_empty());
    }

    #[test]
    fn test_hard_low_memory_overrides_single_threaded() {
        let r = CompatibilityReport::derive(CapabilitySignals {
            shared_memory_available: false,
            estimated_memory_mb: Some(512),
            ..signals()
        });
        assert_eq!(r.strategy, Strategy::LowMemory);
    }

    #[test]
    fn test_soft_low_memory_only_downgrades_standard() {
        let r = CompatibilityReport::derive(CapabilitySignals {
            estimated_memory_mb: Some(1536),
            ..signals()
        });
        assert_eq!(r.strategy, Strategy::LowMemory);

        let r = CompatibilityReport::derive(CapabilitySignals {
            shared_memory_available: false,
            estimated_memory_mb: Some(1536),
            ..signals()
        });
        assert_eq!(r.strategy, Strategy::SingleThreaded);
    }

    #[test]
    fn test_memory_constraint_is_not_masked_by_cpu_only() {
        let r = CompatibilityReport::derive(CapabilitySignals {
            gpu_available: false,
            estimated_memory_mb: Some(1024 + 256),
            ..signals()
        });
        assert_eq!(r.strategy, Strategy::LowMemory);

        let r = CompatibilityReport::derive(CapabilitySignals {
            gpu_available: false,
            ..signals()
        });
        assert_eq!(r.strategy, Strategy::CpuOnly);
    }

    #[test]
    fn test_missing_runtime_is_absolute_veto() {
        let r = CompatibilityReport::derive(CapabilitySignals {
            numeric_runtime_available: false,
            ..signals()
        });
        assert_eq!(r.strategy, Strategy::Unavailable);
        assert!(!r.can_run_inference);
    }

    #[test]
    fn test_can_run_iff_runtime_available() {
        for shared in [true, false] {
            for gpu in [true, false] {
                for runtime in [true, false] {
                    for mem in [None, Some(512), Some(1536), Some(8192)] {
                        let r = CompatibilityReport::derive(CapabilitySignals {
                            shared_memory_available: shared,
                            gpu_available: gpu,
                            numeric_runtime_available: runtime,
                            estimated_memory_mb: mem,
                            ..signals()
                        });
                        assert_eq!(r.can_run_inference, runtime);
                        assert_eq!(r.strategy == Strategy::Unavailable, !r.can_run_inference);
                    }
                }
            }
        }
    }

    #[test]
    fn test_serializes_camel_case() {
        let r = CompatibilityReport::derive(signals());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["canRunInference"], true);
        assert_eq!(json["strategy"], "standard");
        assert_eq!(json["deviceClass"], "desktop");
    }
}
