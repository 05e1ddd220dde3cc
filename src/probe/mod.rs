//! 能力探测：每个会话检查一次运行环境并产出 CompatibilityReport
//!
//! probe() 同步、无副作用、可重复调用；report() 返回会话内缓存，refresh() 强制重算。
//! 每一项检查独立兜底：单项出错只把该项降为安全默认值（false / None），不会中断整个探测。

pub mod detect;
pub mod host;
pub mod report;

use std::sync::{Arc, RwLock};

pub use detect::{classify_device, detect_browser, detect_os, DeviceClass};
pub use host::{FixedHost, NativeHost, PlatformHost, MINIMAL_WASM_MODULE};
pub use report::{CapabilitySignals, CompatibilityReport, Strategy};

/// 能力探测器
pub struct CapabilityProbe {
    host: Arc<dyn PlatformHost>,
    cached: RwLock<Option<CompatibilityReport>>,
}

fn guarded<T>(check: &str, result: Result<T, String>, fallback: T) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(check, error = %e, "Capability check failed, using safe default");
            fallback
        }
    }
}

impl CapabilityProbe {
    pub fn new(host: Arc<dyn PlatformHost>) -> Self {
        Self {
            host,
            cached: RwLock::new(None),
        }
    }

    /// 重新检查所有能力（不读缓存）
    pub fn probe(&self) -> CompatibilityReport {
        let host = self.host.as_ref();

        let shared_memory_available = guarded("shared_memory", host.shared_memory(), false);
        let cross_origin_isolated = guarded("cross_origin_isolated", host.cross_origin_isolated(), false);
        let gpu_available = guarded("gpu", host.gpu_binding(), false);
        // 校验接口缺失时假定可用，避免误判
        let numeric_runtime_available = guarded(
            "numeric_runtime",
            host.validate_module(&MINIMAL_WASM_MODULE).map(|v| v.unwrap_or(true)),
            false,
        );
        let ident = guarded("identification", host.identification(), String::new());
        let device_class = classify_device(&ident);
        let estimated_memory_mb = guarded("memory_hint", host.memory_hint_gb(), None)
            .filter(|gb| gb.is_finite() && *gb > 0.0)
            .map(|gb| (gb * 1024.0).round() as u64)
            .or_else(|| device_class.default_memory_mb());

        let report = CompatibilityReport::derive(CapabilitySignals {
            shared_memory_available,
            cross_origin_isolated,
            gpu_available,
            numeric_runtime_available,
            estimated_memory_mb,
            device_class,
            browser: detect_browser(&ident),
            os: detect_os(&ident),
        });
        tracing::info!(
            strategy = %report.strategy,
            can_run = report.can_run_inference,
            "Capability probe: {}",
            report.summary()
        );
        report
    }

    /// 会话内缓存的报告；首次调用时探测
    pub fn report(&self) -> CompatibilityReport {
        if let Ok(guard) = self.cached.read() {
            if let Some(r) = guard.as_ref() {
                return r.clone();
            }
        }
        self.refresh()
    }

    /// 重算并更新缓存
    pub fn refresh(&self) -> CompatibilityReport {
        let report = self.probe();
        if let Ok(mut guard) = self.cached.write() {
            *guard = Some(report.clone());
        }
        report
    }
}
