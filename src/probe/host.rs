//! 平台宿主：能力探测的原始信号来源
//!
//! 每个方法都可能失败（返回 Err），由 CapabilityProbe 单独兜底为安全默认值。
//! - NativeHost：本机进程（并行度、GPU 设备节点、/proc/meminfo）
//! - FixedHost：固定答案，用于测试与演示

use std::path::Path;

/// 最小合法 WASM 模块：魔数 + 版本号
pub const MINIMAL_WASM_MODULE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

/// 平台能力查询接口
pub trait PlatformHost: Send + Sync {
    /// 是否存在共享内存原语（多线程推理所需）
    fn shared_memory(&self) -> Result<bool, String>;

    fn cross_origin_isolated(&self) -> Result<bool, String>;

    /// 是否存在 GPU 计算绑定
    fn gpu_binding(&self) -> Result<bool, String>;

    /// 校验最小模块；Ok(None) 表示平台不提供校验接口
    fn validate_module(&self, bytes: &[u8]) -> Result<Option<bool>, String>;

    /// 平台内存提示（GB），没有则 None
    fn memory_hint_gb(&self) -> Result<Option<f64>, String>;

    /// 平台标识串（类似 User-Agent）
    fn identification(&self) -> Result<String, String>;
}

/// 本机宿主
#[derive(Debug, Default, Clone)]
pub struct NativeHost;

impl NativeHost {
    pub fn new() -> Self {
        Self
    }

    fn read_meminfo_total_kb(path: &Path) -> Option<u64> {
        let data = std::fs::read_to_string(path).ok()?;
        data.lines()
            .find(|l| l.starts_with("MemTotal:"))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse::<u64>().ok())
    }
}

impl PlatformHost for NativeHost {
    fn shared_memory(&self) -> Result<bool, String> {
        std::thread::available_parallelism()
            .map(|n| n.get() > 1)
            .map_err(|e| e.to_string())
    }

    fn cross_origin_isolated(&self) -> Result<bool, String> {
        // 本机进程没有同源隔离的概念
        Ok(true)
    }

    fn gpu_binding(&self) -> Result<bool, String> {
        if let Ok(v) = std::env::var("HAVEN_GPU") {
            return Ok(matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"));
        }
        Ok(["/dev/dri/renderD128", "/dev/nvidia0", "/dev/kfd"]
            .iter()
            .any(|p| Path::new(p).exists()))
    }

    fn validate_module(&self, _bytes: &[u8]) -> Result<Option<bool>, String> {
        Ok(None)
    }

    fn memory_hint_gb(&self) -> Result<Option<f64>, String> {
        Ok(Self::read_meminfo_total_kb(Path::new("/proc/meminfo"))
            .map(|kb| kb as f64 / (1024.0 * 1024.0)))
    }

    fn identification(&self) -> Result<String, String> {
        let platform = match std::env::consts::OS {
            "linux" => "X11; Linux",
            "macos" => "Macintosh; Mac OS X",
            "windows" => "Windows NT",
            "android" => "Linux; Android; Mobile",
            "ios" => "iPhone; CPU iPhone OS",
            other => other,
        };
        Ok(format!(
            "haven/{} ({}; {})",
            env!("CARGO_PKG_VERSION"),
            platform,
            std::env::consts::ARCH
        ))
    }
}

/// 固定答案的宿主；字段为 Err 时模拟该项检查抛异常
#[derive(Debug, Clone)]
pub struct FixedHost {
    pub shared_memory: Result<bool, String>,
    pub cross_origin_isolated: Result<bool, String>,
    pub gpu: Result<bool, String>,
    pub module_validation: Result<Option<bool>, String>,
    pub memory_hint_gb: Result<Option<f64>, String>,
    pub identification: Result<String, String>,
}

impl Default for FixedHost {
    fn default() -> Self {
        Self::capable()
    }
}

impl FixedHost {
    /// 全能力桌面环境
    pub fn capable() -> Self {
        Self {
            shared_memory: Ok(true),
            cross_origin_isolated: Ok(true),
            gpu: Ok(true),
            module_validation: Ok(Some(true)),
            memory_hint_gb: Ok(Some(8.0)),
            identification: Ok(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }

    /// 数值运行时缺失的环境
    pub fn without_runtime() -> Self {
        Self {
            module_validation: Ok(Some(false)),
            ..Self::capable()
        }
    }

    pub fn with_gpu(mut self, gpu: bool) -> Self {
        self.gpu = Ok(gpu);
        self
    }

    pub fn with_shared_memory(mut self, available: bool) -> Self {
        self.shared_memory = Ok(available);
        self
    }

    pub fn with_memory_hint_gb(mut self, gb: Option<f64>) -> Self {
        self.memory_hint_gb = Ok(gb);
        self
    }

    pub fn with_identification(mut self, ident: impl Into<String>) -> Self {
        self.identification = Ok(ident.into());
        self
    }
}

impl PlatformHost for FixedHost {
    fn shared_memory(&self) -> Result<bool, String> {
        self.shared_memory.clone()
    }

    fn cross_origin_isolated(&self) -> Result<bool, String> {
        self.cross_origin_isolated.clone()
    }

    fn gpu_binding(&self) -> Result<bool, String> {
        self.gpu.clone()
    }

    fn validate_module(&self, _bytes: &[u8]) -> Result<Option<bool>, String> {
        self.module_validation.clone()
    }

    fn memory_hint_gb(&self) -> Result<Option<f64>, String> {
        self.memory_hint_gb.clone()
    }

    fn identification(&self) -> Result<String, String> {
        self.identification.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_host_identification_is_parseable() {
        let ident = NativeHost::new().identification().unwrap();
        assert!(ident.starts_with("haven/"));
    }

    #[test]
    fn test_meminfo_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meminfo");
        std::fs::write(&path, "MemTotal:       16318480 kB\nMemFree:  100 kB\n").unwrap();
        assert_eq!(NativeHost::read_meminfo_total_kb(&path), Some(16318480));
    }

    #[test]
    fn test_native_host_does_not_offer_validation() {
        assert_eq!(
            NativeHost::new().validate_module(&MINIMAL_WASM_MODULE),
            Ok(None)
        );
    }
}
