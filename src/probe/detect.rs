//! 平台标识串解析：设备类型、浏览器 / 运行环境、操作系统
//!
//! 均为有序子串测试；平板必须先于手机判断，否则 Android 平板会被误判为手机。

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl DeviceClass {
    /// 无平台内存提示时的保守默认值（MB）
    pub fn default_memory_mb(&self) -> Option<u64> {
        match self {
            DeviceClass::Mobile => Some(2048),
            // 平板按手机处理，宁可低估
            DeviceClass::Tablet => Some(2048),
            DeviceClass::Desktop => Some(4096),
            DeviceClass::Unknown => None,
        }
    }
}

pub fn classify_device(ident: &str) -> DeviceClass {
    let s = ident.to_lowercase();
    let is_android = s.contains("android");
    if s.contains("ipad")
        || s.contains("tablet")
        || s.contains("kindle")
        || s.contains("silk")
        || s.contains("playbook")
        || (is_android && !s.contains("mobile"))
    {
        DeviceClass::Tablet
    } else if s.contains("mobi")
        || s.contains("iphone")
        || s.contains("ipod")
        || is_android
        || s.contains("blackberry")
        || s.contains("iemobile")
        || s.contains("opera mini")
    {
        DeviceClass::Mobile
    } else if s.contains("windows")
        || s.contains("macintosh")
        || s.contains("mac os x")
        || s.contains("x11")
        || s.contains("linux")
        || s.contains("cros")
    {
        DeviceClass::Desktop
    } else {
        DeviceClass::Unknown
    }
}

pub fn detect_browser(ident: &str) -> String {
    let s = ident.to_lowercase();
    let name = if s.contains("edg/") || s.contains("edge/") {
        "Edge"
    } else if s.contains("opr/") || s.contains("opera") {
        "Opera"
    } else if s.contains("samsungbrowser") {
        "Samsung Internet"
    } else if s.contains("firefox") || s.contains("fxios") {
        "Firefox"
    } else if s.contains("chrome") || s.contains("crios") || s.contains("chromium") {
        "Chrome"
    } else if s.contains("safari") {
        "Safari"
    } else if s.contains("haven/") {
        "Native"
    } else {
        "Unknown"
    };
    name.to_string()
}

pub fn detect_os(ident: &str) -> String {
    let s = ident.to_lowercase();
    let name = if s.contains("windows") {
        "Windows"
    } else if s.contains("android") {
        "Android"
    } else if s.contains("iphone") || s.contains("ipad") || s.contains("ipod") {
        "iOS"
    } else if s.contains("mac os") || s.contains("macintosh") {
        "macOS"
    } else if s.contains("cros") {
        "ChromeOS"
    } else if s.contains("linux") || s.contains("x11") {
        "Linux"
    } else {
        "Unknown"
    };
    name.to_string()
}
