//! 进度层：进程内进度总线与引擎回调节流

pub mod bus;
pub mod throttle;

pub use bus::{ProgressBus, ProgressState, ProgressStatus, Subscription};
pub use throttle::{overall_percent, ThrottledReporter};
