//! 模型生命周期：槽位、版本记录、实时验证与加载状态机

pub mod cache;
pub mod manager;
pub mod slot;
pub mod verify;

pub use cache::CachedVersionRecord;
pub use manager::{LifecycleSettings, ModelLifecycle, RoleSpec};
pub use slot::{LoadAttemptState, ModelSlot, ReadyFuture};
pub use verify::verify_handle;
