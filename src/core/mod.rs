//! 核心层：错误分类与恢复、退避时间表、角色与状态投影、运行时构建

pub mod backoff;
pub mod builder;
pub mod error;
pub mod recovery;
pub mod state;

pub use backoff::{BackoffPolicy, BackoffSchedule};
pub use builder::{create_runtime_builder, HavenRuntime, RuntimeBuilder, RECORD_FILE};
pub use error::{ErrorCategory, HavenError, LoadError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use state::{ModelRole, ModelStatus, SlotState};
