//! 存储层：注入给生命周期管理器的键值存储

pub mod kv;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
