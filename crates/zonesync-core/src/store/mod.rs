//! In-process store implementations
//!
//! History stores ([`MemoryHistoryStore`], [`FileHistoryStore`]) and config
//! stores ([`StaticConfigStore`], [`FileConfigStore`]).

pub mod config;
pub mod file;
pub mod memory;

pub use config::{FileConfigStore, StaticConfigStore, config_store_for};
pub use file::{FileHistoryStore, FileHistoryStoreFactory};
pub use memory::{MemoryHistoryStore, MemoryHistoryStoreFactory};
