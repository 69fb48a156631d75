//! 分布式锁模块

mod lock_manager;

pub use lock_manager::{LockConfig, LockLease, LockManager};
