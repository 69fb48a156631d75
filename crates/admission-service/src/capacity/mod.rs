//! 容量计数缓存模块

mod counter_cache;

pub use counter_cache::CapacityCounterCache;
