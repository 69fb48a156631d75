//! 锁存储抽象
//!
//! 分布式锁管理器和容量计数缓存都依赖同一个外部键值存储，
//! 该存储必须提供"不存在才设置+过期"、"比较后删除"、"带过期的自增"
//! 等原子操作。生产环境由 Redis 提供（Lua 脚本保证原子性），
//! 测试和开发环境使用内存实现。

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// 原子键值存储接口
///
/// 所有方法都必须是原子的：Redis 实现依赖单命令或 Lua 脚本，
/// 内存实现依赖单一互斥锁内完成整个操作。
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// 仅当 key 不存在时设置值并附带过期时间（SET NX PX）
    ///
    /// 返回 true 表示设置成功（key 原本不存在）
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// 获取值
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 无条件设置值并刷新过期时间
    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// 删除 key
    async fn delete(&self, key: &str) -> Result<()>;

    /// 检查 key 是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 剩余过期时间（毫秒）
    ///
    /// key 不存在或无过期时间时返回 None
    async fn ttl_ms(&self, key: &str) -> Result<Option<i64>>;

    /// 仅当存储值等于 expected 时删除（原子比较删除）
    ///
    /// 返回 true 表示删除成功，false 表示值不匹配或 key 已不存在
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// 仅当存储值等于 expected 时重置过期时间（原子比较续期）
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool>;

    /// 自增并刷新过期时间，返回自增后的值
    async fn incr_px(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// 自减，下限为 0，返回自减后的值
    ///
    /// key 不存在或已为 0 时返回 0，绝不产生负数
    async fn decr_floor(&self, key: &str) -> Result<i64>;

    /// 批量读取（MGET）
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;
}
