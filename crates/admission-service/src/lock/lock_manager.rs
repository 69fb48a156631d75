//! 分布式锁管理器
//!
//! 基于锁存储的 SET NX PX 原语实现带 TTL 的互斥租约。
//! 锁的归属只由 token 匹配证明，key 存在与否不代表归属；
//! 释放和续期都通过原子比较脚本完成，过期后被他人抢占的锁
//! 不会被旧持有者误删。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{AdmissionError, Result};
use crate::store::AtomicStore;

/// 锁配置
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// 默认锁 TTL
    pub default_ttl: Duration,
    /// 获取锁最大尝试次数
    pub max_attempts: u32,
    /// 重试基础退避时间，按 2^attempt 指数增长
    pub base_backoff: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_millis(10_000),
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

/// 计算第 N 次失败后的退避时间（attempt 从 0 开始）
///
/// 公式: base * 2^attempt，溢出时饱和
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// 分布式锁管理器
///
/// 对同一资源的并发获取至多一个成功；失败方经有限次退避重试后
/// 得到 `LockUnavailable`，这是可重试的竞争信号而不是致命错误。
pub struct LockManager<S: AtomicStore> {
    store: Arc<S>,
    config: LockConfig,
    /// 实例唯一标识，用于区分不同服务实例持有的锁
    instance_id: String,
}

impl<S: AtomicStore> LockManager<S> {
    /// 创建锁管理器
    pub fn new(store: Arc<S>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// 使用默认配置创建锁管理器
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, LockConfig::default())
    }

    /// 锁在存储中的完整 key
    ///
    /// resource 形如 `event:<id>` 或 `category:<id>`
    fn lock_key(resource: &str) -> String {
        format!("lock:{}", resource)
    }

    /// 获取锁（使用配置中的默认参数）
    pub async fn acquire(&self, resource: &str) -> Result<LockLease<S>> {
        self.acquire_with(
            resource,
            self.config.default_ttl,
            self.config.max_attempts,
            self.config.base_backoff,
        )
        .await
    }

    /// 获取锁（显式指定 TTL、尝试次数与退避）
    ///
    /// 每次失败后等待 base_backoff * 2^attempt 再重试，
    /// 等待使用 tokio::time::sleep，不阻塞其他任务。
    /// 用尽尝试次数后返回 `LockUnavailable`。
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    pub async fn acquire_with(
        &self,
        resource: &str,
        ttl: Duration,
        max_attempts: u32,
        base_backoff: Duration,
    ) -> Result<LockLease<S>> {
        let key = Self::lock_key(resource);
        // token 格式: instance_id:uuid，每次获取都生成新值
        let token = format!("{}:{}", self.instance_id, Uuid::new_v4());

        for attempt in 0..max_attempts {
            if self.store.set_nx_px(&key, &token, ttl).await? {
                debug!(resource = %resource, token = %token, attempt = attempt, "Lock acquired");
                return Ok(LockLease {
                    resource: resource.to_string(),
                    key,
                    token,
                    store: Arc::clone(&self.store),
                    released: false,
                });
            }

            if attempt + 1 < max_attempts {
                let delay = backoff_delay(base_backoff, attempt);
                debug!(
                    resource = %resource,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Lock not acquired, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(AdmissionError::LockUnavailable {
            resource: resource.to_string(),
        })
    }

    /// 检查资源当前是否被锁定
    pub async fn is_locked(&self, resource: &str) -> Result<bool> {
        self.store.exists(&Self::lock_key(resource)).await
    }

    /// 查询锁的剩余 TTL
    ///
    /// 未锁定时返回 None
    pub async fn remaining_ttl(&self, resource: &str) -> Result<Option<Duration>> {
        let ttl = self.store.ttl_ms(&Self::lock_key(resource)).await?;
        Ok(ttl.map(|ms| Duration::from_millis(ms.max(0) as u64)))
    }
}

/// 锁租约
///
/// 持有锁的凭证。建议通过 `release()` 显式释放；
/// 未释放就 drop 只会记录警告，锁最终由 TTL 过期回收。
pub struct LockLease<S: AtomicStore> {
    resource: String,
    key: String,
    token: String,
    store: Arc<S>,
    /// 标记锁是否已被释放，避免 Drop 时误报
    released: bool,
}

impl<S: AtomicStore> LockLease<S> {
    /// 锁定的资源标识
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// 持有凭证 token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// 显式释放锁
    ///
    /// 原子比较 token 后删除。返回 false 表示锁已过期或被其他
    /// 持有者抢占——这是正常情况而非错误，释放对新持有者无影响。
    #[instrument(skip(self), fields(resource = %self.resource))]
    pub async fn release(mut self) -> Result<bool> {
        self.released = true;
        let released = self
            .store
            .compare_and_delete(&self.key, &self.token)
            .await?;

        if released {
            debug!(resource = %self.resource, "Lock released");
        } else {
            warn!(
                resource = %self.resource,
                token = %self.token,
                "Lock was already released or owned by another holder"
            );
        }

        Ok(released)
    }

    /// 锁续期
    ///
    /// 原子比较 token 后重置 TTL，用于长临界区。
    /// 返回 false 表示已不再持有该锁。
    pub async fn extend(&self, new_ttl: Duration) -> Result<bool> {
        self.store
            .compare_and_expire(&self.key, &self.token, new_ttl)
            .await
    }
}

// 手写 Debug，存储后端不要求 Debug，也不该出现在日志里
impl<S: AtomicStore> std::fmt::Debug for LockLease<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockLease")
            .field("resource", &self.resource)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

impl<S: AtomicStore> Drop for LockLease<S> {
    fn drop(&mut self) {
        if !self.released {
            // Drop 中无法执行异步操作，只能记录警告
            // 锁最终会通过 TTL 过期自动释放
            warn!(
                resource = %self.resource,
                token = %self.token,
                "LockLease dropped without explicit release - lock will expire via TTL"
            );
        }
    }
}
