//! 容量计数缓存
//!
//! 维护每个容量受限资源（活动/分类）已付费报名数的影子计数，
//! 用于在热路径上避免数据库行锁。缓存是建议性的：
//! 未命中必须按 Unknown 处理并从关系库重算，绝不能当作 0；
//! TTL 窗口内允许陈旧，正确性由分布式锁 + 数据库唯一约束兜底。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use crate::error::Result;
use crate::models::ResourceKind;
use crate::store::AtomicStore;

/// 容量计数缓存
pub struct CapacityCounterCache<S: AtomicStore> {
    store: Arc<S>,
    /// 计数条目 TTL
    ttl: Duration,
}

impl<S: AtomicStore> CapacityCounterCache<S> {
    /// 创建计数缓存
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// 使用默认 TTL（300 秒）创建
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, Duration::from_secs(300))
    }

    /// 计数在存储中的完整 key
    fn counter_key(kind: ResourceKind, id: &str) -> String {
        format!("capacity:{}:{}", kind.as_str(), id)
    }

    /// 读取缓存计数
    ///
    /// 返回 None 表示未命中（Unknown），调用方必须从关系库重算后
    /// 调用 `set` 回填。存储值无法解析时按未命中处理并顺手失效。
    #[instrument(skip(self))]
    pub async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<i64>> {
        let key = Self::counter_key(kind, id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match raw.parse::<i64>() {
            Ok(count) => Ok(Some(count)),
            Err(_) => {
                warn!(key = %key, raw = %raw, "Unparsable counter value, invalidating");
                self.store.delete(&key).await?;
                Ok(None)
            }
        }
    }

    /// 无条件覆盖计数并刷新 TTL
    ///
    /// 用于从关系库回填/重同步
    #[instrument(skip(self))]
    pub async fn set(&self, kind: ResourceKind, id: &str, count: i64) -> Result<()> {
        self.store
            .set_px(&Self::counter_key(kind, id), &count.to_string(), self.ttl)
            .await
    }

    /// 原子自增，返回新值
    pub async fn increment(&self, kind: ResourceKind, id: &str) -> Result<i64> {
        self.store
            .incr_px(&Self::counter_key(kind, id), self.ttl)
            .await
    }

    /// 原子自减，下限钳制为 0，返回新值
    pub async fn decrement(&self, kind: ResourceKind, id: &str) -> Result<i64> {
        self.store.decr_floor(&Self::counter_key(kind, id)).await
    }

    /// 强制失效，下次 get 必然未命中
    pub async fn invalidate(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.store.delete(&Self::counter_key(kind, id)).await
    }

    /// 批量读取
    ///
    /// 仅供看板和对账使用，准入热路径只读在场的两个资源。
    /// 无法解析的条目与 `get` 同样处理：按未命中返回并顺手失效。
    pub async fn get_many(
        &self,
        resources: &[(ResourceKind, String)],
    ) -> Result<HashMap<(ResourceKind, String), Option<i64>>> {
        let keys: Vec<String> = resources
            .iter()
            .map(|(kind, id)| Self::counter_key(*kind, id))
            .collect();
        let values = self.store.get_many(&keys).await?;

        let mut counts = HashMap::with_capacity(resources.len());
        for ((resource, key), raw) in resources.iter().cloned().zip(keys).zip(values) {
            let count = match raw {
                None => None,
                Some(v) => match v.parse::<i64>() {
                    Ok(count) => Some(count),
                    Err(_) => {
                        warn!(key = %key, raw = %v, "Unparsable counter value, invalidating");
                        self.store.delete(&key).await?;
                        None
                    }
                },
            };
            counts.insert(resource, count);
        }
        Ok(counts)
    }
}
