//! 内存锁存储
//!
//! 供测试和开发环境使用的 AtomicStore 实现。
//! 每个操作在同一把互斥锁内完成，语义上等价于 Redis 的单命令/Lua 脚本原子性；
//! 过期通过 Instant 截止时间在访问时惰性判定。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::AtomicStore;
use crate::error::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// 创建新的内存存储实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出未过期的条目值，过期条目顺手清理
    fn live_value(map: &mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<String> {
        match map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut map = self.data.lock();
        if Self::live_value(&mut map, key, now).is_some() {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut map = self.data.lock();
        Ok(Self::live_value(&mut map, key, now))
    }

    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut map = self.data.lock();
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut map = self.data.lock();
        Ok(Self::live_value(&mut map, key, now).is_some())
    }

    async fn ttl_ms(&self, key: &str) -> Result<Option<i64>> {
        let now = Instant::now();
        let mut map = self.data.lock();
        match map.get(key) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(entry
                .expires_at
                .map(|deadline| deadline.duration_since(now).as_millis() as i64)),
            None => Ok(None),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let now = Instant::now();
        let mut map = self.data.lock();
        match Self::live_value(&mut map, key, now) {
            Some(value) if value == expected => {
                map.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut map = self.data.lock();
        match Self::live_value(&mut map, key, now) {
            Some(value) if value == expected => {
                if let Some(entry) = map.get_mut(key) {
                    entry.expires_at = Some(now + ttl);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr_px(&self, key: &str, ttl: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut map = self.data.lock();
        let current = Self::live_value(&mut map, key, now)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        map.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(next)
    }

    async fn decr_floor(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut map = self.data.lock();
        let current = Self::live_value(&mut map, key, now)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        if current <= 0 {
            return Ok(0);
        }
        let next = current - 1;
        // 保留原过期时间，与 Redis DECR 行为一致
        if let Some(entry) = map.get_mut(key) {
            entry.value = next.to_string();
        }
        Ok(next)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let now = Instant::now();
        let mut map = self.data.lock();
        Ok(keys
            .iter()
            .map(|key| Self::live_value(&mut map, key, now))
            .collect())
    }
}
