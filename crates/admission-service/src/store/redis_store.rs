//! Redis 锁存储实现
//!
//! 单步操作使用 Redis 原生命令，多步操作（比较删除、比较续期、
//! 下限自减）使用 Lua 脚本保证原子性，避免检查-执行竞态。

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::info;

use super::AtomicStore;
use crate::error::{AdmissionError, Result};

/// 仅当值匹配时删除锁，避免误删其他持有者的锁
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// 仅当值匹配时重置过期时间，用于锁续期
const COMPARE_AND_EXPIRE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// 自增并刷新过期时间
const INCR_PX_SCRIPT: &str = r#"
    local value = redis.call("incr", KEYS[1])
    redis.call("pexpire", KEYS[1], ARGV[1])
    return value
"#;

/// 读取后条件自减，下限钳制为 0
const DECR_FLOOR_SCRIPT: &str = r#"
    local value = tonumber(redis.call("get", KEYS[1]) or "0")
    if value <= 0 then
        return 0
    end
    return redis.call("decr", KEYS[1])
"#;

/// Redis 存储客户端
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// 创建 Redis 客户端
    pub fn new(url: &str) -> Result<Self> {
        let client =
            Client::open(url).map_err(|e| AdmissionError::LockStore(e.to_string()))?;
        info!("Redis lock store client created");
        Ok(Self { client })
    }

    /// 获取连接
    async fn get_conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AdmissionError::LockStore(e.to_string()))
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| AdmissionError::LockStore(e.to_string()))
    }
}

fn store_err(e: redis::RedisError) -> AdmissionError {
    AdmissionError::LockStore(e.to_string())
}

#[async_trait]
impl AtomicStore for RedisStore {
    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_conn().await?;

        // SET key value NX PX milliseconds
        // NX: 只在 key 不存在时设置
        // PX: 设置过期时间（毫秒）
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        // SET NX 成功时返回 "OK"，失败时返回 None
        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn().await?;
        conn.get(key).await.map_err(store_err)
    }

    async fn set_px(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let _: () = conn.del(key).await.map_err(store_err)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        conn.exists(key).await.map_err(store_err)
    }

    async fn ttl_ms(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.get_conn().await?;
        // PTTL 返回 -2 表示 key 不存在，-1 表示无过期时间
        let ttl: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(if ttl >= 0 { Some(ttl) } else { None })
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let deleted: i32 = redis::Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(deleted == 1)
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let extended: i32 = redis::Script::new(COMPARE_AND_EXPIRE_SCRIPT)
            .key(key)
            .arg(expected)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(extended == 1)
    }

    async fn incr_px(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.get_conn().await?;
        redis::Script::new(INCR_PX_SCRIPT)
            .key(key)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn decr_floor(&self, key: &str) -> Result<i64> {
        let mut conn = self.get_conn().await?;
        redis::Script::new(DECR_FLOOR_SCRIPT)
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = self.get_conn().await?;
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        cmd.query_async(&mut conn).await.map_err(store_err)
    }
}
