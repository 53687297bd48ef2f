//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块实现持久层的Redis存储后端
//!
//! 所有命令经过统一的超时包装。条目以原始字节存储，TTL由Redis原生
//! 过期机制承载（EX秒）。

use crate::config::DurableConfig;
use crate::error::{CacheError, Result};
use crate::sync::write_back::{BatchSink, WriteBackEntry};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use secrecy::ExposeSecret;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Redis持久存储
///
/// `ConnectionManager`内部自动重连，克隆开销低，可在任务间共享。
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    command_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RedisStore {
    /// 建立到Redis的连接
    ///
    /// # 参数
    ///
    /// * `config` - 持久层配置，连接串保存在`SecretString`中
    ///
    /// # 返回值
    ///
    /// 返回新的RedisStore实例或错误
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn connect(config: &DurableConfig) -> Result<Self> {
        let client = Client::open(config.connection_string.expose_secret())
            .map_err(|e| CacheError::Config(format!("Invalid redis connection string: {}", e)))?;

        let manager = tokio::time::timeout(
            Duration::from_millis(config.connection_timeout_ms),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CacheError::Timeout("redis connect".to_string()))??;

        debug!("Connected to redis backend");
        Ok(Self {
            manager,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
        })
    }

    #[cfg(test)]
    pub fn from_manager(manager: ConnectionManager, command_timeout_ms: u64) -> Self {
        Self {
            manager,
            command_timeout: Duration::from_millis(command_timeout_ms),
        }
    }

    async fn timed<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, redis::RedisError>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout(what.to_string())),
        }
    }

    /// 读取单键，不存在时返回None
    #[instrument(skip(self, key), level = "debug")]
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let key = key.to_vec();
        self.timed("GET", async move { conn.get(key).await }).await
    }

    /// 读取单键及其剩余TTL（秒）
    ///
    /// TTL为-1（永不过期）或-2（不存在）时归一化为0。
    pub async fn get_with_ttl(&self, key: &[u8]) -> Result<Option<(Vec<u8>, u32)>> {
        let mut conn = self.manager.clone();
        let key = key.to_vec();
        let (value, ttl): (Option<Vec<u8>>, i64) = self
            .timed("GET+TTL", async move {
                redis::pipe()
                    .get(&key)
                    .ttl(&key)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(value.map(|v| (v, u32::try_from(ttl).unwrap_or(0))))
    }

    /// 写入单键，`ttl`为0时不设置过期
    #[instrument(skip(self, key, value), level = "debug", fields(value_len = value.len()))]
    pub async fn set(&self, key: &[u8], value: &[u8], ttl: u32) -> Result<()> {
        let mut conn = self.manager.clone();
        let key = key.to_vec();
        let value = value.to_vec();
        self.timed("SET", async move {
            if ttl > 0 {
                conn.set_ex(key, value, u64::from(ttl)).await
            } else {
                conn.set(key, value).await
            }
        })
        .await
    }

    /// 探测键是否存在
    pub async fn exists(&self, key: &[u8]) -> Result<bool> {
        let mut conn = self.manager.clone();
        let key = key.to_vec();
        self.timed("EXISTS", async move { conn.exists(key).await })
            .await
    }

    /// 删除单键，返回是否实际删除
    pub async fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut conn = self.manager.clone();
        let key = key.to_vec();
        let removed: i64 = self.timed("DEL", async move { conn.del(key).await }).await?;
        Ok(removed > 0)
    }

    /// 批量写入，单次流水线提交
    #[instrument(skip(self, entries), level = "debug", fields(batch_len = entries.len()))]
    pub async fn write_batch(&self, entries: &[WriteBackEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for entry in entries {
            if entry.ttl > 0 {
                pipe.set(&entry.key, &entry.data)
                    .arg("EX")
                    .arg(u64::from(entry.ttl))
                    .ignore();
            } else {
                pipe.set(&entry.key, &entry.data).ignore();
            }
        }
        let mut conn = self.manager.clone();
        self.timed("PIPELINE SET", async move {
            pipe.query_async::<()>(&mut conn).await
        })
        .await
    }
}

#[async_trait]
impl BatchSink for RedisStore {
    async fn write_batch(&self, entries: Vec<WriteBackEntry>) -> Result<()> {
        if let Err(e) = RedisStore::write_batch(self, &entries).await {
            warn!("Batch write of {} entries failed: {}", entries.len(), e);
            return Err(e);
        }
        Ok(())
    }
}
