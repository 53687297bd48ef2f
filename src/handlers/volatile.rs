//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 易失缓存层处理器，基于moka内存缓存实现
//!
//! 该层支持全部操作动词。条目携带各自的相对TTL，过期检查在读取时
//! 惰性执行：命中已过期条目时将其作废并按未命中处理。

use crate::common::{
    normalize_exptime, DeleteRequest, GatRequest, GetEResponse, GetRequest, GetResponse,
    SetRequest, TouchRequest, MAX_RELATIVE_TTL,
};
use crate::config::VolatileConfig;
use crate::error::{CacheError, Result};
use crate::handlers::{GetEStream, GetStream, TierHandler};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// 客户端过期时间转换为本层可用的相对TTL
///
/// 绝对unix时间戳重订为`时间戳 - 当前时间`；已经过去的绝对时间
/// 返回None，表示条目立即过期而非永不过期。
fn effective_ttl(exptime: u32) -> Option<u32> {
    if exptime > MAX_RELATIVE_TTL {
        match normalize_exptime(exptime) {
            0 => None,
            ttl => Some(ttl),
        }
    } else {
        Some(exptime)
    }
}

/// 缓存条目
///
/// `exptime`为归一化后的相对秒数，0表示永不过期。
#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    flags: u32,
    exptime: u32,
    stored_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.exptime != 0 && self.stored_at.elapsed().as_secs() >= u64::from(self.exptime)
    }

    /// 剩余TTL（秒），0表示永不过期
    fn remaining_ttl(&self) -> u32 {
        if self.exptime == 0 {
            return 0;
        }
        let elapsed = self.stored_at.elapsed().as_secs();
        u64::from(self.exptime)
            .saturating_sub(elapsed)
            .try_into()
            .unwrap_or(u32::MAX)
    }
}

/// 易失层处理器
///
/// # 示例
///
/// ```ignore
/// let handler = VolatileHandler::new(&VolatileConfig::default());
/// handler.set(req).await?;
/// ```
pub struct VolatileHandler {
    cache: Cache<Vec<u8>, Arc<Entry>>,
}

impl VolatileHandler {
    pub fn new(config: &VolatileConfig) -> Self {
        let cache = Cache::builder().max_capacity(config.max_items).build();
        Self { cache }
    }

    /// 读取单键，过期条目在此处作废
    async fn lookup(&self, key: &[u8]) -> Option<Arc<Entry>> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_expired() => {
                self.cache.invalidate(key).await;
                None
            }
            other => other,
        }
    }

    async fn store(&self, req: SetRequest) {
        match effective_ttl(req.exptime) {
            Some(ttl) => {
                let entry = Entry {
                    data: req.data,
                    flags: req.flags,
                    exptime: ttl,
                    stored_at: Instant::now(),
                };
                self.cache.insert(req.key, Arc::new(entry)).await;
            }
            // 过去的绝对时间戳等价于立即过期
            None => self.cache.invalidate(&req.key).await,
        }
    }
}

#[async_trait]
impl TierHandler for VolatileHandler {
    async fn set(&self, req: SetRequest) -> Result<()> {
        self.store(req).await;
        Ok(())
    }

    async fn add(&self, req: SetRequest) -> Result<()> {
        // 检查与写入之间存在窗口，易失层允许此竞争
        if self.lookup(&req.key).await.is_some() {
            return Err(CacheError::ItemNotStored);
        }
        self.store(req).await;
        Ok(())
    }

    async fn replace(&self, req: SetRequest) -> Result<()> {
        if self.lookup(&req.key).await.is_none() {
            return Err(CacheError::ItemNotStored);
        }
        self.store(req).await;
        Ok(())
    }

    async fn append(&self, req: SetRequest) -> Result<()> {
        match self.lookup(&req.key).await {
            Some(existing) => {
                let mut data = existing.data.clone();
                data.extend_from_slice(&req.data);
                // 追加保留原条目的flags与TTL
                let entry = Entry {
                    data,
                    flags: existing.flags,
                    exptime: existing.remaining_ttl(),
                    stored_at: Instant::now(),
                };
                self.cache.insert(req.key, Arc::new(entry)).await;
                Ok(())
            }
            None => Err(CacheError::ItemNotStored),
        }
    }

    async fn prepend(&self, req: SetRequest) -> Result<()> {
        match self.lookup(&req.key).await {
            Some(existing) => {
                let mut data = req.data;
                data.extend_from_slice(&existing.data);
                let entry = Entry {
                    data,
                    flags: existing.flags,
                    exptime: existing.remaining_ttl(),
                    stored_at: Instant::now(),
                };
                self.cache.insert(req.key, Arc::new(entry)).await;
                Ok(())
            }
            None => Err(CacheError::ItemNotStored),
        }
    }

    async fn get(&self, req: GetRequest) -> GetStream {
        let (tx, rx) = mpsc::channel(req.keys.len().max(1));
        for (i, key) in req.keys.into_iter().enumerate() {
            let opaque = req.opaques.get(i).copied().unwrap_or(0);
            let quiet = req.quiet.get(i).copied().unwrap_or(false);
            let response = match self.lookup(&key).await {
                Some(entry) => GetResponse {
                    miss: false,
                    key,
                    data: entry.data.clone(),
                    flags: entry.flags,
                    opaque,
                    quiet,
                },
                None => GetResponse {
                    miss: true,
                    key,
                    data: Vec::new(),
                    flags: 0,
                    opaque,
                    quiet,
                },
            };
            // 容量与键数相同，发送不会阻塞
            let _ = tx.send(Ok(response)).await;
        }
        rx
    }

    async fn get_e(&self, req: GetRequest) -> GetEStream {
        let (tx, rx) = mpsc::channel(req.keys.len().max(1));
        for (i, key) in req.keys.into_iter().enumerate() {
            let opaque = req.opaques.get(i).copied().unwrap_or(0);
            let quiet = req.quiet.get(i).copied().unwrap_or(false);
            let response = match self.lookup(&key).await {
                Some(entry) => GetEResponse {
                    miss: false,
                    key,
                    data: entry.data.clone(),
                    flags: entry.flags,
                    exptime: entry.remaining_ttl(),
                    opaque,
                    quiet,
                },
                None => GetEResponse {
                    miss: true,
                    key,
                    data: Vec::new(),
                    flags: 0,
                    exptime: 0,
                    opaque,
                    quiet,
                },
            };
            let _ = tx.send(Ok(response)).await;
        }
        rx
    }

    async fn gat(&self, req: GatRequest) -> Result<GetResponse> {
        match self.lookup(&req.key).await {
            Some(existing) => {
                match effective_ttl(req.exptime) {
                    Some(ttl) => {
                        let entry = Entry {
                            data: existing.data.clone(),
                            flags: existing.flags,
                            exptime: ttl,
                            stored_at: Instant::now(),
                        };
                        self.cache.insert(req.key.clone(), Arc::new(entry)).await;
                    }
                    None => self.cache.invalidate(&req.key).await,
                }
                Ok(GetResponse {
                    miss: false,
                    key: req.key,
                    data: existing.data.clone(),
                    flags: existing.flags,
                    opaque: req.opaque,
                    quiet: req.quiet,
                })
            }
            None => Err(CacheError::KeyNotFound),
        }
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        if self.lookup(&req.key).await.is_none() {
            return Err(CacheError::KeyNotFound);
        }
        self.cache.invalidate(&req.key).await;
        Ok(())
    }

    async fn touch(&self, req: TouchRequest) -> Result<()> {
        match self.lookup(&req.key).await {
            Some(existing) => {
                match effective_ttl(req.exptime) {
                    Some(ttl) => {
                        let entry = Entry {
                            data: existing.data.clone(),
                            flags: existing.flags,
                            exptime: ttl,
                            stored_at: Instant::now(),
                        };
                        self.cache.insert(req.key, Arc::new(entry)).await;
                    }
                    None => self.cache.invalidate(&req.key).await,
                }
                Ok(())
            }
            None => Err(CacheError::KeyNotFound),
        }
    }

    async fn close(&self) -> Result<()> {
        debug!("Volatile handler closed");
        Ok(())
    }
}
