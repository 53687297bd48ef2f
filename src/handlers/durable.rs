//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 持久层处理器，基于Redis存储后端
//!
//! 支持的动词：set、replace、get、get_e、delete。其余动词返回
//! [`CacheError::UnsupportedCommand`]。进入只读模式后所有写入以
//! [`CacheError::ItemNotStored`]拒绝，停机排空期间由此挡住新写入。

use crate::backend::RedisStore;
use crate::common::{
    normalize_exptime, DeleteRequest, GatRequest, GetEResponse, GetRequest, GetResponse,
    SetRequest, TouchRequest,
};
use crate::error::{CacheError, Result};
use crate::handlers::{GetEStream, GetStream, TierHandler};
use crate::sync::write_back::{WriteBackBuffer, WriteBackEntry};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 持久层处理器
pub struct DurableHandler {
    store: Arc<RedisStore>,
    write_back: Option<Arc<WriteBackBuffer>>,
    readonly: Arc<AtomicBool>,
}

impl DurableHandler {
    /// 创建持久层处理器
    ///
    /// # 参数
    ///
    /// * `store` - Redis存储后端
    /// * `write_back` - 写回缓冲，None时写入直达后端
    pub fn new(store: Arc<RedisStore>, write_back: Option<Arc<WriteBackBuffer>>) -> Self {
        Self {
            store,
            write_back,
            readonly: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 切入只读模式，之后的写入全部拒绝
    pub fn set_readonly(&self) {
        self.readonly.store(true, Ordering::Release);
        warn!("Durable handler switched to readonly mode");
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly.load(Ordering::Acquire)
    }

    /// 写回缓冲当前积压深度，未启用时为0
    pub fn buffer_len(&self) -> usize {
        self.write_back.as_ref().map_or(0, |b| b.len())
    }

    /// 排空写回缓冲
    pub async fn force_flush(&self) -> Result<()> {
        match &self.write_back {
            Some(buffer) => buffer.force_flush().await,
            None => Ok(()),
        }
    }

    async fn write(&self, req: SetRequest) -> Result<()> {
        if self.is_readonly() {
            return Err(CacheError::ItemNotStored);
        }
        let ttl = normalize_exptime(req.exptime);
        match &self.write_back {
            Some(buffer) => {
                buffer
                    .enqueue(WriteBackEntry {
                        key: req.key,
                        data: req.data,
                        flags: req.flags,
                        ttl,
                    })
                    .await
            }
            None => self.store.set(&req.key, &req.data, ttl).await,
        }
    }
}

#[async_trait]
impl TierHandler for DurableHandler {
    async fn set(&self, req: SetRequest) -> Result<()> {
        self.write(req).await
    }

    async fn add(&self, _req: SetRequest) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn replace(&self, req: SetRequest) -> Result<()> {
        if self.is_readonly() {
            return Err(CacheError::ItemNotStored);
        }
        // 存在性探测与写入之间的窗口不可避免，与原生replace语义一致程度已足够
        if !self.store.exists(&req.key).await? {
            return Err(CacheError::ItemNotStored);
        }
        self.write(req).await
    }

    async fn append(&self, _req: SetRequest) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn prepend(&self, _req: SetRequest) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn get(&self, req: GetRequest) -> GetStream {
        let (tx, rx) = mpsc::channel(req.keys.len().max(1));
        let store = self.store.clone();
        tokio::spawn(async move {
            for (i, key) in req.keys.into_iter().enumerate() {
                let opaque = req.opaques.get(i).copied().unwrap_or(0);
                let quiet = req.quiet.get(i).copied().unwrap_or(false);
                match store.get(&key).await {
                    Ok(Some(data)) => {
                        let resp = GetResponse {
                            miss: false,
                            key,
                            data,
                            // flags不落持久层，读出时恒为0
                            flags: 0,
                            opaque,
                            quiet,
                        };
                        if tx.send(Ok(resp)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        let resp = GetResponse {
                            miss: true,
                            key,
                            data: Vec::new(),
                            flags: 0,
                            opaque,
                            quiet,
                        };
                        if tx.send(Ok(resp)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        // 硬错误终止本次批量读取
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });
        rx
    }

    async fn get_e(&self, req: GetRequest) -> GetEStream {
        let (tx, rx) = mpsc::channel(req.keys.len().max(1));
        let store = self.store.clone();
        tokio::spawn(async move {
            for (i, key) in req.keys.into_iter().enumerate() {
                let opaque = req.opaques.get(i).copied().unwrap_or(0);
                let quiet = req.quiet.get(i).copied().unwrap_or(false);
                match store.get_with_ttl(&key).await {
                    Ok(Some((data, ttl))) => {
                        let resp = GetEResponse {
                            miss: false,
                            key,
                            data,
                            flags: 0,
                            exptime: ttl,
                            opaque,
                            quiet,
                        };
                        if tx.send(Ok(resp)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        let resp = GetEResponse {
                            miss: true,
                            key,
                            data: Vec::new(),
                            flags: 0,
                            exptime: 0,
                            opaque,
                            quiet,
                        };
                        if tx.send(Ok(resp)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });
        rx
    }

    async fn gat(&self, _req: GatRequest) -> Result<GetResponse> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        if self.store.delete(&req.key).await? {
            Ok(())
        } else {
            Err(CacheError::KeyNotFound)
        }
    }

    async fn touch(&self, _req: TouchRequest) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn close(&self) -> Result<()> {
        if let Some(buffer) = &self.write_back {
            buffer.force_flush().await?;
            buffer.shutdown().await;
        }
        debug!("Durable handler closed");
        Ok(())
    }
}
