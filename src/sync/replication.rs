//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块实现层间异步复制
//!
//! 延迟优先的写路径在快层成功后立即应答，慢层副本由复制工人在
//! 后台补写。队列有界且投递方绝不等待：队列满时丢弃该副本并计数。

use crate::common::SetRequest;
use crate::error::{CacheError, Result};
use crate::handlers::TierHandler;
use crate::metrics::GLOBAL_METRICS;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 层间复制工人
pub struct Replicator {
    tx: mpsc::Sender<SetRequest>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Replicator {
    /// 启动复制工人
    ///
    /// # 参数
    ///
    /// * `capacity` - 队列容量
    /// * `target` - 副本落地的目标层
    pub fn start(capacity: usize, target: Arc<dyn TierHandler>) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(replicate_loop(rx, target, cancel.clone()));
        Self {
            tx,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// 提交一个副本写入，调用方不等待
    ///
    /// 队列满时丢弃并计数，缺失的副本由后续读路径回填弥补。
    pub fn offer(&self, req: SetRequest) {
        match self.tx.try_send(req) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(req)) => {
                GLOBAL_METRICS.incr_counter("cmd_set_replica_dropped");
                warn!(
                    "Replication queue full, dropping replica for key ({} bytes)",
                    req.key.len()
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                GLOBAL_METRICS.incr_counter("cmd_set_replica_dropped");
            }
        }
    }

    /// 停止工人，退出前排空已入队的副本
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn replicate_loop(
    mut rx: mpsc::Receiver<SetRequest>,
    target: Arc<dyn TierHandler>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // 已入队的副本尽量落地
                while let Ok(req) = rx.try_recv() {
                    apply(&target, req).await;
                }
                debug!("Replication worker stopped");
                return;
            }
            req = rx.recv() => {
                match req {
                    Some(req) => apply(&target, req).await,
                    None => return,
                }
            }
        }
    }
}

async fn apply(target: &Arc<dyn TierHandler>, req: SetRequest) {
    GLOBAL_METRICS.incr_counter("cmd_set_l2_replica");
    if let Err(e) = replica_result(target.set(req).await) {
        GLOBAL_METRICS.incr_counter("cmd_set_replica_errors");
        warn!("Replica write failed: {}", e);
    }
}

fn replica_result(result: Result<()>) -> Result<()> {
    match result {
        // 目标层只读说明正在停机，不算副本错误
        Err(CacheError::ItemNotStored) => Ok(()),
        other => other,
    }
}
