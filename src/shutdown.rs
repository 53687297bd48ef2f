//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 优雅停机编排
//!
//! 停机顺序：持久层切只读挡住新写入，等待宽限期让在途请求落地，
//! 随后停掉复制工人并排空写回缓冲。顺序不可调换，否则排空后仍有
//! 新条目进入缓冲。

use crate::error::Result;
use crate::handlers::durable::DurableHandler;
use crate::handlers::TierHandler;
use crate::sync::Replicator;
use std::time::Duration;
use tracing::info;

/// 等待进程终止信号（Ctrl-C）
pub async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// 排空持久层并关闭
///
/// # 参数
///
/// * `durable` - 持久层处理器
/// * `replicator` - 复制工人，单层模式下为None
/// * `grace` - 只读切换后的宽限期
pub async fn drain(
    durable: &DurableHandler,
    replicator: Option<&Replicator>,
    grace: Duration,
) -> Result<()> {
    info!("Shutdown requested, switching durable tier to readonly");
    durable.set_readonly();

    // 在途写入在宽限期内完成入队
    tokio::time::sleep(grace).await;

    if let Some(replicator) = replicator {
        replicator.shutdown().await;
    }

    let backlog = durable.buffer_len();
    if backlog > 0 {
        info!("Draining {} buffered entries before close", backlog);
    }
    durable.close().await?;
    info!("Durable tier drained and closed");
    Ok(())
}
