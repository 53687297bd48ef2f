//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块实现持久层的异步写回缓冲
//!
//! 入队方在缓冲满时阻塞等待（背压），条目至多投递一次：批量写入
//! 失败时整批丢弃并计数，不做重试或重新入队。所有刷新（急切、周期、
//! 强制）都在唯一的刷新工人中串行执行，彼此不会交叠。

use crate::error::{CacheError, Result};
use crate::metrics::GLOBAL_METRICS;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 写回条目
///
/// `ttl`为归一化后的相对秒数，0表示永不过期。`flags`随条目入队，
/// 但持久层行布局只落键/值/TTL，批量写入端可以忽略它。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBackEntry {
    pub key: Vec<u8>,
    pub data: Vec<u8>,
    pub flags: u32,
    pub ttl: u32,
}

/// 批量写入目的端
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn write_batch(&self, entries: Vec<WriteBackEntry>) -> Result<()>;
}

/// 缓冲参数
#[derive(Debug, Clone, Copy)]
pub struct BufferParams {
    pub capacity: usize,
    pub low_water_mark: usize,
    pub max_batch_size: usize,
    pub poll_interval: Duration,
    pub flush_period: Duration,
}

impl From<&crate::config::WriteBackConfig> for BufferParams {
    fn from(c: &crate::config::WriteBackConfig) -> Self {
        Self {
            capacity: c.capacity,
            low_water_mark: c.low_water_mark,
            max_batch_size: c.max_batch_size,
            poll_interval: Duration::from_millis(c.poll_interval_ms),
            flush_period: Duration::from_millis(c.flush_period_ms),
        }
    }
}

/// 刷新工人的触发信号
enum FlushSignal {
    /// 深度越过低水位线，尽快刷一批
    Eager,
    /// 排空全部积压后应答
    Drain(oneshot::Sender<()>),
}

/// 异步写回缓冲
///
/// # 示例
///
/// ```ignore
/// let buffer = WriteBackBuffer::start(params, sink);
/// buffer.enqueue(entry).await?;
/// buffer.force_flush().await?;
/// buffer.shutdown().await;
/// ```
pub struct WriteBackBuffer {
    tx: mpsc::Sender<WriteBackEntry>,
    signal_tx: mpsc::Sender<FlushSignal>,
    depth: Arc<AtomicUsize>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl WriteBackBuffer {
    /// 启动缓冲及其后台任务
    pub fn start(params: BufferParams, sink: Arc<dyn BatchSink>) -> Self {
        let (tx, rx) = mpsc::channel(params.capacity);
        // 容量1：多个急切触发合并为一次刷新
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let depth = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let worker = FlushWorker {
            rx,
            signal_rx,
            sink,
            depth: depth.clone(),
            max_batch_size: params.max_batch_size,
            flush_period: params.flush_period,
            cancel: cancel.clone(),
        };
        let worker_handle = tokio::spawn(worker.run());

        let watcher_handle = tokio::spawn(size_watch_loop(
            depth.clone(),
            params.low_water_mark,
            params.poll_interval,
            signal_tx.clone(),
            cancel.clone(),
        ));

        Self {
            tx,
            signal_tx,
            depth,
            cancel,
            worker: Mutex::new(Some(worker_handle)),
            watcher: Mutex::new(Some(watcher_handle)),
        }
    }

    /// 当前积压深度
    ///
    /// 发送前递增、仅由刷新工人按实际出队递减。计数器可能短暂
    /// 高于实际占用，但绝不低于，也不会下溢。
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 入队一个写回条目
    ///
    /// 缓冲满时阻塞等待空位，等待时长计入指标。
    pub async fn enqueue(&self, entry: WriteBackEntry) -> Result<()> {
        let start = Instant::now();
        // 先计数后发送：工人在发送落地的瞬间就可能出队并递减，
        // 若递增在后，深度会瞬间下溢
        self.depth.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(entry).await.is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(CacheError::Shutdown("write-back buffer closed".to_string()));
        }
        GLOBAL_METRICS.observe_duration("set_batch_buffer_timewait", start.elapsed());
        Ok(())
    }

    /// 排空全部积压并等待完成
    pub async fn force_flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.signal_tx
            .send(FlushSignal::Drain(ack_tx))
            .await
            .map_err(|_| CacheError::Shutdown("flush worker stopped".to_string()))?;
        ack_rx
            .await
            .map_err(|_| CacheError::Shutdown("flush worker stopped".to_string()))
    }

    /// 停止后台任务，退出前排空剩余积压
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.watcher.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }
}

/// 深度巡检循环
///
/// 以固定间隔轮询深度，越过低水位线时触发急切刷新。触发通道已满
/// 说明一次刷新已在路上，丢弃本次触发即可。
async fn size_watch_loop(
    depth: Arc<AtomicUsize>,
    low_water_mark: usize,
    poll_interval: Duration,
    signal_tx: mpsc::Sender<FlushSignal>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                if depth.load(Ordering::Acquire) >= low_water_mark {
                    let _ = signal_tx.try_send(FlushSignal::Eager);
                }
            }
        }
    }
}

/// 唯一的刷新工人
///
/// 独占条目接收端，周期、急切与强制刷新在同一循环内串行执行。
struct FlushWorker {
    rx: mpsc::Receiver<WriteBackEntry>,
    signal_rx: mpsc::Receiver<FlushSignal>,
    sink: Arc<dyn BatchSink>,
    depth: Arc<AtomicUsize>,
    max_batch_size: usize,
    flush_period: Duration,
    cancel: CancellationToken,
}

impl FlushWorker {
    async fn run(self) {
        let FlushWorker {
            mut rx,
            mut signal_rx,
            sink,
            depth,
            max_batch_size,
            flush_period,
            cancel,
        } = self;

        let mut period = tokio::time::interval(flush_period);
        period.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        period.tick().await; // 首个tick立即完成，跳过

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    drain(&mut rx, &sink, &depth, max_batch_size).await;
                    debug!("Flush worker stopped");
                    return;
                }
                _ = period.tick() => {
                    flush_once(&mut rx, &sink, &depth, max_batch_size).await;
                }
                signal = signal_rx.recv() => {
                    match signal {
                        Some(FlushSignal::Eager) => {
                            flush_once(&mut rx, &sink, &depth, max_batch_size).await;
                            period.reset();
                        }
                        Some(FlushSignal::Drain(ack)) => {
                            drain(&mut rx, &sink, &depth, max_batch_size).await;
                            period.reset();
                            let _ = ack.send(());
                        }
                        None => {
                            drain(&mut rx, &sink, &depth, max_batch_size).await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// 取出至多一个批次并写出
///
/// 写出失败时整批丢弃，仅计数。返回取出的条目数。
async fn flush_once(
    rx: &mut mpsc::Receiver<WriteBackEntry>,
    sink: &Arc<dyn BatchSink>,
    depth: &AtomicUsize,
    max_batch_size: usize,
) -> usize {
    let mut batch = Vec::new();
    while batch.len() < max_batch_size {
        match rx.try_recv() {
            Ok(entry) => batch.push(entry),
            Err(_) => break,
        }
    }
    if batch.is_empty() {
        return 0;
    }
    let count = batch.len();
    depth.fetch_sub(count, Ordering::AcqRel);
    GLOBAL_METRICS.set_gauge("set_buffer_depth", depth.load(Ordering::Acquire) as u64);

    match sink.write_batch(batch).await {
        Ok(()) => {
            GLOBAL_METRICS.incr_counter_by("cmd_set_batch", count as u64);
        }
        Err(e) => {
            GLOBAL_METRICS.incr_counter("cmd_set_batch_errors");
            GLOBAL_METRICS.incr_counter_by("set_batch_dropped", count as u64);
            warn!("Dropping batch of {} entries after write failure: {}", count, e);
        }
    }
    count
}

/// 连续刷新直至积压清空
async fn drain(
    rx: &mut mpsc::Receiver<WriteBackEntry>,
    sink: &Arc<dyn BatchSink>,
    depth: &AtomicUsize,
    max_batch_size: usize,
) {
    while flush_once(rx, sink, depth, max_batch_size).await > 0 {}
}
