//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 双层编排器
//!
//! 各动词的一致性策略：
//! - set：延迟优先。快层落地即应答，慢层副本交给复制工人异步补写；
//!   快层失败时退而同步写慢层，两层全败才算失败
//! - get：两阶段。快层未命中的键去慢层带TTL读取，命中结果回填快层
//! - replace：快路径在快层命中即替换并异步补写慢层；慢路径探测慢层
//! - delete：先慢层后快层，慢层未命中直接短路
//! - 其余动词不支持
//!
//! 该编排器不保证层间强一致，快层以TTL收敛。

use crate::common::{
    DeleteRequest, GatRequest, GetRequest, GetResponse, SetRequest, TouchRequest,
};
use crate::error::{CacheError, Result};
use crate::handlers::TierHandler;
use crate::metrics::GLOBAL_METRICS;
use crate::orcas::Orca;
use crate::protocol::Responder;
use crate::sync::Replicator;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

pub struct L1L2Orca {
    l1: Arc<dyn TierHandler>,
    l2: Arc<dyn TierHandler>,
    res: Arc<dyn Responder>,
    replicator: Arc<Replicator>,
}

impl L1L2Orca {
    pub fn new(
        l1: Arc<dyn TierHandler>,
        l2: Arc<dyn TierHandler>,
        res: Arc<dyn Responder>,
        replicator: Arc<Replicator>,
    ) -> Self {
        Self {
            l1,
            l2,
            res,
            replicator,
        }
    }
}

#[async_trait]
impl Orca for L1L2Orca {
    async fn set(&self, req: SetRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);

        GLOBAL_METRICS.incr_counter("cmd_set");
        GLOBAL_METRICS.incr_counter("cmd_set_l1");
        let start = Instant::now();
        let err_l1 = self.l1.set(req.clone()).await.err();
        GLOBAL_METRICS.observe_duration("set_l1", start.elapsed());

        match err_l1 {
            None => {
                GLOBAL_METRICS.incr_counter("cmd_set_success_l1");
                GLOBAL_METRICS.incr_counter("cmd_set_success");
                // 慢层副本异步补写，不占请求延迟。先移交副本再回包，
                // 回包失败不能让快层已持有的值缺失慢层副本
                self.replicator.offer(req);
                self.res.set(opaque, quiet).await
            }
            Some(e1) => {
                GLOBAL_METRICS.incr_counter("cmd_set_errors_l1");
                warn!("Set failed in L1, falling back to L2: {}", e1);

                GLOBAL_METRICS.incr_counter("cmd_set_l2");
                match self.l2.set(req).await {
                    Ok(()) => {
                        GLOBAL_METRICS.incr_counter("cmd_set_success_l2");
                        GLOBAL_METRICS.incr_counter("cmd_set_success");
                        self.res.set(opaque, quiet).await
                    }
                    Err(e2) => {
                        GLOBAL_METRICS.incr_counter("cmd_set_errors_l2");
                        GLOBAL_METRICS.incr_counter("cmd_set_errors");
                        warn!("Set failed in both tiers: l1={}, l2={}", e1, e2);
                        Err(CacheError::CompoundTierFailure)
                    }
                }
            }
        }
    }

    async fn add(&self, _req: SetRequest) -> Result<()> {
        warn!("Add command not supported by L1L2 orchestrator");
        Err(CacheError::UnsupportedCommand)
    }

    async fn replace(&self, req: SetRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);

        GLOBAL_METRICS.incr_counter("cmd_replace");
        GLOBAL_METRICS.incr_counter("cmd_replace_l1");
        let start = Instant::now();
        let err_l1 = self.l1.replace(req.clone()).await.err();
        GLOBAL_METRICS.observe_duration("replace_l1", start.elapsed());

        match err_l1 {
            None => {
                // 快路径：快层有键，视慢层也有，补一个普通set即可
                GLOBAL_METRICS.incr_counter("cmd_replace_stored_l1");
                GLOBAL_METRICS.incr_counter("cmd_replace_stored");
                // 副本移交先于回包，回包失败不阻断慢层补写
                self.replicator.offer(req);
                self.res.replace(opaque, quiet).await
            }
            Some(e1) => {
                match e1 {
                    CacheError::ItemNotStored | CacheError::KeyNotFound => {
                        GLOBAL_METRICS.incr_counter("cmd_replace_not_stored_l1");
                    }
                    _ => {
                        GLOBAL_METRICS.incr_counter("cmd_replace_errors_l1");
                    }
                }

                // 慢路径：只有慢层能裁决键是否存在
                GLOBAL_METRICS.incr_counter("cmd_replace_l2");
                let start = Instant::now();
                let result = self.l2.replace(req).await;
                GLOBAL_METRICS.observe_duration("replace_l2", start.elapsed());
                match result {
                    Ok(()) => {
                        GLOBAL_METRICS.incr_counter("cmd_replace_stored_l2");
                        GLOBAL_METRICS.incr_counter("cmd_replace_stored");
                        self.res.replace(opaque, quiet).await
                    }
                    Err(CacheError::ItemNotStored) | Err(CacheError::KeyNotFound) => {
                        GLOBAL_METRICS.incr_counter("cmd_replace_not_stored_l2");
                        GLOBAL_METRICS.incr_counter("cmd_replace_not_stored");
                        Err(CacheError::ItemNotStored)
                    }
                    Err(e2) => {
                        GLOBAL_METRICS.incr_counter("cmd_replace_errors_l2");
                        GLOBAL_METRICS.incr_counter("cmd_replace_errors");
                        Err(e2)
                    }
                }
            }
        }
    }

    async fn append(&self, _req: SetRequest) -> Result<()> {
        warn!("Append command not supported by L1L2 orchestrator");
        Err(CacheError::UnsupportedCommand)
    }

    async fn prepend(&self, _req: SetRequest) -> Result<()> {
        warn!("Prepend command not supported by L1L2 orchestrator");
        Err(CacheError::UnsupportedCommand)
    }

    async fn get(&self, req: GetRequest) -> Result<()> {
        GLOBAL_METRICS.incr_counter_by("cmd_get_keys", req.keys.len() as u64);
        GLOBAL_METRICS.incr_counter("cmd_get_l1");

        let noop_opaque = req.noop_opaque;
        let noop_end = req.noop_end;

        let start = Instant::now();
        let mut stream = self.l1.get(req).await;

        let mut hard_err: Option<CacheError> = None;
        let mut l2_keys = Vec::new();
        let mut l2_opaques = Vec::new();
        let mut l2_quiets = Vec::new();

        while let Some(item) = stream.recv().await {
            match item {
                Ok(res) if res.miss => {
                    GLOBAL_METRICS.incr_counter("cmd_get_misses_l1");
                    l2_keys.push(res.key);
                    l2_opaques.push(res.opaque);
                    l2_quiets.push(res.quiet);
                }
                Ok(res) => {
                    GLOBAL_METRICS.incr_counter("cmd_get_hits");
                    GLOBAL_METRICS.incr_counter("cmd_get_hits_l1");
                    self.res.get(res).await?;
                }
                Err(e) => {
                    // 错误项终止流，之后不会再有响应
                    GLOBAL_METRICS.incr_counter("cmd_get_errors");
                    GLOBAL_METRICS.incr_counter("cmd_get_errors_l1");
                    hard_err = Some(e);
                    break;
                }
            }
        }
        GLOBAL_METRICS.observe_duration("get_l1", start.elapsed());

        // 快层硬错误不丢弃已收集的未命中键，仍下探慢层服务它们，
        // 错误在慢层排空后再上报
        let l1_err = hard_err.take();
        if l2_keys.is_empty() {
            return match l1_err {
                Some(e) => Err(e),
                None => self.res.get_end(noop_opaque, noop_end).await,
            };
        }

        let l2_req = GetRequest {
            keys: l2_keys,
            opaques: l2_opaques,
            quiet: l2_quiets,
            noop_opaque,
            noop_end,
        };

        GLOBAL_METRICS.incr_counter("cmd_get_e_l2");
        GLOBAL_METRICS.incr_counter_by("cmd_get_e_keys_l2", l2_req.keys.len() as u64);
        let start = Instant::now();
        let mut stream = self.l2.get_e(l2_req).await;

        while let Some(item) = stream.recv().await {
            match item {
                Ok(res) if res.miss => {
                    GLOBAL_METRICS.incr_counter("cmd_get_e_misses_l2");
                    // 两层都未命中才是真未命中
                    GLOBAL_METRICS.incr_counter("cmd_get_misses");
                    self.res.get(GetResponse::from(res)).await?;
                }
                Ok(res) => {
                    GLOBAL_METRICS.incr_counter("cmd_get_e_hits_l2");
                    GLOBAL_METRICS.incr_counter("cmd_get_hits");

                    // 慢层命中回填快层，带上剩余TTL。
                    // add会在键上加锁引起并发冲突，这里用普通set无条件覆盖。
                    let backfill = SetRequest {
                        key: res.key.clone(),
                        data: res.data.clone(),
                        flags: res.flags,
                        exptime: res.exptime,
                        opaque: 0,
                        quiet: res.quiet,
                    };
                    GLOBAL_METRICS.incr_counter("cmd_get_set_l1");
                    if let Err(e) = self.l1.set(backfill).await {
                        // 回填失败不影响本次读取结果
                        GLOBAL_METRICS.incr_counter("cmd_get_set_errors_l1");
                        warn!("L1 backfill failed: {}", e);
                    } else {
                        GLOBAL_METRICS.incr_counter("cmd_get_set_success_l1");
                    }

                    self.res.get(GetResponse::from(res)).await?;
                }
                Err(e) => {
                    GLOBAL_METRICS.incr_counter("cmd_get_errors");
                    GLOBAL_METRICS.incr_counter("cmd_get_e_errors_l2");
                    hard_err = Some(e);
                    break;
                }
            }
        }
        GLOBAL_METRICS.observe_duration("get_l2", start.elapsed());

        match hard_err.or(l1_err) {
            Some(e) => Err(e),
            None => self.res.get_end(noop_opaque, noop_end).await,
        }
    }

    async fn get_e(&self, _req: GetRequest) -> Result<()> {
        warn!("GetE command not supported by L1L2 orchestrator");
        Err(CacheError::UnsupportedCommand)
    }

    async fn gat(&self, _req: GatRequest) -> Result<()> {
        warn!("Gat command not supported by L1L2 orchestrator");
        Err(CacheError::UnsupportedCommand)
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);

        // 先删慢层。慢层先行可以排除"快层删除、慢层读出、回填快层、
        // 慢层删除"这类交错导致的复活。
        GLOBAL_METRICS.incr_counter("cmd_delete");
        GLOBAL_METRICS.incr_counter("cmd_delete_l2");
        let start = Instant::now();
        let result = self.l2.delete(req.clone()).await;
        GLOBAL_METRICS.observe_duration("delete_l2", start.elapsed());

        match result {
            Err(CacheError::KeyNotFound) => {
                // 慢层未命中直接短路，可能是并发删除正在收尾
                GLOBAL_METRICS.incr_counter("cmd_delete_misses_l2");
                GLOBAL_METRICS.incr_counter("cmd_delete_misses");
                return Err(CacheError::KeyNotFound);
            }
            Err(e) => {
                // 慢层失败时不动快层，避免删一半
                GLOBAL_METRICS.incr_counter("cmd_delete_errors_l2");
                GLOBAL_METRICS.incr_counter("cmd_delete_errors");
                return Err(e);
            }
            Ok(()) => {
                GLOBAL_METRICS.incr_counter("cmd_delete_hits_l2");
            }
        }

        GLOBAL_METRICS.incr_counter("cmd_delete_l1");
        match self.l1.delete(req).await {
            Ok(()) => {
                GLOBAL_METRICS.incr_counter("cmd_delete_hits_l1");
                GLOBAL_METRICS.incr_counter("cmd_delete_hits");
                self.res.delete(opaque, quiet).await
            }
            Err(CacheError::KeyNotFound) => {
                // 快层未命中无妨，整体效果仍是删除
                GLOBAL_METRICS.incr_counter("cmd_delete_misses_l1");
                GLOBAL_METRICS.incr_counter("cmd_delete_hits");
                self.res.delete(opaque, quiet).await
            }
            Err(e) => {
                GLOBAL_METRICS.incr_counter("cmd_delete_errors_l1");
                GLOBAL_METRICS.incr_counter("cmd_delete_errors");
                Err(e)
            }
        }
    }

    async fn touch(&self, _req: TouchRequest) -> Result<()> {
        warn!("Touch command not supported by L1L2 orchestrator");
        Err(CacheError::UnsupportedCommand)
    }

    async fn noop(&self, opaque: u32) -> Result<()> {
        self.res.noop(opaque).await
    }

    async fn quit(&self, opaque: u32, quiet: bool) -> Result<()> {
        self.res.quit(opaque, quiet).await
    }

    async fn version(&self, opaque: u32) -> Result<()> {
        self.res.version(opaque).await
    }

    async fn unknown(&self, _opaque: u32) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }
}
