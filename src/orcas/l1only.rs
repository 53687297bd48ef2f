//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 单层编排器，所有动词直达唯一的存储层

use crate::common::{
    DeleteRequest, GatRequest, GetRequest, SetRequest, TouchRequest,
};
use crate::error::Result;
use crate::handlers::TierHandler;
use crate::metrics::GLOBAL_METRICS;
use crate::orcas::Orca;
use crate::protocol::Responder;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

pub struct L1OnlyOrca {
    l1: Arc<dyn TierHandler>,
    res: Arc<dyn Responder>,
}

impl L1OnlyOrca {
    pub fn new(l1: Arc<dyn TierHandler>, res: Arc<dyn Responder>) -> Self {
        Self { l1, res }
    }
}

#[async_trait]
impl Orca for L1OnlyOrca {
    async fn set(&self, req: SetRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);
        GLOBAL_METRICS.incr_counter("cmd_set");
        GLOBAL_METRICS.incr_counter("cmd_set_l1");
        let start = Instant::now();
        let result = self.l1.set(req).await;
        GLOBAL_METRICS.observe_duration("set_l1", start.elapsed());
        match result {
            Ok(()) => {
                GLOBAL_METRICS.incr_counter("cmd_set_success_l1");
                GLOBAL_METRICS.incr_counter("cmd_set_success");
                self.res.set(opaque, quiet).await
            }
            Err(e) => {
                GLOBAL_METRICS.incr_counter("cmd_set_errors_l1");
                GLOBAL_METRICS.incr_counter("cmd_set_errors");
                Err(e)
            }
        }
    }

    async fn add(&self, req: SetRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);
        GLOBAL_METRICS.incr_counter("cmd_add");
        GLOBAL_METRICS.incr_counter("cmd_add_l1");
        match self.l1.add(req).await {
            Ok(()) => {
                GLOBAL_METRICS.incr_counter("cmd_add_stored_l1");
                self.res.add(opaque, quiet).await
            }
            Err(e) => {
                GLOBAL_METRICS.incr_counter("cmd_add_errors_l1");
                Err(e)
            }
        }
    }

    async fn replace(&self, req: SetRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);
        GLOBAL_METRICS.incr_counter("cmd_replace");
        GLOBAL_METRICS.incr_counter("cmd_replace_l1");
        match self.l1.replace(req).await {
            Ok(()) => {
                GLOBAL_METRICS.incr_counter("cmd_replace_stored_l1");
                GLOBAL_METRICS.incr_counter("cmd_replace_stored");
                self.res.replace(opaque, quiet).await
            }
            Err(e) => {
                GLOBAL_METRICS.incr_counter("cmd_replace_errors_l1");
                Err(e)
            }
        }
    }

    async fn append(&self, req: SetRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);
        GLOBAL_METRICS.incr_counter("cmd_append");
        match self.l1.append(req).await {
            Ok(()) => self.res.append(opaque, quiet).await,
            Err(e) => Err(e),
        }
    }

    async fn prepend(&self, req: SetRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);
        GLOBAL_METRICS.incr_counter("cmd_prepend");
        match self.l1.prepend(req).await {
            Ok(()) => self.res.prepend(opaque, quiet).await,
            Err(e) => Err(e),
        }
    }

    async fn get(&self, req: GetRequest) -> Result<()> {
        GLOBAL_METRICS.incr_counter_by("cmd_get_keys", req.keys.len() as u64);
        GLOBAL_METRICS.incr_counter("cmd_get_l1");
        let noop_opaque = req.noop_opaque;
        let noop_end = req.noop_end;
        let start = Instant::now();
        let mut stream = self.l1.get(req).await;

        while let Some(item) = stream.recv().await {
            match item {
                Ok(res) => {
                    if res.miss {
                        GLOBAL_METRICS.incr_counter("cmd_get_misses_l1");
                        GLOBAL_METRICS.incr_counter("cmd_get_misses");
                    } else {
                        GLOBAL_METRICS.incr_counter("cmd_get_hits_l1");
                        GLOBAL_METRICS.incr_counter("cmd_get_hits");
                    }
                    self.res.get(res).await?;
                }
                Err(e) => {
                    GLOBAL_METRICS.incr_counter("cmd_get_errors_l1");
                    GLOBAL_METRICS.incr_counter("cmd_get_errors");
                    return Err(e);
                }
            }
        }
        GLOBAL_METRICS.observe_duration("get_l1", start.elapsed());
        self.res.get_end(noop_opaque, noop_end).await
    }

    async fn get_e(&self, req: GetRequest) -> Result<()> {
        GLOBAL_METRICS.incr_counter("cmd_get_e_l1");
        let noop_opaque = req.noop_opaque;
        let noop_end = req.noop_end;
        let mut stream = self.l1.get_e(req).await;

        while let Some(item) = stream.recv().await {
            match item {
                Ok(res) => {
                    if res.miss {
                        GLOBAL_METRICS.incr_counter("cmd_get_e_misses_l1");
                    } else {
                        GLOBAL_METRICS.incr_counter("cmd_get_e_hits_l1");
                    }
                    self.res.get_e(res).await?;
                }
                Err(e) => {
                    GLOBAL_METRICS.incr_counter("cmd_get_e_errors_l1");
                    return Err(e);
                }
            }
        }
        self.res.get_end(noop_opaque, noop_end).await
    }

    async fn gat(&self, req: GatRequest) -> Result<()> {
        GLOBAL_METRICS.incr_counter("cmd_gat");
        match self.l1.gat(req).await {
            Ok(res) => {
                GLOBAL_METRICS.incr_counter("cmd_gat_hits");
                self.res.gat(res).await
            }
            Err(e) => {
                GLOBAL_METRICS.incr_counter("cmd_gat_misses");
                Err(e)
            }
        }
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);
        GLOBAL_METRICS.incr_counter("cmd_delete");
        GLOBAL_METRICS.incr_counter("cmd_delete_l1");
        match self.l1.delete(req).await {
            Ok(()) => {
                GLOBAL_METRICS.incr_counter("cmd_delete_hits_l1");
                GLOBAL_METRICS.incr_counter("cmd_delete_hits");
                self.res.delete(opaque, quiet).await
            }
            Err(e) => {
                GLOBAL_METRICS.incr_counter("cmd_delete_misses_l1");
                Err(e)
            }
        }
    }

    async fn touch(&self, req: TouchRequest) -> Result<()> {
        let (opaque, quiet) = (req.opaque, req.quiet);
        GLOBAL_METRICS.incr_counter("cmd_touch");
        match self.l1.touch(req).await {
            Ok(()) => {
                GLOBAL_METRICS.incr_counter("cmd_touch_hits");
                self.res.touch(opaque, quiet).await
            }
            Err(e) => {
                GLOBAL_METRICS.incr_counter("cmd_touch_misses");
                Err(e)
            }
        }
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
        Err(crate::error::CacheError::UnsupportedCommand)
    }
}
