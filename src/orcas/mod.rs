//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 编排器模块
//!
//! 编排器实现各动词在存储层之间的一致性策略，并通过响应器写出
//! 成功结果。失败以`Err`上抛，由连接循环统一写出协议错误。

pub mod l1l2;
pub mod l1only;

use crate::common::{DeleteRequest, GatRequest, GetRequest, SetRequest, TouchRequest};
use crate::error::Result;
use async_trait::async_trait;

pub use l1l2::L1L2Orca;
pub use l1only::L1OnlyOrca;

/// 编排器契约
#[async_trait]
pub trait Orca: Send + Sync {
    async fn set(&self, req: SetRequest) -> Result<()>;

    async fn add(&self, req: SetRequest) -> Result<()>;

    async fn replace(&self, req: SetRequest) -> Result<()>;

    async fn append(&self, req: SetRequest) -> Result<()>;

    async fn prepend(&self, req: SetRequest) -> Result<()>;

    async fn get(&self, req: GetRequest) -> Result<()>;

    async fn get_e(&self, req: GetRequest) -> Result<()>;

    async fn gat(&self, req: GatRequest) -> Result<()>;

    async fn delete(&self, req: DeleteRequest) -> Result<()>;

    async fn touch(&self, req: TouchRequest) -> Result<()>;

    async fn noop(&self, opaque: u32) -> Result<()>;

    async fn quit(&self, opaque: u32, quiet: bool) -> Result<()>;

    async fn version(&self, opaque: u32) -> Result<()>;

    async fn unknown(&self, opaque: u32) -> Result<()>;
}
