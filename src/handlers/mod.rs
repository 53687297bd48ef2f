//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了存储层处理器契约，由编排器消费。

pub mod durable;
pub mod volatile;

use crate::common::{
    DeleteRequest, GatRequest, GetEResponse, GetRequest, GetResponse, SetRequest, TouchRequest,
};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// 批量读取响应流
///
/// 契约：每个请求键恰好产生一条命中或未命中响应；
/// 一旦流中出现`Err`（硬错误，如传输故障），之后不再有任何响应
pub type GetStream = mpsc::Receiver<Result<GetResponse>>;

/// 带剩余TTL的批量读取响应流
pub type GetEStream = mpsc::Receiver<Result<GetEResponse>>;

/// 存储层处理器契约
///
/// 易失层与持久层各自实现一个能力子集；未实现的操作返回
/// [`CacheError::UnsupportedCommand`](crate::error::CacheError::UnsupportedCommand)，绝不崩溃。
/// 批量读取必须保留请求中逐键的opaque/quiet关联。
#[async_trait]
pub trait TierHandler: Send + Sync {
    async fn set(&self, req: SetRequest) -> Result<()>;

    async fn add(&self, req: SetRequest) -> Result<()>;

    async fn replace(&self, req: SetRequest) -> Result<()>;

    async fn append(&self, req: SetRequest) -> Result<()>;

    async fn prepend(&self, req: SetRequest) -> Result<()>;

    async fn get(&self, req: GetRequest) -> GetStream;

    async fn get_e(&self, req: GetRequest) -> GetEStream;

    async fn gat(&self, req: GatRequest) -> Result<GetResponse>;

    async fn delete(&self, req: DeleteRequest) -> Result<()>;

    async fn touch(&self, req: TouchRequest) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
