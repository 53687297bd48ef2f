//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了响应器契约，由编排器消费、协议层实现。

use crate::common::{GetEResponse, GetResponse, RequestKind};
use crate::error::{CacheError, Result};
use async_trait::async_trait;

/// 响应器契约
///
/// 将编排结果序列化到线路协议。编排器只持有引用，从不自己编码字节。
/// 具体的binary/text协议实现由外部连接循环提供。
#[async_trait]
pub trait Responder: Send + Sync {
    /// 回应存储成功
    async fn set(&self, opaque: u32, quiet: bool) -> Result<()>;

    /// 回应新增成功
    async fn add(&self, opaque: u32, quiet: bool) -> Result<()>;

    /// 回应替换成功
    async fn replace(&self, opaque: u32, quiet: bool) -> Result<()>;

    /// 回应追加成功
    async fn append(&self, opaque: u32, quiet: bool) -> Result<()>;

    /// 回应前插成功
    async fn prepend(&self, opaque: u32, quiet: bool) -> Result<()>;

    /// 回应删除成功
    async fn delete(&self, opaque: u32, quiet: bool) -> Result<()>;

    /// 回应TTL更新成功
    async fn touch(&self, opaque: u32, quiet: bool) -> Result<()>;

    /// 回应单条读取结果（命中或未命中）
    async fn get(&self, response: GetResponse) -> Result<()>;

    /// 回应单条带TTL读取结果
    async fn get_e(&self, response: GetEResponse) -> Result<()>;

    /// 回应读取并更新TTL的结果
    async fn gat(&self, response: GetResponse) -> Result<()>;

    /// 回应批量读取结束
    async fn get_end(&self, opaque: u32, noop_end: bool) -> Result<()>;

    /// 回应Noop
    async fn noop(&self, opaque: u32) -> Result<()>;

    /// 回应Quit
    async fn quit(&self, opaque: u32, quiet: bool) -> Result<()>;

    /// 回应版本查询
    async fn version(&self, opaque: u32) -> Result<()>;

    /// 回应协议级错误
    async fn error(
        &self,
        opaque: u32,
        kind: RequestKind,
        err: &CacheError,
        quiet: bool,
    ) -> Result<()>;
}
