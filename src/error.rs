//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存代理的错误类型和处理机制。

use thiserror::Error;

/// 缓存代理错误类型枚举
///
/// 定义了分层缓存编排过程中可能出现的各种结果
#[derive(Error, Debug)]
pub enum CacheError {
    /// 键不存在（未命中，不是故障）
    #[error("Key not found")]
    KeyNotFound,

    /// 条件写入前置条件失败（例如对不存在的键执行Replace）
    #[error("Item not stored")]
    ItemNotStored,

    /// 当前编排器不支持该命令
    #[error("Unsupported command")]
    UnsupportedCommand,

    /// 两层写入全部失败（与单层失败区分，便于调用方判断降级程度）
    #[error("Both L1 and L2 writes failed")]
    CompoundTierFailure,

    /// 内部错误（驱动/传输层故障）
    #[error("Internal error: {0}")]
    Internal(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl CacheError {
    /// 判断是否为未命中
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::KeyNotFound)
    }
}

/// 缓存操作结果类型别名
///
/// 简化错误处理，所有缓存操作都返回此类型
pub type Result<T> = std::result::Result<T, CacheError>;
