//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了请求/响应信封和memcached过期时间语义。

use std::time::{SystemTime, UNIX_EPOCH};

/// memcached协议允许的最大相对TTL（30天，单位秒）
///
/// 超过该值的exptime被视为绝对unix时间戳
pub const MAX_RELATIVE_TTL: u32 = 60 * 60 * 24 * 30;

/// 请求类型
///
/// 用于错误上报时标识出错的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Get,
    GetE,
    Gat,
    Delete,
    Touch,
    Noop,
    Quit,
    Version,
    Unknown,
}

/// 单键写入请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetRequest {
    /// 缓存键（字节序列，透传不解释）
    pub key: Vec<u8>,
    /// 缓存值
    pub data: Vec<u8>,
    /// 客户端自定义位域，透传不修改
    pub flags: u32,
    /// 过期时间，见[`normalize_exptime`]
    pub exptime: u32,
    /// 协议关联ID
    pub opaque: u32,
    /// 静默模式标志
    pub quiet: bool,
}

/// 单键删除请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteRequest {
    pub key: Vec<u8>,
    pub opaque: u32,
    pub quiet: bool,
}

/// 单键TTL更新请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchRequest {
    pub key: Vec<u8>,
    pub exptime: u32,
    pub opaque: u32,
    pub quiet: bool,
}

/// Get-and-Touch请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatRequest {
    pub key: Vec<u8>,
    pub exptime: u32,
    pub opaque: u32,
    pub quiet: bool,
}

/// 批量读取请求
///
/// keys/opaques/quiet为等长的索引对齐序列：keys[i]对应opaques[i]和quiet[i]
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub keys: Vec<Vec<u8>>,
    pub opaques: Vec<u32>,
    pub quiet: Vec<bool>,
    /// 批次结束帧的关联ID
    pub noop_opaque: u32,
    /// 批次结束帧是否需要回显noop
    pub noop_end: bool,
}

/// 单键读取响应
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetResponse {
    pub miss: bool,
    pub key: Vec<u8>,
    pub data: Vec<u8>,
    pub flags: u32,
    pub opaque: u32,
    pub quiet: bool,
}

/// 带剩余TTL的读取响应
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetEResponse {
    pub miss: bool,
    pub key: Vec<u8>,
    pub data: Vec<u8>,
    pub flags: u32,
    /// 剩余TTL（秒）
    pub exptime: u32,
    pub opaque: u32,
    pub quiet: bool,
}

impl From<GetEResponse> for GetResponse {
    fn from(res: GetEResponse) -> Self {
        GetResponse {
            miss: res.miss,
            key: res.key,
            data: res.data,
            flags: res.flags,
            opaque: res.opaque,
            quiet: res.quiet,
        }
    }
}

/// 将memcached过期时间归一化为相对TTL
///
/// 不超过30天的值是相对TTL，原样返回（0表示永不过期）；
/// 更大的值是绝对unix时间戳，转换为`值 - 当前时间`
pub fn normalize_exptime(exptime: u32) -> u32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as u32;
    normalize_exptime_at(exptime, now)
}

/// [`normalize_exptime`]的可注入时钟版本
pub fn normalize_exptime_at(exptime: u32, now_unix: u32) -> u32 {
    if exptime > MAX_RELATIVE_TTL {
        exptime.saturating_sub(now_unix)
    } else {
        exptime
    }
}
