//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存代理的配置结构和解析逻辑。

use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

/// 顶层配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 监听端口（由外部连接循环使用）
    pub listen_port: u16,
    /// 编排模式
    pub mode: OrchestratorMode,
    /// 易失层配置
    pub volatile: VolatileConfig,
    /// 持久层配置
    pub durable: DurableConfig,
    /// 优雅关闭配置
    pub shutdown: ShutdownConfig,
}

/// 编排模式枚举
///
/// 定义支持的分层架构
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorMode {
    /// 仅易失层
    L1Only,
    /// 双层（易失层+持久层）
    #[default]
    L1L2,
}

/// 易失层（L1）配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct VolatileConfig {
    /// 最大缓存条目数
    pub max_items: u64,
}

impl Default for VolatileConfig {
    fn default() -> Self {
        Self { max_items: 1_000_000 }
    }
}

/// 持久层（L2）配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DurableConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 是否启用写回缓冲（false时每条Set直接落盘）
    pub enable_write_back: bool,
    /// 写回缓冲配置
    pub write_back: WriteBackConfig,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            enable_write_back: true,
            write_back: WriteBackConfig::default(),
        }
    }
}

/// 写回缓冲配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct WriteBackConfig {
    /// 队列容量（条目数），入队在到达容量时阻塞
    pub capacity: usize,
    /// 低水位线：队列长度达到该值即触发抢先刷新
    pub low_water_mark: usize,
    /// 单次批量写入的最大条目数
    pub max_batch_size: usize,
    /// 队列长度轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 周期性刷新间隔（毫秒）
    pub flush_period_ms: u64,
}

impl Default for WriteBackConfig {
    fn default() -> Self {
        Self {
            capacity: 80_000,
            low_water_mark: 1_000,
            max_batch_size: 5_000,
            poll_interval_ms: 5,
            flush_period_ms: 200,
        }
    }
}

/// 优雅关闭配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ShutdownConfig {
    /// 只读模式切换后等待在途请求入队的宽限期（毫秒）
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_period_ms: 500 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 11211,
            mode: OrchestratorMode::default(),
            volatile: VolatileConfig::default(),
            durable: DurableConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(s: &str) -> Result<Self, String> {
        let config: Config = toml::from_str(s).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有数值在合理范围内
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("listen_port cannot be zero".to_string());
        }

        if self.volatile.max_items == 0 {
            return Err("volatile max_items cannot be zero".to_string());
        }

        let timeout = self.durable.connection_timeout_ms;
        if !(100..=30_000).contains(&timeout) {
            return Err("durable connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }

        let timeout = self.durable.command_timeout_ms;
        if !(100..=60_000).contains(&timeout) {
            return Err("durable command_timeout_ms must be between 100 and 60000 ms".to_string());
        }

        let wb = &self.durable.write_back;
        if wb.capacity == 0 {
            return Err("write_back capacity cannot be zero".to_string());
        }
        if wb.max_batch_size == 0 {
            return Err("write_back max_batch_size cannot be zero".to_string());
        }
        if wb.max_batch_size > wb.capacity {
            return Err(format!(
                "write_back max_batch_size ({}) cannot exceed capacity ({})",
                wb.max_batch_size, wb.capacity
            ));
        }
        if wb.low_water_mark == 0 || wb.low_water_mark > wb.capacity {
            return Err(format!(
                "write_back low_water_mark ({}) must be between 1 and capacity ({})",
                wb.low_water_mark, wb.capacity
            ));
        }
        if wb.poll_interval_ms == 0 {
            return Err("write_back poll_interval_ms cannot be zero".to_string());
        }
        if wb.flush_period_ms == 0 || wb.flush_period_ms > 60_000 {
            return Err("write_back flush_period_ms must be between 1 and 60000 ms".to_string());
        }

        Ok(())
    }
}
