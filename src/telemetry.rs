//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存代理的日志初始化功能。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化tracing日志
///
/// 此函数应该在应用程序启动时调用一次。
/// 过滤级别由`RUST_LOG`环境变量控制，默认`info`。
/// 指标/遥测汇聚由外部协作方负责，这里只配置结构化日志输出。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // 与其他tracing初始化可能冲突，由嵌入方决定是否调用，失败时静默忽略
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
