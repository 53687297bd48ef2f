//! memstrata - memcached协议兼容的分层缓存代理核心
//!
//! 提供易失快层与持久慢层的两级编排，支持按动词的一致性策略、
//! 慢层命中回填快层、异步批量写回与优雅停机排空。

#![doc(html_root_url = "https://docs.rs/memstrata/0.1.0")]

pub mod backend;
pub mod common;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod orcas;
pub mod protocol;
pub mod shutdown;
pub mod sync;
pub mod telemetry;

// Re-export commonly used items
pub use common::{
    DeleteRequest, GatRequest, GetEResponse, GetRequest, GetResponse, RequestKind, SetRequest,
    TouchRequest,
};
pub use config::Config;
pub use error::{CacheError, Result};
pub use handlers::durable::DurableHandler;
pub use handlers::volatile::VolatileHandler;
pub use handlers::TierHandler;
pub use orcas::{L1L2Orca, L1OnlyOrca, Orca};
pub use protocol::Responder;
pub use sync::{Replicator, WriteBackBuffer};

/// memstrata 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
