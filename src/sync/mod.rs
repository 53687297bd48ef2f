//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 异步数据同步模块：写回缓冲与层间复制

pub mod replication;
pub mod write_back;

pub use replication::Replicator;
pub use write_back::{BatchSink, WriteBackBuffer, WriteBackEntry};
