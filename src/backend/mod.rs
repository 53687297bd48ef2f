//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 持久存储后端模块

pub mod redis;

pub use redis::RedisStore;
