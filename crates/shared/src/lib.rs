//! 共享库
//!
//! 包含消费端与生产端共用的配置、错误处理、Kafka 消费组抽象、HTTP 服务和生命周期管理。

pub mod config;
pub mod error;
pub mod kafka;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod roster;
pub mod server;
