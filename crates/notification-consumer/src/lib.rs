//! 通知消费服务
//!
//! 以消费组方式持续消费 `notifications` topic，把通知按收件人写入内存收件箱，
//! 并通过 HTTP 提供查询。

pub mod error;
pub mod handler;
pub mod routes;
pub mod service;
pub mod store;
pub mod worker;

pub use error::ConsumerError;
pub use handler::NotificationHandler;
pub use service::{ConsumerService, run};
pub use store::NotificationStore;
pub use worker::{ConsumerGroupWorker, WorkerStats};
