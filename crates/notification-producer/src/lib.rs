//! 通知发布服务
//!
//! 接收 HTTP 发送请求，校验收发双方后把通知同步发布到 `notifications` topic，
//! 以收件人 ID 作为消息 key。

pub mod error;
pub mod publisher;
pub mod routes;
pub mod service;

pub use error::ProducerError;
pub use publisher::{Published, Publisher, RecordSender};
pub use service::run;
