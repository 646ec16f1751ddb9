//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的生产者与消费组抽象，
//! 统一消息表示、错误映射和优雅关闭语义。

pub mod consumer;
pub mod group;
pub mod producer;

use rdkafka::message::{BorrowedMessage, Message};
use serde::de::DeserializeOwned;

use crate::error::NotifyError;

pub use consumer::KafkaConsumerGroup;
pub use group::{
    ClaimDispatcher, ConsumerGroup, ConsumerGroupHandler, GroupSession, GroupState,
    GroupStateTracker, PartitionClaim,
};
pub use producer::KafkaProducer;

/// 集中管理 topic 名称
pub mod topics {
    pub const NOTIFICATIONS: &str = "notifications";
}

/// 默认消费组
pub const NOTIFICATIONS_GROUP: &str = "notifications-group";

// ---------------------------------------------------------------------------
// ConsumerRecord
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以跨 await 点、跨任务传递给分区处理任务。
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl ConsumerRecord {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Option<&str>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: key.map(String::from),
            payload: payload.into(),
        }
    }

    /// 从 rdkafka 的借用消息构造，非 UTF-8 的 key 视为缺失
    pub(crate) fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
        }
    }

    /// 返回 key，缺失时报错
    pub fn require_key(&self) -> Result<&str, NotifyError> {
        self.key.as_deref().ok_or_else(|| NotifyError::MissingKey {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        })
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, NotifyError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| NotifyError::Deserialization(e.to_string()))
    }
}
