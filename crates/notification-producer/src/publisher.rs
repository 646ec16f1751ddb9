//! 通知发布
//!
//! 校验收发双方、构造通知、序列化并同步发送，失败直接返回给调用方，不重试。

use std::sync::Arc;

use async_trait::async_trait;
use notify_shared::error::NotifyError;
use notify_shared::kafka::KafkaProducer;
use notify_shared::models::Notification;
use notify_shared::observability::metrics;
use notify_shared::roster::Roster;
use tracing::info;

use crate::error::{ProducerError, Result};

/// 消息发送接口
///
/// 发送须等待 broker 确认，返回消息所在的分区和 offset。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSender: Send + Sync {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> std::result::Result<(i32, i64), NotifyError>;
}

#[async_trait]
impl RecordSender for KafkaProducer {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> std::result::Result<(i32, i64), NotifyError> {
        KafkaProducer::send(self, topic, key, payload).await
    }
}

/// 一次成功发布的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    pub partition: i32,
    pub offset: i64,
}

pub struct Publisher {
    sender: Arc<dyn RecordSender>,
    roster: Roster,
    topic: String,
}

impl Publisher {
    pub fn new(sender: Arc<dyn RecordSender>, roster: Roster, topic: impl Into<String>) -> Self {
        Self {
            sender,
            roster,
            topic: topic.into(),
        }
    }

    /// 发布一条通知，以收件人 ID 作为消息 key
    pub async fn publish(&self, from_id: i64, to_id: i64, message: &str) -> Result<Published> {
        let from = self.find_user(from_id)?;
        let to = self.find_user(to_id)?;
        let key = to.key();
        let notification = Notification::new(from.clone(), to.clone(), message);

        let payload = notification.to_bytes().map_err(|e| {
            metrics::record_published("serialization_error");
            ProducerError::Serialization(e.to_string())
        })?;

        let (partition, offset) = self
            .sender
            .send(&self.topic, &key, &payload)
            .await
            .map_err(|e| {
                metrics::record_published("send_error");
                ProducerError::Publish(e)
            })?;

        metrics::record_published("success");
        info!(
            topic = %self.topic,
            from = from_id,
            to = to_id,
            partition,
            offset,
            "通知已发送到 Kafka"
        );
        Ok(Published { partition, offset })
    }

    fn find_user(&self, id: i64) -> Result<&notify_shared::models::User> {
        self.roster.find(id).map_err(|e| match e {
            NotifyError::UserNotFound { id } => {
                metrics::record_published("user_not_found");
                ProducerError::UserNotFound { id }
            }
            other => ProducerError::Shared(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher(sender: MockRecordSender) -> Publisher {
        Publisher::new(Arc::new(sender), Roster::builtin(), "notifications")
    }

    #[tokio::test]
    async fn test_publish_keys_by_recipient() {
        let mut sender = MockRecordSender::new();
        sender
            .expect_send()
            .withf(|topic, key, payload| {
                let notification = Notification::from_bytes(payload).unwrap();
                topic.to_string() == "notifications"
                    && key.to_string() == "2"
                    && notification.from.name == "Micho"
                    && notification.to.name == "Tito"
                    && notification.message == "hi"
            })
            .times(1)
            .returning(|_, _, _| Ok((0, 41)));

        let published = tokio_test::assert_ok!(publisher(sender).publish(1, 2, "hi").await);
        assert_eq!(published, Published { partition: 0, offset: 41 });
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_not_published() {
        let mut sender = MockRecordSender::new();
        sender.expect_send().never();

        let err = publisher(sender).publish(1, 99, "hi").await.unwrap_err();
        assert!(matches!(err, ProducerError::UserNotFound { id: 99 }));
    }

    #[tokio::test]
    async fn test_unknown_sender_is_not_published() {
        let mut sender = MockRecordSender::new();
        sender.expect_send().never();

        let err = publisher(sender).publish(0, 2, "hi").await.unwrap_err();
        assert!(matches!(err, ProducerError::UserNotFound { id: 0 }));
    }

    #[tokio::test]
    async fn test_send_failure_is_reported() {
        let mut sender = MockRecordSender::new();
        sender
            .expect_send()
            .withf(|topic, key, _| topic.to_string() == "notifications" && key.to_string() == "4")
            .times(1)
            .returning(|_, _, _| Err(NotifyError::Kafka("message timed out".to_string())));

        let err = publisher(sender).publish(3, 4, "yo").await.unwrap_err();
        assert!(matches!(err, ProducerError::Publish(_)));
        assert_eq!(
            err.to_string(),
            "failed to send message to Kafka: Kafka 错误: message timed out"
        );
    }
}
