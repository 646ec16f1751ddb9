//! 通知消息处理器
//!
//! 每个分区一个 `consume_claim` 任务并发调用同一个处理器，
//! 共享状态只有收件箱本身。

use std::sync::Arc;

use async_trait::async_trait;
use notify_shared::error::NotifyError;
use notify_shared::kafka::{ConsumerGroupHandler, ConsumerRecord, GroupSession, PartitionClaim};
use notify_shared::models::Notification;
use notify_shared::observability::metrics;
use tracing::{debug, info, warn};

use crate::error::ConsumerError;
use crate::store::NotificationStore;

/// 单条记录的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored,
    Skipped,
}

pub struct NotificationHandler {
    store: Arc<NotificationStore>,
}

impl NotificationHandler {
    pub fn new(store: Arc<NotificationStore>) -> Self {
        Self { store }
    }

    /// 处理一条记录：解码、入库、确认
    ///
    /// 解码失败的记录只记日志并跳过，不确认也不重试；
    /// 确认只发生在入库之后。
    pub fn handle_record(&self, session: &dyn GroupSession, record: &ConsumerRecord) -> RecordOutcome {
        let (recipient, notification) = match decode(record) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, topic = %record.topic, "跳过无法解码的消息");
                let reason = match &e {
                    ConsumerError::MalformedRecord {
                        source: NotifyError::MissingKey { .. },
                        ..
                    } => "missing_key",
                    _ => "malformed",
                };
                metrics::record_skipped(reason);
                return RecordOutcome::Skipped;
            }
        };

        debug!(
            recipient = %recipient,
            from = notification.from.id,
            partition = record.partition,
            offset = record.offset,
            "通知已入库"
        );
        self.store.add(recipient, notification);
        session.mark_message(record);
        metrics::record_consumed(record.partition);

        RecordOutcome::Stored
    }
}

/// 取出收件人 key 并反序列化负载
fn decode(record: &ConsumerRecord) -> Result<(&str, Notification), ConsumerError> {
    let malformed = |source: NotifyError| ConsumerError::MalformedRecord {
        partition: record.partition,
        offset: record.offset,
        source,
    };

    let recipient = record.require_key().map_err(malformed)?;
    let notification = record.deserialize_payload::<Notification>().map_err(malformed)?;
    Ok((recipient, notification))
}

#[async_trait]
impl ConsumerGroupHandler for NotificationHandler {
    async fn setup(&self, session: &dyn GroupSession) -> Result<(), NotifyError> {
        info!(
            generation = session.generation(),
            claims = ?session.claims(),
            "消费组会话建立"
        );
        Ok(())
    }

    async fn cleanup(&self, session: &dyn GroupSession) -> Result<(), NotifyError> {
        info!(
            generation = session.generation(),
            stored_users = self.store.user_count(),
            stored_total = self.store.total(),
            "消费组会话清理"
        );
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        mut claim: PartitionClaim,
    ) -> Result<(), NotifyError> {
        let partition = claim.partition();
        info!(topic = %claim.topic(), partition, "开始消费分区");

        let mut stored = 0u64;
        let mut skipped = 0u64;
        while let Some(record) = claim.next().await {
            match self.handle_record(session, &record) {
                RecordOutcome::Stored => stored += 1,
                RecordOutcome::Skipped => skipped += 1,
            }
        }

        info!(partition, stored, skipped, "分区消费结束");
        Ok(())
    }
}
