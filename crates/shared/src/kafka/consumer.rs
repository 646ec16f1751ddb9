//! 基于 rdkafka 的消费组实现
//!
//! 重平衡事件通过 `ConsumerContext` 回调转发到消费轮次中：
//! 分区分配时认领新分区，分区回收时结束当前会话，由驱动循环发起下一轮。
//! offset 采用手动存储 + 自动提交：处理器调用 `mark_message` 之后才会被提交。

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use rdkafka::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::BorrowedMessage;
use rdkafka::topic_partition_list::TopicPartitionList;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::group::{
    ClaimDispatcher, ConsumerGroup, ConsumerGroupHandler, GroupSession, GroupState,
    GroupStateTracker,
};
use super::ConsumerRecord;
use crate::config::KafkaConfig;
use crate::error::NotifyError;

/// 每个分区处理任务的消息缓冲
const CLAIM_BUFFER: usize = 16;

// ---------------------------------------------------------------------------
// 重平衡回调
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum RebalanceEvent {
    Assigned(Vec<i32>),
    Revoked(Vec<i32>),
    Failed(String),
}

/// 把 librdkafka 线程上的重平衡回调转为异步事件
struct GroupContext {
    events: mpsc::UnboundedSender<RebalanceEvent>,
}

fn partitions(tpl: &TopicPartitionList) -> Vec<i32> {
    tpl.elements().iter().map(|e| e.partition()).collect()
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        let event = match rebalance {
            Rebalance::Revoke(tpl) => RebalanceEvent::Revoked(partitions(tpl)),
            Rebalance::Error(e) => RebalanceEvent::Failed(e.to_string()),
            Rebalance::Assign(_) => return,
        };
        // 接收端随消费组一起释放，关闭阶段发送失败可以忽略
        let _ = self.events.send(event);
    }

    fn post_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(tpl) = rebalance {
            let _ = self.events.send(RebalanceEvent::Assigned(partitions(tpl)));
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        if let Err(e) = result {
            // 没有新 offset 时 librdkafka 也会回调错误，不值得告警
            if !matches!(e, KafkaError::ConsumerCommit(rdkafka::types::RDKafkaErrorCode::NoOffset)) {
                warn!(error = %e, "提交 offset 失败");
            }
        }
    }
}

type GroupConsumer = StreamConsumer<GroupContext>;

// ---------------------------------------------------------------------------
// 会话
// ---------------------------------------------------------------------------

struct KafkaSession {
    consumer: Arc<GroupConsumer>,
    generation: u64,
    claims: Mutex<BTreeSet<i32>>,
}

impl GroupSession for KafkaSession {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn claims(&self) -> Vec<i32> {
        self.claims.lock().iter().copied().collect()
    }

    fn mark_message(&self, record: &ConsumerRecord) {
        if let Err(e) = self
            .consumer
            .store_offset(&record.topic, record.partition, record.offset)
        {
            // 分区已被回收时存储会失败，消息将由新的持有者重新投递
            warn!(
                error = %e,
                partition = record.partition,
                offset = record.offset,
                "存储 offset 失败"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumerGroup
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费组
///
/// 独占持有底层连接，`close` 之后连接释放。
pub struct KafkaConsumerGroup {
    consumer: Arc<GroupConsumer>,
    events: mpsc::UnboundedReceiver<RebalanceEvent>,
    state: GroupStateTracker,
    generation: u64,
    subscribed: bool,
    group_id: String,
}

impl KafkaConsumerGroup {
    /// 创建消费组并确认 broker 可达
    ///
    /// 启动阶段连接失败直接返回 `Connection` 错误，不做重试。
    pub async fn connect(config: &KafkaConfig) -> Result<Self, NotifyError> {
        info!(brokers = %config.brokers, "正在连接 Kafka");

        let (tx, rx) = mpsc::unbounded_channel();
        let consumer: GroupConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set(
                "socket.connection.setup.timeout.ms",
                (config.connect_timeout_secs * 1000).to_string(),
            )
            .create_with_context(GroupContext { events: tx })
            .map_err(|e| NotifyError::Connection(format!("创建消费者失败: {e}")))?;
        let consumer = Arc::new(consumer);

        // 拉取元数据是阻塞调用，放到 blocking 线程池执行
        let client = Arc::clone(&consumer);
        let topic = config.topic.clone();
        let timeout = config.connect_timeout();
        tokio::task::spawn_blocking(move || {
            client
                .fetch_metadata(Some(&topic), timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| NotifyError::Internal(format!("连接检查任务异常: {e}")))?
        .map_err(|e| NotifyError::Connection(format!("无法连接 Kafka {}: {e}", config.brokers)))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费组已连接"
        );

        Ok(Self {
            consumer,
            events: rx,
            state: GroupStateTracker::default(),
            generation: 0,
            subscribed: false,
            group_id: config.consumer_group.clone(),
        })
    }

    fn subscribe(&mut self, topics: &[&str]) -> Result<(), NotifyError> {
        if self.subscribed {
            return Ok(());
        }
        self.consumer
            .subscribe(topics)
            .map_err(|e| NotifyError::Kafka(format!("订阅 topic 失败: {e}")))?;
        self.subscribed = true;
        info!(?topics, group_id = %self.group_id, "已订阅 Kafka topics");
        Ok(())
    }

    fn current_assignment(&self) -> BTreeSet<i32> {
        match self.consumer.assignment() {
            Ok(tpl) => partitions(&tpl).into_iter().collect(),
            Err(e) => {
                debug!(error = %e, "读取当前分区分配失败");
                BTreeSet::new()
            }
        }
    }
}

/// 把一次拉取结果转换为拥有所有权的记录，借用消息不跨越 await
fn into_record(
    polled: Option<KafkaResult<BorrowedMessage<'_>>>,
) -> Result<ConsumerRecord, NotifyError> {
    match polled {
        Some(Ok(msg)) => Ok(ConsumerRecord::from_borrowed(&msg)),
        Some(Err(e)) => Err(NotifyError::Kafka(format!("接收消息出错: {e}"))),
        None => Err(NotifyError::Kafka("消息流意外结束".to_string())),
    }
}

#[async_trait]
impl ConsumerGroup for KafkaConsumerGroup {
    async fn consume(
        &mut self,
        topics: &[&str],
        handler: Arc<dyn ConsumerGroupHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), NotifyError> {
        if *shutdown.borrow() {
            return Ok(());
        }

        self.subscribe(topics)?;
        self.state.transition(GroupState::Claiming);

        self.generation += 1;
        let generation = self.generation;
        let session = Arc::new(KafkaSession {
            consumer: Arc::clone(&self.consumer),
            generation,
            claims: Mutex::new(self.current_assignment()),
        });

        if let Err(e) = handler.setup(session.as_ref()).await {
            self.state.transition(GroupState::Rebalancing);
            return Err(e);
        }

        let topic = topics.first().copied().unwrap_or_default();
        let mut dispatcher = ClaimDispatcher::new(
            topic,
            Arc::clone(&session) as Arc<dyn GroupSession>,
            Arc::clone(&handler),
            CLAIM_BUFFER,
        );
        for partition in session.claims() {
            dispatcher.claim(partition);
        }

        self.state.transition(GroupState::Delivering);
        info!(generation, claims = ?session.claims(), "消费会话开始");

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        let outcome = loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时不再拉取新消息
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(generation, "收到关闭信号，结束消费会话");
                        break Ok(());
                    }
                }

                Some(event) = self.events.recv() => match event {
                    RebalanceEvent::Assigned(assigned) => {
                        info!(generation, partitions = ?assigned, "分区已分配");
                        let mut claims = session.claims.lock();
                        for partition in assigned {
                            claims.insert(partition);
                            dispatcher.claim(partition);
                        }
                    }
                    RebalanceEvent::Revoked(revoked) => {
                        info!(generation, partitions = ?revoked, "分区被回收，结束消费会话");
                        break Ok(());
                    }
                    RebalanceEvent::Failed(reason) => {
                        break Err(NotifyError::Session(format!("重平衡失败: {reason}")));
                    }
                },

                polled = stream.next() => {
                    let record = match into_record(polled) {
                        Ok(record) => record,
                        Err(e) => break Err(e),
                    };
                    debug!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        "收到 Kafka 消息"
                    );
                    if let Err(e) = dispatcher.dispatch(record).await {
                        break Err(e);
                    }
                }
            }
        };

        // 已投递的消息处理完之后再结束会话
        let drained = dispatcher.finish().await;

        self.state.transition(GroupState::Rebalancing);
        if let Err(e) = handler.cleanup(session.as_ref()).await {
            error!(generation, error = %e, "会话清理失败");
        }
        info!(generation, "消费会话结束");

        outcome.and(drained)
    }

    fn close(self) {
        self.state.transition(GroupState::Closing);
        self.consumer.unsubscribe();
        self.state.transition(GroupState::Closed);
        info!(group_id = %self.group_id, "Kafka 消费组已关闭");
    }
}

impl std::fmt::Debug for KafkaConsumerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConsumerGroup")
            .field("group_id", &self.group_id)
            .field("state", &self.state.current())
            .finish()
    }
}

/// 单元测试只覆盖不依赖 broker 的部分，完整链路见消费端集成测试
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_from_list() {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition("notifications", 0);
        tpl.add_partition("notifications", 2);
        assert_eq!(partitions(&tpl), vec![0, 2]);
    }

    #[test]
    fn test_into_record_end_of_stream() {
        let err = into_record(None).unwrap_err();
        assert!(err.is_retryable());
    }
}
