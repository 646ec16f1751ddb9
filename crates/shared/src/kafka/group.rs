//! 消费组抽象
//!
//! 消费组的成员关系与分区分配由 broker 负责，这里只定义业务侧需要响应的三类事件：
//! 会话开始（`setup`）、分区消息投递（`consume_claim`）、会话结束（`cleanup`）。
//! `ConsumerGroup` 描述一次"消费轮次"：阻塞直到会话因重平衡、错误或关闭信号而结束。

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::ConsumerRecord;
use crate::error::NotifyError;

// ---------------------------------------------------------------------------
// 会话状态机
// ---------------------------------------------------------------------------

/// 消费组会话状态
///
/// `Initializing → Claiming → Delivering ⇄ Rebalancing → Closing → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Initializing,
    Claiming,
    Delivering,
    Rebalancing,
    Closing,
    Closed,
}

impl GroupState {
    /// 判断状态迁移是否合法
    pub fn can_transition_to(self, next: GroupState) -> bool {
        use GroupState::*;
        matches!(
            (self, next),
            (Initializing, Claiming)
                | (Claiming, Delivering)
                | (Claiming, Rebalancing)
                | (Delivering, Rebalancing)
                | (Rebalancing, Delivering)
                | (Rebalancing, Claiming)
                | (Initializing | Claiming | Delivering | Rebalancing, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Claiming => "claiming",
            Self::Delivering => "delivering",
            Self::Rebalancing => "rebalancing",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// 线程安全的状态记录器，非法迁移只记录告警不拒绝
#[derive(Debug)]
pub struct GroupStateTracker {
    state: Mutex<GroupState>,
}

impl Default for GroupStateTracker {
    fn default() -> Self {
        Self {
            state: Mutex::new(GroupState::Initializing),
        }
    }
}

impl GroupStateTracker {
    pub fn current(&self) -> GroupState {
        *self.state.lock()
    }

    /// 迁移到新状态，返回迁移前的状态
    pub fn transition(&self, next: GroupState) -> GroupState {
        let mut state = self.state.lock();
        let prev = *state;
        if prev == next {
            return prev;
        }
        if !prev.can_transition_to(next) {
            warn!(from = %prev, to = %next, "消费组状态迁移不符合预期");
        } else {
            debug!(from = %prev, to = %next, "消费组状态迁移");
        }
        *state = next;
        prev
    }
}

// ---------------------------------------------------------------------------
// 会话与分区
// ---------------------------------------------------------------------------

/// 一次消费组会话
///
/// 由传输层实现，处理器通过它确认消息处理完成。
pub trait GroupSession: Send + Sync {
    /// 会话代次，每个消费轮次递增
    fn generation(&self) -> u64;

    /// 当前会话持有的分区
    fn claims(&self) -> Vec<i32>;

    /// 标记消息已处理，其 offset 将在下次提交时生效
    fn mark_message(&self, record: &ConsumerRecord);
}

/// 单个分区在一次会话内的消息流
///
/// 发送端关闭（会话结束或分区被回收）后 `next` 返回 `None`。
pub struct PartitionClaim {
    topic: String,
    partition: i32,
    records: mpsc::Receiver<ConsumerRecord>,
}

impl PartitionClaim {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        records: mpsc::Receiver<ConsumerRecord>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            records,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub async fn next(&mut self) -> Option<ConsumerRecord> {
        self.records.recv().await
    }
}

/// 消费组回调
///
/// 每个已分配的分区对应一个并发执行的 `consume_claim`，实现必须可被多个分区任务同时调用。
#[async_trait]
pub trait ConsumerGroupHandler: Send + Sync + 'static {
    /// 会话开始，分区分配完成后调用
    async fn setup(&self, session: &dyn GroupSession) -> Result<(), NotifyError>;

    /// 会话结束，所有分区任务退出后调用
    async fn cleanup(&self, session: &dyn GroupSession) -> Result<(), NotifyError>;

    /// 持续处理一个分区的消息，直到分区消息流关闭
    async fn consume_claim(
        &self,
        session: &dyn GroupSession,
        claim: PartitionClaim,
    ) -> Result<(), NotifyError>;
}

/// 消费组传输层
#[async_trait]
pub trait ConsumerGroup: Send {
    /// 执行一次消费轮次
    ///
    /// 阻塞直到会话结束：分区被回收时返回 `Ok`，收到关闭信号时返回 `Ok`，
    /// 传输层异常返回 `Err`，由调用方决定是否重试。
    async fn consume(
        &mut self,
        topics: &[&str],
        handler: Arc<dyn ConsumerGroupHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), NotifyError>;

    /// 关闭连接。消费 self 保证只关闭一次。
    fn close(self)
    where
        Self: Sized;
}

// ---------------------------------------------------------------------------
// ClaimDispatcher
// ---------------------------------------------------------------------------

/// 把消息按分区路由到各自的处理任务
///
/// 每个分区一个 `consume_claim` 任务，分区内保持顺序，分区间并发执行。
/// 通道有界，处理跟不上时对拉取循环形成背压。
pub struct ClaimDispatcher {
    topic: String,
    session: Arc<dyn GroupSession>,
    handler: Arc<dyn ConsumerGroupHandler>,
    senders: HashMap<i32, mpsc::Sender<ConsumerRecord>>,
    tasks: JoinSet<Result<(), NotifyError>>,
    buffer: usize,
}

impl ClaimDispatcher {
    pub fn new(
        topic: impl Into<String>,
        session: Arc<dyn GroupSession>,
        handler: Arc<dyn ConsumerGroupHandler>,
        buffer: usize,
    ) -> Self {
        Self {
            topic: topic.into(),
            session,
            handler,
            senders: HashMap::new(),
            tasks: JoinSet::new(),
            buffer: buffer.max(1),
        }
    }

    /// 为分区启动处理任务，已存在时忽略
    pub fn claim(&mut self, partition: i32) {
        if self.senders.contains_key(&partition) {
            return;
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        self.senders.insert(partition, tx);

        let claim = PartitionClaim::new(self.topic.clone(), partition, rx);
        let session = Arc::clone(&self.session);
        let handler = Arc::clone(&self.handler);
        self.tasks.spawn(async move {
            handler.consume_claim(session.as_ref(), claim).await
        });

        info!(topic = %self.topic, partition, "分区处理任务已启动");
    }

    /// 关闭分区消息流，任务处理完已投递的消息后自然退出
    pub fn release(&mut self, partition: i32) {
        if self.senders.remove(&partition).is_some() {
            info!(topic = %self.topic, partition, "分区已释放");
        }
    }

    pub fn claimed(&self) -> BTreeSet<i32> {
        self.senders.keys().copied().collect()
    }

    /// 投递消息到所属分区的任务，分区尚未认领时自动认领
    pub async fn dispatch(&mut self, record: ConsumerRecord) -> Result<(), NotifyError> {
        let partition = record.partition;
        if !self.senders.contains_key(&partition) {
            self.claim(partition);
        }

        let Some(sender) = self.senders.get(&partition) else {
            return Err(NotifyError::Internal(format!("分区 {partition} 未认领")));
        };

        sender.send(record).await.map_err(|_| {
            NotifyError::Session(format!("分区 {partition} 的处理任务已提前退出"))
        })
    }

    /// 关闭所有分区消息流并等待处理任务退出
    ///
    /// 返回第一个任务错误；所有任务都会被等待，不会因某个任务失败而遗留。
    pub async fn finish(mut self) -> Result<(), NotifyError> {
        self.senders.clear();

        let mut first_err = None;
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(NotifyError::Internal(format!("分区处理任务异常退出: {e}"))),
            };
            if let Err(e) = outcome {
                error!(error = %e, "分区处理任务返回错误");
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
