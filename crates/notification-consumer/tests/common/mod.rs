//! 集成测试用的内存消费组
//!
//! 按脚本逐轮返回：投递一批记录，或以传输错误结束。
//! 脚本耗尽后阻塞到关闭信号，模拟一个空闲但仍持有分区的会话。

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use notify_shared::error::NotifyError;
use notify_shared::kafka::{
    ClaimDispatcher, ConsumerGroup, ConsumerGroupHandler, ConsumerRecord, GroupSession,
};
use notify_shared::models::{Notification, User};
use parking_lot::Mutex;
use tokio::sync::watch;

pub const TOPIC: &str = "notifications";

pub enum Pass {
    Deliver(Vec<ConsumerRecord>),
    Fail(&'static str),
}

/// 记录被确认的 (partition, offset)
#[derive(Default)]
pub struct ScriptedSession {
    generation: u64,
    pub marked: Mutex<Vec<(i32, i64)>>,
}

impl GroupSession for ScriptedSession {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn claims(&self) -> Vec<i32> {
        vec![0]
    }

    fn mark_message(&self, record: &ConsumerRecord) {
        self.marked.lock().push((record.partition, record.offset));
    }
}

#[derive(Default)]
pub struct GroupLog {
    pub passes: AtomicUsize,
    pub closed: AtomicUsize,
    pub marked: Mutex<Vec<(i32, i64)>>,
}

impl GroupLog {
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn marked(&self) -> Vec<(i32, i64)> {
        self.marked.lock().clone()
    }
}

pub struct ScriptedGroup {
    script: VecDeque<Pass>,
    log: Arc<GroupLog>,
}

impl ScriptedGroup {
    pub fn new(script: Vec<Pass>) -> (Self, Arc<GroupLog>) {
        let log = Arc::new(GroupLog::default());
        let group = Self {
            script: script.into(),
            log: Arc::clone(&log),
        };
        (group, log)
    }
}

#[async_trait]
impl ConsumerGroup for ScriptedGroup {
    async fn consume(
        &mut self,
        _topics: &[&str],
        handler: Arc<dyn ConsumerGroupHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), NotifyError> {
        let generation = self.log.passes.fetch_add(1, Ordering::SeqCst) as u64 + 1;

        let records = match self.script.pop_front() {
            Some(Pass::Fail(reason)) => return Err(NotifyError::Kafka(reason.to_string())),
            Some(Pass::Deliver(records)) => records,
            None => {
                let _ = shutdown.wait_for(|stop| *stop).await;
                return Ok(());
            }
        };

        let session = Arc::new(ScriptedSession {
            generation,
            ..Default::default()
        });
        handler.setup(session.as_ref()).await?;

        let mut dispatcher = ClaimDispatcher::new(
            TOPIC,
            Arc::clone(&session) as Arc<dyn GroupSession>,
            Arc::clone(&handler),
            16,
        );
        for record in records {
            dispatcher.dispatch(record).await?;
        }
        let drained = dispatcher.finish().await;

        handler.cleanup(session.as_ref()).await?;
        self.log
            .marked
            .lock()
            .extend(session.marked.lock().iter().copied());
        drained
    }

    fn close(self) {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn notification_record(partition: i32, offset: i64, from: i64, to: i64, message: &str) -> ConsumerRecord {
    let payload = Notification::new(User::new(from, "from"), User::new(to, "to"), message)
        .to_bytes()
        .unwrap();
    ConsumerRecord::new(TOPIC, partition, offset, Some(&to.to_string()), payload)
}

pub fn raw_record(partition: i32, offset: i64, key: Option<&str>, payload: &[u8]) -> ConsumerRecord {
    ConsumerRecord::new(TOPIC, partition, offset, key, payload.to_vec())
}
