//! 消费组驱动循环
//!
//! 反复执行消费轮次，每轮阻塞到会话结束（分区回收、传输错误或取消）。
//! 非取消导致的错误记日志后固定等待一段时间再重试，不做指数退避也不限制次数。

use std::sync::Arc;
use std::time::Duration;

use notify_shared::kafka::{ConsumerGroup, ConsumerGroupHandler};
use notify_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// 驱动循环退出时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub passes: u64,
    pub failed_passes: u64,
}

pub struct ConsumerGroupWorker<G> {
    group: G,
    handler: Arc<dyn ConsumerGroupHandler>,
    topics: Vec<String>,
    backoff: Duration,
}

impl<G: ConsumerGroup> ConsumerGroupWorker<G> {
    pub fn new(
        group: G,
        handler: Arc<dyn ConsumerGroupHandler>,
        topics: Vec<String>,
        backoff: Duration,
    ) -> Self {
        Self {
            group,
            handler,
            topics,
            backoff,
        }
    }

    /// 运行到收到取消信号，退出前关闭消费组
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
        info!(?topics, backoff_ms = self.backoff.as_millis() as u64, "消费循环启动");

        loop {
            if *cancel.borrow() {
                info!("收到取消信号，不再发起新的消费轮次");
                break;
            }

            stats.passes += 1;
            let result = self
                .group
                .consume(&topics, Arc::clone(&self.handler), cancel.clone())
                .await;

            match result {
                Ok(()) => debug!(pass = stats.passes, "消费轮次结束"),
                Err(e) => {
                    if *cancel.borrow() {
                        info!(error = %e, "取消过程中消费轮次出错，停止重试");
                        break;
                    }

                    stats.failed_passes += 1;
                    metrics::record_consume_error();
                    error!(
                        error = %e,
                        retryable = e.is_retryable(),
                        pass = stats.passes,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "消费轮次出错，稍后重试"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => {}
                        _ = cancelled(&mut cancel) => {
                            info!("等待重试期间收到取消信号");
                            break;
                        }
                    }
                }
            }
        }

        drop(topics);
        self.group.close();
        info!(
            passes = stats.passes,
            failed_passes = stats.failed_passes,
            "消费循环已退出"
        );
        stats
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // 发送端被丢弃同样视为取消
    let _ = cancel.wait_for(|c| *c).await;
}
