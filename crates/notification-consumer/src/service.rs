//! 消费服务装配
//!
//! 启动顺序：连接 Kafka（失败即退出）→ 绑定 HTTP → 启动消费循环 → 等待中断。

use std::net::SocketAddr;
use std::sync::Arc;

use notify_shared::config::AppConfig;
use notify_shared::kafka::{ConsumerGroup, KafkaConsumerGroup};
use notify_shared::lifecycle::{Lifecycle, ShutdownOutcome, interrupt_channel};
use notify_shared::server::HttpServer;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::Result;
use crate::handler::NotificationHandler;
use crate::routes::{self, AppState};
use crate::store::NotificationStore;
use crate::worker::ConsumerGroupWorker;

/// 已绑定端口、尚未开始消费的服务实例
pub struct ConsumerService<G> {
    store: Arc<NotificationStore>,
    worker: ConsumerGroupWorker<G>,
    server: HttpServer,
    lifecycle: Lifecycle,
}

impl<G: ConsumerGroup + 'static> ConsumerService<G> {
    pub async fn start(group: G, config: &AppConfig) -> Result<Self> {
        let store = Arc::new(NotificationStore::new());
        let handler = Arc::new(NotificationHandler::new(Arc::clone(&store)));
        let worker = ConsumerGroupWorker::new(
            group,
            handler,
            vec![config.kafka.topic.clone()],
            config.kafka.retry_backoff(),
        );

        let state = AppState::new(Arc::clone(&store), config.service_name.clone());
        let server = HttpServer::bind(&config.server_addr(), routes::router(state)).await?;

        Ok(Self {
            store,
            worker,
            server,
            lifecycle: Lifecycle::new(config.shutdown.grace_period()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn store(&self) -> Arc<NotificationStore> {
        Arc::clone(&self.store)
    }

    /// 启动消费循环并运行到关闭完成
    pub async fn run_until(self, interrupts: mpsc::Receiver<()>) -> ShutdownOutcome {
        let cancel = self.lifecycle.cancellation();
        let worker = self.worker;
        let handle = tokio::spawn(async move {
            let stats = worker.run(cancel).await;
            info!(passes = stats.passes, failed_passes = stats.failed_passes, "消费任务结束");
        });

        self.lifecycle.run(interrupts, self.server, Some(handle)).await
    }
}

/// 连接 Kafka 并运行消费服务，直到收到中断信号
pub async fn run(config: &AppConfig) -> Result<ShutdownOutcome> {
    let group = KafkaConsumerGroup::connect(&config.kafka).await?;
    let service = ConsumerService::start(group, config).await?;
    info!(
        addr = %service.local_addr(),
        topic = %config.kafka.topic,
        group_id = %config.kafka.consumer_group,
        "通知消费服务已启动"
    );
    Ok(service.run_until(interrupt_channel()).await)
}
