//! 发布服务装配
//!
//! 启动顺序：创建生产者并确认 broker 可达（失败即退出）→ 绑定 HTTP → 等待中断 → 刷出生产者。

use std::sync::Arc;
use std::time::Duration;

use notify_shared::config::AppConfig;
use notify_shared::kafka::KafkaProducer;
use notify_shared::lifecycle::{Lifecycle, ShutdownOutcome, interrupt_channel};
use notify_shared::roster::Roster;
use notify_shared::server::HttpServer;
use tracing::info;

use crate::error::Result;
use crate::publisher::Publisher;
use crate::routes::{self, AppState};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(config: &AppConfig) -> Result<ShutdownOutcome> {
    let producer = KafkaProducer::new(&config.kafka)?;
    producer
        .verify(&config.kafka.topic, config.kafka.connect_timeout())
        .await?;

    let roster = Roster::builtin();
    info!(users = roster.len(), "用户名册已加载");

    let publisher = Publisher::new(
        Arc::new(producer.clone()),
        roster,
        config.kafka.topic.clone(),
    );
    let state = AppState::new(Arc::new(publisher), config.service_name.clone());
    let server = HttpServer::bind(&config.server_addr(), routes::router(state)).await?;
    info!(
        addr = %server.local_addr(),
        topic = %config.kafka.topic,
        "通知发布服务已启动"
    );

    let lifecycle = Lifecycle::new(config.shutdown.grace_period());
    let outcome = lifecycle.run(interrupt_channel(), server, None).await;

    producer.flush(FLUSH_TIMEOUT);
    Ok(outcome)
}
