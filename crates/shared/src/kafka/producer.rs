//! Kafka 生产者封装
//!
//! 每次发送都等待 broker 确认后才返回，不做本地缓冲或批量聚合，
//! 调用方能拿到消息落在的分区和 offset。

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::error::NotifyError;

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer`，Clone 只复制内部的 Arc。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// 设置 `message.timeout.ms` 为 5 秒，超时即向调用方报错，由调用方决定是否重试。
    pub fn new(config: &KafkaConfig) -> Result<Self, NotifyError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .set(
                "socket.connection.setup.timeout.ms",
                (config.connect_timeout_secs * 1000).to_string(),
            )
            .create()
            .map_err(|e| NotifyError::Connection(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 确认 broker 可达，启动阶段调用
    pub async fn verify(&self, topic: &str, timeout: Duration) -> Result<(), NotifyError> {
        let producer = self.producer.clone();
        let topic = topic.to_string();
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(&topic), timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| NotifyError::Internal(format!("连接检查任务异常: {e}")))?
        .map_err(|e| NotifyError::Connection(format!("无法连接 Kafka: {e}")))
    }

    /// 发送原始字节消息
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), NotifyError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        // rdkafka 0.39+ 返回 Delivery 结构体而非元组
        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| NotifyError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 关闭前刷出尚未确认的消息
    pub fn flush(&self, timeout: Duration) {
        if let Err(e) = self.producer.flush(timeout) {
            warn!(error = %e, "刷出待发送消息超时");
        } else {
            info!("Kafka 生产者已关闭");
        }
    }
}
