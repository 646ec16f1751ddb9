//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 服务名常量，同时用作配置文件名和日志中的服务标识
pub mod services {
    pub const CONSUMER: &str = "notification-consumer";
    pub const PRODUCER: &str = "notification-producer";
}

/// Kafka 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub consumer_group: String,
    pub topic: String,
    pub auto_offset_reset: String,
    /// 建立初始连接（拉取元数据）的超时时间
    pub connect_timeout_secs: u64,
    /// 消费轮次出错后的固定等待时间
    pub retry_backoff_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            consumer_group: "notifications-group".to_string(),
            topic: "notifications".to_string(),
            auto_offset_reset: "earliest".to_string(),
            connect_timeout_secs: 10,
            retry_backoff_ms: 1000,
        }
    }
}

impl KafkaConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    pub json_logs: bool,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

/// 优雅关闭配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// HTTP 监听器处理在途请求的宽限期
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub kafka: KafkaConfig,
    pub server: ServerConfig,
    pub observability: ObservabilityConfig,
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. 内置默认值（端口按服务区分）
    /// 2. config/default.toml
    /// 3. config/{service_name}.toml
    /// 4. 环境变量（NOTIFY_ 前缀，层级用双下划线，如 NOTIFY_KAFKA__BROKERS -> kafka.brokers）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("server.port", i64::from(Self::default_port(service_name)))?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 各服务的默认 HTTP 端口：生产端 8080，消费端 8081
    fn default_port(service_name: &str) -> u16 {
        match service_name {
            services::CONSUMER => 8081,
            _ => 8080,
        }
    }

    /// 用命令行参数覆盖已加载的配置，未指定的参数保持原值
    pub fn with_overrides(mut self, brokers: Option<String>, log_level: Option<String>) -> Self {
        if let Some(brokers) = brokers {
            self.kafka.brokers = brokers;
        }
        if let Some(level) = log_level {
            self.observability.log_level = level;
        }
        self
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.kafka.topic, "notifications");
        assert_eq!(config.kafka.consumer_group, "notifications-group");
        assert_eq!(config.kafka.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.kafka.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_uses_service_default_port() {
        let consumer = AppConfig::load(services::CONSUMER).unwrap();
        assert_eq!(consumer.service_name, services::CONSUMER);
        assert_eq!(consumer.server.port, 8081);

        assert_eq!(AppConfig::default_port(services::CONSUMER), 8081);
        assert_eq!(AppConfig::default_port(services::PRODUCER), 8080);
    }

    #[test]
    fn test_server_addr() {
        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_cli_overrides() {
        let config = AppConfig::default()
            .with_overrides(Some("10.0.0.1:9092".to_string()), None);
        assert_eq!(config.kafka.brokers, "10.0.0.1:9092");
        assert_eq!(config.observability.log_level, "info");

        let config = config.with_overrides(None, Some("debug".to_string()));
        assert_eq!(config.kafka.brokers, "10.0.0.1:9092");
        assert_eq!(config.observability.log_level, "debug");
    }
}
