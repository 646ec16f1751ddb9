//! CLI 命令定义

use clap::{Parser, Subcommand};
use notify_shared::config::services;

/// Kafka 点对点通知系统
///
/// 根命令本身不做任何事，通过 `consumer` 或 `producer` 子命令启动对应服务。
#[derive(Parser, Debug)]
#[command(name = "kafka-notify")]
#[command(version, about = "基于 Kafka 的用户通知收发服务")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Kafka broker 地址，覆盖配置文件
    #[arg(short, long, global = true)]
    pub kafka_broker_address: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// 启动通知消费服务
    ///
    /// 以消费组方式消费 notifications topic，并在 8081 端口提供
    /// `GET /notifications/{userID}` 查询。
    Consumer,

    /// 启动通知发布服务
    ///
    /// 在 8080 端口提供 `POST /send`，把通知发布到 notifications topic。
    Producer,
}

impl Commands {
    /// 服务名，同时决定加载哪个配置文件
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Consumer => services::CONSUMER,
            Self::Producer => services::PRODUCER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kafka-notify",
            "consumer",
            "-k",
            "broker:29092",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.command, Commands::Consumer);
        assert_eq!(cli.kafka_broker_address.as_deref(), Some("broker:29092"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.command.service_name(), "notification-consumer");
    }

    #[test]
    fn test_flags_are_optional() {
        let cli = Cli::try_parse_from(["kafka-notify", "producer"]).unwrap();
        assert_eq!(cli.command, Commands::Producer);
        assert!(cli.kafka_broker_address.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["kafka-notify"]).is_err());
    }
}
