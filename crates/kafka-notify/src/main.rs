//! kafka-notify 命令行入口
//!
//! 加载配置、初始化日志后运行所选服务。
//! 启动失败返回错误退出；宽限期内未能完成关闭时以状态码 1 退出。

mod cli;

use anyhow::Context;
use clap::Parser;
use notify_shared::config::AppConfig;
use notify_shared::lifecycle::ShutdownOutcome;
use notify_shared::observability;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let service_name = cli.command.service_name();

    let config = AppConfig::load(service_name)
        .context("加载配置失败")?
        .with_overrides(cli.kafka_broker_address, cli.log_level);

    let guard = observability::init(service_name, &config.observability).await?;

    info!(
        service = service_name,
        brokers = %config.kafka.brokers,
        addr = %config.server_addr(),
        "Starting {}...",
        service_name
    );

    let outcome = match cli.command {
        Commands::Consumer => notification_consumer::run(&config)
            .await
            .context("通知消费服务启动失败")?,
        Commands::Producer => notification_producer::run(&config)
            .await
            .context("通知发布服务启动失败")?,
    };

    if outcome == ShutdownOutcome::Forced {
        warn!(service = service_name, "服务被强制终止");
        drop(guard);
        std::process::exit(1);
    }

    info!(service = service_name, "服务已停止");
    Ok(())
}
