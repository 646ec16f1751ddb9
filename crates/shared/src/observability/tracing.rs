//! 日志初始化
//!
//! `RUST_LOG` 优先，未设置时使用配置中的日志级别。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// 构建日志过滤器
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化全局 subscriber，重复初始化返回错误
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
