//! 统一可观测性模块
//!
//! 提供日志与指标的统一初始化。
//! 所有服务通过单一入口点配置可观测性，确保一致的日志格式和指标命名。

pub mod metrics;
pub mod middleware;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// 持有指标导出服务的生命周期，随进程退出一起释放。
pub struct ObservabilityGuard {
    _metrics_handle: Option<metrics::MetricsHandle>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("Shutting down observability...");
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics（Prometheus 指标，可选）
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %service_name,
        log_level = %config.log_level,
        metrics_enabled = config.metrics_enabled,
        "Observability initialized"
    );

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(service_name, config.metrics_port).await?)
    } else {
        None
    };

    Ok(ObservabilityGuard {
        _metrics_handle: metrics_handle,
    })
}
