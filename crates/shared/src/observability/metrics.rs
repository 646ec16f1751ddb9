//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。未安装 recorder 时记录函数为空操作。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    metrics::describe_counter!(
        "notifications_consumed_total",
        "Notifications decoded and stored by the consumer"
    );
    metrics::describe_counter!(
        "notifications_skipped_total",
        "Records dropped by the consumer without being stored"
    );
    metrics::describe_counter!(
        "consume_pass_errors_total",
        "Consume passes that ended with a transport error"
    );
    metrics::describe_counter!(
        "notifications_published_total",
        "Publish attempts by the producer"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录成功入库的通知
#[inline]
pub fn record_consumed(partition: i32) {
    metrics::counter!(
        "notifications_consumed_total",
        "partition" => partition.to_string()
    )
    .increment(1);
}

/// 记录被丢弃的消息
#[inline]
pub fn record_skipped(reason: &'static str) {
    metrics::counter!("notifications_skipped_total", "reason" => reason).increment(1);
}

/// 记录以传输错误结束的消费轮次
#[inline]
pub fn record_consume_error() {
    metrics::counter!("consume_pass_errors_total").increment(1);
}

/// 记录发布结果
#[inline]
pub fn record_published(status: &'static str) {
    metrics::counter!("notifications_published_total", "status" => status).increment(1);
}
