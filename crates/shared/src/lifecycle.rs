//! 进程生命周期与优雅关闭
//!
//! 单一取消信号由系统中断触发，按固定顺序传播：
//! 1. 取消后台消费循环，不再发起新的消费轮次；
//! 2. HTTP 服务停止接受新连接，在宽限期内处理完在途请求；
//! 3. 等待消费循环完全退出。
//!
//! 宽限期耗尽或再次收到中断时立即强制终止。

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

use crate::server::HttpServer;

/// 关闭结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// 所有组件在宽限期内自然退出
    Graceful,
    /// 宽限期耗尽或收到第二次中断
    Forced,
}

/// 生命周期协调器
///
/// 持有取消信号的发送端；后台任务通过 `cancellation()` 获得接收端。
pub struct Lifecycle {
    cancel_tx: watch::Sender<bool>,
    grace: Duration,
}

impl Lifecycle {
    pub fn new(grace: Duration) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self { cancel_tx, grace }
    }

    /// 取消信号的接收端，值变为 `true` 表示已取消
    pub fn cancellation(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// 运行到收到中断信号，再按顺序关闭各组件
    ///
    /// HTTP 服务在收到信号前自行退出（例如监听失败）同样会触发关闭流程。
    pub async fn run(
        self,
        mut interrupts: mpsc::Receiver<()>,
        mut server: HttpServer,
        mut worker: Option<JoinHandle<()>>,
    ) -> ShutdownOutcome {
        tokio::select! {
            _ = next_interrupt(&mut interrupts) => {
                info!("收到中断信号，开始优雅关闭");
            }
            result = server.join() => {
                if let Err(e) = result {
                    error!(error = %e, "HTTP 服务提前退出，开始关闭");
                } else {
                    warn!("HTTP 服务提前退出，开始关闭");
                }
            }
        }

        let deadline = Instant::now() + self.grace;

        // 1. 先取消消费循环
        self.cancel();
        info!("已通知后台消费循环停止");

        // 2. 再关闭 HTTP 服务
        server.begin_shutdown();
        tokio::select! {
            drained = timeout_at(deadline, server.join()) => match drained {
                Ok(_) => info!("HTTP 服务已关闭"),
                Err(_) => {
                    server.abort();
                    error!(grace_secs = self.grace.as_secs_f64(), "宽限期内未能关闭 HTTP 服务，强制终止");
                    abort_worker(worker.take());
                    return ShutdownOutcome::Forced;
                }
            },
            _ = next_interrupt(&mut interrupts) => {
                warn!("再次收到中断信号，强制终止");
                server.abort();
                abort_worker(worker.take());
                return ShutdownOutcome::Forced;
            }
        }

        // 3. 最后等待消费循环退出
        let Some(mut handle) = worker else {
            info!("关闭完成");
            return ShutdownOutcome::Graceful;
        };

        tokio::select! {
            joined = timeout_at(deadline, &mut handle) => match joined {
                Ok(Ok(())) => {
                    info!("后台消费循环已退出，关闭完成");
                    ShutdownOutcome::Graceful
                }
                Ok(Err(e)) => {
                    error!(error = %e, "后台消费循环异常退出");
                    ShutdownOutcome::Graceful
                }
                Err(_) => {
                    handle.abort();
                    error!("宽限期内后台消费循环未退出，强制终止");
                    ShutdownOutcome::Forced
                }
            },
            _ = next_interrupt(&mut interrupts) => {
                warn!("再次收到中断信号，强制终止");
                handle.abort();
                ShutdownOutcome::Forced
            }
        }
    }
}

/// 等待下一次中断；通道关闭后永不返回
async fn next_interrupt(interrupts: &mut mpsc::Receiver<()>) {
    if interrupts.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

fn abort_worker(worker: Option<JoinHandle<()>>) {
    if let Some(handle) = worker {
        handle.abort();
    }
}

/// 把 Ctrl+C 与 SIGTERM 转为中断事件流
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
/// 每收到一次信号发送一个事件，第二次信号用于强制终止。
pub fn interrupt_channel() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(2);

    tokio::spawn(async move {
        #[cfg(unix)]
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    error!(error = %e, "注册 SIGTERM 处理器失败");
                    None
                }
            };

        loop {
            #[cfg(unix)]
            let terminated = async {
                match terminate.as_mut() {
                    Some(signal) => {
                        signal.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            #[cfg(not(unix))]
            let terminated = std::future::pending::<()>();

            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "监听 Ctrl+C 失败");
                        return;
                    }
                    info!("Received Ctrl+C");
                }
                _ = terminated => info!("Received SIGTERM"),
            }

            if tx.send(()).await.is_err() {
                return;
            }
        }
    });

    rx
}
