//! HTTP 服务封装
//!
//! 在后台任务中运行 axum 服务，把"开始优雅关闭"和"等待退出"拆成两步，
//! 由生命周期协调器决定等待多久、何时强制中止。

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::NotifyError;

pub struct HttpServer {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl HttpServer {
    /// 绑定地址并在后台开始服务
    pub async fn bind(addr: &str, router: Router) -> Result<Self, NotifyError> {
        let listener = TcpListener::bind(addr).await?;
        Self::serve(listener, router)
    }

    /// 在已绑定的监听器上开始服务
    pub fn serve(listener: TcpListener, router: Router) -> Result<Self, NotifyError> {
        let addr = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    // 发送端被丢弃同样视为关闭
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await
        });

        info!(%addr, "HTTP 服务已启动");
        Ok(Self {
            addr,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 停止接受新连接，在途请求继续处理
    pub fn begin_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        info!(addr = %self.addr, "HTTP 服务开始优雅关闭");
    }

    /// 等待服务任务退出
    ///
    /// 可以在 `select!` 中被取消后再次调用；已退出后再调用直接返回。
    pub async fn join(&mut self) -> Result<(), NotifyError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        let joined = handle.await;
        self.handle = None;

        match joined {
            Ok(Ok(())) => {
                info!(addr = %self.addr, "HTTP 服务已退出");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(addr = %self.addr, error = %e, "HTTP 服务异常退出");
                Err(e.into())
            }
            Err(e) => Err(NotifyError::Internal(format!("HTTP 服务任务异常: {e}"))),
        }
    }

    /// 强制中止，丢弃仍在处理的连接
    pub fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            warn!(addr = %self.addr, "HTTP 服务被强制关闭");
        }
    }
}
