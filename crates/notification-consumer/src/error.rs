//! 消费服务错误类型
//!
//! 消息解码失败只影响单条记录；HTTP 查询错误转换为带 `message` 字段的响应。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use notify_shared::error::NotifyError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("消息解码失败: partition={partition} offset={offset}, 原因={source}")]
    MalformedRecord {
        partition: i32,
        offset: i64,
        #[source]
        source: NotifyError,
    },

    /// 查询路径中缺少用户 ID
    #[error("no messages found")]
    NoMessagesFound,

    #[error(transparent)]
    Shared(#[from] NotifyError),
}

impl ConsumerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoMessagesFound => StatusCode::NOT_FOUND,
            Self::MalformedRecord { .. } | Self::Shared(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ConsumerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            Self::NoMessagesFound => self.to_string(),
            other => {
                tracing::error!(error = %other, "查询通知失败");
                "internal server error".to_string()
            }
        };

        (status, axum::Json(json!({ "message": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ConsumerError>;
