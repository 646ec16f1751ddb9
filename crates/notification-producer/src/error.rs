//! 发布服务错误类型
//!
//! 参数错误 400，用户不存在 404，序列化或发送失败 500。
//! 响应体统一为 `{"message": ...}`。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use notify_shared::error::NotifyError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("failed to parse ID from form value {field}: {reason}")]
    InvalidId { field: &'static str, reason: String },

    #[error("User not found")]
    UserNotFound { id: i64 },

    #[error("failed to marshal notification: {0}")]
    Serialization(String),

    #[error("failed to send message to Kafka: {0}")]
    Publish(#[source] NotifyError),

    #[error(transparent)]
    Shared(#[from] NotifyError),
}

impl ProducerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidId { .. } => StatusCode::BAD_REQUEST,
            Self::UserNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Serialization(_) | Self::Publish(_) | Self::Shared(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidId { .. } => "INVALID_ID",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Publish(_) => "PUBLISH_ERROR",
            Self::Shared(e) => e.code(),
        }
    }
}

impl IntoResponse for ProducerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "发送通知失败");
        } else {
            tracing::warn!(error = %self, code = self.error_code(), "发送请求无效");
        }

        (status, axum::Json(json!({ "message": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProducerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = ProducerError::InvalidId {
            field: "fromID",
            reason: "invalid digit found in string".to_string(),
        };
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            invalid.to_string(),
            "failed to parse ID from form value fromID: invalid digit found in string"
        );

        let missing = ProducerError::UserNotFound { id: 99 };
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "User not found");

        let publish = ProducerError::Publish(NotifyError::Kafka("timed out".to_string()));
        assert_eq!(publish.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(publish.error_code(), "PUBLISH_ERROR");
    }

    #[test]
    fn test_shared_error_keeps_code() {
        let err: ProducerError = NotifyError::Connection("refused".to_string()).into();
        assert_eq!(err.error_code(), "KAFKA_CONNECTION_ERROR");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
