//! 统一错误处理模块
//!
//! 定义消费端与生产端共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum NotifyError {
    // ==================== Kafka 错误 ====================
    /// 无法建立到 broker 的初始连接，启动阶段遇到即终止进程
    #[error("Kafka 连接失败: {0}")]
    Connection(String),

    #[error("Kafka 错误: {0}")]
    Kafka(String),

    #[error("消费会话异常结束: {0}")]
    Session(String),

    // ==================== 消息格式错误 ====================
    #[error("消息序列化失败: {0}")]
    Serialization(String),

    #[error("消息反序列化失败: {0}")]
    Deserialization(String),

    #[error("消息缺少 key: topic={topic} partition={partition} offset={offset}")]
    MissingKey {
        topic: String,
        partition: i32,
        offset: i64,
    },

    // ==================== 业务校验错误 ====================
    #[error("用户不存在: id={id}")]
    UserNotFound { id: i64 },

    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    // ==================== 通用错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, NotifyError>;

impl NotifyError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "KAFKA_CONNECTION_ERROR",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Session(_) => "SESSION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",
            Self::MissingKey { .. } => "MISSING_KEY",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 只有运行期的传输层错误值得重试；格式错误重试必然再次失败。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Kafka(_) | Self::Session(_))
    }
}

impl From<serde_json::Error> for NotifyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = NotifyError::UserNotFound { id: 99 };
        assert_eq!(err.code(), "USER_NOT_FOUND");
        assert_eq!(err.to_string(), "用户不存在: id=99");
    }

    #[test]
    fn test_is_retryable() {
        assert!(NotifyError::Kafka("broker down".into()).is_retryable());
        assert!(NotifyError::Session("rebalance failed".into()).is_retryable());
        assert!(!NotifyError::Deserialization("bad json".into()).is_retryable());
        assert!(!NotifyError::Connection("refused".into()).is_retryable());
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let notify_err: NotifyError = err.into();
        assert_eq!(notify_err.code(), "DESERIALIZATION_ERROR");
    }
}
