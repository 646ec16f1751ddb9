//! 领域模型
//!
//! 用户与通知的值类型。通知在发布时创建一次，之后只读，
//! 以 JSON 形式在 Kafka 上传输。

use serde::{Deserialize, Serialize};

/// 用户
///
/// ID 由外部系统分配，本系统只负责引用。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// 作为 Kafka 消息 key 的十进制字符串形式
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

/// 点对点通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub from: User,
    pub to: User,
    pub message: String,
}

impl Notification {
    pub fn new(from: User, to: User, message: impl Into<String>) -> Self {
        Self {
            from,
            to,
            message: message.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
