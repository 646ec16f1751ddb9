//! 内存收件箱
//!
//! 按收件人 ID 保存通知，每个用户的序列只追加，顺序即到达顺序。
//! 读操作可并发，写操作互斥；读者不会看到写了一半的条目。

use std::collections::HashMap;

use notify_shared::models::Notification;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct NotificationStore {
    inner: RwLock<HashMap<String, Vec<Notification>>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条通知，用户首次出现时创建其序列
    pub fn add(&self, user_id: &str, notification: Notification) {
        let mut inner = self.inner.write();
        inner
            .entry(user_id.to_string())
            .or_default()
            .push(notification);
    }

    /// 返回该用户通知的快照，未知用户返回空列表
    pub fn get(&self, user_id: &str) -> Vec<Notification> {
        self.inner
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 至少收到过一条通知的用户数
    pub fn user_count(&self) -> usize {
        self.inner.read().len()
    }

    pub fn total(&self) -> usize {
        self.inner.read().values().map(Vec::len).sum()
    }
}
