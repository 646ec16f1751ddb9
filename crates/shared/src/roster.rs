//! 用户名册
//!
//! 固定的合法用户列表，由外部提供，发送通知前用于校验发送方与接收方。

use crate::error::NotifyError;
use crate::models::User;

/// 只读用户名册
#[derive(Debug, Clone)]
pub struct Roster {
    users: Vec<User>,
}

impl Roster {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }

    /// 内置名册
    pub fn builtin() -> Self {
        Self::new(vec![
            User::new(1, "Micho"),
            User::new(2, "Tito"),
            User::new(3, "Negro"),
            User::new(4, "Cabezon"),
        ])
    }

    /// 按 ID 查找用户，未找到返回 `UserNotFound`
    pub fn find(&self, id: i64) -> Result<&User, NotifyError> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .ok_or(NotifyError::UserNotFound { id })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::builtin()
    }
}
