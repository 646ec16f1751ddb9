//! 查询接口
//!
//! - `GET /notifications/{user_id}`：返回该用户收到的全部通知
//! - `GET /health`：健康检查

use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router, middleware};
use notify_shared::observability::middleware::http_tracing;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ConsumerError, Result};
use crate::store::NotificationStore;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<NotificationStore>,
    pub service_name: String,
}

impl AppState {
    pub fn new(store: Arc<NotificationStore>, service_name: impl Into<String>) -> Self {
        Self {
            store,
            service_name: service_name.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notifications/{user_id}", get(get_notifications))
        .route("/notifications", get(missing_user_id))
        .route("/notifications/", get(missing_user_id))
        .route("/health", get(health))
        .layer(middleware::from_fn(http_tracing))
        .with_state(state)
}

async fn get_notifications(
    State(state): State<AppState>,
    user_id: std::result::Result<Path<String>, PathRejection>,
) -> Result<Json<Value>> {
    let user_id = match user_id {
        Ok(Path(user_id)) if !user_id.is_empty() => user_id,
        Ok(_) => return Err(ConsumerError::NoMessagesFound),
        Err(rejection) => {
            debug!(error = %rejection, "无法解析用户 ID");
            return Err(ConsumerError::NoMessagesFound);
        }
    };

    let notifications = state.store.get(&user_id);
    if notifications.is_empty() {
        return Ok(Json(json!({
            "message": "No notifications found for user",
            "notifications": [],
        })));
    }

    Ok(Json(json!({ "notifications": notifications })))
}

async fn missing_user_id() -> ConsumerError {
    ConsumerError::NoMessagesFound
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": state.service_name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use notify_shared::models::{Notification, User};
    use tower::ServiceExt;

    fn app(store: Arc<NotificationStore>) -> Router {
        router(AppState::new(store, "notification-consumer"))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_get_notifications_in_arrival_order() {
        let store = Arc::new(NotificationStore::new());
        store.add(
            "2",
            Notification::new(User::new(1, "Micho"), User::new(2, "Tito"), "hi"),
        );
        store.add(
            "2",
            Notification::new(User::new(3, "Negro"), User::new(2, "Tito"), "yo"),
        );

        let (status, body) = get_json(app(store), "/notifications/2").await;

        assert_eq!(status, StatusCode::OK);
        let list = body["notifications"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["from"], json!({"id": 1, "name": "Micho"}));
        assert_eq!(list[0]["message"], "hi");
        assert_eq!(list[1]["message"], "yo");
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn test_unknown_user_returns_empty_list() {
        let store = Arc::new(NotificationStore::new());

        // 空白 ID 也是普通的未知用户
        for uri in ["/notifications/3", "/notifications/%20"] {
            let (status, body) = get_json(app(Arc::clone(&store)), uri).await;
            assert_eq!(status, StatusCode::OK, "uri: {uri}");
            assert_eq!(body["message"], "No notifications found for user");
            assert_eq!(body["notifications"], json!([]));
        }
    }

    #[tokio::test]
    async fn test_missing_user_id_returns_404() {
        let store = Arc::new(NotificationStore::new());

        for uri in ["/notifications/", "/notifications", "/notifications/%FF"] {
            let (status, body) = get_json(app(Arc::clone(&store)), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "uri: {uri}");
            assert_eq!(body, json!({"message": "no messages found"}));
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app(Arc::new(NotificationStore::new())), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "service": "notification-consumer"}));
    }
}
