//! 发送接口
//!
//! - `POST /send`：表单字段 `fromID`、`toID`、`message`
//! - `GET /health`：健康检查

use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use notify_shared::observability::middleware::http_tracing;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{ProducerError, Result};
use crate::publisher::Publisher;

#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<Publisher>,
    pub service_name: String,
}

impl AppState {
    pub fn new(publisher: Arc<Publisher>, service_name: impl Into<String>) -> Self {
        Self {
            publisher,
            service_name: service_name.into(),
        }
    }
}

/// 缺失的字段按空字符串处理，由 ID 解析统一报错
#[derive(Debug, Default, Deserialize)]
pub struct SendForm {
    #[serde(rename = "fromID", default)]
    pub from_id: String,
    #[serde(rename = "toID", default)]
    pub to_id: String,
    #[serde(default)]
    pub message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/send", post(send_notification))
        .route("/health", get(health))
        .layer(middleware::from_fn(http_tracing))
        .with_state(state)
}

fn parse_id(field: &'static str, raw: &str) -> Result<i64> {
    raw.parse().map_err(|e: std::num::ParseIntError| ProducerError::InvalidId {
        field,
        reason: e.to_string(),
    })
}

async fn send_notification(
    State(state): State<AppState>,
    form: std::result::Result<Form<SendForm>, FormRejection>,
) -> Result<Json<Value>> {
    // 无法读取的表单等同于空表单
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            debug!(error = %rejection, "无法解析表单");
            SendForm::default()
        }
    };

    let from_id = parse_id("fromID", &form.from_id)?;
    let to_id = parse_id("toID", &form.to_id)?;

    state.publisher.publish(from_id, to_id, &form.message).await?;

    Ok(Json(json!({ "message": "Notification sent successfully!" })))
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
    use crate::publisher::MockRecordSender;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use notify_shared::error::NotifyError;
    use notify_shared::roster::Roster;
    use tower::ServiceExt;

    fn app(sender: MockRecordSender) -> Router {
        let publisher = Publisher::new(Arc::new(sender), Roster::builtin(), "notifications");
        router(AppState::new(Arc::new(publisher), "notification-producer"))
    }

    async fn post_form(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/send")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut sender = MockRecordSender::new();
        sender
            .expect_send()
            .withf(|_, key, _| key.to_string() == "2")
            .times(1)
            .returning(|_, _, _| Ok((0, 7)));

        let (status, body) = post_form(app(sender), "fromID=1&toID=2&message=hi+there").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Notification sent successfully!"}));
    }

    #[tokio::test]
    async fn test_unknown_user_returns_404() {
        let mut sender = MockRecordSender::new();
        sender.expect_send().never();

        let (status, body) = post_form(app(sender), "fromID=1&toID=99&message=hi").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"message": "User not found"}));
    }

    #[tokio::test]
    async fn test_invalid_id_returns_400_naming_field() {
        let mut sender = MockRecordSender::new();
        sender.expect_send().never();

        let (status, body) = post_form(app(sender), "fromID=abc&toID=2&message=hi").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["message"].as_str().unwrap();
        assert!(message.starts_with("failed to parse ID from form value fromID"));

        let mut sender = MockRecordSender::new();
        sender.expect_send().never();
        let (status, body) = post_form(app(sender), "fromID=1&message=hi").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("toID"));
    }

    #[tokio::test]
    async fn test_request_without_form_content_type_returns_400() {
        let mut sender = MockRecordSender::new();
        sender.expect_send().never();

        let response = app(sender)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/send")
                    .body(Body::from("fromID=1&toID=2&message=x"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("failed to parse ID from form value fromID")
        );
    }

    #[tokio::test]
    async fn test_publish_failure_returns_500() {
        let mut sender = MockRecordSender::new();
        sender
            .expect_send()
            .times(1)
            .returning(|_, _, _| Err(NotifyError::Kafka("broker down".to_string())));

        let (status, body) = post_form(app(sender), "fromID=3&toID=4&message=yo").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("broker down"));
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(MockRecordSender::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
