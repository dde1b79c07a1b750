use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use storefront_infra::QueueError;

pub fn queue_error_to_response(err: QueueError) -> axum::response::Response {
    match &err {
        QueueError::Timeout(_) => json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", err.to_string()),
        QueueError::ServiceUnavailable(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", err.to_string())
        }
        QueueError::AlreadyBound(_) | QueueError::Disconnected(_) | QueueError::Poisoned => {
            json_error(StatusCode::BAD_GATEWAY, "bad_gateway", err.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
