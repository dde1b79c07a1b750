use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value as JsonValue;
use tracing::{debug, error};

use storefront_infra::send_message;

use super::GatewayState;
use super::errors::{json_error, queue_error_to_response};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Forward a named call to the service. An empty body means "no parameters".
pub async fn rpc(
    Extension(state): Extension<Arc<GatewayState>>,
    Path(method): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let payload: JsonValue = if body.iter().all(u8::is_ascii_whitespace) {
        JsonValue::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, "invalid_json", e.to_string()),
        }
    };

    debug!(%method, "forwarding rpc");

    // The queue client blocks; keep it off the async workers.
    let call = {
        let state = state.clone();
        let method = method.clone();
        tokio::task::spawn_blocking(move || {
            send_message(&**state.queue(), state.service(), &method, payload)
        })
    };

    match call.await {
        Ok(Ok(reply)) => (StatusCode::OK, Json(reply)).into_response(),
        Ok(Err(e)) => queue_error_to_response(e),
        Err(e) => {
            error!(%method, error = %e, "rpc task failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
        }
    }
}
