//! HTTP gateway (Axum router) in front of the message queue.
//!
//! - `errors.rs`: consistent transport-level error responses
//! - `routes.rs`: handlers
//!
//! `POST /rpc/{method}` forwards the JSON body to the bound service and answers
//! with its `{"result"|"error"}` mapping. Only transport failures (no service,
//! timeout) change the status code.

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use storefront_infra::MessageQueue;

pub mod errors;
pub mod routes;

/// What the routes need: a queue client and the service to address.
#[derive(Clone)]
pub struct GatewayState {
    queue: Arc<dyn MessageQueue>,
    service: String,
}

impl GatewayState {
    pub fn new(queue: Arc<dyn MessageQueue>, service: impl Into<String>) -> Self {
        Self {
            queue,
            service: service.into(),
        }
    }

    pub fn queue(&self) -> &Arc<dyn MessageQueue> {
        &self.queue
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/rpc/:method", post(routes::rpc))
        .layer(ServiceBuilder::new().layer(Extension(Arc::new(state))))
}
