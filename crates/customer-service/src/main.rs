use std::sync::Arc;

use anyhow::Context;

use storefront_customer_service::gateway::{self, GatewayState};
use storefront_customer_service::{CustomerServiceController, ServiceConfig};
use storefront_infra::InMemoryMessageQueue;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storefront_observability::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    let queue = Arc::new(InMemoryMessageQueue::with_timeout(config.request_timeout));

    let controller = Arc::new(
        CustomerServiceController::from_config(&config, queue.clone())
            .context("failed to build customer service")?,
    );
    {
        let controller = controller.clone();
        tokio::task::spawn_blocking(move || controller.start())
            .await?
            .context("failed to start customer service")?;
    }

    let app = gateway::build_app(GatewayState::new(queue, config.service_name.clone()));

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    tokio::task::spawn_blocking(move || controller.stop()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
