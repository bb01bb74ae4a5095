use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{DEFAULT_REST_ADDR, router, state_from_env};

/// Main entry point for the EMR application
///
/// Loads `.env`, seeds the in-memory store and serves the REST facade until interrupted.
///
/// # Environment Variables
/// - `EMR_REST_ADDR`: REST server address (default: "0.0.0.0:8080")
/// - `EMR_SEED_FILE`: YAML seed for the in-memory store (optional)
/// - `EMR_BASE_URL`: base url the resources hang under (default: "/ws/rest")
/// - `EMR_DEFAULT_LIMIT` / `EMR_ABSOLUTE_LIMIT`: paging limits (default: 50 / 100)
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, seeding or binding fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("emr_run=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("EMR_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let state = state_from_env()?;
    tracing::info!(
        "++ Starting EMR REST on {} ({} resources under {})",
        rest_addr,
        state.registry.resource_names().count(),
        state.config.rest_root()
    );

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("++ EMR REST stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
    }
}
