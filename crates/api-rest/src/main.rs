//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the EMR REST facade on its own, with OpenAPI/Swagger UI.
//!
//! ## Intended use
//! Development and debugging against a seeded in-memory store. The workspace's `emr-run` binary
//! serves the same router.
//!
//! # Environment Variables
//! - `EMR_REST_ADDR`: listen address (default: "0.0.0.0:8080")
//! - `EMR_SEED_FILE`: YAML seed loaded at startup (default: none, standard datatypes only)
//! - `EMR_BASE_URL`, `EMR_DEFAULT_LIMIT`, `EMR_ABSOLUTE_LIMIT`: see [`api_rest::config_from_env`]

use api_rest::{router, state_from_env, DEFAULT_REST_ADDR};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("emr_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("EMR_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let state = state_from_env()?;
    tracing::info!(
        "-- Starting EMR REST API on {} under {}",
        addr,
        state.config.rest_root()
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
