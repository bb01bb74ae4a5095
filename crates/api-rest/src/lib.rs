//! # API REST
//!
//! REST API for the EMR facade.
//!
//! Handles:
//! - HTTP endpoints with axum, under `<base url>/v1`
//! - Mapping of core errors to status codes and the shared error envelope
//! - OpenAPI/Swagger documentation, with one model per resource and representation
//! - Startup configuration from the environment
//!
//! Every endpoint builds a [`RequestContext`] from the query string and hands it to the resource
//! registered under the path's name; the resources themselves live in `emr-core`.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod routes;

use emr_core::config::limit_from_env_value;
use emr_core::constants::{DEFAULT_ABSOLUTE_LIMIT, DEFAULT_BASE_URL, DEFAULT_LIMIT};
use emr_core::{RequestContext, RequestParams, ResourceRegistry, RestConfig};
use emr_domain::{InMemoryEmr, Seed, Services};
use std::path::Path;
use std::sync::Arc;

pub use error::{ApiError, ApiResult};
pub use routes::{openapi, router, ApiDoc};

/// Default listen address of the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:8080";

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub registry: Arc<ResourceRegistry>,
    pub config: Arc<RestConfig>,
}

impl AppState {
    /// State with the standard resource registry.
    pub fn new(services: Services, config: RestConfig) -> Self {
        Self {
            services,
            registry: Arc::new(ResourceRegistry::standard()),
            config: Arc::new(config),
        }
    }

    /// A request context for one call, from its query string pairs.
    pub fn context(&self, query: Vec<(String, String)>) -> ApiResult<RequestContext> {
        let params = RequestParams::from_pairs(query)?;
        Ok(RequestContext::new(
            self.services.clone(),
            self.registry.clone(),
            self.config.clone(),
            params,
        ))
    }
}

/// Resolves the REST configuration through `lookup`, usually `std::env::var`.
///
/// Reads `EMR_BASE_URL`, `EMR_DEFAULT_LIMIT` and `EMR_ABSOLUTE_LIMIT`.
///
/// # Errors
///
/// Returns an error if a limit is not a whole number or the limits are inconsistent.
pub fn config_from_lookup<F>(lookup: F) -> anyhow::Result<RestConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = lookup("EMR_BASE_URL")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.into());
    let default_limit = limit_from_env_value(lookup("EMR_DEFAULT_LIMIT"), DEFAULT_LIMIT)?;
    let absolute_limit = limit_from_env_value(lookup("EMR_ABSOLUTE_LIMIT"), DEFAULT_ABSOLUTE_LIMIT)?;
    Ok(RestConfig::new(base_url, default_limit, absolute_limit)?)
}

/// Resolves the REST configuration from the process environment.
///
/// # Errors
///
/// See [`config_from_lookup`].
pub fn config_from_env() -> anyhow::Result<RestConfig> {
    config_from_lookup(|key| std::env::var(key).ok())
}

/// The in-memory services, seeded from `seed_file` when one is given.
///
/// # Errors
///
/// Returns an error if the seed file cannot be read or parsed.
pub fn load_services(seed_file: Option<&Path>) -> anyhow::Result<Services> {
    let store = match seed_file {
        Some(path) => {
            tracing::info!("-- Loading seed from {}", path.display());
            InMemoryEmr::from_seed(Seed::from_yaml_file(path)?)?
        }
        None => InMemoryEmr::default(),
    };
    Ok(Services::from_provider(Arc::new(store)))
}

/// Builds the full application state from the environment, including `EMR_SEED_FILE`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the seed file cannot be loaded.
pub fn state_from_env() -> anyhow::Result<AppState> {
    let config = config_from_env()?;
    let seed_file = std::env::var("EMR_SEED_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let services = load_services(seed_file.as_deref().map(Path::new))?;
    Ok(AppState::new(services, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_config_from_lookup_defaults() {
        let cfg = config_from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(cfg.rest_root(), "/ws/rest/v1");
        assert_eq!(cfg.default_limit(), DEFAULT_LIMIT);
        assert_eq!(cfg.absolute_limit(), DEFAULT_ABSOLUTE_LIMIT);
    }

    #[test]
    fn test_config_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("EMR_BASE_URL", "/openmrs/ws/rest/"),
            ("EMR_DEFAULT_LIMIT", "5"),
            ("EMR_ABSOLUTE_LIMIT", "10"),
        ]
        .into_iter()
        .collect();
        let cfg = config_from_lookup(|k| vars.get(k).map(|v| (*v).to_owned()))
            .expect("overrides are valid");
        assert_eq!(cfg.rest_root(), "/openmrs/ws/rest/v1");
        assert_eq!(cfg.default_limit(), 5);

        let err = config_from_lookup(|k| (k == "EMR_DEFAULT_LIMIT").then(|| "500".to_owned()));
        assert!(err.is_err(), "default above absolute limit should fail");
    }

    #[test]
    fn test_load_services_from_seed_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "locations:\n  - name: Outpatient Clinic\n    tags: [Login Location]")
            .expect("seed written");

        let services = load_services(Some(file.path())).expect("seed loads");
        let clinic = services
            .locations
            .get_location_by_name("Outpatient Clinic")
            .expect("lookup succeeds");
        assert!(clinic.is_some(), "seeded location should exist");
    }

    #[test]
    fn test_load_services_rejects_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("nope.yaml");
        assert!(load_services(Some(&missing)).is_err());
    }
}
