//! REST runtime configuration.
//!
//! Resolved once at process startup and passed into every request context, so request handling
//! never reads process-wide environment variables.

use crate::constants::{API_VERSION, DEFAULT_ABSOLUTE_LIMIT, DEFAULT_BASE_URL, DEFAULT_LIMIT};
use crate::{RestError, RestResult};

/// Configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct RestConfig {
    base_url: String,
    default_limit: usize,
    absolute_limit: usize,
}

impl RestConfig {
    /// Create a new `RestConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::InvalidConfig`] if `default_limit` is zero or exceeds
    /// `absolute_limit`.
    pub fn new(base_url: String, default_limit: usize, absolute_limit: usize) -> RestResult<Self> {
        if default_limit == 0 {
            return Err(RestError::InvalidConfig(
                "default_limit must be at least 1".into(),
            ));
        }
        if default_limit > absolute_limit {
            return Err(RestError::InvalidConfig(format!(
                "default_limit ({default_limit}) cannot exceed absolute_limit ({absolute_limit})"
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            default_limit,
            absolute_limit,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Prefix of every resource URI, e.g. `/ws/rest/v1`.
    pub fn rest_root(&self) -> String {
        format!("{}/{}", self.base_url, API_VERSION)
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub fn absolute_limit(&self) -> usize {
        self.absolute_limit
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            default_limit: DEFAULT_LIMIT,
            absolute_limit: DEFAULT_ABSOLUTE_LIMIT,
        }
    }
}

/// Parse an optional limit value (typically from an environment variable).
///
/// If `value` is `None` or blank, returns `default`.
pub fn limit_from_env_value(value: Option<String>, default: usize) -> RestResult<usize> {
    let Some(raw) = value else {
        return Ok(default);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(default);
    }
    trimmed
        .parse()
        .map_err(|_| RestError::InvalidConfig(format!("limit must be a whole number, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash() {
        let cfg = RestConfig::new("/openmrs/ws/rest/".into(), 10, 20).expect("valid config");

        assert_eq!(cfg.base_url(), "/openmrs/ws/rest");
        assert_eq!(cfg.rest_root(), "/openmrs/ws/rest/v1");
    }

    #[test]
    fn test_new_rejects_bad_limits() {
        assert!(RestConfig::new("/ws/rest".into(), 0, 100).is_err());
        assert!(RestConfig::new("/ws/rest".into(), 101, 100).is_err());
    }

    #[test]
    fn test_limit_from_env_value() {
        assert_eq!(limit_from_env_value(None, 50).expect("default"), 50);
        assert_eq!(limit_from_env_value(Some("  ".into()), 50).expect("default"), 50);
        assert_eq!(limit_from_env_value(Some("25".into()), 50).expect("parsed"), 25);
        assert!(limit_from_env_value(Some("lots".into()), 50).is_err());
    }
}
