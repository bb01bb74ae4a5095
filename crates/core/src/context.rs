//! Per-request context.
//!
//! Carries the injected domain services, the resource registry, the startup configuration and
//! the parsed request parameters. Every resource operation, getter and setter receives it.

use crate::config::RestConfig;
use crate::constants::{
    PARAM_INCLUDE_ALL, PARAM_LIMIT, PARAM_PURGE, PARAM_REASON, PARAM_REPRESENTATION,
    PARAM_START_INDEX, PARAM_TOTAL_COUNT, PARAM_TYPE, RESERVED_PARAMETERS,
};
use crate::registry::ResourceRegistry;
use crate::representation::Representation;
use crate::{RestError, RestResult};
use emr_domain::Services;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Request parameters that control rendering, paging and deletion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestParams {
    pub representation: Option<Representation>,
    pub start_index: usize,
    pub limit: Option<usize>,
    pub include_all: bool,
    pub total_count: bool,
    /// Subclass type name (`t`), e.g. `drugorder`.
    pub subclass: Option<String>,
    pub purge: bool,
    pub reason: Option<String>,
    /// Every parameter as received, including the ones above.
    pub query: BTreeMap<String, String>,
}

impl RequestParams {
    /// Parses query string pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::IllegalRequest`] if `startIndex` or `limit` is not a non-negative
    /// whole number, or `limit` is zero.
    pub fn from_pairs<I, K, V>(pairs: I) -> RestResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let query: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let number = |name: &str| -> RestResult<Option<usize>> {
            query
                .get(name)
                .filter(|v| !v.trim().is_empty())
                .map(|v| {
                    v.trim().parse::<usize>().map_err(|_| {
                        RestError::IllegalRequest(format!(
                            "{name} must be a non-negative whole number, got '{v}'"
                        ))
                    })
                })
                .transpose()
        };
        let flag = |name: &str| {
            query
                .get(name)
                .map(|v| v.is_empty() || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let limit = number(PARAM_LIMIT)?;
        if limit == Some(0) {
            return Err(RestError::IllegalRequest("limit must be at least 1".into()));
        }

        Ok(Self {
            representation: query
                .get(PARAM_REPRESENTATION)
                .map(|v| Representation::parse(v)),
            start_index: number(PARAM_START_INDEX)?.unwrap_or(0),
            limit,
            include_all: flag(PARAM_INCLUDE_ALL),
            total_count: flag(PARAM_TOTAL_COUNT),
            subclass: query
                .get(PARAM_TYPE)
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty()),
            purge: flag(PARAM_PURGE),
            reason: query
                .get(PARAM_REASON)
                .map(|r| r.trim().to_owned())
                .filter(|r| !r.is_empty()),
            query,
        })
    }

    /// True if any parameter other than the paging/rendering ones is present.
    pub fn is_search(&self) -> bool {
        self.query
            .keys()
            .any(|k| !RESERVED_PARAMETERS.contains(&k.as_str()))
    }
}

#[derive(Clone)]
pub struct RequestContext {
    services: Services,
    registry: Arc<ResourceRegistry>,
    config: Arc<RestConfig>,
    params: RequestParams,
}

impl RequestContext {
    pub fn new(
        services: Services,
        registry: Arc<ResourceRegistry>,
        config: Arc<RestConfig>,
        params: RequestParams,
    ) -> Self {
        Self {
            services,
            registry,
            config,
            params,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    /// A raw parameter value, ignoring blanks.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .query
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// The requested representation, or `default` if none was asked for.
    pub fn representation_or(&self, default: Representation) -> Representation {
        self.params.representation.clone().unwrap_or(default)
    }

    /// Page size: the requested limit capped at the absolute limit, else the default.
    pub fn limit(&self) -> usize {
        self.params
            .limit
            .unwrap_or(self.config.default_limit())
            .min(self.config.absolute_limit())
    }

    pub fn include_all(&self) -> bool {
        self.params.include_all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_parses_known_parameters() {
        let params = RequestParams::from_pairs([
            ("v", "full"),
            ("startIndex", "10"),
            ("limit", "5"),
            ("includeAll", "true"),
            ("t", "DrugOrder"),
            ("q", "john"),
        ])
        .expect("valid parameters");

        assert_eq!(params.representation, Some(Representation::Full));
        assert_eq!(params.start_index, 10);
        assert_eq!(params.limit, Some(5));
        assert!(params.include_all);
        assert_eq!(params.subclass.as_deref(), Some("drugorder"));
        assert!(params.is_search());
    }

    #[test]
    fn test_from_pairs_rejects_bad_numbers() {
        assert!(RequestParams::from_pairs([("limit", "-1")]).is_err());
        assert!(RequestParams::from_pairs([("limit", "0")]).is_err());
        assert!(RequestParams::from_pairs([("startIndex", "ten")]).is_err());
    }

    #[test]
    fn test_bare_purge_flag_is_true() {
        let params = RequestParams::from_pairs([("purge", "")]).expect("valid");

        assert!(params.purge);
        assert!(!params.is_search());
    }
}
