//! # API Shared
//!
//! Wire types shared by the EMR REST binaries.
//!
//! Contains:
//! - The search-result envelope returned by every list and search
//! - The error envelope every failed request answers with
//! - `HealthService` and its `HealthRes`
//!
//! Used by `emr-core` (which builds search results) and `api-rest` (which serves them).

pub mod health;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

pub use health::{HealthRes, HealthService};

/// A `rel`/`uri` pair, e.g. the `next` page of a search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Link {
    pub rel: String,
    pub uri: String,
}

/// One page of a list or search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[schema(value_type = Vec<Object>)]
    pub results: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    /// Present only when the request asked for `totalCount=true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `object_not_found`.
    pub code: String,
    pub message: String,
}

/// `{"error": {"code": "...", "message": "..."}}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_result_omits_empty_links_and_count() {
        let result = SearchResult {
            results: vec![json!({ "uuid": "a" })],
            ..Default::default()
        };
        let encoded = serde_json::to_value(&result).expect("serializes");
        assert_eq!(encoded, json!({ "results": [{ "uuid": "a" }] }));

        let paged = SearchResult {
            results: Vec::new(),
            links: vec![Link {
                rel: "next".into(),
                uri: "/ws/rest/v1/concept?startIndex=50".into(),
            }],
            total_count: Some(120),
        };
        let encoded = serde_json::to_value(&paged).expect("serializes");
        assert_eq!(encoded["totalCount"], 120);
        assert_eq!(encoded["links"][0]["rel"], "next");
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = ErrorEnvelope::new("object_not_found", "object not found: patient x");
        let encoded = serde_json::to_value(&envelope).expect("serializes");
        assert_eq!(encoded["error"]["code"], "object_not_found");
        assert_eq!(encoded["error"]["message"], "object not found: patient x");
    }
}
