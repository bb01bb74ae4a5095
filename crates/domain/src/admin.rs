//! System settings and installed modules.

use crate::audit::AuditInfo;
use emr_uuid::EntityUuid;
use serde::{Deserialize, Serialize};

/// A named configuration value, exposed over REST as a system setting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalProperty {
    pub uuid: EntityUuid,
    pub property: String,
    pub value: Option<String>,
    pub description: Option<String>,
    pub audit: AuditInfo,
}

impl GlobalProperty {
    pub fn new(property: impl Into<String>, value: Option<String>) -> Self {
        Self {
            property: property.into(),
            value,
            ..Default::default()
        }
    }
}

/// An installed module, identified by its module id rather than a uuid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Module {
    pub module_id: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub started: bool,
    pub start_error: Option<String>,
    /// Where the module was installed from, if it was installed at runtime.
    pub download_url: Option<String>,
}
