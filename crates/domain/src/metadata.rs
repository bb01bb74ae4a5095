//! Simple named metadata and locations.

use crate::audit::{retireable, AuditInfo, RetireInfo};
use emr_uuid::EntityUuid;
use serde::{Deserialize, Serialize};

/// The kinds of name/description metadata that share one shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    ConceptClass,
    EncounterType,
    PatientIdentifierType,
    PersonAttributeType,
    OrderType,
    VisitType,
}

impl MetadataKind {
    pub const ALL: [MetadataKind; 6] = [
        MetadataKind::ConceptClass,
        MetadataKind::EncounterType,
        MetadataKind::PatientIdentifierType,
        MetadataKind::PersonAttributeType,
        MetadataKind::OrderType,
        MetadataKind::VisitType,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetadataKind::ConceptClass => "concept class",
            MetadataKind::EncounterType => "encounter type",
            MetadataKind::PatientIdentifierType => "patient identifier type",
            MetadataKind::PersonAttributeType => "person attribute type",
            MetadataKind::OrderType => "order type",
            MetadataKind::VisitType => "visit type",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub uuid: EntityUuid,
    pub kind: MetadataKind,
    pub name: String,
    pub description: Option<String>,
    pub audit: AuditInfo,
    pub retire: RetireInfo,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            uuid: EntityUuid::new(),
            kind: MetadataKind::ConceptClass,
            name: String::new(),
            description: None,
            audit: AuditInfo::default(),
            retire: RetireInfo::default(),
        }
    }
}

impl Metadata {
    pub fn new(kind: MetadataKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub uuid: EntityUuid,
    pub name: String,
    pub description: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city_village: Option<String>,
    pub state_province: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub parent_location: Option<EntityUuid>,
    pub tags: Vec<String>,
    pub audit: AuditInfo,
    pub retire: RetireInfo,
}

impl Location {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

retireable!(Metadata, Location);
