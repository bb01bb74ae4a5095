//! The concept dictionary: concepts, their names, datatypes, mappings and drugs.

use crate::audit::{retireable, voidable, AuditInfo, RetireInfo, VoidInfo};
use emr_uuid::EntityUuid;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Concept {
    pub uuid: EntityUuid,
    pub names: Vec<ConceptName>,
    pub descriptions: Vec<ConceptDescription>,
    pub datatype: Option<EntityUuid>,
    pub concept_class: Option<EntityUuid>,
    pub set: bool,
    pub version: Option<String>,
    pub answers: Vec<EntityUuid>,
    pub set_members: Vec<EntityUuid>,
    pub mappings: Vec<ConceptMap>,
    pub numeric: Option<ConceptNumeric>,
    pub audit: AuditInfo,
    pub retire: RetireInfo,
}

impl Concept {
    /// The locale-preferred name, else the fully specified one, else the first non-voided name.
    pub fn name(&self) -> Option<&ConceptName> {
        let active = || self.names.iter().filter(|n| !n.void.voided);
        active()
            .find(|n| n.locale_preferred)
            .or_else(|| active().find(|n| n.is_fully_specified()))
            .or_else(|| active().next())
    }

    pub fn display_name(&self) -> String {
        self.name().map(|n| n.name.clone()).unwrap_or_default()
    }

    /// True if any non-voided name matches `name` ignoring case.
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| !n.void.voided && n.name.eq_ignore_ascii_case(name))
    }

    pub fn description(&self) -> Option<&ConceptDescription> {
        self.descriptions.first()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptName {
    pub uuid: EntityUuid,
    pub concept: Option<EntityUuid>,
    pub name: String,
    pub locale: String,
    pub locale_preferred: bool,
    /// `FULLY_SPECIFIED`, `SHORT` or `INDEX_TERM`; absent for synonyms.
    pub concept_name_type: Option<String>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

impl ConceptName {
    pub fn is_fully_specified(&self) -> bool {
        self.concept_name_type.as_deref() == Some("FULLY_SPECIFIED")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptDescription {
    pub uuid: EntityUuid,
    pub description: String,
    pub locale: String,
}

/// A mapping of a concept onto a code in an external source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptMap {
    pub uuid: EntityUuid,
    pub concept: Option<EntityUuid>,
    pub source: String,
    pub source_code: String,
    pub comment: Option<String>,
    pub audit: AuditInfo,
}

/// Ranges and units carried by numeric concepts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptNumeric {
    pub hi_absolute: Option<f64>,
    pub hi_critical: Option<f64>,
    pub hi_normal: Option<f64>,
    pub low_absolute: Option<f64>,
    pub low_critical: Option<f64>,
    pub low_normal: Option<f64>,
    pub units: Option<String>,
    pub precise: bool,
}

/// How observation values for a concept are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatatypeKind {
    Numeric,
    Coded,
    Text,
    NotApplicable,
    Document,
    Date,
    Time,
    Datetime,
    Boolean,
    Complex,
    Other,
}

impl DatatypeKind {
    /// Maps an HL7 abbreviation (`NM`, `CWE`, `ST`, ...) onto a kind.
    pub fn from_hl7(abbreviation: &str) -> Self {
        match abbreviation.trim().to_ascii_uppercase().as_str() {
            "NM" | "SN" => Self::Numeric,
            "CWE" => Self::Coded,
            "ST" => Self::Text,
            "ZZ" => Self::NotApplicable,
            "RP" => Self::Document,
            "DT" => Self::Date,
            "TM" => Self::Time,
            "TS" => Self::Datetime,
            "BIT" => Self::Boolean,
            "ED" => Self::Complex,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptDatatype {
    pub uuid: EntityUuid,
    pub name: String,
    pub hl7_abbreviation: String,
    pub description: Option<String>,
    pub audit: AuditInfo,
    pub retire: RetireInfo,
}

impl ConceptDatatype {
    pub fn kind(&self) -> DatatypeKind {
        DatatypeKind::from_hl7(&self.hl7_abbreviation)
    }

    /// The datatypes every dictionary ships with.
    pub fn standard() -> Vec<ConceptDatatype> {
        const STANDARD: &[(&str, &str, &str)] = &[
            ("8d4a4488-c2cc-11de-8d13-0010c6dffd0f", "Numeric", "NM"),
            ("8d4a48b6-c2cc-11de-8d13-0010c6dffd0f", "Coded", "CWE"),
            ("8d4a4ab4-c2cc-11de-8d13-0010c6dffd0f", "Text", "ST"),
            ("8d4a4c94-c2cc-11de-8d13-0010c6dffd0f", "N/A", "ZZ"),
            ("8d4a4e74-c2cc-11de-8d13-0010c6dffd0f", "Document", "RP"),
            ("8d4a505e-c2cc-11de-8d13-0010c6dffd0f", "Date", "DT"),
            ("8d4a591e-c2cc-11de-8d13-0010c6dffd0f", "Time", "TM"),
            ("8d4a5af4-c2cc-11de-8d13-0010c6dffd0f", "Datetime", "TS"),
            ("8d4a5cca-c2cc-11de-8d13-0010c6dffd0f", "Boolean", "BIT"),
            ("8d4a6242-c2cc-11de-8d13-0010c6dffd0f", "Complex", "ED"),
        ];

        STANDARD
            .iter()
            .filter_map(|(uuid, name, hl7)| {
                Some(ConceptDatatype {
                    uuid: EntityUuid::parse(uuid).ok()?,
                    name: (*name).to_owned(),
                    hl7_abbreviation: (*hl7).to_owned(),
                    ..Default::default()
                })
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Drug {
    pub uuid: EntityUuid,
    pub name: String,
    pub concept: Option<EntityUuid>,
    pub dosage_form: Option<EntityUuid>,
    pub dose_strength: Option<f64>,
    pub units: Option<String>,
    pub combination: bool,
    pub maximum_daily_dose: Option<f64>,
    pub minimum_daily_dose: Option<f64>,
    pub audit: AuditInfo,
    pub retire: RetireInfo,
}

voidable! {
    ConceptName => void,
}

retireable!(Concept, ConceptDatatype, Drug);
