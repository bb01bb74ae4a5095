//! Visits, encounters, observations, orders and allergies.

use crate::audit::{voidable, AuditInfo, VoidInfo};
use chrono::{DateTime, Utc};
use emr_uuid::EntityUuid;
use serde::{Deserialize, Serialize};

/// A patient's stay or appointment, grouping the encounters that happened during it.
///
/// `encounters` is populated by the store on fetch. On save, every listed encounter is linked to
/// the visit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Visit {
    pub uuid: EntityUuid,
    pub patient: Option<EntityUuid>,
    pub visit_type: Option<EntityUuid>,
    pub indication: Option<EntityUuid>,
    pub location: Option<EntityUuid>,
    pub start_datetime: DateTime<Utc>,
    pub stop_datetime: Option<DateTime<Utc>>,
    pub encounters: Vec<EntityUuid>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

impl Default for Visit {
    fn default() -> Self {
        Self {
            uuid: EntityUuid::new(),
            patient: None,
            visit_type: None,
            indication: None,
            location: None,
            start_datetime: Utc::now(),
            stop_datetime: None,
            encounters: Vec::new(),
            audit: AuditInfo::default(),
            void: VoidInfo::default(),
        }
    }
}

impl Visit {
    /// Whether the visit has started and not yet stopped at `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start_datetime <= at && self.stop_datetime.is_none_or(|stop| stop > at)
    }
}

/// A clinical encounter.
///
/// `obs` and `orders` are populated by the store on fetch and split back out on save, so the
/// encounter behaves as the aggregate root of its observations and orders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Encounter {
    pub uuid: EntityUuid,
    pub encounter_datetime: DateTime<Utc>,
    pub patient: Option<EntityUuid>,
    pub location: Option<EntityUuid>,
    pub encounter_type: Option<EntityUuid>,
    pub provider: Option<EntityUuid>,
    pub visit: Option<EntityUuid>,
    pub obs: Vec<Obs>,
    pub orders: Vec<Order>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

impl Default for Encounter {
    fn default() -> Self {
        Self {
            uuid: EntityUuid::new(),
            encounter_datetime: Utc::now(),
            patient: None,
            location: None,
            encounter_type: None,
            provider: None,
            visit: None,
            obs: Vec::new(),
            orders: Vec::new(),
            audit: AuditInfo::default(),
            void: VoidInfo::default(),
        }
    }
}

/// The typed value of an observation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ObsValue {
    #[default]
    None,
    Coded(EntityUuid),
    /// A drug answer; `concept` is the drug's concept, stored alongside as the coded value.
    Drug {
        drug: EntityUuid,
        concept: Option<EntityUuid>,
    },
    Numeric(f64),
    Boolean(bool),
    Text(String),
    Datetime(DateTime<Utc>),
    Complex(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Obs {
    pub uuid: EntityUuid,
    pub person: Option<EntityUuid>,
    pub concept: Option<EntityUuid>,
    pub encounter: Option<EntityUuid>,
    pub order: Option<EntityUuid>,
    pub location: Option<EntityUuid>,
    pub obs_datetime: DateTime<Utc>,
    pub accession_number: Option<String>,
    pub obs_group: Option<EntityUuid>,
    pub group_members: Vec<Obs>,
    pub value: ObsValue,
    pub value_modifier: Option<String>,
    pub comment: Option<String>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

impl Default for Obs {
    fn default() -> Self {
        Self {
            uuid: EntityUuid::new(),
            person: None,
            concept: None,
            encounter: None,
            order: None,
            location: None,
            obs_datetime: Utc::now(),
            accession_number: None,
            obs_group: None,
            group_members: Vec::new(),
            value: ObsValue::None,
            value_modifier: None,
            comment: None,
            audit: AuditInfo::default(),
            void: VoidInfo::default(),
        }
    }
}

impl Obs {
    pub fn is_group(&self) -> bool {
        !self.group_members.is_empty()
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.value, ObsValue::Complex(_))
    }
}

/// Fields only drug orders carry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrugOrderDetail {
    pub drug: Option<EntityUuid>,
    pub dose: Option<f64>,
    pub units: Option<String>,
    pub frequency: Option<String>,
    pub prn: bool,
    pub complex: bool,
    pub quantity: Option<i32>,
}

/// The order subtype.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderDetail {
    #[default]
    Generic,
    Drug(DrugOrderDetail),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub uuid: EntityUuid,
    pub order_type: Option<EntityUuid>,
    pub patient: Option<EntityUuid>,
    pub concept: Option<EntityUuid>,
    pub encounter: Option<EntityUuid>,
    pub orderer: Option<EntityUuid>,
    pub instructions: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub auto_expire_date: Option<DateTime<Utc>>,
    pub accession_number: Option<String>,
    pub discontinued: bool,
    pub discontinued_by: Option<String>,
    pub discontinued_date: Option<DateTime<Utc>>,
    pub discontinued_reason: Option<EntityUuid>,
    pub discontinued_reason_non_coded: Option<String>,
    pub detail: OrderDetail,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

/// The category of substance a patient is allergic to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllergenType {
    Drug,
    Food,
    Environment,
    #[default]
    Other,
}

impl AllergenType {
    pub fn as_str(self) -> &'static str {
        match self {
            AllergenType::Drug => "DRUG",
            AllergenType::Food => "FOOD",
            AllergenType::Environment => "ENVIRONMENT",
            AllergenType::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRUG" => Some(AllergenType::Drug),
            "FOOD" => Some(AllergenType::Food),
            "ENVIRONMENT" => Some(AllergenType::Environment),
            "OTHER" => Some(AllergenType::Other),
            _ => None,
        }
    }
}

/// What a patient is allergic to: a coded concept, or free text when no concept fits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Allergen {
    pub allergen_type: AllergenType,
    pub coded_allergen: Option<EntityUuid>,
    pub non_coded_allergen: Option<String>,
}

impl Allergen {
    pub fn is_empty(&self) -> bool {
        self.coded_allergen.is_none()
            && self
                .non_coded_allergen
                .as_deref()
                .is_none_or(|text| text.trim().is_empty())
    }

    /// Two allergens are the same if they name the same concept, or the same free text ignoring
    /// case.
    pub fn same_as(&self, other: &Allergen) -> bool {
        match (&self.coded_allergen, &other.coded_allergen) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (&self.non_coded_allergen, &other.non_coded_allergen) {
                (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
                _ => false,
            },
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllergyReaction {
    pub uuid: EntityUuid,
    pub reaction: Option<EntityUuid>,
    pub reaction_non_coded: Option<String>,
}

/// A patient allergy, owned by the patient.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Allergy {
    pub uuid: EntityUuid,
    pub patient: Option<EntityUuid>,
    pub allergen: Allergen,
    pub severity: Option<EntityUuid>,
    pub comment: Option<String>,
    pub reactions: Vec<AllergyReaction>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

voidable! {
    Visit => void,
    Allergy => void,
    Encounter => void,
    Obs => void,
    Order => void,
}
