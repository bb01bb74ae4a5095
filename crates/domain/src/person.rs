//! People, patients and their owned collections.
//!
//! Child collections carry a back-reference to their owner (`person`, `patient`) the way the
//! persistence layer would populate it, so a child rendered on its own can still build its URI.

use crate::audit::{voidable, AuditInfo, VoidInfo};
use crate::clinical::Allergy;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use emr_uuid::EntityUuid;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    pub uuid: EntityUuid,
    pub gender: String,
    pub birthdate: Option<NaiveDate>,
    pub birthdate_estimated: bool,
    pub dead: bool,
    pub death_date: Option<DateTime<Utc>>,
    pub cause_of_death: Option<EntityUuid>,
    pub names: Vec<PersonName>,
    pub addresses: Vec<PersonAddress>,
    pub attributes: Vec<PersonAttribute>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

impl Person {
    /// The preferred non-voided name, or the first non-voided one.
    pub fn preferred_name(&self) -> Option<&PersonName> {
        preferred(&self.names, |n| n.preferred, |n| n.void.voided)
    }

    /// The preferred non-voided address, or the first non-voided one.
    pub fn preferred_address(&self) -> Option<&PersonAddress> {
        preferred(&self.addresses, |a| a.preferred, |a| a.void.voided)
    }

    pub fn active_attributes(&self) -> impl Iterator<Item = &PersonAttribute> {
        self.attributes.iter().filter(|a| !a.void.voided)
    }

    /// Age in whole years at `on`, if the birthdate is known.
    pub fn age_on(&self, on: NaiveDate) -> Option<i32> {
        let birthdate = self.birthdate?;
        let mut age = on.year() - birthdate.year();
        if (on.month(), on.day()) < (birthdate.month(), birthdate.day()) {
            age -= 1;
        }
        Some(age)
    }

    pub fn age(&self) -> Option<i32> {
        let on = match self.death_date {
            Some(death) if self.dead => death.date_naive(),
            _ => Utc::now().date_naive(),
        };
        self.age_on(on)
    }

    pub fn display_name(&self) -> String {
        self.preferred_name()
            .map(PersonName::full_name)
            .unwrap_or_default()
    }
}

fn preferred<T>(
    items: &[T],
    is_preferred: impl Fn(&T) -> bool,
    is_voided: impl Fn(&T) -> bool,
) -> Option<&T> {
    items
        .iter()
        .find(|i| is_preferred(i) && !is_voided(i))
        .or_else(|| items.iter().find(|i| !is_voided(i)))
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonName {
    pub uuid: EntityUuid,
    pub person: Option<EntityUuid>,
    pub preferred: bool,
    pub prefix: Option<String>,
    pub given_name: Option<String>,
    pub middle_name: Option<String>,
    pub family_name: Option<String>,
    pub family_name2: Option<String>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

impl PersonName {
    /// Prefix, given, middle and family names joined by single spaces.
    pub fn full_name(&self) -> String {
        [
            &self.prefix,
            &self.given_name,
            &self.middle_name,
            &self.family_name,
            &self.family_name2,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonAddress {
    pub uuid: EntityUuid,
    pub person: Option<EntityUuid>,
    pub preferred: bool,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city_village: Option<String>,
    pub state_province: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub county_district: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonAttribute {
    pub uuid: EntityUuid,
    pub person: Option<EntityUuid>,
    pub attribute_type: Option<EntityUuid>,
    pub value: Option<String>,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

/// A person registered as a patient.
///
/// The patient shares its uuid and void state with the wrapped person.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patient {
    pub person: Person,
    pub identifiers: Vec<PatientIdentifier>,
    pub allergies: Vec<Allergy>,
}

impl Patient {
    pub fn uuid(&self) -> &EntityUuid {
        &self.person.uuid
    }

    /// The preferred non-voided identifier, or the first non-voided one.
    pub fn preferred_identifier(&self) -> Option<&PatientIdentifier> {
        preferred(&self.identifiers, |i| i.preferred, |i| i.void.voided)
    }

    pub fn active_identifiers(&self) -> impl Iterator<Item = &PatientIdentifier> {
        self.identifiers.iter().filter(|i| !i.void.voided)
    }

    pub fn active_allergies(&self) -> impl Iterator<Item = &Allergy> {
        self.allergies.iter().filter(|a| !a.void.voided)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientIdentifier {
    pub uuid: EntityUuid,
    pub patient: Option<EntityUuid>,
    pub identifier: String,
    pub identifier_type: Option<EntityUuid>,
    pub location: Option<EntityUuid>,
    pub preferred: bool,
    pub audit: AuditInfo,
    pub void: VoidInfo,
}

voidable! {
    Person => void,
    PersonName => void,
    PersonAddress => void,
    PersonAttribute => void,
    Patient => person.void,
    PatientIdentifier => void,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(given: &str, family: &str, preferred: bool) -> PersonName {
        PersonName {
            given_name: Some(given.into()),
            family_name: Some(family.into()),
            preferred,
            ..Default::default()
        }
    }

    #[test]
    fn test_full_name_skips_blank_parts() {
        let n = PersonName {
            prefix: Some("Dr".into()),
            given_name: Some("Ada".into()),
            middle_name: Some("  ".into()),
            family_name: Some("Lovelace".into()),
            ..Default::default()
        };

        assert_eq!(n.full_name(), "Dr Ada Lovelace");
    }

    #[test]
    fn test_preferred_name_ignores_voided() {
        let mut voided = name("Old", "Name", true);
        voided.void.void("typo");
        let person = Person {
            names: vec![voided, name("New", "Name", false)],
            ..Default::default()
        };

        assert_eq!(person.display_name(), "New Name");
    }

    #[test]
    fn test_age_on_respects_birthday() {
        let person = Person {
            birthdate: NaiveDate::from_ymd_opt(2000, 6, 15),
            ..Default::default()
        };

        let before = NaiveDate::from_ymd_opt(2020, 6, 14).expect("valid date");
        let on = NaiveDate::from_ymd_opt(2020, 6, 15).expect("valid date");
        assert_eq!(person.age_on(before), Some(19));
        assert_eq!(person.age_on(on), Some(20));
    }
}
