//! YAML seed files for the in-memory store.
//!
//! A seed lists entities by kind. Every section is optional and every entity field not given
//! falls back to its default, including a freshly generated uuid.
//!
//! ```yaml
//! actor: admin
//! metadata:
//!   - kind: encounter_type
//!     name: Adult Initial
//! locations:
//!   - name: Outpatient Clinic
//!     tags: [Login Location]
//! ```

use crate::{
    Concept, ConceptDatatype, DomainError, DomainResult, Drug, Encounter, GlobalProperty,
    Location, Metadata, Module, Obs, Order, Patient, Person, Visit,
};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub actor: Option<String>,
    pub concept_datatypes: Vec<ConceptDatatype>,
    pub metadata: Vec<Metadata>,
    pub concepts: Vec<Concept>,
    pub drugs: Vec<Drug>,
    pub locations: Vec<Location>,
    pub persons: Vec<Person>,
    pub patients: Vec<Patient>,
    pub visits: Vec<Visit>,
    pub encounters: Vec<Encounter>,
    pub obs: Vec<Obs>,
    pub orders: Vec<Order>,
    pub global_properties: Vec<GlobalProperty>,
    pub modules: Vec<Module>,
}

impl Seed {
    /// Parses a seed from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::SeedParse`] if the text is not a valid seed.
    pub fn from_yaml_str(yaml: &str) -> DomainResult<Self> {
        serde_yaml::from_str(yaml).map_err(DomainError::SeedParse)
    }

    /// Reads and parses a seed file.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::SeedRead`] if the file cannot be read, or
    /// [`DomainError::SeedParse`] if its contents are not a valid seed.
    pub fn from_yaml_file(path: &Path) -> DomainResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(DomainError::SeedRead)?;
        Self::from_yaml_str(&yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EncounterService, InMemoryEmr, LocationService, MetadataKind, PatientService};
    use std::io::Write;

    const SEED: &str = r#"
actor: registrar
metadata:
  - uuid: 61ae96f4-6afe-4351-b6f8-cd4fc383cce1
    kind: encounter_type
    name: Adult Initial
locations:
  - uuid: 8d6c993e-c2cc-11de-8d13-0010c6dffd0f
    name: Unknown Location
    tags: [Login Location]
patients:
  - person:
      uuid: da7f524f-27ce-4bb2-86d6-6d1d05312bd5
      gender: M
      names:
        - given_name: Horatio
          family_name: Hornblower
          preferred: true
    identifiers:
      - identifier: "101-6"
        preferred: true
encounters:
  - patient: da7f524f-27ce-4bb2-86d6-6d1d05312bd5
    encounter_type: 61ae96f4-6afe-4351-b6f8-cd4fc383cce1
    encounter_datetime: 2008-08-01T00:00:00Z
  - encounter_type: 61ae96f4-6afe-4351-b6f8-cd4fc383cce1
"#;

    #[test]
    fn test_seed_loads_and_skips_invalid_entries() {
        let seed = Seed::from_yaml_str(SEED).expect("seed should parse");
        assert_eq!(seed.actor.as_deref(), Some("registrar"));
        assert_eq!(seed.metadata[0].kind, MetadataKind::EncounterType);

        let emr = InMemoryEmr::from_seed(seed).expect("seed should load");

        let patient = emr
            .get_patient("da7f524f-27ce-4bb2-86d6-6d1d05312bd5")
            .expect("lookup")
            .expect("patient seeded");
        assert_eq!(patient.person.audit.creator.as_deref(), Some("registrar"));
        assert_eq!(
            emr.get_encounters_by_patient(patient.uuid().as_str())
                .expect("lookup")
                .len(),
            1,
            "encounter without a patient must be skipped"
        );
        assert!(emr
            .get_location_by_name("unknown location")
            .expect("lookup")
            .is_some());
    }

    #[test]
    fn test_seed_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SEED.as_bytes()).expect("write seed");

        let seed = Seed::from_yaml_file(file.path()).expect("seed file should parse");
        assert_eq!(seed.patients.len(), 1);
    }

    #[test]
    fn test_seed_file_errors() {
        let missing = Seed::from_yaml_file(Path::new("/definitely/not/here.yaml"));
        assert!(matches!(missing, Err(DomainError::SeedRead(_))));

        let invalid = Seed::from_yaml_str("patients: 12");
        assert!(matches!(invalid, Err(DomainError::SeedParse(_))));
    }
}
