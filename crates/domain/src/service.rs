//! Domain service interfaces.
//!
//! Resources never reach the store directly. Every lookup, save and purge goes through one of
//! these traits, handed to the request through [`Services`]. Lookups take plain string ids so
//! callers can pass URL segments through unchanged; a miss is `Ok(None)`, not an error.

use crate::{
    Concept, ConceptDatatype, DomainResult, Drug, Encounter, GlobalProperty, Location, Metadata,
    MetadataKind, Module, Obs, Order, Patient, Person, Visit,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub trait PersonService: Send + Sync {
    fn get_person(&self, uuid: &str) -> DomainResult<Option<Person>>;
    fn save_person(&self, person: Person) -> DomainResult<Person>;
    fn purge_person(&self, uuid: &str) -> DomainResult<()>;
    /// People with a name containing `query`, ignoring case.
    fn search_people(&self, query: &str, include_voided: bool) -> DomainResult<Vec<Person>>;
}

pub trait PatientService: Send + Sync {
    fn get_patient(&self, uuid: &str) -> DomainResult<Option<Patient>>;
    fn save_patient(&self, patient: Patient) -> DomainResult<Patient>;
    fn purge_patient(&self, uuid: &str) -> DomainResult<()>;
    /// Patients whose name or identifier contains `query`, ignoring case.
    fn search_patients(&self, query: &str, include_voided: bool) -> DomainResult<Vec<Patient>>;
    /// Groups of two or more patients agreeing on every listed attribute
    /// (`gender`, `birthdate`, `givenName`, `middleName`, `familyName`), flattened.
    fn find_duplicate_patients(&self, attributes: &[String]) -> DomainResult<Vec<Patient>>;
}

pub trait ConceptService: Send + Sync {
    fn get_concept(&self, uuid: &str) -> DomainResult<Option<Concept>>;
    fn get_concept_by_name(&self, name: &str) -> DomainResult<Option<Concept>>;
    fn save_concept(&self, concept: Concept) -> DomainResult<Concept>;
    fn purge_concept(&self, uuid: &str) -> DomainResult<()>;
    fn get_all_concepts(&self, include_retired: bool) -> DomainResult<Vec<Concept>>;
    fn search_concepts(&self, query: &str, include_retired: bool) -> DomainResult<Vec<Concept>>;
    /// Concepts that list `uuid` among their answers.
    fn get_concepts_by_answer(&self, uuid: &str) -> DomainResult<Vec<Concept>>;
    /// The concept configured as the boolean `true` answer.
    fn get_true_concept(&self) -> DomainResult<Option<Concept>>;
    fn get_false_concept(&self) -> DomainResult<Option<Concept>>;

    fn get_datatype(&self, uuid: &str) -> DomainResult<Option<ConceptDatatype>>;
    fn get_datatype_by_name(&self, name: &str) -> DomainResult<Option<ConceptDatatype>>;
    fn get_all_datatypes(&self) -> DomainResult<Vec<ConceptDatatype>>;

    fn get_drug(&self, uuid: &str) -> DomainResult<Option<Drug>>;
    fn get_drug_by_name(&self, name: &str) -> DomainResult<Option<Drug>>;
    fn save_drug(&self, drug: Drug) -> DomainResult<Drug>;
    fn purge_drug(&self, uuid: &str) -> DomainResult<()>;
    fn get_all_drugs(&self, include_retired: bool) -> DomainResult<Vec<Drug>>;
    fn search_drugs(&self, query: &str, include_retired: bool) -> DomainResult<Vec<Drug>>;
}

pub trait EncounterService: Send + Sync {
    fn get_encounter(&self, uuid: &str) -> DomainResult<Option<Encounter>>;
    fn save_encounter(&self, encounter: Encounter) -> DomainResult<Encounter>;
    fn purge_encounter(&self, uuid: &str) -> DomainResult<()>;
    fn get_encounters_by_patient(&self, patient_uuid: &str) -> DomainResult<Vec<Encounter>>;
    /// Encounters whose patient matches `query` by name or identifier.
    fn search_encounters(&self, query: &str, include_voided: bool) -> DomainResult<Vec<Encounter>>;
}

/// Filters for [`VisitService::get_visits`]. Every set field must match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisitQuery {
    pub patient: Option<String>,
    pub location: Option<String>,
    pub visit_type: Option<String>,
    /// Only visits starting at or after this instant.
    pub from_start: Option<DateTime<Utc>>,
    /// Whether visits that have already stopped are returned.
    pub include_inactive: bool,
    pub include_voided: bool,
}

pub trait VisitService: Send + Sync {
    fn get_visit(&self, uuid: &str) -> DomainResult<Option<Visit>>;
    fn save_visit(&self, visit: Visit) -> DomainResult<Visit>;
    /// Removes the visit. A visit that still has encounters cannot be purged.
    fn purge_visit(&self, uuid: &str) -> DomainResult<()>;
    fn get_all_visits(&self, include_voided: bool) -> DomainResult<Vec<Visit>>;
    /// Matching visits, oldest start first.
    fn get_visits(&self, query: &VisitQuery) -> DomainResult<Vec<Visit>>;
}

pub trait ObsService: Send + Sync {
    fn get_obs(&self, uuid: &str) -> DomainResult<Option<Obs>>;
    fn save_obs(&self, obs: Obs) -> DomainResult<Obs>;
    fn purge_obs(&self, uuid: &str) -> DomainResult<()>;
    fn get_obs_by_person(&self, person_uuid: &str) -> DomainResult<Vec<Obs>>;
    fn get_obs_by_encounter(&self, encounter_uuid: &str) -> DomainResult<Vec<Obs>>;
    /// Observations whose concept name contains `query`.
    fn search_obs(&self, query: &str, include_voided: bool) -> DomainResult<Vec<Obs>>;
}

pub trait OrderService: Send + Sync {
    fn get_order(&self, uuid: &str) -> DomainResult<Option<Order>>;
    fn save_order(&self, order: Order) -> DomainResult<Order>;
    fn purge_order(&self, uuid: &str) -> DomainResult<()>;
    fn get_all_orders(&self, include_voided: bool) -> DomainResult<Vec<Order>>;
    fn get_orders_by_patient(&self, patient_uuid: &str) -> DomainResult<Vec<Order>>;
}

pub trait LocationService: Send + Sync {
    fn get_location(&self, uuid: &str) -> DomainResult<Option<Location>>;
    fn get_location_by_name(&self, name: &str) -> DomainResult<Option<Location>>;
    fn save_location(&self, location: Location) -> DomainResult<Location>;
    fn purge_location(&self, uuid: &str) -> DomainResult<()>;
    fn get_all_locations(&self, include_retired: bool) -> DomainResult<Vec<Location>>;
    fn search_locations(&self, query: &str, include_retired: bool) -> DomainResult<Vec<Location>>;
    /// Locations carrying `tag`, or `None` if no location uses the tag at all.
    fn get_locations_by_tag(&self, tag: &str) -> DomainResult<Option<Vec<Location>>>;
}

pub trait MetadataService: Send + Sync {
    fn get_metadata(&self, kind: MetadataKind, uuid: &str) -> DomainResult<Option<Metadata>>;
    fn get_metadata_by_name(&self, kind: MetadataKind, name: &str)
        -> DomainResult<Option<Metadata>>;
    fn save_metadata(&self, item: Metadata) -> DomainResult<Metadata>;
    fn purge_metadata(&self, kind: MetadataKind, uuid: &str) -> DomainResult<()>;
    fn get_all_metadata(&self, kind: MetadataKind, include_retired: bool)
        -> DomainResult<Vec<Metadata>>;
}

pub trait AdministrationService: Send + Sync {
    fn get_global_property(&self, property: &str) -> DomainResult<Option<GlobalProperty>>;
    fn get_global_property_by_uuid(&self, uuid: &str) -> DomainResult<Option<GlobalProperty>>;
    fn save_global_property(&self, gp: GlobalProperty) -> DomainResult<GlobalProperty>;
    fn purge_global_property(&self, property: &str) -> DomainResult<()>;
    fn get_all_global_properties(&self) -> DomainResult<Vec<GlobalProperty>>;
    fn get_global_properties_by_prefix(&self, prefix: &str) -> DomainResult<Vec<GlobalProperty>>;
}

pub trait ModuleService: Send + Sync {
    fn get_module(&self, module_id: &str) -> DomainResult<Option<Module>>;
    fn get_all_modules(&self) -> DomainResult<Vec<Module>>;
    fn start_module(&self, module_id: &str) -> DomainResult<Module>;
    fn stop_module(&self, module_id: &str) -> DomainResult<Module>;
    fn unload_module(&self, module_id: &str) -> DomainResult<()>;
    /// Installs (or replaces) a module from `url` and starts it.
    fn install_module(&self, url: &str) -> DomainResult<Module>;
}

/// Explicit service container passed to every request.
#[derive(Clone)]
pub struct Services {
    pub persons: Arc<dyn PersonService>,
    pub patients: Arc<dyn PatientService>,
    pub concepts: Arc<dyn ConceptService>,
    pub encounters: Arc<dyn EncounterService>,
    pub visits: Arc<dyn VisitService>,
    pub obs: Arc<dyn ObsService>,
    pub orders: Arc<dyn OrderService>,
    pub locations: Arc<dyn LocationService>,
    pub metadata: Arc<dyn MetadataService>,
    pub administration: Arc<dyn AdministrationService>,
    pub modules: Arc<dyn ModuleService>,
}

impl Services {
    /// Wires every service to one implementation that provides them all.
    pub fn from_provider<P>(provider: Arc<P>) -> Self
    where
        P: PersonService
            + PatientService
            + ConceptService
            + EncounterService
            + VisitService
            + ObsService
            + OrderService
            + LocationService
            + MetadataService
            + AdministrationService
            + ModuleService
            + 'static,
    {
        Self {
            persons: provider.clone(),
            patients: provider.clone(),
            concepts: provider.clone(),
            encounters: provider.clone(),
            visits: provider.clone(),
            obs: provider.clone(),
            orders: provider.clone(),
            locations: provider.clone(),
            metadata: provider.clone(),
            administration: provider.clone(),
            modules: provider,
        }
    }
}
