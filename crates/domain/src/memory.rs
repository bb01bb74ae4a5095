//! In-memory reference implementation of every domain service.
//!
//! One [`RwLock`]-guarded store holds all entities. Aggregates are assembled on read and split on
//! write the way the persistence layer would: a patient is a person plus identifiers and
//! allergies, a visit lists its encounters, an encounter carries its top-level observations and
//! orders, and an observation carries its group members.
//! Every save stamps audit information with the configured actor.

use crate::{
    AdministrationService, Allergy, AuditInfo, Concept, ConceptDatatype, ConceptService,
    DomainError, DomainResult, Drug, Encounter, EncounterService, EntityUuid, GlobalProperty,
    Location, LocationService, Metadata, MetadataKind, MetadataService, Module, ModuleService,
    Obs, ObsService, Order, OrderService, Patient, PatientIdentifier, PatientService, Person,
    PersonService, Seed, Visit, VisitQuery, VisitService, VoidInfo,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global property naming the concept used as the boolean `true` answer.
pub const TRUE_CONCEPT_PROPERTY: &str = "concept.true";
/// Global property naming the concept used as the boolean `false` answer.
pub const FALSE_CONCEPT_PROPERTY: &str = "concept.false";
/// Module id of the REST layer itself.
pub const REST_MODULE_ID: &str = "webservices.rest";

#[derive(Default)]
struct Store {
    persons: BTreeMap<String, Person>,
    /// Patient uuid to identifiers; presence marks the person as a patient.
    patients: BTreeMap<String, Vec<PatientIdentifier>>,
    /// Patient uuid to allergies.
    allergies: BTreeMap<String, Vec<Allergy>>,
    concepts: BTreeMap<String, Concept>,
    datatypes: BTreeMap<String, ConceptDatatype>,
    drugs: BTreeMap<String, Drug>,
    /// Stored without `encounters`; encounters point at their visit.
    visits: BTreeMap<String, Visit>,
    encounters: BTreeMap<String, Encounter>,
    /// Flat; group members reference their parent through `obs_group`.
    obs: BTreeMap<String, Obs>,
    orders: BTreeMap<String, Order>,
    locations: BTreeMap<String, Location>,
    metadata: BTreeMap<(MetadataKind, String), Metadata>,
    /// Keyed by property name.
    global_properties: BTreeMap<String, GlobalProperty>,
    modules: BTreeMap<String, Module>,
}

/// Thread-safe in-memory EMR.
pub struct InMemoryEmr {
    store: RwLock<Store>,
    actor: String,
}

impl InMemoryEmr {
    /// Creates an empty store with the standard concept datatypes and the REST module installed.
    ///
    /// # Arguments
    ///
    /// * `actor` - Name recorded as creator/changer on every save.
    pub fn new(actor: impl Into<String>) -> Self {
        let mut store = Store::default();
        for datatype in ConceptDatatype::standard() {
            store
                .datatypes
                .insert(datatype.uuid.to_string(), datatype);
        }
        store.modules.insert(
            REST_MODULE_ID.into(),
            Module {
                module_id: REST_MODULE_ID.into(),
                name: "Rest Web Services".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                started: true,
                ..Default::default()
            },
        );

        Self {
            store: RwLock::new(store),
            actor: actor.into(),
        }
    }

    /// Creates a store and loads `seed` into it.
    ///
    /// Entries that fail validation are logged and skipped rather than aborting the load.
    pub fn from_seed(seed: Seed) -> DomainResult<Self> {
        let emr = Self::new(seed.actor.clone().unwrap_or_else(|| "admin".into()));
        let loaded = emr.apply_seed(seed)?;
        tracing::info!("-- Seeded in-memory store with {} entities", loaded);
        Ok(emr)
    }

    /// Loads every entity in `seed`, returning how many were accepted.
    pub fn apply_seed(&self, seed: Seed) -> DomainResult<usize> {
        let mut loaded = 0;
        let mut accept = |kind: &str, result: DomainResult<()>| match result {
            Ok(()) => loaded += 1,
            Err(e) => tracing::warn!("skipping seed {}: {}", kind, e),
        };

        {
            let mut store = self.write()?;
            for datatype in seed.concept_datatypes {
                store
                    .datatypes
                    .insert(datatype.uuid.to_string(), datatype);
                accept("concept datatype", Ok(()));
            }
            for module in seed.modules {
                store.modules.insert(module.module_id.clone(), module);
                accept("module", Ok(()));
            }
        }

        for item in seed.metadata {
            accept("metadata", self.save_metadata(item).map(drop));
        }
        for concept in seed.concepts {
            accept("concept", self.save_concept(concept).map(drop));
        }
        for drug in seed.drugs {
            accept("drug", self.save_drug(drug).map(drop));
        }
        for location in seed.locations {
            accept("location", self.save_location(location).map(drop));
        }
        for person in seed.persons {
            accept("person", self.save_person(person).map(drop));
        }
        for patient in seed.patients {
            accept("patient", self.save_patient(patient).map(drop));
        }
        for visit in seed.visits {
            accept("visit", self.save_visit(visit).map(drop));
        }
        for encounter in seed.encounters {
            accept("encounter", self.save_encounter(encounter).map(drop));
        }
        for obs in seed.obs {
            accept("obs", self.save_obs(obs).map(drop));
        }
        for order in seed.orders {
            accept("order", self.save_order(order).map(drop));
        }
        for gp in seed.global_properties {
            accept("global property", self.save_global_property(gp).map(drop));
        }

        Ok(loaded)
    }

    fn read(&self) -> DomainResult<RwLockReadGuard<'_, Store>> {
        self.store
            .read()
            .map_err(|e| DomainError::Unavailable(e.to_string()))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, Store>> {
        self.store
            .write()
            .map_err(|e| DomainError::Unavailable(e.to_string()))
    }
}

impl Default for InMemoryEmr {
    fn default() -> Self {
        Self::new("admin")
    }
}

// ===== AUDIT STAMPING =====

fn stamp(audit: &mut AuditInfo, existing: Option<&AuditInfo>, actor: &str) {
    match existing {
        Some(previous) => {
            audit.creator = previous.creator.clone();
            audit.date_created = previous.date_created;
            audit.changed_by = Some(actor.to_owned());
            audit.date_changed = Some(Utc::now());
        }
        None => {
            if audit.creator.is_none() {
                audit.creator = Some(actor.to_owned());
            }
        }
    }
}

fn stamp_void(void: &mut VoidInfo, actor: &str) {
    if void.voided && void.voided_by.is_none() {
        void.voided_by = Some(actor.to_owned());
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn missing(what: &str, uuid: &str) -> DomainError {
    DomainError::NotFound(format!("{what} {uuid}"))
}

/// Every active allergy names an allergen, and no allergen is recorded twice.
fn check_allergies(allergies: &[Allergy]) -> DomainResult<()> {
    let active: Vec<&Allergy> = allergies.iter().filter(|a| !a.void.voided).collect();
    for (i, allergy) in active.iter().enumerate() {
        if allergy.allergen.is_empty() {
            return Err(DomainError::Validation(
                "an allergy must name a coded or non-coded allergen".into(),
            ));
        }
        if active[..i]
            .iter()
            .any(|other| other.allergen.same_as(&allergy.allergen))
        {
            return Err(DomainError::Validation(format!(
                "allergy {} duplicates an allergen already recorded for the patient",
                allergy.uuid
            )));
        }
    }
    Ok(())
}

// ===== STORE OPERATIONS =====

impl Store {
    fn insert_person(&mut self, mut person: Person, actor: &str) -> DomainResult<Person> {
        if person.names.is_empty() {
            return Err(DomainError::Validation(
                "a person must have at least one name".into(),
            ));
        }

        let uuid = person.uuid.clone();
        let existing = self.persons.get(uuid.as_str());
        stamp(&mut person.audit, existing.map(|p| &p.audit), actor);
        stamp_void(&mut person.void, actor);

        for name in &mut person.names {
            let previous = existing
                .and_then(|p| p.names.iter().find(|n| n.uuid == name.uuid))
                .map(|n| &n.audit);
            stamp(&mut name.audit, previous, actor);
            stamp_void(&mut name.void, actor);
            name.person = Some(uuid.clone());
        }
        for address in &mut person.addresses {
            let previous = existing
                .and_then(|p| p.addresses.iter().find(|a| a.uuid == address.uuid))
                .map(|a| &a.audit);
            stamp(&mut address.audit, previous, actor);
            stamp_void(&mut address.void, actor);
            address.person = Some(uuid.clone());
        }
        for attribute in &mut person.attributes {
            let previous = existing
                .and_then(|p| p.attributes.iter().find(|a| a.uuid == attribute.uuid))
                .map(|a| &a.audit);
            stamp(&mut attribute.audit, previous, actor);
            stamp_void(&mut attribute.void, actor);
            attribute.person = Some(uuid.clone());
        }

        self.persons.insert(uuid.to_string(), person.clone());
        Ok(person)
    }

    fn assemble_patient(&self, uuid: &str) -> Option<Patient> {
        let identifiers = self.patients.get(uuid)?;
        let person = self.persons.get(uuid)?;
        Some(Patient {
            person: person.clone(),
            identifiers: identifiers.clone(),
            allergies: self.allergies.get(uuid).cloned().unwrap_or_default(),
        })
    }

    fn patient_matches(&self, patient_uuid: &str, query: &str) -> bool {
        let name_matches = self
            .persons
            .get(patient_uuid)
            .map(|p| {
                p.names
                    .iter()
                    .any(|n| !n.void.voided && contains_ignore_case(&n.full_name(), query))
            })
            .unwrap_or(false);
        let identifier_matches = self
            .patients
            .get(patient_uuid)
            .map(|ids| {
                ids.iter()
                    .any(|i| !i.void.voided && contains_ignore_case(&i.identifier, query))
            })
            .unwrap_or(false);
        name_matches || identifier_matches
    }

    fn insert_obs(&mut self, mut obs: Obs, actor: &str) -> DomainResult<Obs> {
        let person = obs
            .person
            .clone()
            .ok_or_else(|| DomainError::Validation("obs person is required".into()))?;
        if !self.persons.contains_key(person.as_str()) {
            return Err(missing("person", person.as_str()));
        }
        let concept = obs
            .concept
            .clone()
            .ok_or_else(|| DomainError::Validation("obs concept is required".into()))?;
        if !self.concepts.contains_key(concept.as_str()) {
            return Err(missing("concept", concept.as_str()));
        }

        let uuid = obs.uuid.clone();
        let existing = self.obs.get(uuid.as_str()).map(|o| o.audit.clone());
        stamp(&mut obs.audit, existing.as_ref(), actor);
        stamp_void(&mut obs.void, actor);

        let members = std::mem::take(&mut obs.group_members);
        let mut saved_members = Vec::with_capacity(members.len());
        for mut member in members {
            member.obs_group = Some(uuid.clone());
            member.person = Some(person.clone());
            if member.encounter.is_none() {
                member.encounter = obs.encounter.clone();
            }
            saved_members.push(self.insert_obs(member, actor)?);
        }

        self.obs.insert(uuid.to_string(), obs.clone());
        obs.group_members = saved_members;
        Ok(obs)
    }

    fn assemble_obs(&self, stored: &Obs) -> Obs {
        let mut obs = stored.clone();
        obs.group_members = self
            .obs
            .values()
            .filter(|o| o.obs_group.as_ref() == Some(&stored.uuid))
            .map(|member| self.assemble_obs(member))
            .collect();
        obs
    }

    fn remove_obs(&mut self, uuid: &str) {
        let members: Vec<String> = self
            .obs
            .values()
            .filter(|o| o.obs_group.as_ref().map(|g| g.as_str()) == Some(uuid))
            .map(|o| o.uuid.to_string())
            .collect();
        for member in members {
            self.remove_obs(&member);
        }
        self.obs.remove(uuid);
    }

    fn insert_order(&mut self, mut order: Order, actor: &str) -> DomainResult<Order> {
        let patient = order
            .patient
            .clone()
            .ok_or_else(|| DomainError::Validation("order patient is required".into()))?;
        if !self.patients.contains_key(patient.as_str()) {
            return Err(missing("patient", patient.as_str()));
        }
        if order.order_type.is_none() {
            return Err(DomainError::Validation("order type is required".into()));
        }

        let existing = self.orders.get(order.uuid.as_str()).map(|o| o.audit.clone());
        stamp(&mut order.audit, existing.as_ref(), actor);
        stamp_void(&mut order.void, actor);
        self.orders.insert(order.uuid.to_string(), order.clone());
        Ok(order)
    }

    fn assemble_visit(&self, stored: &Visit) -> Visit {
        let mut encounters: Vec<&Encounter> = self
            .encounters
            .values()
            .filter(|e| e.visit.as_ref() == Some(&stored.uuid) && !e.void.voided)
            .collect();
        encounters.sort_by_key(|e| e.encounter_datetime);

        let mut visit = stored.clone();
        visit.encounters = encounters.into_iter().map(|e| e.uuid.clone()).collect();
        visit
    }

    fn assemble_encounter(&self, stored: &Encounter) -> Encounter {
        let mut encounter = stored.clone();
        encounter.obs = self
            .obs
            .values()
            .filter(|o| {
                o.encounter.as_ref() == Some(&stored.uuid) && o.obs_group.is_none() && !o.void.voided
            })
            .map(|o| self.assemble_obs(o))
            .collect();
        encounter.orders = self
            .orders
            .values()
            .filter(|o| o.encounter.as_ref() == Some(&stored.uuid) && !o.void.voided)
            .cloned()
            .collect();
        encounter
    }

    fn concept_in_use(&self, uuid: &str) -> bool {
        self.concepts
            .values()
            .any(|c| c.answers.iter().chain(&c.set_members).any(|m| m.as_str() == uuid))
            || self
                .obs
                .values()
                .any(|o| o.concept.as_ref().map(|c| c.as_str()) == Some(uuid))
            || self.allergies.values().flatten().any(|a| {
                a.allergen.coded_allergen.as_ref().map(|c| c.as_str()) == Some(uuid)
                    || a.reactions
                        .iter()
                        .any(|r| r.reaction.as_ref().map(|c| c.as_str()) == Some(uuid))
            })
    }

    fn concept_from_property(&self, property: &str) -> Option<Concept> {
        let uuid = self.global_properties.get(property)?.value.as_deref()?;
        self.concepts.get(uuid.trim()).cloned()
    }
}

// ===== SERVICE IMPLEMENTATIONS =====

impl PersonService for InMemoryEmr {
    fn get_person(&self, uuid: &str) -> DomainResult<Option<Person>> {
        Ok(self.read()?.persons.get(uuid).cloned())
    }

    fn save_person(&self, person: Person) -> DomainResult<Person> {
        let mut store = self.write()?;
        let saved = store.insert_person(person, &self.actor)?;
        tracing::debug!("saved person {}", saved.uuid);
        Ok(saved)
    }

    fn purge_person(&self, uuid: &str) -> DomainResult<()> {
        let mut store = self.write()?;
        if store.patients.contains_key(uuid) {
            return Err(DomainError::Conflict(format!(
                "person {uuid} is a patient; purge the patient instead"
            )));
        }
        store.persons.remove(uuid);
        Ok(())
    }

    fn search_people(&self, query: &str, include_voided: bool) -> DomainResult<Vec<Person>> {
        let store = self.read()?;
        Ok(store
            .persons
            .values()
            .filter(|p| include_voided || !p.void.voided)
            .filter(|p| {
                p.names
                    .iter()
                    .any(|n| !n.void.voided && contains_ignore_case(&n.full_name(), query))
            })
            .cloned()
            .collect())
    }
}

impl PatientService for InMemoryEmr {
    fn get_patient(&self, uuid: &str) -> DomainResult<Option<Patient>> {
        Ok(self.read()?.assemble_patient(uuid))
    }

    fn save_patient(&self, patient: Patient) -> DomainResult<Patient> {
        let Patient {
            person,
            mut identifiers,
            mut allergies,
        } = patient;
        if !person.void.voided && identifiers.iter().all(|i| i.void.voided) {
            return Err(DomainError::Validation(
                "a patient must have at least one identifier".into(),
            ));
        }
        check_allergies(&allergies)?;

        let mut store = self.write()?;
        let uuid = person.uuid.to_string();
        for identifier in &identifiers {
            let taken = store.patients.iter().any(|(other, ids)| {
                other != &uuid
                    && ids.iter().any(|i| {
                        !i.void.voided
                            && i.identifier == identifier.identifier
                            && i.identifier_type == identifier.identifier_type
                    })
            });
            if taken && !identifier.void.voided {
                return Err(DomainError::Conflict(format!(
                    "identifier {} is already in use by another patient",
                    identifier.identifier
                )));
            }
        }

        let person = store.insert_person(person, &self.actor)?;
        let existing = store.patients.get(&uuid).cloned().unwrap_or_default();
        for identifier in &mut identifiers {
            let previous = existing
                .iter()
                .find(|i| i.uuid == identifier.uuid)
                .map(|i| &i.audit);
            stamp(&mut identifier.audit, previous, &self.actor);
            stamp_void(&mut identifier.void, &self.actor);
            identifier.patient = Some(person.uuid.clone());
        }
        let existing_allergies = store.allergies.get(&uuid).cloned().unwrap_or_default();
        for allergy in &mut allergies {
            let previous = existing_allergies
                .iter()
                .find(|a| a.uuid == allergy.uuid)
                .map(|a| &a.audit);
            stamp(&mut allergy.audit, previous, &self.actor);
            stamp_void(&mut allergy.void, &self.actor);
            allergy.patient = Some(person.uuid.clone());
        }
        store.patients.insert(uuid.clone(), identifiers.clone());
        store.allergies.insert(uuid, allergies.clone());
        tracing::debug!("saved patient {}", person.uuid);
        Ok(Patient {
            person,
            identifiers,
            allergies,
        })
    }

    fn purge_patient(&self, uuid: &str) -> DomainResult<()> {
        let mut store = self.write()?;
        store.patients.remove(uuid);
        store.allergies.remove(uuid);
        store.persons.remove(uuid);
        Ok(())
    }

    fn search_patients(&self, query: &str, include_voided: bool) -> DomainResult<Vec<Patient>> {
        let store = self.read()?;
        Ok(store
            .patients
            .keys()
            .filter(|uuid| store.patient_matches(uuid, query))
            .filter_map(|uuid| store.assemble_patient(uuid))
            .filter(|p| include_voided || !p.person.void.voided)
            .collect())
    }

    fn find_duplicate_patients(&self, attributes: &[String]) -> DomainResult<Vec<Patient>> {
        let store = self.read()?;
        let mut groups: BTreeMap<Vec<String>, Vec<Patient>> = BTreeMap::new();

        for uuid in store.patients.keys() {
            let Some(patient) = store.assemble_patient(uuid) else {
                continue;
            };
            if patient.person.void.voided {
                continue;
            }
            let name = patient.person.preferred_name();
            let mut key = Vec::with_capacity(attributes.len());
            for attribute in attributes {
                let value = match attribute.as_str() {
                    "gender" => Some(patient.person.gender.to_lowercase()),
                    "birthdate" => patient.person.birthdate.map(|d| d.to_string()),
                    "givenName" => name.and_then(|n| n.given_name.clone()),
                    "middleName" => name.and_then(|n| n.middle_name.clone()),
                    "familyName" => name.and_then(|n| n.family_name.clone()),
                    other => {
                        return Err(DomainError::Validation(format!(
                            "unsupported duplicate attribute: {other}"
                        )))
                    }
                };
                key.push(value.unwrap_or_default().to_lowercase());
            }
            groups.entry(key).or_default().push(patient);
        }

        Ok(groups
            .into_values()
            .filter(|group| group.len() > 1)
            .flatten()
            .collect())
    }
}

impl ConceptService for InMemoryEmr {
    fn get_concept(&self, uuid: &str) -> DomainResult<Option<Concept>> {
        Ok(self.read()?.concepts.get(uuid).cloned())
    }

    fn get_concept_by_name(&self, name: &str) -> DomainResult<Option<Concept>> {
        Ok(self
            .read()?
            .concepts
            .values()
            .find(|c| c.has_name(name))
            .cloned())
    }

    fn save_concept(&self, mut concept: Concept) -> DomainResult<Concept> {
        if concept.names.iter().all(|n| n.void.voided) {
            return Err(DomainError::Validation(
                "a concept must have at least one name".into(),
            ));
        }
        let mut store = self.write()?;
        match &concept.datatype {
            Some(dt) if store.datatypes.contains_key(dt.as_str()) => {}
            Some(dt) => return Err(missing("concept datatype", dt.as_str())),
            None => {
                return Err(DomainError::Validation(
                    "a concept must have a datatype".into(),
                ))
            }
        }

        let existing = store.concepts.get(concept.uuid.as_str());
        stamp(&mut concept.audit, existing.map(|c| &c.audit), &self.actor);
        for name in &mut concept.names {
            let previous = existing
                .and_then(|c| c.names.iter().find(|n| n.uuid == name.uuid))
                .map(|n| &n.audit);
            stamp(&mut name.audit, previous, &self.actor);
            stamp_void(&mut name.void, &self.actor);
            name.concept = Some(concept.uuid.clone());
        }
        for mapping in &mut concept.mappings {
            let previous = existing
                .and_then(|c| c.mappings.iter().find(|m| m.uuid == mapping.uuid))
                .map(|m| &m.audit);
            stamp(&mut mapping.audit, previous, &self.actor);
            mapping.concept = Some(concept.uuid.clone());
        }
        if concept.retire.retired && concept.retire.retired_by.is_none() {
            concept.retire.retired_by = Some(self.actor.clone());
        }

        store
            .concepts
            .insert(concept.uuid.to_string(), concept.clone());
        tracing::debug!("saved concept {}", concept.uuid);
        Ok(concept)
    }

    fn purge_concept(&self, uuid: &str) -> DomainResult<()> {
        let mut store = self.write()?;
        if store.concept_in_use(uuid) {
            return Err(DomainError::Conflict(format!(
                "concept {uuid} is referenced and cannot be purged"
            )));
        }
        store.concepts.remove(uuid);
        Ok(())
    }

    fn get_all_concepts(&self, include_retired: bool) -> DomainResult<Vec<Concept>> {
        Ok(self
            .read()?
            .concepts
            .values()
            .filter(|c| include_retired || !c.retire.retired)
            .cloned()
            .collect())
    }

    fn search_concepts(&self, query: &str, include_retired: bool) -> DomainResult<Vec<Concept>> {
        Ok(self
            .read()?
            .concepts
            .values()
            .filter(|c| include_retired || !c.retire.retired)
            .filter(|c| {
                c.names
                    .iter()
                    .any(|n| !n.void.voided && contains_ignore_case(&n.name, query))
            })
            .cloned()
            .collect())
    }

    fn get_concepts_by_answer(&self, uuid: &str) -> DomainResult<Vec<Concept>> {
        Ok(self
            .read()?
            .concepts
            .values()
            .filter(|c| c.answers.iter().any(|a| a.as_str() == uuid))
            .cloned()
            .collect())
    }

    fn get_true_concept(&self) -> DomainResult<Option<Concept>> {
        Ok(self.read()?.concept_from_property(TRUE_CONCEPT_PROPERTY))
    }

    fn get_false_concept(&self) -> DomainResult<Option<Concept>> {
        Ok(self.read()?.concept_from_property(FALSE_CONCEPT_PROPERTY))
    }

    fn get_datatype(&self, uuid: &str) -> DomainResult<Option<ConceptDatatype>> {
        Ok(self.read()?.datatypes.get(uuid).cloned())
    }

    fn get_datatype_by_name(&self, name: &str) -> DomainResult<Option<ConceptDatatype>> {
        Ok(self
            .read()?
            .datatypes
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn get_all_datatypes(&self) -> DomainResult<Vec<ConceptDatatype>> {
        Ok(self.read()?.datatypes.values().cloned().collect())
    }

    fn get_drug(&self, uuid: &str) -> DomainResult<Option<Drug>> {
        Ok(self.read()?.drugs.get(uuid).cloned())
    }

    fn get_drug_by_name(&self, name: &str) -> DomainResult<Option<Drug>> {
        Ok(self
            .read()?
            .drugs
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn save_drug(&self, mut drug: Drug) -> DomainResult<Drug> {
        if drug.name.trim().is_empty() {
            return Err(DomainError::Validation("a drug must have a name".into()));
        }
        let mut store = self.write()?;
        match &drug.concept {
            Some(c) if store.concepts.contains_key(c.as_str()) => {}
            Some(c) => return Err(missing("concept", c.as_str())),
            None => return Err(DomainError::Validation("a drug must have a concept".into())),
        }
        let existing = store.drugs.get(drug.uuid.as_str()).map(|d| d.audit.clone());
        stamp(&mut drug.audit, existing.as_ref(), &self.actor);
        store.drugs.insert(drug.uuid.to_string(), drug.clone());
        Ok(drug)
    }

    fn purge_drug(&self, uuid: &str) -> DomainResult<()> {
        self.write()?.drugs.remove(uuid);
        Ok(())
    }

    fn get_all_drugs(&self, include_retired: bool) -> DomainResult<Vec<Drug>> {
        Ok(self
            .read()?
            .drugs
            .values()
            .filter(|d| include_retired || !d.retire.retired)
            .cloned()
            .collect())
    }

    fn search_drugs(&self, query: &str, include_retired: bool) -> DomainResult<Vec<Drug>> {
        Ok(self
            .read()?
            .drugs
            .values()
            .filter(|d| include_retired || !d.retire.retired)
            .filter(|d| contains_ignore_case(&d.name, query))
            .cloned()
            .collect())
    }
}

impl EncounterService for InMemoryEmr {
    fn get_encounter(&self, uuid: &str) -> DomainResult<Option<Encounter>> {
        let store = self.read()?;
        Ok(store
            .encounters
            .get(uuid)
            .map(|e| store.assemble_encounter(e)))
    }

    fn save_encounter(&self, mut encounter: Encounter) -> DomainResult<Encounter> {
        let mut store = self.write()?;
        let patient = encounter
            .patient
            .clone()
            .ok_or_else(|| DomainError::Validation("encounter patient is required".into()))?;
        if !store.patients.contains_key(patient.as_str()) {
            return Err(missing("patient", patient.as_str()));
        }
        if encounter.encounter_type.is_none() {
            return Err(DomainError::Validation(
                "encounter type is required".into(),
            ));
        }
        if let Some(visit) = &encounter.visit {
            let found = store
                .visits
                .get(visit.as_str())
                .ok_or_else(|| missing("visit", visit.as_str()))?;
            if found.patient.as_ref() != Some(&patient) {
                return Err(DomainError::Validation(format!(
                    "visit {visit} belongs to another patient"
                )));
            }
        }

        let existing = store
            .encounters
            .get(encounter.uuid.as_str())
            .map(|e| e.audit.clone());
        stamp(&mut encounter.audit, existing.as_ref(), &self.actor);
        stamp_void(&mut encounter.void, &self.actor);

        for mut obs in std::mem::take(&mut encounter.obs) {
            obs.encounter = Some(encounter.uuid.clone());
            obs.person = Some(patient.clone());
            if obs.location.is_none() {
                obs.location = encounter.location.clone();
            }
            store.insert_obs(obs, &self.actor)?;
        }
        for mut order in std::mem::take(&mut encounter.orders) {
            order.encounter = Some(encounter.uuid.clone());
            order.patient = Some(patient.clone());
            store.insert_order(order, &self.actor)?;
        }

        store
            .encounters
            .insert(encounter.uuid.to_string(), encounter.clone());
        tracing::debug!("saved encounter {}", encounter.uuid);
        Ok(store.assemble_encounter(&encounter))
    }

    fn purge_encounter(&self, uuid: &str) -> DomainResult<()> {
        let mut store = self.write()?;
        let top_level: Vec<String> = store
            .obs
            .values()
            .filter(|o| o.encounter.as_ref().map(|e| e.as_str()) == Some(uuid))
            .map(|o| o.uuid.to_string())
            .collect();
        for obs in top_level {
            store.remove_obs(&obs);
        }
        store
            .orders
            .retain(|_, o| o.encounter.as_ref().map(|e| e.as_str()) != Some(uuid));
        store.encounters.remove(uuid);
        Ok(())
    }

    fn get_encounters_by_patient(&self, patient_uuid: &str) -> DomainResult<Vec<Encounter>> {
        let store = self.read()?;
        let mut encounters: Vec<Encounter> = store
            .encounters
            .values()
            .filter(|e| {
                !e.void.voided && e.patient.as_ref().map(|p| p.as_str()) == Some(patient_uuid)
            })
            .map(|e| store.assemble_encounter(e))
            .collect();
        encounters.sort_by_key(|e| e.encounter_datetime);
        Ok(encounters)
    }

    fn search_encounters(&self, query: &str, include_voided: bool) -> DomainResult<Vec<Encounter>> {
        let store = self.read()?;
        Ok(store
            .encounters
            .values()
            .filter(|e| include_voided || !e.void.voided)
            .filter(|e| {
                e.patient
                    .as_ref()
                    .map(|p| store.patient_matches(p.as_str(), query))
                    .unwrap_or(false)
            })
            .map(|e| store.assemble_encounter(e))
            .collect())
    }
}

impl VisitService for InMemoryEmr {
    fn get_visit(&self, uuid: &str) -> DomainResult<Option<Visit>> {
        let store = self.read()?;
        Ok(store.visits.get(uuid).map(|v| store.assemble_visit(v)))
    }

    fn save_visit(&self, mut visit: Visit) -> DomainResult<Visit> {
        let mut store = self.write()?;
        let patient = visit
            .patient
            .clone()
            .ok_or_else(|| DomainError::Validation("visit patient is required".into()))?;
        if !store.patients.contains_key(patient.as_str()) {
            return Err(missing("patient", patient.as_str()));
        }
        if visit.visit_type.is_none() {
            return Err(DomainError::Validation("visit type is required".into()));
        }
        if visit
            .stop_datetime
            .is_some_and(|stop| stop < visit.start_datetime)
        {
            return Err(DomainError::Validation(
                "a visit cannot stop before it starts".into(),
            ));
        }

        let linked = std::mem::take(&mut visit.encounters);
        for uuid in &linked {
            let encounter = store
                .encounters
                .get(uuid.as_str())
                .ok_or_else(|| missing("encounter", uuid.as_str()))?;
            if encounter.patient.as_ref() != Some(&patient) {
                return Err(DomainError::Validation(format!(
                    "encounter {uuid} belongs to another patient"
                )));
            }
        }

        let existing = store.visits.get(visit.uuid.as_str()).map(|v| v.audit.clone());
        stamp(&mut visit.audit, existing.as_ref(), &self.actor);
        stamp_void(&mut visit.void, &self.actor);
        for uuid in &linked {
            if let Some(encounter) = store.encounters.get_mut(uuid.as_str()) {
                encounter.visit = Some(visit.uuid.clone());
            }
        }
        store.visits.insert(visit.uuid.to_string(), visit.clone());
        tracing::debug!("saved visit {}", visit.uuid);
        Ok(store.assemble_visit(&visit))
    }

    fn purge_visit(&self, uuid: &str) -> DomainResult<()> {
        let mut store = self.write()?;
        if store
            .encounters
            .values()
            .any(|e| e.visit.as_ref().map(|v| v.as_str()) == Some(uuid))
        {
            return Err(DomainError::Conflict(format!(
                "visit {uuid} still has encounters"
            )));
        }
        store.visits.remove(uuid);
        Ok(())
    }

    fn get_all_visits(&self, include_voided: bool) -> DomainResult<Vec<Visit>> {
        self.get_visits(&VisitQuery {
            include_inactive: true,
            include_voided,
            ..Default::default()
        })
    }

    fn get_visits(&self, query: &VisitQuery) -> DomainResult<Vec<Visit>> {
        let store = self.read()?;
        let now = Utc::now();
        let matches = |id: &Option<EntityUuid>, wanted: &Option<String>| match wanted {
            Some(wanted) => id.as_ref().map(|v| v.as_str()) == Some(wanted.as_str()),
            None => true,
        };
        let mut visits: Vec<Visit> = store
            .visits
            .values()
            .filter(|v| query.include_voided || !v.void.voided)
            .filter(|v| matches(&v.patient, &query.patient))
            .filter(|v| matches(&v.location, &query.location))
            .filter(|v| matches(&v.visit_type, &query.visit_type))
            .filter(|v| query.from_start.is_none_or(|from| v.start_datetime >= from))
            .filter(|v| query.include_inactive || v.stop_datetime.is_none_or(|stop| stop > now))
            .map(|v| store.assemble_visit(v))
            .collect();
        visits.sort_by_key(|v| v.start_datetime);
        Ok(visits)
    }
}

impl ObsService for InMemoryEmr {
    fn get_obs(&self, uuid: &str) -> DomainResult<Option<Obs>> {
        let store = self.read()?;
        Ok(store.obs.get(uuid).map(|o| store.assemble_obs(o)))
    }

    fn save_obs(&self, obs: Obs) -> DomainResult<Obs> {
        let mut store = self.write()?;
        let saved = store.insert_obs(obs, &self.actor)?;
        tracing::debug!("saved obs {}", saved.uuid);
        Ok(saved)
    }

    fn purge_obs(&self, uuid: &str) -> DomainResult<()> {
        self.write()?.remove_obs(uuid);
        Ok(())
    }

    fn get_obs_by_person(&self, person_uuid: &str) -> DomainResult<Vec<Obs>> {
        let store = self.read()?;
        Ok(store
            .obs
            .values()
            .filter(|o| {
                !o.void.voided
                    && o.obs_group.is_none()
                    && o.person.as_ref().map(|p| p.as_str()) == Some(person_uuid)
            })
            .map(|o| store.assemble_obs(o))
            .collect())
    }

    fn get_obs_by_encounter(&self, encounter_uuid: &str) -> DomainResult<Vec<Obs>> {
        let store = self.read()?;
        Ok(store
            .obs
            .values()
            .filter(|o| {
                !o.void.voided
                    && o.obs_group.is_none()
                    && o.encounter.as_ref().map(|e| e.as_str()) == Some(encounter_uuid)
            })
            .map(|o| store.assemble_obs(o))
            .collect())
    }

    fn search_obs(&self, query: &str, include_voided: bool) -> DomainResult<Vec<Obs>> {
        let store = self.read()?;
        Ok(store
            .obs
            .values()
            .filter(|o| include_voided || !o.void.voided)
            .filter(|o| {
                o.concept
                    .as_ref()
                    .and_then(|c| store.concepts.get(c.as_str()))
                    .map(|c| {
                        c.names
                            .iter()
                            .any(|n| contains_ignore_case(&n.name, query))
                    })
                    .unwrap_or(false)
            })
            .map(|o| store.assemble_obs(o))
            .collect())
    }
}

impl OrderService for InMemoryEmr {
    fn get_order(&self, uuid: &str) -> DomainResult<Option<Order>> {
        Ok(self.read()?.orders.get(uuid).cloned())
    }

    fn save_order(&self, order: Order) -> DomainResult<Order> {
        let mut store = self.write()?;
        let saved = store.insert_order(order, &self.actor)?;
        tracing::debug!("saved order {}", saved.uuid);
        Ok(saved)
    }

    fn purge_order(&self, uuid: &str) -> DomainResult<()> {
        self.write()?.orders.remove(uuid);
        Ok(())
    }

    fn get_all_orders(&self, include_voided: bool) -> DomainResult<Vec<Order>> {
        Ok(self
            .read()?
            .orders
            .values()
            .filter(|o| include_voided || !o.void.voided)
            .cloned()
            .collect())
    }

    fn get_orders_by_patient(&self, patient_uuid: &str) -> DomainResult<Vec<Order>> {
        Ok(self
            .read()?
            .orders
            .values()
            .filter(|o| {
                !o.void.voided && o.patient.as_ref().map(|p| p.as_str()) == Some(patient_uuid)
            })
            .cloned()
            .collect())
    }
}

impl LocationService for InMemoryEmr {
    fn get_location(&self, uuid: &str) -> DomainResult<Option<Location>> {
        Ok(self.read()?.locations.get(uuid).cloned())
    }

    fn get_location_by_name(&self, name: &str) -> DomainResult<Option<Location>> {
        Ok(self
            .read()?
            .locations
            .values()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn save_location(&self, mut location: Location) -> DomainResult<Location> {
        if location.name.trim().is_empty() {
            return Err(DomainError::Validation(
                "a location must have a name".into(),
            ));
        }
        let mut store = self.write()?;
        let existing = store
            .locations
            .get(location.uuid.as_str())
            .map(|l| l.audit.clone());
        stamp(&mut location.audit, existing.as_ref(), &self.actor);
        store
            .locations
            .insert(location.uuid.to_string(), location.clone());
        Ok(location)
    }

    fn purge_location(&self, uuid: &str) -> DomainResult<()> {
        self.write()?.locations.remove(uuid);
        Ok(())
    }

    fn get_all_locations(&self, include_retired: bool) -> DomainResult<Vec<Location>> {
        Ok(self
            .read()?
            .locations
            .values()
            .filter(|l| include_retired || !l.retire.retired)
            .cloned()
            .collect())
    }

    fn search_locations(&self, query: &str, include_retired: bool) -> DomainResult<Vec<Location>> {
        Ok(self
            .read()?
            .locations
            .values()
            .filter(|l| include_retired || !l.retire.retired)
            .filter(|l| contains_ignore_case(&l.name, query))
            .cloned()
            .collect())
    }

    fn get_locations_by_tag(&self, tag: &str) -> DomainResult<Option<Vec<Location>>> {
        let store = self.read()?;
        let tagged: Vec<Location> = store
            .locations
            .values()
            .filter(|l| l.has_tag(tag))
            .cloned()
            .collect();
        if tagged.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            tagged.into_iter().filter(|l| !l.retire.retired).collect(),
        ))
    }
}

impl MetadataService for InMemoryEmr {
    fn get_metadata(&self, kind: MetadataKind, uuid: &str) -> DomainResult<Option<Metadata>> {
        Ok(self
            .read()?
            .metadata
            .get(&(kind, uuid.to_owned()))
            .cloned())
    }

    fn get_metadata_by_name(
        &self,
        kind: MetadataKind,
        name: &str,
    ) -> DomainResult<Option<Metadata>> {
        Ok(self
            .read()?
            .metadata
            .values()
            .find(|m| m.kind == kind && m.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn save_metadata(&self, mut item: Metadata) -> DomainResult<Metadata> {
        if item.name.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "a {} must have a name",
                item.kind.label()
            )));
        }
        let mut store = self.write()?;
        let key = (item.kind, item.uuid.to_string());
        let existing = store.metadata.get(&key).map(|m| m.audit.clone());
        stamp(&mut item.audit, existing.as_ref(), &self.actor);
        store.metadata.insert(key, item.clone());
        Ok(item)
    }

    fn purge_metadata(&self, kind: MetadataKind, uuid: &str) -> DomainResult<()> {
        self.write()?.metadata.remove(&(kind, uuid.to_owned()));
        Ok(())
    }

    fn get_all_metadata(
        &self,
        kind: MetadataKind,
        include_retired: bool,
    ) -> DomainResult<Vec<Metadata>> {
        Ok(self
            .read()?
            .metadata
            .values()
            .filter(|m| m.kind == kind && (include_retired || !m.retire.retired))
            .cloned()
            .collect())
    }
}

impl AdministrationService for InMemoryEmr {
    fn get_global_property(&self, property: &str) -> DomainResult<Option<GlobalProperty>> {
        Ok(self.read()?.global_properties.get(property).cloned())
    }

    fn get_global_property_by_uuid(&self, uuid: &str) -> DomainResult<Option<GlobalProperty>> {
        Ok(self
            .read()?
            .global_properties
            .values()
            .find(|gp| gp.uuid.as_str() == uuid)
            .cloned())
    }

    fn save_global_property(&self, mut gp: GlobalProperty) -> DomainResult<GlobalProperty> {
        if gp.property.trim().is_empty() {
            return Err(DomainError::Validation(
                "a global property must have a name".into(),
            ));
        }
        let mut store = self.write()?;
        let existing = store.global_properties.get(&gp.property).cloned();
        if let Some(previous) = &existing {
            gp.uuid = previous.uuid.clone();
        }
        stamp(&mut gp.audit, existing.as_ref().map(|p| &p.audit), &self.actor);
        store
            .global_properties
            .insert(gp.property.clone(), gp.clone());
        Ok(gp)
    }

    fn purge_global_property(&self, property: &str) -> DomainResult<()> {
        self.write()?.global_properties.remove(property);
        Ok(())
    }

    fn get_all_global_properties(&self) -> DomainResult<Vec<GlobalProperty>> {
        Ok(self.read()?.global_properties.values().cloned().collect())
    }

    fn get_global_properties_by_prefix(&self, prefix: &str) -> DomainResult<Vec<GlobalProperty>> {
        let prefix = prefix.to_lowercase();
        Ok(self
            .read()?
            .global_properties
            .values()
            .filter(|gp| gp.property.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect())
    }
}

impl ModuleService for InMemoryEmr {
    fn get_module(&self, module_id: &str) -> DomainResult<Option<Module>> {
        Ok(self.read()?.modules.get(module_id).cloned())
    }

    fn get_all_modules(&self) -> DomainResult<Vec<Module>> {
        Ok(self.read()?.modules.values().cloned().collect())
    }

    fn start_module(&self, module_id: &str) -> DomainResult<Module> {
        let mut store = self.write()?;
        let module = store
            .modules
            .get_mut(module_id)
            .ok_or_else(|| missing("module", module_id))?;
        module.started = true;
        module.start_error = None;
        tracing::info!("-- Started module {}", module_id);
        Ok(module.clone())
    }

    fn stop_module(&self, module_id: &str) -> DomainResult<Module> {
        let mut store = self.write()?;
        let module = store
            .modules
            .get_mut(module_id)
            .ok_or_else(|| missing("module", module_id))?;
        module.started = false;
        tracing::info!("-- Stopped module {}", module_id);
        Ok(module.clone())
    }

    fn unload_module(&self, module_id: &str) -> DomainResult<()> {
        let mut store = self.write()?;
        store
            .modules
            .remove(module_id)
            .ok_or_else(|| missing("module", module_id))?;
        tracing::info!("-- Unloaded module {}", module_id);
        Ok(())
    }

    fn install_module(&self, url: &str) -> DomainResult<Module> {
        let (module_id, version) = module_id_from_url(url).ok_or_else(|| {
            DomainError::Validation(format!("cannot derive a module id from {url}"))
        })?;
        let module = Module {
            name: module_id.clone(),
            module_id: module_id.clone(),
            version,
            started: true,
            download_url: Some(url.to_owned()),
            ..Default::default()
        };
        self.write()?.modules.insert(module_id, module.clone());
        tracing::info!("-- Installed module {} from {}", module.module_id, url);
        Ok(module)
    }
}

/// Splits `.../reporting-0.9.2.omod` into (`reporting`, `0.9.2`).
fn module_id_from_url(url: &str) -> Option<(String, String)> {
    let file = url
        .split(['?', '#'])
        .next()?
        .rsplit('/')
        .find(|segment| !segment.is_empty())?;
    let stem = file.strip_suffix(".omod").unwrap_or(file);
    let (id, version) = match stem.rfind('-') {
        Some(idx) if stem[idx + 1..].starts_with(|c: char| c.is_ascii_digit()) => {
            (&stem[..idx], &stem[idx + 1..])
        }
        _ => (stem, ""),
    };
    if id.is_empty() {
        return None;
    }
    Some((id.to_owned(), version.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConceptName, EntityUuid, ObsValue, PersonName};

    const NUMERIC: &str = "8d4a4488-c2cc-11de-8d13-0010c6dffd0f";

    fn person(given: &str, family: &str) -> Person {
        Person {
            gender: "F".into(),
            names: vec![PersonName {
                given_name: Some(given.into()),
                family_name: Some(family.into()),
                preferred: true,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn patient(emr: &InMemoryEmr, given: &str, family: &str, identifier: &str) -> Patient {
        emr.save_patient(Patient {
            person: person(given, family),
            identifiers: vec![PatientIdentifier {
                identifier: identifier.into(),
                preferred: true,
                ..Default::default()
            }],
            ..Default::default()
        })
        .expect("patient should save")
    }

    fn concept(emr: &InMemoryEmr, name: &str) -> Concept {
        emr.save_concept(Concept {
            names: vec![ConceptName {
                name: name.into(),
                locale: "en".into(),
                locale_preferred: true,
                ..Default::default()
            }],
            datatype: Some(EntityUuid::parse(NUMERIC).expect("valid uuid")),
            ..Default::default()
        })
        .expect("concept should save")
    }

    #[test]
    fn test_save_patient_stamps_audit_and_back_references() {
        let emr = InMemoryEmr::new("tester");
        let saved = patient(&emr, "Ada", "Lovelace", "100-1");

        assert_eq!(saved.person.audit.creator.as_deref(), Some("tester"));
        assert_eq!(saved.identifiers[0].patient.as_ref(), Some(saved.uuid()));
        assert_eq!(saved.person.names[0].person.as_ref(), Some(saved.uuid()));

        let updated = emr.save_patient(saved.clone()).expect("resave");
        assert_eq!(updated.person.audit.changed_by.as_deref(), Some("tester"));
        assert_eq!(updated.person.audit.date_created, saved.person.audit.date_created);
    }

    #[test]
    fn test_save_patient_requires_identifier() {
        let emr = InMemoryEmr::default();
        let result = emr.save_patient(Patient {
            person: person("No", "Id"),
            ..Default::default()
        });

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_duplicate_identifier_conflicts() {
        let emr = InMemoryEmr::default();
        patient(&emr, "Ada", "Lovelace", "100-1");
        let result = emr.save_patient(Patient {
            person: person("Other", "Person"),
            identifiers: vec![PatientIdentifier {
                identifier: "100-1".into(),
                ..Default::default()
            }],
            ..Default::default()
        });

        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn test_find_duplicates_groups_matching_patients() {
        let emr = InMemoryEmr::default();
        patient(&emr, "Ada", "Lovelace", "1");
        patient(&emr, "ada", "LOVELACE", "2");
        patient(&emr, "Grace", "Hopper", "3");

        let dups = emr
            .find_duplicate_patients(&["givenName".into(), "familyName".into()])
            .expect("search works");
        assert_eq!(dups.len(), 2);

        let bad = emr.find_duplicate_patients(&["shoeSize".into(), "gender".into()]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_encounter_owns_obs_and_orders() {
        let emr = InMemoryEmr::default();
        let p = patient(&emr, "Ada", "Lovelace", "1");
        let weight = concept(&emr, "Weight");
        let visit = emr
            .save_metadata(Metadata::new(MetadataKind::EncounterType, "Visit"))
            .expect("metadata saves");

        let encounter = emr
            .save_encounter(Encounter {
                patient: Some(p.uuid().clone()),
                encounter_type: Some(visit.uuid.clone()),
                obs: vec![Obs {
                    concept: Some(weight.uuid.clone()),
                    value: ObsValue::Numeric(70.0),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .expect("encounter saves");

        assert_eq!(encounter.obs.len(), 1);
        assert_eq!(encounter.obs[0].person.as_ref(), Some(p.uuid()));
        let by_person = emr
            .get_obs_by_person(p.uuid().as_str())
            .expect("obs lookup");
        assert_eq!(by_person.len(), 1);

        emr.purge_encounter(encounter.uuid.as_str())
            .expect("purge works");
        assert!(emr
            .get_obs_by_person(p.uuid().as_str())
            .expect("obs lookup")
            .is_empty());
    }

    #[test]
    fn test_visit_lists_linked_encounters() {
        let emr = InMemoryEmr::default();
        let ada = patient(&emr, "Ada", "Lovelace", "1");
        let grace = patient(&emr, "Grace", "Hopper", "2");
        let encounter_type = emr
            .save_metadata(Metadata::new(MetadataKind::EncounterType, "Triage"))
            .expect("metadata saves");
        let visit_type = emr
            .save_metadata(Metadata::new(MetadataKind::VisitType, "Outpatient"))
            .expect("metadata saves");
        let encounter_for = |p: &Patient| {
            emr.save_encounter(Encounter {
                patient: Some(p.uuid().clone()),
                encounter_type: Some(encounter_type.uuid.clone()),
                ..Default::default()
            })
            .expect("encounter saves")
        };
        let triage = encounter_for(&ada);
        let other = encounter_for(&grace);

        let visit = emr
            .save_visit(Visit {
                patient: Some(ada.uuid().clone()),
                visit_type: Some(visit_type.uuid.clone()),
                encounters: vec![triage.uuid.clone()],
                ..Default::default()
            })
            .expect("visit saves");
        assert_eq!(visit.encounters, vec![triage.uuid.clone()]);
        assert_eq!(visit.audit.creator.as_deref(), Some("admin"));
        let linked = emr
            .get_encounter(triage.uuid.as_str())
            .expect("lookup")
            .expect("encounter exists");
        assert_eq!(linked.visit.as_ref(), Some(&visit.uuid));

        let mut mismatched = visit.clone();
        mismatched.encounters = vec![other.uuid.clone()];
        assert!(matches!(
            emr.save_visit(mismatched),
            Err(DomainError::Validation(_))
        ));

        let mut misfiled = other.clone();
        misfiled.visit = Some(visit.uuid.clone());
        assert!(matches!(
            emr.save_encounter(misfiled),
            Err(DomainError::Validation(_))
        ));

        assert!(matches!(
            emr.purge_visit(visit.uuid.as_str()),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn test_visit_query_filters() {
        let emr = InMemoryEmr::default();
        let ada = patient(&emr, "Ada", "Lovelace", "1");
        let visit_type = emr
            .save_metadata(Metadata::new(MetadataKind::VisitType, "Outpatient"))
            .expect("metadata saves");
        let start = Utc::now() - chrono::Duration::days(3);
        let visit_at = |days: i64, stopped: bool| {
            let start_datetime = start + chrono::Duration::days(days);
            emr.save_visit(Visit {
                patient: Some(ada.uuid().clone()),
                visit_type: Some(visit_type.uuid.clone()),
                start_datetime,
                stop_datetime: stopped.then(|| start_datetime + chrono::Duration::hours(1)),
                ..Default::default()
            })
            .expect("visit saves")
        };
        let first = visit_at(0, true);
        let second = visit_at(2, false);

        let all = emr.get_all_visits(false).expect("lookup");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].uuid, first.uuid, "oldest start first");

        let active = emr
            .get_visits(&VisitQuery {
                patient: Some(ada.uuid().to_string()),
                ..Default::default()
            })
            .expect("lookup");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].uuid, second.uuid);

        let recent = emr
            .get_visits(&VisitQuery {
                from_start: Some(start + chrono::Duration::days(1)),
                include_inactive: true,
                ..Default::default()
            })
            .expect("lookup");
        assert_eq!(recent.len(), 1);

        let mut backwards = second.clone();
        backwards.stop_datetime = Some(backwards.start_datetime - chrono::Duration::hours(1));
        assert!(matches!(
            emr.save_visit(backwards),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_patient_allergies_are_validated_and_stamped() {
        let emr = InMemoryEmr::new("tester");
        let mut ada = patient(&emr, "Ada", "Lovelace", "1");
        let penicillin = crate::Allergen {
            non_coded_allergen: Some("Penicillin".into()),
            ..Default::default()
        };
        ada.allergies.push(Allergy {
            allergen: penicillin.clone(),
            ..Default::default()
        });
        let saved = emr.save_patient(ada).expect("allergy saves");
        assert_eq!(saved.allergies[0].audit.creator.as_deref(), Some("tester"));
        assert_eq!(saved.allergies[0].patient.as_ref(), Some(saved.uuid()));

        let mut twice = saved.clone();
        twice.allergies.push(Allergy {
            allergen: penicillin,
            ..Default::default()
        });
        assert!(matches!(
            emr.save_patient(twice),
            Err(DomainError::Validation(_))
        ));

        let mut empty = saved.clone();
        empty.allergies.push(Allergy::default());
        assert!(matches!(
            emr.save_patient(empty),
            Err(DomainError::Validation(_))
        ));

        let fetched = emr
            .get_patient(saved.uuid().as_str())
            .expect("lookup")
            .expect("patient exists");
        assert_eq!(fetched.allergies.len(), 1);
    }

    #[test]
    fn test_obs_group_members_are_assembled() {
        let emr = InMemoryEmr::default();
        let p = patient(&emr, "Ada", "Lovelace", "1");
        let vitals = concept(&emr, "Vitals");
        let pulse = concept(&emr, "Pulse");

        let group = emr
            .save_obs(Obs {
                person: Some(p.uuid().clone()),
                concept: Some(vitals.uuid.clone()),
                group_members: vec![Obs {
                    concept: Some(pulse.uuid.clone()),
                    value: ObsValue::Numeric(72.0),
                    ..Default::default()
                }],
                ..Default::default()
            })
            .expect("group saves");

        let fetched = emr
            .get_obs(group.uuid.as_str())
            .expect("lookup")
            .expect("group exists");
        assert_eq!(fetched.group_members.len(), 1);
        assert_eq!(fetched.group_members[0].obs_group.as_ref(), Some(&group.uuid));
    }

    #[test]
    fn test_concept_in_use_cannot_be_purged() {
        let emr = InMemoryEmr::default();
        let answer = concept(&emr, "Yes");
        let mut question = concept(&emr, "Question");
        question.answers.push(answer.uuid.clone());
        emr.save_concept(question).expect("resave");

        let result = emr.purge_concept(answer.uuid.as_str());
        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn test_locations_by_unknown_tag_is_none() {
        let emr = InMemoryEmr::default();
        emr.save_location(Location {
            name: "Ward A".into(),
            tags: vec!["Login Location".into()],
            ..Default::default()
        })
        .expect("location saves");

        assert_eq!(
            emr.get_locations_by_tag("login location")
                .expect("lookup")
                .map(|l| l.len()),
            Some(1)
        );
        assert!(emr.get_locations_by_tag("Pharmacy").expect("lookup").is_none());
    }

    #[test]
    fn test_module_id_from_url() {
        assert_eq!(
            module_id_from_url("https://modules.example.org/reporting-0.9.2.omod"),
            Some(("reporting".into(), "0.9.2".into()))
        );
        assert_eq!(
            module_id_from_url("http://host/download/htmlformentry.omod?token=1"),
            Some(("htmlformentry".into(), String::new()))
        );
    }

    #[test]
    fn test_install_start_stop_unload_module() {
        let emr = InMemoryEmr::default();
        let installed = emr
            .install_module("http://host/idgen-4.1.omod")
            .expect("install works");
        assert!(installed.started);

        assert!(!emr.stop_module("idgen").expect("stop works").started);
        assert!(emr.start_module("idgen").expect("start works").started);
        emr.unload_module("idgen").expect("unload works");
        assert!(emr.get_module("idgen").expect("lookup").is_none());
        assert!(matches!(
            emr.stop_module("idgen"),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn test_global_property_keeps_uuid_on_resave() {
        let emr = InMemoryEmr::default();
        let first = emr
            .save_global_property(GlobalProperty::new("locale.allowed", Some("en".into())))
            .expect("saves");
        let second = emr
            .save_global_property(GlobalProperty::new("locale.allowed", Some("en,fr".into())))
            .expect("resaves");

        assert_eq!(first.uuid, second.uuid);
        assert_eq!(
            emr.get_global_properties_by_prefix("LOCALE")
                .expect("prefix search")
                .len(),
            1
        );
    }
}
