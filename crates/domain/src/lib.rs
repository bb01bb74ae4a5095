//! # EMR Domain
//!
//! The delegate entities and domain services that the REST layer decorates.
//!
//! This crate contains:
//! - Entity structs (patients, people, concepts, visits, encounters, observations, orders,
//!   allergies, metadata)
//! - The service traits each resource delegates persistence to
//! - [`Services`], the explicit container handed to every request instead of a global locator
//! - [`InMemoryEmr`], a reference implementation of every service over one guarded store
//! - [`Seed`], YAML seed loading for the in-memory store
//!
//! **No API concerns**: representations, HTTP routing and error envelopes live in `emr-core` and
//! `api-rest`.

pub mod admin;
pub mod audit;
pub mod clinical;
pub mod concept;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod person;
pub mod seed;
pub mod service;

pub use admin::{GlobalProperty, Module};
pub use audit::{AuditInfo, RetireInfo, Retireable, VoidInfo, Voidable};
pub use clinical::{
    Allergen, AllergenType, Allergy, AllergyReaction, DrugOrderDetail, Encounter, Obs, ObsValue,
    Order, OrderDetail, Visit,
};
pub use concept::{
    Concept, ConceptDatatype, ConceptDescription, ConceptMap, ConceptName, ConceptNumeric,
    DatatypeKind, Drug,
};
pub use emr_uuid::EntityUuid;
pub use error::{DomainError, DomainResult};
pub use memory::InMemoryEmr;
pub use metadata::{Location, Metadata, MetadataKind};
pub use person::{
    Patient, PatientIdentifier, Person, PersonAddress, PersonAttribute, PersonName,
};
pub use seed::Seed;
pub use service::{
    AdministrationService, ConceptService, EncounterService, LocationService, MetadataService,
    ModuleService, ObsService, OrderService, PatientService, PersonService, Services,
    VisitQuery, VisitService,
};
