//! The closed set of delegate types the REST layer can render.
//!
//! Property getters hand nested delegates back to the engine wrapped in [`Delegate`]; the
//! registry then finds the converter for the delegate's tag and renders it.

use crate::resources::moduleaction::ModuleAction;
use emr_domain::{
    Allergy, Concept, ConceptDatatype, ConceptDescription, ConceptMap, ConceptName, Drug,
    Encounter, GlobalProperty, Location, Metadata, MetadataKind, Module, Obs, Order, Patient,
    PatientIdentifier, Person, PersonAddress, PersonAttribute, PersonName, Visit,
};

#[derive(Clone, Debug)]
pub enum Delegate {
    Person(Person),
    PersonName(PersonName),
    PersonAddress(PersonAddress),
    PersonAttribute(PersonAttribute),
    Patient(Patient),
    PatientIdentifier(PatientIdentifier),
    Allergy(Allergy),
    Concept(Concept),
    ConceptName(ConceptName),
    ConceptDescription(ConceptDescription),
    ConceptMap(ConceptMap),
    ConceptDatatype(ConceptDatatype),
    Drug(Drug),
    Metadata(Metadata),
    Location(Location),
    Visit(Visit),
    Encounter(Encounter),
    Obs(Obs),
    Order(Order),
    SystemSetting(GlobalProperty),
    Module(Module),
    ModuleAction(ModuleAction),
}

impl Delegate {
    /// Name of the converter that renders this delegate.
    pub fn tag(&self) -> &'static str {
        match self {
            Delegate::Person(_) => "person",
            Delegate::PersonName(_) => "personname",
            Delegate::PersonAddress(_) => "personaddress",
            Delegate::PersonAttribute(_) => "personattribute",
            Delegate::Patient(_) => "patient",
            Delegate::PatientIdentifier(_) => "patientidentifier",
            Delegate::Allergy(_) => "allergy",
            Delegate::Concept(_) => "concept",
            Delegate::ConceptName(_) => "conceptname",
            Delegate::ConceptDescription(_) => "conceptdescription",
            Delegate::ConceptMap(_) => "conceptmap",
            Delegate::ConceptDatatype(_) => "conceptdatatype",
            Delegate::Drug(_) => "drug",
            Delegate::Metadata(m) => metadata_tag(m.kind),
            Delegate::Location(_) => "location",
            Delegate::Visit(_) => "visit",
            Delegate::Encounter(_) => "encounter",
            Delegate::Obs(_) => "obs",
            Delegate::Order(_) => "order",
            Delegate::SystemSetting(_) => "systemsetting",
            Delegate::Module(_) => "module",
            Delegate::ModuleAction(_) => "moduleaction",
        }
    }
}

/// Resource name serving one kind of metadata.
pub fn metadata_tag(kind: MetadataKind) -> &'static str {
    match kind {
        MetadataKind::ConceptClass => "conceptclass",
        MetadataKind::EncounterType => "encountertype",
        MetadataKind::PatientIdentifierType => "patientidentifiertype",
        MetadataKind::PersonAttributeType => "personattributetype",
        MetadataKind::OrderType => "ordertype",
        MetadataKind::VisitType => "visittype",
    }
}

/// Conversion between a concrete delegate type and [`Delegate`].
pub trait DelegateType: Clone + Send + Sync + 'static {
    fn into_delegate(self) -> Delegate;
    fn from_delegate(delegate: &Delegate) -> Option<&Self>;
}

macro_rules! delegate_type {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(impl DelegateType for $ty {
            fn into_delegate(self) -> Delegate {
                Delegate::$variant(self)
            }

            fn from_delegate(delegate: &Delegate) -> Option<&Self> {
                match delegate {
                    Delegate::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        })*
    };
}

delegate_type! {
    Person => Person,
    PersonName => PersonName,
    PersonAddress => PersonAddress,
    PersonAttribute => PersonAttribute,
    Patient => Patient,
    PatientIdentifier => PatientIdentifier,
    Allergy => Allergy,
    Concept => Concept,
    ConceptName => ConceptName,
    ConceptDescription => ConceptDescription,
    ConceptMap => ConceptMap,
    ConceptDatatype => ConceptDatatype,
    Drug => Drug,
    Metadata => Metadata,
    Location => Location,
    Visit => Visit,
    Encounter => Encounter,
    Obs => Obs,
    Order => Order,
    SystemSetting => GlobalProperty,
    Module => Module,
    ModuleAction => ModuleAction,
}
