//! Every shipped resource, sub-resource and converter, plus the lookup helpers they share.

/// Registers getter/setter pairs for optional free-text fields.
macro_rules! optional_text {
    ($accessors:expr, $($name:literal => $field:ident),+ $(,)?) => {
        $accessors$(.property(
            $name,
            |d, _| Ok(d.$field.clone().into()),
            |d, v, _| {
                d.$field = $crate::convert::optional_string($name, v)?;
                Ok(())
            },
        ))+
    };
}

pub mod concept;
pub mod conceptdatatype;
pub mod drug;
pub mod encounter;
pub mod location;
pub mod metadata;
pub mod module;
pub mod moduleaction;
pub mod obs;
pub mod order;
pub mod patient;
pub mod person;
pub mod systemsetting;
pub mod visit;

use crate::accessors::PropertyValue;
use crate::context::RequestContext;
use crate::convert;
use crate::delegate::DelegateType;
use crate::registry::ResourceRegistry;
use crate::{RestError, RestResult};
use emr_domain::{DomainResult, EntityUuid, MetadataKind};
use serde_json::Value;

/// Registers every shipped resource with `registry`.
pub(crate) fn register_all(registry: &mut ResourceRegistry) {
    registry
        .register(person::PersonResource::new())
        .register_sub_resource(person::PersonNameResource::new())
        .register_sub_resource(person::PersonAddressResource::new())
        .register_sub_resource(person::PersonAttributeResource::new())
        .register(patient::PatientResource::new())
        .register_sub_resource(patient::PatientIdentifierResource::new())
        .register_sub_resource(patient::AllergyResource::new())
        .register(concept::ConceptResource::new())
        .register_sub_resource(concept::ConceptNameResource::new())
        .register_sub_resource(concept::ConceptMapResource::new())
        .register_converter(concept::ConceptDescriptionConverter::new())
        .register(conceptdatatype::ConceptDatatypeResource::new())
        .register(drug::DrugResource::new())
        .register(location::LocationResource::new())
        .register(visit::VisitResource::new())
        .register(encounter::EncounterResource::new())
        .register(obs::ObsResource::new())
        .register(order::OrderResource::new())
        .register(systemsetting::SystemSettingResource::new())
        .register(module::ModuleResource::new())
        .register(moduleaction::ModuleActionResource::new());

    for kind in MetadataKind::ALL {
        registry.register(metadata::MetadataResource::new(kind));
    }
}

// ===== SHARED HELPERS =====

/// Renders a linked entity: the id is resolved through `fetch`, a dangling id renders as `null`.
pub(crate) fn linked<T, F>(id: Option<&EntityUuid>, fetch: F) -> RestResult<PropertyValue>
where
    T: DelegateType,
    F: FnOnce(&str) -> DomainResult<Option<T>>,
{
    match id {
        Some(id) => Ok(PropertyValue::optional_delegate(fetch(id.as_str())?)),
        None => Ok(PropertyValue::Null),
    }
}

/// Resolves a posted reference (a uuid string or an object carrying `uuid`) to an entity.
///
/// `null` clears the reference.
///
/// # Errors
///
/// Returns [`RestError::Conversion`] if the value is not a reference or names nothing.
pub(crate) fn resolve<T, F>(property: &str, value: &Value, fetch: F) -> RestResult<Option<T>>
where
    F: FnOnce(&str) -> DomainResult<Option<T>>,
{
    let Some(id) = convert::reference_id(property, value)? else {
        return Ok(None);
    };
    fetch(&id)?
        .map(Some)
        .ok_or_else(|| RestError::conversion(property, format!("{property} {id} does not exist")))
}

/// Like [`resolve`], but a posted `null` is rejected.
pub(crate) fn resolve_required<T, F>(property: &str, value: &Value, fetch: F) -> RestResult<T>
where
    F: FnOnce(&str) -> DomainResult<Option<T>>,
{
    resolve(property, value, fetch)?
        .ok_or_else(|| RestError::conversion(property, format!("{property} cannot be null")))
}

/// Id of a metadata item of `kind`, failing if the posted reference names nothing.
pub(crate) fn metadata_id(
    kind: MetadataKind,
    property: &str,
    value: &Value,
    ctx: &RequestContext,
) -> RestResult<Option<EntityUuid>> {
    let metadata = &ctx.services().metadata;
    Ok(resolve(property, value, |id| {
        match metadata.get_metadata(kind, id)? {
            Some(found) => Ok(Some(found)),
            None => metadata.get_metadata_by_name(kind, id),
        }
    })?
    .map(|m| m.uuid))
}

pub(crate) fn concept_id(
    property: &str,
    value: &Value,
    ctx: &RequestContext,
) -> RestResult<Option<EntityUuid>> {
    Ok(resolve(property, value, |id| ctx.services().concepts.get_concept(id))?.map(|c| c.uuid))
}

pub(crate) fn location_id(
    property: &str,
    value: &Value,
    ctx: &RequestContext,
) -> RestResult<Option<EntityUuid>> {
    Ok(resolve(property, value, |id| ctx.services().locations.get_location(id))?.map(|l| l.uuid))
}

pub(crate) fn patient_id(
    property: &str,
    value: &Value,
    ctx: &RequestContext,
) -> RestResult<Option<EntityUuid>> {
    Ok(resolve(property, value, |id| ctx.services().patients.get_patient(id))?
        .map(|p| p.person.uuid))
}

pub(crate) fn person_id(
    property: &str,
    value: &Value,
    ctx: &RequestContext,
) -> RestResult<Option<EntityUuid>> {
    Ok(resolve(property, value, |id| ctx.services().persons.get_person(id))?.map(|p| p.uuid))
}

/// Name of a metadata item, or an empty string if it cannot be found.
pub(crate) fn metadata_name(
    kind: MetadataKind,
    id: Option<&EntityUuid>,
    ctx: &RequestContext,
) -> RestResult<String> {
    let Some(id) = id else {
        return Ok(String::new());
    };
    Ok(ctx
        .services()
        .metadata
        .get_metadata(kind, id.as_str())?
        .map(|m| m.name)
        .unwrap_or_default())
}

/// URI of a child addressed through its parent.
pub(crate) fn child_uri(
    ctx: &RequestContext,
    parent: &str,
    parent_id: Option<&EntityUuid>,
    path: &str,
    id: &EntityUuid,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        ctx.config().rest_root(),
        parent,
        parent_id.map(EntityUuid::as_str).unwrap_or_default(),
        path,
        id
    )
}

/// Keeps `preferred` on the child with `id` only, if it is preferred.
pub(crate) fn keep_single_preferred<T>(
    items: &mut [T],
    id: &str,
    uuid: impl Fn(&T) -> &EntityUuid,
    preferred: impl Fn(&mut T) -> &mut bool,
) {
    let chosen = items
        .iter_mut()
        .find(|item| uuid(item).as_str() == id)
        .map(|item| *preferred(item))
        .unwrap_or(false);
    if !chosen {
        return;
    }
    for item in items.iter_mut() {
        if uuid(item).as_str() != id {
            *preferred(item) = false;
        }
    }
}

/// Parses a posted `includeAll`-style search into the query text, if any.
pub(crate) fn query_text(ctx: &RequestContext) -> String {
    ctx.param(crate::constants::PARAM_QUERY)
        .unwrap_or_default()
        .to_owned()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by resource tests.

    use crate::config::RestConfig;
    use crate::context::{RequestContext, RequestParams};
    use crate::registry::ResourceRegistry;
    use emr_domain::{InMemoryEmr, Seed, Services};
    use std::sync::Arc;

    pub const SEED: &str = r#"
actor: tester
metadata:
  - uuid: 8d490dfc-c2cc-11de-8d13-0010c6dffd0f
    kind: concept_class
    name: Test
  - uuid: 8d4907b2-c2cc-11de-8d13-0010c6dffd0f
    kind: concept_class
    name: ConvSet
  - uuid: 61ae96f4-6afe-4351-b6f8-cd4fc383cce1
    kind: encounter_type
    name: ADULTINITIAL
  - uuid: 2f470aa8-1d73-43b7-81b5-01f0c0dfa53c
    kind: patient_identifier_type
    name: OpenMRS ID
  - uuid: 54fc8400-1683-4d71-a1ac-98d40836ff7c
    kind: person_attribute_type
    name: Birthplace
  - uuid: 131168f4-15f5-102d-96e4-000c29c2a5d7
    kind: order_type
    name: Drug Order
  - uuid: 7b0f5697-27e3-40c4-8bae-f4049abfb4ed
    kind: visit_type
    name: Outpatient
concepts:
  - uuid: 5089AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA
    datatype: 8d4a4488-c2cc-11de-8d13-0010c6dffd0f
    concept_class: 8d490dfc-c2cc-11de-8d13-0010c6dffd0f
    names:
      - uuid: 5089bbbb-c2cc-11de-8d13-0010c6dffd0f
        name: WEIGHT (KG)
        locale: en
        locale_preferred: true
        concept_name_type: FULLY_SPECIFIED
    numeric:
      units: kg
  - uuid: 0cbe2ed3-cd5f-4f46-9459-26127c9265ab
    datatype: 8d4a48b6-c2cc-11de-8d13-0010c6dffd0f
    concept_class: 8d490dfc-c2cc-11de-8d13-0010c6dffd0f
    names:
      - name: FAVORITE FOOD
        locale: en
        concept_name_type: FULLY_SPECIFIED
    answers:
      - b055abd8-a420-4a11-8b98-02ee170a7b54
  - uuid: b055abd8-a420-4a11-8b98-02ee170a7b54
    datatype: 8d4a4c94-c2cc-11de-8d13-0010c6dffd0f
    concept_class: 8d490dfc-c2cc-11de-8d13-0010c6dffd0f
    names:
      - name: RICE
        locale: en
        concept_name_type: FULLY_SPECIFIED
  - uuid: 89ca642a-dab6-4f20-b712-e12ca4fc6d36
    datatype: 8d4a5cca-c2cc-11de-8d13-0010c6dffd0f
    concept_class: 8d490dfc-c2cc-11de-8d13-0010c6dffd0f
    names:
      - name: FEVER PRESENT
        locale: en
        concept_name_type: FULLY_SPECIFIED
  - uuid: 0f97e14e-cdc2-49ac-9255-b5126f8a5147
    datatype: 8d4a4c94-c2cc-11de-8d13-0010c6dffd0f
    concept_class: 8d4907b2-c2cc-11de-8d13-0010c6dffd0f
    set: true
    names:
      - name: VITALS
        locale: en
        concept_name_type: FULLY_SPECIFIED
    set_members:
      - 5089AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA
      - 89ca642a-dab6-4f20-b712-e12ca4fc6d36
  - uuid: 3cd6f600-26fe-102b-80cb-0017a47871b2
    datatype: 8d4a4c94-c2cc-11de-8d13-0010c6dffd0f
    concept_class: 8d490dfc-c2cc-11de-8d13-0010c6dffd0f
    names:
      - name: TRUE
        locale: en
        concept_name_type: FULLY_SPECIFIED
  - uuid: 3cd6f86c-26fe-102b-80cb-0017a47871b2
    datatype: 8d4a4c94-c2cc-11de-8d13-0010c6dffd0f
    concept_class: 8d490dfc-c2cc-11de-8d13-0010c6dffd0f
    names:
      - name: FALSE
        locale: en
        concept_name_type: FULLY_SPECIFIED
drugs:
  - uuid: 3cfcf118-931c-46f7-8ff6-7b876f0d4202
    name: Aspirin
    concept: b055abd8-a420-4a11-8b98-02ee170a7b54
locations:
  - uuid: 9356400c-a5a2-4532-8f2b-2361b3446eb8
    name: Xanadu
    tags: [Login Location]
  - uuid: dc5c1fcc-0459-4201-bf70-0b90535ba362
    name: Unknown Location
persons:
  - uuid: ba1b19c2-3ed6-4f63-b8c0-f762dc8d7562
    gender: F
    birthdate: 1975-04-08
    names:
      - uuid: 399e3a7b-6482-487d-94ce-c07bb3ca3cc7
        given_name: Collet
        family_name: Chebaskwony
        preferred: true
patients:
  - person:
      uuid: da7f524f-27ce-4bb2-86d6-6d1d05312bd5
      gender: M
      birthdate: 1976-08-25
      names:
        - uuid: 13a1234c-4a36-4b9f-9c1d-5b1c7e4c6d3e
          given_name: Horatio
          family_name: Hornblower
          preferred: true
    identifiers:
      - uuid: 1f22bd18-9e3e-4d87-9b7b-4b6c4e6f0c11
        identifier: 101-6
        identifier_type: 2f470aa8-1d73-43b7-81b5-01f0c0dfa53c
        location: 9356400c-a5a2-4532-8f2b-2361b3446eb8
        preferred: true
    allergies:
      - uuid: 22b6c0a0-0d2e-4a5f-9a3c-64a3f1f0a7d1
        allergen:
          allergen_type: FOOD
          coded_allergen: b055abd8-a420-4a11-8b98-02ee170a7b54
        comment: Hives after meals
        reactions:
          - reaction_non_coded: Hives
visits:
  - uuid: 1e5d5d48-6b78-11e0-93c3-18a905e044dc
    patient: da7f524f-27ce-4bb2-86d6-6d1d05312bd5
    visit_type: 7b0f5697-27e3-40c4-8bae-f4049abfb4ed
    location: 9356400c-a5a2-4532-8f2b-2361b3446eb8
    start_datetime: 2008-08-01T09:00:00Z
encounters:
  - uuid: 6519d653-393b-4118-9c83-a3715b82d4ac
    encounter_datetime: 2008-08-01T00:00:00Z
    patient: da7f524f-27ce-4bb2-86d6-6d1d05312bd5
    encounter_type: 61ae96f4-6afe-4351-b6f8-cd4fc383cce1
    location: 9356400c-a5a2-4532-8f2b-2361b3446eb8
    visit: 1e5d5d48-6b78-11e0-93c3-18a905e044dc
obs:
  - uuid: 39fb7f47-e80a-4056-9285-bd798be13c63
    person: da7f524f-27ce-4bb2-86d6-6d1d05312bd5
    concept: 5089AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA
    encounter: 6519d653-393b-4118-9c83-a3715b82d4ac
    obs_datetime: 2008-08-01T00:00:00Z
    value:
      type: numeric
      value: 70.0
orders:
  - uuid: 921de0a3-05c4-444a-be03-e01b4c4b9142
    patient: da7f524f-27ce-4bb2-86d6-6d1d05312bd5
    order_type: 131168f4-15f5-102d-96e4-000c29c2a5d7
    concept: b055abd8-a420-4a11-8b98-02ee170a7b54
    instructions: Take with food
    detail:
      kind: drug
      drug: 3cfcf118-931c-46f7-8ff6-7b876f0d4202
      dose: 325.0
      units: mg
      frequency: daily
global_properties:
  - uuid: 1f1bb3e4-7c6a-4a4c-9a1b-6a0f1c2b3d4e
    property: concept.true
    value: 3cd6f600-26fe-102b-80cb-0017a47871b2
  - uuid: 2a2cc4f5-8d7b-4b5d-8b2c-7b1f2d3c4e5f
    property: concept.false
    value: 3cd6f86c-26fe-102b-80cb-0017a47871b2
  - uuid: 3b3dd506-9e8c-4c6e-9c3d-8c2f3e4d5f60
    property: order.nextOrderNumberSeed
    value: "1"
modules:
  - module_id: reporting
    name: Reporting
    version: 0.9.2
    started: true
"#;

    pub const PATIENT: &str = "da7f524f-27ce-4bb2-86d6-6d1d05312bd5";
    pub const PERSON: &str = "ba1b19c2-3ed6-4f63-b8c0-f762dc8d7562";
    pub const WEIGHT: &str = "5089AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    pub const FAVORITE_FOOD: &str = "0cbe2ed3-cd5f-4f46-9459-26127c9265ab";
    pub const RICE: &str = "b055abd8-a420-4a11-8b98-02ee170a7b54";
    pub const FEVER: &str = "89ca642a-dab6-4f20-b712-e12ca4fc6d36";
    pub const VITALS: &str = "0f97e14e-cdc2-49ac-9255-b5126f8a5147";
    pub const TRUE_CONCEPT: &str = "3cd6f600-26fe-102b-80cb-0017a47871b2";
    pub const ASPIRIN: &str = "3cfcf118-931c-46f7-8ff6-7b876f0d4202";
    pub const XANADU: &str = "9356400c-a5a2-4532-8f2b-2361b3446eb8";
    pub const ENCOUNTER: &str = "6519d653-393b-4118-9c83-a3715b82d4ac";
    pub const VISIT: &str = "1e5d5d48-6b78-11e0-93c3-18a905e044dc";
    pub const VISIT_TYPE: &str = "7b0f5697-27e3-40c4-8bae-f4049abfb4ed";
    pub const ALLERGY: &str = "22b6c0a0-0d2e-4a5f-9a3c-64a3f1f0a7d1";
    pub const ENCOUNTER_TYPE: &str = "61ae96f4-6afe-4351-b6f8-cd4fc383cce1";
    pub const OBS: &str = "39fb7f47-e80a-4056-9285-bd798be13c63";
    pub const ORDER: &str = "921de0a3-05c4-444a-be03-e01b4c4b9142";
    pub const ORDER_TYPE: &str = "131168f4-15f5-102d-96e4-000c29c2a5d7";
    pub const IDENTIFIER_TYPE: &str = "2f470aa8-1d73-43b7-81b5-01f0c0dfa53c";
    pub const ATTRIBUTE_TYPE: &str = "54fc8400-1683-4d71-a1ac-98d40836ff7c";
    pub const TEST_CLASS: &str = "8d490dfc-c2cc-11de-8d13-0010c6dffd0f";
    pub const NUMERIC: &str = "8d4a4488-c2cc-11de-8d13-0010c6dffd0f";

    /// A seeded store and the registry, shared by every context built from them.
    pub struct Fixture {
        pub services: Services,
        pub registry: Arc<ResourceRegistry>,
        pub config: Arc<RestConfig>,
    }

    impl Fixture {
        pub fn new() -> Self {
            let seed = Seed::from_yaml_str(SEED).expect("test seed should parse");
            let store = InMemoryEmr::from_seed(seed).expect("test seed should load");
            Self {
                services: Services::from_provider(Arc::new(store)),
                registry: Arc::new(ResourceRegistry::standard()),
                config: Arc::new(RestConfig::default()),
            }
        }

        /// A request context with the given query parameters.
        pub fn ctx(&self, params: &[(&str, &str)]) -> RequestContext {
            let params = RequestParams::from_pairs(params.iter().copied())
                .expect("test parameters should parse");
            RequestContext::new(
                self.services.clone(),
                self.registry.clone(),
                self.config.clone(),
                params,
            )
        }
    }
}
