//! `encounter`: the aggregate root of the observations and orders recorded at one sitting.
//! An encounter may belong to a `visit`.

use super::obs::obs_from_payload;
use super::{linked, location_id, metadata_id, metadata_name, patient_id, person_id, resolve};
use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::constants::PARAM_PATIENT;
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{CrudHandler, Lifecycle, Representable};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use emr_domain::{AuditInfo, Encounter, MetadataKind, Obs};
use serde_json::{Map, Value};

pub struct EncounterResource {
    accessors: PropertyAccessors<Encounter>,
}

impl Default for EncounterResource {
    fn default() -> Self {
        Self::new()
    }
}

impl EncounterResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Encounter>::new()
            .get("display", |e, ctx| {
                let kind = metadata_name(MetadataKind::EncounterType, e.encounter_type.as_ref(), ctx)?;
                Ok(format!("{kind} {}", e.encounter_datetime.format("%d/%m/%Y")).into())
            })
            .property(
                "encounterDatetime",
                |e, _| Ok(PropertyValue::datetime(Some(e.encounter_datetime))),
                |e, v, _| {
                    e.encounter_datetime = convert::optional_datetime("encounterDatetime", v)?
                        .ok_or_else(|| {
                            RestError::conversion("encounterDatetime", "encounterDatetime cannot be null")
                        })?;
                    Ok(())
                },
            )
            .property(
                "patient",
                |e, ctx| linked(e.patient.as_ref(), |id| ctx.services().patients.get_patient(id)),
                |e, v, ctx| {
                    e.patient = patient_id("patient", v, ctx)?;
                    if e.patient.is_none() {
                        return Err(RestError::conversion("patient", "patient cannot be null"));
                    }
                    Ok(())
                },
            )
            .property(
                "location",
                |e, ctx| {
                    linked(e.location.as_ref(), |id| {
                        ctx.services().locations.get_location(id)
                    })
                },
                |e, v, ctx| {
                    e.location = location_id("location", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "encounterType",
                |e, ctx| {
                    linked(e.encounter_type.as_ref(), |id| {
                        ctx.services()
                            .metadata
                            .get_metadata(MetadataKind::EncounterType, id)
                    })
                },
                |e, v, ctx| {
                    e.encounter_type =
                        metadata_id(MetadataKind::EncounterType, "encounterType", v, ctx)?;
                    if e.encounter_type.is_none() {
                        return Err(RestError::conversion(
                            "encounterType",
                            "encounterType cannot be null",
                        ));
                    }
                    Ok(())
                },
            )
            .property(
                "provider",
                |e, ctx| linked(e.provider.as_ref(), |id| ctx.services().persons.get_person(id)),
                |e, v, ctx| {
                    e.provider = person_id("provider", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "visit",
                |e, ctx| linked(e.visit.as_ref(), |id| ctx.services().visits.get_visit(id)),
                |e, v, ctx| {
                    e.visit = resolve("visit", v, |id| ctx.services().visits.get_visit(id))?
                        .map(|visit| visit.uuid);
                    Ok(())
                },
            )
            .property(
                "obs",
                |e, _| Ok(PropertyValue::delegates(e.obs.clone())),
                add_obs,
            )
            .get("orders", |e, _| Ok(PropertyValue::delegates(e.orders.clone())));
        Self { accessors }
    }
}

/// Adds the posted observations. Entries naming an observation already on the encounter are
/// left as they are.
fn add_obs(encounter: &mut Encounter, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    for item in convert::array("obs", value)? {
        let existing = item
            .get("uuid")
            .and_then(Value::as_str)
            .is_some_and(|uuid| encounter.obs.iter().any(|o| o.uuid.as_str() == uuid));
        if existing {
            continue;
        }
        let template = Obs {
            person: encounter.patient.clone(),
            obs_datetime: encounter.encounter_datetime,
            encounter: Some(encounter.uuid.clone()),
            location: encounter.location.clone(),
            ..Default::default()
        };
        let obs = obs_from_payload(item, template, ctx)?;
        encounter.obs.push(obs);
    }
    Ok(())
}

impl Representable for EncounterResource {
    type Delegate = Encounter;

    fn name(&self) -> &'static str {
        "encounter"
    }

    fn accessors(&self) -> &PropertyAccessors<Encounter> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Encounter) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Encounter) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a Encounter) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Encounter>,
    ) -> Option<ResourceDescription> {
        let mut description = ResourceDescription::new();
        match rep {
            Representation::Default => {
                description
                    .add_property("uuid")
                    .add_property("display")
                    .add_property("encounterDatetime")
                    .add_property_as("patient", Representation::Ref)
                    .add_property_as("location", Representation::Ref)
                    .add_property_as("encounterType", Representation::Ref)
                    .add_property_as("provider", Representation::Ref)
                    .add_property_as("visit", Representation::Ref)
                    .add_property_as("obs", Representation::Ref)
                    .add_property_as("orders", Representation::Ref)
                    .add_property("voided")
                    .add_self_link()
                    .add_link("full", ".?v=full");
            }
            Representation::Full => {
                description
                    .add_property("uuid")
                    .add_property("display")
                    .add_property("encounterDatetime")
                    .add_property_as("patient", Representation::Ref)
                    .add_property("location")
                    .add_property("encounterType")
                    .add_property_as("provider", Representation::Ref)
                    .add_property_as("visit", Representation::Ref)
                    .add_property("obs")
                    .add_property("orders")
                    .add_property("voided")
                    .add_property("auditInfo")
                    .add_self_link();
            }
            _ => return None,
        }
        Some(description)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add("encounterDatetime")
            .add_required("patient")
            .add_required("encounterType")
            .add("location")
            .add("provider")
            .add("visit")
            .add("obs");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "encounterDatetime" => PropertyType::DateTime,
            "patient" => PropertyType::Ref("patient"),
            "location" => PropertyType::Ref("location"),
            "encounterType" => PropertyType::Ref("encountertype"),
            "provider" => PropertyType::Ref("person"),
            "visit" => PropertyType::Ref("visit"),
            "obs" => PropertyType::OwnedList("obs"),
            "orders" => PropertyType::RefList("order"),
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for EncounterResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Encounter>> {
        Ok(ctx.services().encounters.get_encounter(id)?)
    }

    fn new_delegate(
        &self,
        _body: &Map<String, Value>,
        _ctx: &RequestContext,
    ) -> RestResult<Encounter> {
        Ok(Encounter::default())
    }

    fn save(&self, delegate: Encounter, ctx: &RequestContext) -> RestResult<Encounter> {
        Ok(ctx.services().encounters.save_encounter(delegate)?)
    }

    fn delete_delegate(
        &self,
        mut delegate: Encounter,
        reason: &str,
        ctx: &RequestContext,
    ) -> RestResult<()> {
        if delegate.void.void(reason) {
            ctx.services().encounters.save_encounter(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(
        &self,
        mut delegate: Encounter,
        _ctx: &RequestContext,
    ) -> RestResult<Encounter> {
        delegate.void.unvoid();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Encounter>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(encounter) = delegate {
            ctx.services()
                .encounters
                .purge_encounter(encounter.uuid.as_str())?;
        }
        Ok(())
    }

    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Encounter>> {
        let services = ctx.services();
        if let Some(patient) = ctx.param(PARAM_PATIENT) {
            let Some(patient) = services.patients.get_patient(patient)? else {
                tracing::debug!("encounter search: no patient {patient}");
                return Ok(PageableResult::Empty);
            };
            return Ok(services
                .encounters
                .get_encounters_by_patient(patient.uuid().as_str())?
                .into());
        }
        let query = super::query_text(ctx);
        if query.is_empty() {
            return Ok(PageableResult::Empty);
        }
        Ok(services
            .encounters
            .search_encounters(&query, ctx.include_all())?
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::resources::testing::{
        Fixture, ENCOUNTER, ENCOUNTER_TYPE, OBS, ORDER, PATIENT, PERSON, WEIGHT, XANADU,
    };
    use serde_json::json;

    #[test]
    fn test_default_representation() {
        let fixture = Fixture::new();
        let encounter = EncounterResource::new()
            .retrieve(ENCOUNTER, &fixture.ctx(&[]))
            .expect("encounter exists");

        assert_eq!(encounter["display"], "ADULTINITIAL 01/08/2008");
        assert_eq!(encounter["encounterDatetime"], "2008-08-01T00:00:00.000+0000");
        assert_eq!(encounter["patient"]["uuid"], PATIENT);
        assert_eq!(encounter["patient"]["display"], "101-6 - Horatio Hornblower");
        assert_eq!(encounter["location"]["uuid"], XANADU);
        assert_eq!(encounter["encounterType"]["uuid"], ENCOUNTER_TYPE);
        assert_eq!(encounter["obs"][0]["uuid"], OBS);
        assert_eq!(encounter["obs"][0]["display"], "WEIGHT (KG): 70.0");
        assert_eq!(encounter["orders"], json!([]), "seeded order has no encounter");
        assert_eq!(encounter["resourceVersion"], "1.8");
    }

    #[test]
    fn test_create_with_inline_obs() {
        let fixture = Fixture::new();
        let resource = EncounterResource::new();
        let created = resource
            .create(
                &json!({
                    "patient": PATIENT,
                    "encounterType": "ADULTINITIAL",
                    "encounterDatetime": "2011-05-01T10:15:00.000+0000",
                    "location": XANADU,
                    "provider": PERSON,
                    "obs": [{ "concept": WEIGHT, "value": 72 }],
                }),
                &fixture.ctx(&[("v", "full")]),
            )
            .expect("encounter is created");

        assert_eq!(created["display"], "ADULTINITIAL 01/05/2011");
        assert_eq!(created["provider"]["uuid"], PERSON);
        let obs = created["obs"].as_array().expect("obs render");
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0]["value"], 72.0);
        assert_eq!(obs[0]["obsDatetime"], "2011-05-01T10:15:00.000+0000");
        assert_eq!(obs[0]["location"]["uuid"], XANADU);
        assert_eq!(created["auditInfo"]["creator"], "tester");
    }

    #[test]
    fn test_create_requires_type_and_patient() {
        let fixture = Fixture::new();
        let err = EncounterResource::new()
            .create(&json!({ "patient": PATIENT }), &fixture.ctx(&[]))
            .expect_err("encounterType is required");
        assert_eq!(
            err.to_string(),
            "Some required properties are missing: encounterType"
        );

        let err = EncounterResource::new()
            .create(
                &json!({ "patient": PERSON, "encounterType": ENCOUNTER_TYPE }),
                &fixture.ctx(&[]),
            )
            .expect_err("a person who is not a patient is rejected");
        assert_eq!(err.code(), "conversion");
    }

    #[test]
    fn test_search_by_patient() {
        let fixture = Fixture::new();
        let resource = EncounterResource::new();
        let found = resource
            .list(&fixture.ctx(&[("patient", PATIENT)]))
            .expect("patient search");
        assert_eq!(found.results.len(), 1);
        assert_eq!(found.results[0]["uuid"], ENCOUNTER);

        let unknown = resource
            .list(&fixture.ctx(&[("patient", ORDER)]))
            .expect("unknown patient is not an error");
        assert!(unknown.results.is_empty());

        let by_name = resource
            .list(&fixture.ctx(&[("q", "hornblower")]))
            .expect("query search");
        assert_eq!(by_name.results.len(), 1);
    }

    #[test]
    fn test_list_without_query_is_not_supported() {
        let fixture = Fixture::new();
        let err = EncounterResource::new()
            .list(&fixture.ctx(&[]))
            .expect_err("list all is not supported");
        assert_eq!(err.code(), "operation_not_supported");
    }

    #[test]
    fn test_void_and_purge() {
        let fixture = Fixture::new();
        let resource = EncounterResource::new();
        resource
            .delete(ENCOUNTER, &fixture.ctx(&[]))
            .expect("void succeeds");
        let voided = resource
            .retrieve(ENCOUNTER, &fixture.ctx(&[]))
            .expect("voided encounter still fetches");
        assert_eq!(voided["voided"], true);

        resource
            .delete(ENCOUNTER, &fixture.ctx(&[("purge", "")]))
            .expect("purge succeeds");
        let err = resource
            .retrieve(ENCOUNTER, &fixture.ctx(&[]))
            .expect_err("purged");
        assert_eq!(err.code(), "object_not_found");
        resource
            .delete(ENCOUNTER, &fixture.ctx(&[("purge", "true")]))
            .expect("purging twice is fine");
    }
}
