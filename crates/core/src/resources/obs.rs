//! `obs`: observations, whose `value` is read and written according to the concept's datatype.

use super::{concept_id, linked, location_id, person_id};
use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::constants::{PARAM_ENCOUNTER, PARAM_PATIENT};
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{set_converted_properties, CrudHandler, Lifecycle, Representable};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use base64::Engine;
use emr_domain::{AuditInfo, Concept, DatatypeKind, Obs, ObsValue};
use serde_json::{json, Map, Value};

pub struct ObsResource {
    accessors: PropertyAccessors<Obs>,
}

impl Default for ObsResource {
    fn default() -> Self {
        Self::new()
    }
}

impl ObsResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Obs>::new()
            .get("display", |o, ctx| Ok(display(o, ctx)?.into()))
            .property(
                "concept",
                |o, ctx| linked(o.concept.as_ref(), |id| ctx.services().concepts.get_concept(id)),
                |o, v, ctx| {
                    o.concept = concept_id("concept", v, ctx)?;
                    if o.concept.is_none() {
                        return Err(RestError::conversion("concept", "concept cannot be null"));
                    }
                    Ok(())
                },
            )
            .property(
                "person",
                |o, ctx| linked(o.person.as_ref(), |id| ctx.services().persons.get_person(id)),
                |o, v, ctx| {
                    o.person = person_id("person", v, ctx)?;
                    if o.person.is_none() {
                        return Err(RestError::conversion("person", "person cannot be null"));
                    }
                    Ok(())
                },
            )
            .property(
                "obsDatetime",
                |o, _| Ok(PropertyValue::datetime(Some(o.obs_datetime))),
                |o, v, _| {
                    o.obs_datetime = convert::optional_datetime("obsDatetime", v)?.ok_or_else(|| {
                        RestError::conversion("obsDatetime", "obsDatetime cannot be null")
                    })?;
                    Ok(())
                },
            )
            .get("obsGroup", |o, ctx| {
                linked(o.obs_group.as_ref(), |id| ctx.services().obs.get_obs(id))
            })
            .property(
                "groupMembers",
                |o, _| {
                    if o.group_members.is_empty() {
                        return Ok(PropertyValue::Null);
                    }
                    Ok(PropertyValue::delegates(o.group_members.clone()))
                },
                set_group_members,
            )
            .property(
                "location",
                |o, ctx| {
                    linked(o.location.as_ref(), |id| {
                        ctx.services().locations.get_location(id)
                    })
                },
                |o, v, ctx| {
                    o.location = location_id("location", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "order",
                |o, ctx| linked(o.order.as_ref(), |id| ctx.services().orders.get_order(id)),
                |o, v, ctx| {
                    o.order = super::resolve("order", v, |id| ctx.services().orders.get_order(id))?
                        .map(|order| order.uuid);
                    Ok(())
                },
            )
            .property(
                "encounter",
                |o, ctx| {
                    linked(o.encounter.as_ref(), |id| {
                        ctx.services().encounters.get_encounter(id)
                    })
                },
                |o, v, ctx| {
                    o.encounter = super::resolve("encounter", v, |id| {
                        ctx.services().encounters.get_encounter(id)
                    })?
                    .map(|encounter| encounter.uuid);
                    Ok(())
                },
            )
            .property("value", value, set_value);
        let accessors = optional_text!(
            accessors,
            "accessionNumber" => accession_number,
            "comment" => comment,
            "valueModifier" => value_modifier,
        );
        Self { accessors }
    }
}

fn concept_of(obs: &Obs, ctx: &RequestContext) -> RestResult<Option<Concept>> {
    match &obs.concept {
        Some(id) => Ok(ctx.services().concepts.get_concept(id.as_str())?),
        None => Ok(None),
    }
}

/// `"<concept name>: <value>"`, or empty without a concept.
fn display(obs: &Obs, ctx: &RequestContext) -> RestResult<String> {
    let Some(concept) = concept_of(obs, ctx)? else {
        return Ok(String::new());
    };
    Ok(format!("{}: {}", concept.display_name(), value_text(obs, ctx)?))
}

fn value_text(obs: &Obs, ctx: &RequestContext) -> RestResult<String> {
    let services = ctx.services();
    Ok(match &obs.value {
        ObsValue::None => String::new(),
        ObsValue::Coded(id) => services
            .concepts
            .get_concept(id.as_str())?
            .map(|c| c.display_name())
            .unwrap_or_default(),
        ObsValue::Drug { drug, .. } => services
            .concepts
            .get_drug(drug.as_str())?
            .map(|d| d.name)
            .unwrap_or_default(),
        ObsValue::Numeric(n) => format_number(*n),
        ObsValue::Boolean(true) => "Yes".to_owned(),
        ObsValue::Boolean(false) => "No".to_owned(),
        ObsValue::Text(text) => text.clone(),
        ObsValue::Datetime(dt) => convert::format_datetime(dt),
        ObsValue::Complex(_) => "raw file".to_owned(),
    })
}

/// Whole numbers keep one decimal place, so `70` reads `70.0`.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}

fn value(obs: &Obs, ctx: &RequestContext) -> RestResult<PropertyValue> {
    if obs.is_group() {
        return Ok(PropertyValue::Null);
    }
    let services = ctx.services();
    Ok(match &obs.value {
        ObsValue::None => PropertyValue::Null,
        ObsValue::Complex(_) => PropertyValue::Json(json!({
            "display": "raw file",
            "links": {
                "rel": "self",
                "uri": format!("{}/obs/{}/value", ctx.config().rest_root(), obs.uuid),
            },
        })),
        ObsValue::Datetime(dt) => PropertyValue::datetime(Some(*dt)),
        ObsValue::Drug { drug, .. } => {
            PropertyValue::optional_delegate(services.concepts.get_drug(drug.as_str())?)
        }
        ObsValue::Coded(id) => {
            PropertyValue::optional_delegate(services.concepts.get_concept(id.as_str())?)
        }
        ObsValue::Text(text) => text.as_str().into(),
        ObsValue::Numeric(n) => PropertyValue::number(Some(*n)),
        ObsValue::Boolean(b) => (*b).into(),
    })
}

/// Interprets a posted value by the datatype of the obs concept, which must already be set.
fn set_value(obs: &mut Obs, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    if value.is_null() {
        return Err(RestError::conversion(
            "value",
            "The value for an observation cannot be null",
        ));
    }
    let concept = concept_of(obs, ctx)?
        .ok_or_else(|| RestError::conversion("value", "value cannot be set before concept"))?;
    let kind = match &concept.datatype {
        Some(id) => ctx
            .services()
            .concepts
            .get_datatype(id.as_str())?
            .map(|d| d.kind())
            .unwrap_or(DatatypeKind::Other),
        None => DatatypeKind::Other,
    };

    obs.value = match kind {
        DatatypeKind::Coded => coded_value(&concept, value, ctx)?,
        DatatypeKind::Numeric => numeric_value(&concept, value)?,
        DatatypeKind::Boolean => ObsValue::Boolean(boolean_value(value, ctx)?),
        DatatypeKind::Date | DatatypeKind::Time | DatatypeKind::Datetime => {
            let raw = convert::string("value", value)?;
            ObsValue::Datetime(convert::parse_datetime("value", &raw)?)
        }
        DatatypeKind::Complex => {
            let raw = convert::string("value", value)?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(raw.trim())
                .map_err(|e| RestError::conversion("value", format!("invalid base64 data: {e}")))?;
            ObsValue::Complex(bytes)
        }
        _ => ObsValue::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
    };
    Ok(())
}

/// A concept answer, or a drug standing for its concept.
fn coded_value(concept: &Concept, value: &Value, ctx: &RequestContext) -> RestResult<ObsValue> {
    let id = convert::reference_id("value", value)?.unwrap_or_default();
    let concepts = &ctx.services().concepts;
    if let Some(answer) = concepts.get_concept(&id)? {
        return Ok(ObsValue::Coded(answer.uuid));
    }
    if let Some(drug) = concepts.get_drug(&id)? {
        return Ok(ObsValue::Drug {
            drug: drug.uuid,
            concept: drug.concept,
        });
    }
    Err(RestError::ObjectNotFound(format!(
        "{}:{id}",
        concept.display_name()
    )))
}

/// A number, optionally suffixed with the concept's units.
fn numeric_value(concept: &Concept, value: &Value) -> RestResult<ObsValue> {
    let units = concept
        .numeric
        .as_ref()
        .and_then(|n| n.units.as_deref())
        .filter(|u| !u.trim().is_empty());
    let stripped = match (value, units) {
        (Value::String(raw), Some(units)) => raw
            .trim()
            .strip_suffix(units)
            .map(|number| Value::String(number.trim().to_owned())),
        _ => None,
    };
    let number = convert::optional_number("value", stripped.as_ref().unwrap_or(value))
        .map_err(|_| RestError::conversion("value", format!("{value} has invalid units")))?;
    number
        .map(ObsValue::Numeric)
        .ok_or_else(|| RestError::conversion("value", "numeric value cannot be empty"))
}

/// The configured true/false concepts, or a boolean synonym.
fn boolean_value(value: &Value, ctx: &RequestContext) -> RestResult<bool> {
    if let Some(id) = convert::reference_id("value", value).ok().flatten() {
        let concepts = &ctx.services().concepts;
        if concepts
            .get_true_concept()?
            .is_some_and(|c| c.uuid.as_str() == id)
        {
            return Ok(true);
        }
        if concepts
            .get_false_concept()?
            .is_some_and(|c| c.uuid.as_str() == id)
        {
            return Ok(false);
        }
    }
    convert::parse_boolean("value", value)
}

/// Replaces the group members. Members inherit person, time, encounter and location.
fn set_group_members(obs: &mut Obs, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let mut members = Vec::new();
    for item in convert::array("groupMembers", value)? {
        let template = Obs {
            person: obs.person.clone(),
            obs_datetime: obs.obs_datetime,
            encounter: obs.encounter.clone(),
            location: obs.location.clone(),
            obs_group: Some(obs.uuid.clone()),
            ..Default::default()
        };
        members.push(obs_from_payload(item, template, ctx)?);
    }
    obs.group_members = members;
    Ok(())
}

/// Builds an observation nested in another payload (an encounter or an obs group) on top of
/// `template`. Only `concept` is required; the rest defaults from the template.
pub(crate) fn obs_from_payload(payload: &Value, mut obs: Obs, ctx: &RequestContext) -> RestResult<Obs> {
    let resource = ObsResource::new();
    let body = convert::object("obs", payload)?;
    let allowed = resource.creatable_properties()?.all_optional();
    set_converted_properties(&resource, &mut obs, body, &allowed, ctx)?;
    if obs.concept.is_none() {
        return Err(RestError::conversion(
            "concept",
            "Some required properties are missing: concept",
        ));
    }
    Ok(obs)
}

impl Representable for ObsResource {
    type Delegate = Obs;

    fn name(&self) -> &'static str {
        "obs"
    }

    fn accessors(&self) -> &PropertyAccessors<Obs> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Obs) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Obs) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a Obs) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Obs>,
    ) -> Option<ResourceDescription> {
        let mut description = ResourceDescription::new();
        match rep {
            Representation::Default => {
                description
                    .add_property("uuid")
                    .add_property("display")
                    .add_property_as("concept", Representation::Ref)
                    .add_property_as("person", Representation::Ref)
                    .add_property("obsDatetime")
                    .add_property("accessionNumber")
                    .add_property_as("obsGroup", Representation::Ref)
                    .add_property("groupMembers")
                    .add_property("comment")
                    .add_property_as("location", Representation::Ref)
                    .add_property_as("order", Representation::Ref)
                    .add_property_as("encounter", Representation::Ref)
                    .add_property("voided")
                    .add_property("value")
                    .add_property("valueModifier")
                    .add_self_link()
                    .add_link("full", ".?v=full");
            }
            Representation::Full => {
                description
                    .add_property("uuid")
                    .add_property("display")
                    .add_property("concept")
                    .add_property_as("person", Representation::Ref)
                    .add_property("obsDatetime")
                    .add_property("accessionNumber")
                    .add_property("obsGroup")
                    .add_property_as("groupMembers", Representation::Full)
                    .add_property("comment")
                    .add_property("location")
                    .add_property("order")
                    .add_property("encounter")
                    .add_property("voided")
                    .add_property("auditInfo")
                    .add_property("value")
                    .add_property("valueModifier")
                    .add_self_link();
            }
            _ => return None,
        }
        Some(description)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add_required("person")
            .add_required("obsDatetime")
            .add_required("concept")
            .add("location")
            .add("order")
            .add("encounter")
            .add("accessionNumber")
            .add("groupMembers")
            .add("comment")
            .add("value")
            .add("valueModifier");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "concept" => PropertyType::Ref("concept"),
            "person" => PropertyType::Ref("person"),
            "obsDatetime" => PropertyType::DateTime,
            "obsGroup" => PropertyType::Ref("obs"),
            "groupMembers" => PropertyType::RefList("obs"),
            "location" => PropertyType::Ref("location"),
            "order" => PropertyType::Ref("order"),
            "encounter" => PropertyType::Ref("encounter"),
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for ObsResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Obs>> {
        Ok(ctx.services().obs.get_obs(id)?)
    }

    fn new_delegate(&self, _body: &Map<String, Value>, _ctx: &RequestContext) -> RestResult<Obs> {
        Ok(Obs::default())
    }

    fn save(&self, delegate: Obs, ctx: &RequestContext) -> RestResult<Obs> {
        Ok(ctx.services().obs.save_obs(delegate)?)
    }

    fn delete_delegate(&self, mut delegate: Obs, reason: &str, ctx: &RequestContext) -> RestResult<()> {
        if delegate.void.void(reason) {
            ctx.services().obs.save_obs(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Obs, _ctx: &RequestContext) -> RestResult<Obs> {
        delegate.void.unvoid();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Obs>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(obs) = delegate {
            ctx.services().obs.purge_obs(obs.uuid.as_str())?;
        }
        Ok(())
    }

    /// Scoped to a patient or an encounter when either is given; an unknown scope finds nothing.
    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Obs>> {
        let services = ctx.services();
        if let Some(patient) = ctx.param(PARAM_PATIENT) {
            let Some(patient) = services.patients.get_patient(patient)? else {
                tracing::debug!("obs search: no patient {patient}");
                return Ok(PageableResult::Empty);
            };
            return Ok(services.obs.get_obs_by_person(patient.uuid().as_str())?.into());
        }
        if let Some(encounter) = ctx.param(PARAM_ENCOUNTER) {
            let Some(encounter) = services.encounters.get_encounter(encounter)? else {
                tracing::debug!("obs search: no encounter {encounter}");
                return Ok(PageableResult::Empty);
            };
            return Ok(encounter.obs.into());
        }
        let query = super::query_text(ctx);
        if query.is_empty() {
            return Ok(PageableResult::Empty);
        }
        Ok(services.obs.search_obs(&query, ctx.include_all())?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::resources::testing::{
        Fixture, ASPIRIN, ENCOUNTER, FAVORITE_FOOD, FEVER, OBS, PATIENT, RICE, TEST_CLASS,
        TRUE_CONCEPT, VITALS, WEIGHT,
    };
    use emr_domain::{ConceptName, EntityUuid};

    const COMPLEX: &str = "8d4a6242-c2cc-11de-8d13-0010c6dffd0f";

    fn create(fixture: &Fixture, concept: &str, value: Value) -> RestResult<Value> {
        ObsResource::new().create(
            &json!({
                "person": PATIENT,
                "obsDatetime": "2011-05-01T10:15:00.000+0000",
                "concept": concept,
                "value": value,
            }),
            &fixture.ctx(&[]),
        )
    }

    #[test]
    fn test_default_representation() {
        let fixture = Fixture::new();
        let obs = ObsResource::new()
            .retrieve(OBS, &fixture.ctx(&[]))
            .expect("obs exists");

        assert_eq!(obs["display"], "WEIGHT (KG): 70.0");
        assert_eq!(obs["value"], 70.0);
        assert_eq!(obs["concept"]["uuid"], WEIGHT);
        assert_eq!(obs["encounter"]["uuid"], ENCOUNTER);
        assert_eq!(obs["person"]["uuid"], PATIENT);
        assert_eq!(obs["groupMembers"], Value::Null);
        assert_eq!(obs["obsDatetime"], "2008-08-01T00:00:00.000+0000");
    }

    #[test]
    fn test_numeric_value_strips_units() {
        let fixture = Fixture::new();
        let obs = create(&fixture, WEIGHT, json!("82 kg")).expect("units are accepted");
        assert_eq!(obs["value"], 82.0);

        let err = create(&fixture, WEIGHT, json!("82 lbs")).expect_err("wrong units");
        assert_eq!(err.to_string(), "\"82 lbs\" has invalid units");
    }

    #[test]
    fn test_coded_value_accepts_concept_or_drug() {
        let fixture = Fixture::new();
        let obs = create(&fixture, FAVORITE_FOOD, json!(RICE)).expect("concept answer");
        assert_eq!(obs["value"]["uuid"], RICE);
        assert_eq!(obs["display"], "FAVORITE FOOD: RICE");

        let obs = create(&fixture, FAVORITE_FOOD, json!({ "uuid": ASPIRIN })).expect("drug answer");
        assert_eq!(obs["value"]["uuid"], ASPIRIN);
        assert_eq!(obs["display"], "FAVORITE FOOD: Aspirin");

        let err = create(&fixture, FAVORITE_FOOD, json!("nothing")).expect_err("unknown answer");
        assert_eq!(err.code(), "object_not_found");
    }

    #[test]
    fn test_boolean_value_accepts_true_concept_and_synonyms() {
        let fixture = Fixture::new();
        let obs = create(&fixture, FEVER, json!(TRUE_CONCEPT)).expect("true concept");
        assert_eq!(obs["value"], true);

        let obs = create(&fixture, FEVER, json!("no")).expect("synonym");
        assert_eq!(obs["value"], false);
        assert_eq!(obs["display"], "FEVER PRESENT: No");

        let err = create(&fixture, FEVER, json!("maybe")).expect_err("not a boolean");
        assert_eq!(err.code(), "conversion");
    }

    #[test]
    fn test_null_value_is_rejected() {
        let fixture = Fixture::new();
        let err = create(&fixture, WEIGHT, Value::Null).expect_err("null value");
        assert_eq!(err.to_string(), "The value for an observation cannot be null");
    }

    #[test]
    fn test_missing_required_fails_before_any_setter() {
        let fixture = Fixture::new();
        let err = ObsResource::new()
            .create(&json!({ "concept": "no-such-concept", "value": 1 }), &fixture.ctx(&[]))
            .expect_err("person and obsDatetime are missing");
        assert_eq!(
            err.to_string(),
            "Some required properties are missing: person, obsDatetime"
        );
    }

    #[test]
    fn test_complex_value_is_base64() {
        let fixture = Fixture::new();
        let xray = fixture
            .services
            .concepts
            .save_concept(Concept {
                names: vec![ConceptName {
                    name: "X-RAY".into(),
                    locale: "en".into(),
                    concept_name_type: Some("FULLY_SPECIFIED".into()),
                    ..Default::default()
                }],
                datatype: Some(EntityUuid::parse(COMPLEX).expect("valid uuid")),
                concept_class: Some(EntityUuid::parse(TEST_CLASS).expect("valid uuid")),
                ..Default::default()
            })
            .expect("complex concept saves");

        let obs = create(&fixture, xray.uuid.as_str(), json!("aGVsbG8=")).expect("base64 accepted");
        let uuid = obs["uuid"].as_str().expect("uuid");
        assert_eq!(obs["value"]["display"], "raw file");
        assert_eq!(
            obs["value"]["links"]["uri"],
            format!("/ws/rest/v1/obs/{uuid}/value")
        );
        let stored = fixture
            .services
            .obs
            .get_obs(uuid)
            .expect("lookup succeeds")
            .expect("obs stored");
        assert_eq!(stored.value, ObsValue::Complex(b"hello".to_vec()));

        let err = create(&fixture, xray.uuid.as_str(), json!("not base64!")).expect_err("bad data");
        assert_eq!(err.code(), "conversion");
    }

    #[test]
    fn test_group_members_are_created_with_the_group() {
        let fixture = Fixture::new();
        let group = ObsResource::new()
            .create(
                &json!({
                    "person": PATIENT,
                    "obsDatetime": "2011-05-01",
                    "concept": VITALS,
                    "groupMembers": [
                        { "concept": WEIGHT, "value": 61.5 },
                        { "concept": FEVER, "value": true },
                    ],
                }),
                &fixture.ctx(&[]),
            )
            .expect("group is created");

        assert_eq!(group["value"], Value::Null);
        let members = group["groupMembers"].as_array().expect("members render");
        assert_eq!(members.len(), 2);
        let member = ObsResource::new()
            .retrieve(
                members[0]["uuid"].as_str().expect("member uuid"),
                &fixture.ctx(&[]),
            )
            .expect("member exists");
        assert_eq!(member["obsGroup"]["uuid"], group["uuid"]);
        assert_eq!(member["obsDatetime"], "2011-05-01T00:00:00.000+0000");
    }

    #[test]
    fn test_search_scopes() {
        let fixture = Fixture::new();
        let resource = ObsResource::new();

        let by_patient = resource
            .list(&fixture.ctx(&[("patient", PATIENT)]))
            .expect("patient search");
        assert_eq!(by_patient.results.len(), 1);

        let by_encounter = resource
            .list(&fixture.ctx(&[("encounter", ENCOUNTER)]))
            .expect("encounter search");
        assert_eq!(by_encounter.results[0]["uuid"], OBS);

        let unknown = resource
            .list(&fixture.ctx(&[("patient", "no-such-patient")]))
            .expect("unknown patient is not an error");
        assert!(unknown.results.is_empty());

        let by_name = resource
            .list(&fixture.ctx(&[("q", "weight")]))
            .expect("query search");
        assert_eq!(by_name.results.len(), 1);
    }

    #[test]
    fn test_void_and_unvoid() {
        let fixture = Fixture::new();
        let resource = ObsResource::new();
        resource
            .delete(OBS, &fixture.ctx(&[("reason", "entered in error")]))
            .expect("void succeeds");
        resource
            .delete(OBS, &fixture.ctx(&[]))
            .expect("void is idempotent");

        let voided = resource
            .retrieve(OBS, &fixture.ctx(&[("v", "full")]))
            .expect("voided obs still fetches");
        assert_eq!(voided["voided"], true);

        let restored = resource
            .update(OBS, &json!({ "voided": false }), &fixture.ctx(&[]))
            .expect("unvoid succeeds");
        assert_eq!(restored["voided"], false);
    }
}
