//! `visit`: a patient's stay or appointment, grouping the encounters recorded during it.

use super::{concept_id, linked, location_id, metadata_id, metadata_name, patient_id, resolve_required};
use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::constants::{
    PARAM_FROM_START_DATE, PARAM_INCLUDE_INACTIVE, PARAM_LOCATION, PARAM_PATIENT,
    PARAM_VISIT_TYPE, RESOURCE_VERSION_1_9,
};
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{not_found, CrudHandler, Lifecycle, Representable};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use emr_domain::{AuditInfo, MetadataKind, Visit, VisitQuery};
use serde_json::{Map, Value};

pub struct VisitResource {
    accessors: PropertyAccessors<Visit>,
}

impl Default for VisitResource {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Visit>::new()
            .get("display", |v, ctx| Ok(visit_display(v, ctx)?.into()))
            .property(
                "patient",
                |v, ctx| linked(v.patient.as_ref(), |id| ctx.services().patients.get_patient(id)),
                |v, value, ctx| {
                    v.patient = patient_id("patient", value, ctx)?;
                    if v.patient.is_none() {
                        return Err(RestError::conversion("patient", "patient cannot be null"));
                    }
                    Ok(())
                },
            )
            .property(
                "visitType",
                |v, ctx| {
                    linked(v.visit_type.as_ref(), |id| {
                        ctx.services().metadata.get_metadata(MetadataKind::VisitType, id)
                    })
                },
                |v, value, ctx| {
                    v.visit_type = metadata_id(MetadataKind::VisitType, "visitType", value, ctx)?;
                    if v.visit_type.is_none() {
                        return Err(RestError::conversion("visitType", "visitType cannot be null"));
                    }
                    Ok(())
                },
            )
            .property(
                "indication",
                |v, ctx| linked(v.indication.as_ref(), |id| ctx.services().concepts.get_concept(id)),
                |v, value, ctx| {
                    v.indication = concept_id("indication", value, ctx)?;
                    Ok(())
                },
            )
            .property(
                "location",
                |v, ctx| linked(v.location.as_ref(), |id| ctx.services().locations.get_location(id)),
                |v, value, ctx| {
                    v.location = location_id("location", value, ctx)?;
                    Ok(())
                },
            )
            .property(
                "startDatetime",
                |v, _| Ok(PropertyValue::datetime(Some(v.start_datetime))),
                |v, value, _| {
                    v.start_datetime = convert::optional_datetime("startDatetime", value)?
                        .ok_or_else(|| {
                            RestError::conversion("startDatetime", "startDatetime cannot be null")
                        })?;
                    Ok(())
                },
            )
            .property(
                "stopDatetime",
                |v, _| Ok(PropertyValue::datetime(v.stop_datetime)),
                |v, value, _| {
                    v.stop_datetime = convert::optional_datetime("stopDatetime", value)?;
                    Ok(())
                },
            )
            .property("encounters", get_encounters, set_encounters);
        Self { accessors }
    }
}

/// `<visit type> @ <location> - <start>`, with `?` for whatever is unknown.
fn visit_display(visit: &Visit, ctx: &RequestContext) -> RestResult<String> {
    let or_unknown = |name: String| if name.is_empty() { "?".to_owned() } else { name };
    let visit_type = metadata_name(MetadataKind::VisitType, visit.visit_type.as_ref(), ctx)?;
    let location = match &visit.location {
        Some(id) => ctx
            .services()
            .locations
            .get_location(id.as_str())?
            .map(|l| l.name)
            .unwrap_or_default(),
        None => String::new(),
    };
    Ok(format!(
        "{} @ {} - {}",
        or_unknown(visit_type),
        or_unknown(location),
        visit.start_datetime.format("%d/%m/%Y %H:%M")
    ))
}

/// Voided encounters are left out.
fn get_encounters(visit: &Visit, ctx: &RequestContext) -> RestResult<PropertyValue> {
    let mut encounters = Vec::with_capacity(visit.encounters.len());
    for id in &visit.encounters {
        if let Some(encounter) = ctx.services().encounters.get_encounter(id.as_str())? {
            if !encounter.void.voided {
                encounters.push(encounter);
            }
        }
    }
    Ok(PropertyValue::delegates(encounters))
}

/// Links the posted encounters to the visit. Encounters already linked stay linked.
fn set_encounters(visit: &mut Visit, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    for item in convert::array("encounters", value)? {
        let encounter = resolve_required("encounters", item, |id| {
            ctx.services().encounters.get_encounter(id)
        })?;
        if !visit.encounters.contains(&encounter.uuid) {
            visit.encounters.push(encounter.uuid);
        }
    }
    Ok(())
}

impl Representable for VisitResource {
    type Delegate = Visit;

    fn name(&self) -> &'static str {
        "visit"
    }

    fn resource_version(&self) -> &'static str {
        RESOURCE_VERSION_1_9
    }

    fn accessors(&self) -> &PropertyAccessors<Visit> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Visit) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Visit) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a Visit) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Visit>,
    ) -> Option<ResourceDescription> {
        let full = match rep {
            Representation::Default => false,
            Representation::Full => true,
            _ => return None,
        };
        let nested = if full {
            Representation::Default
        } else {
            Representation::Ref
        };
        let mut description = ResourceDescription::new();
        description
            .add_property("uuid")
            .add_property("display")
            .add_property_as("patient", nested.clone())
            .add_property_as("visitType", nested.clone())
            .add_property_as("indication", nested.clone())
            .add_property_as("location", nested.clone())
            .add_property("startDatetime")
            .add_property("stopDatetime")
            .add_property_as("encounters", nested)
            .add_property("voided");
        if full {
            description.add_property("auditInfo");
        }
        description.add_self_link();
        if !full {
            description.add_link("full", ".?v=full");
        }
        Some(description)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add_required("patient")
            .add_required("visitType")
            .add("startDatetime")
            .add("location")
            .add("indication")
            .add("stopDatetime")
            .add("encounters");
        Ok(fields)
    }

    /// The patient of a visit never changes.
    fn updatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add("visitType")
            .add("startDatetime")
            .add("location")
            .add("indication")
            .add("stopDatetime")
            .add("encounters");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "patient" => PropertyType::Ref("patient"),
            "visitType" => PropertyType::Ref("visittype"),
            "indication" => PropertyType::Ref("concept"),
            "location" => PropertyType::Ref("location"),
            "startDatetime" | "stopDatetime" => PropertyType::DateTime,
            "encounters" => PropertyType::RefList("encounter"),
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for VisitResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Visit>> {
        Ok(ctx.services().visits.get_visit(id)?)
    }

    fn new_delegate(&self, _body: &Map<String, Value>, _ctx: &RequestContext) -> RestResult<Visit> {
        Ok(Visit::default())
    }

    fn save(&self, delegate: Visit, ctx: &RequestContext) -> RestResult<Visit> {
        Ok(ctx.services().visits.save_visit(delegate)?)
    }

    fn delete_delegate(&self, mut delegate: Visit, reason: &str, ctx: &RequestContext) -> RestResult<()> {
        if delegate.void.void(reason) {
            ctx.services().visits.save_visit(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Visit, _ctx: &RequestContext) -> RestResult<Visit> {
        delegate.void.unvoid();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Visit>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(visit) = delegate {
            ctx.services().visits.purge_visit(visit.uuid.as_str())?;
        }
        Ok(())
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<Visit>> {
        Ok(ctx
            .services()
            .visits
            .get_all_visits(ctx.include_all())?
            .into())
    }

    /// Filters by patient, location, visit type, start date and activity. A filter naming
    /// something that does not exist is an error rather than an empty result.
    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Visit>> {
        let services = ctx.services();
        let mut query = VisitQuery {
            include_inactive: true,
            include_voided: ctx.include_all(),
            ..Default::default()
        };

        if let Some(id) = ctx.param(PARAM_PATIENT) {
            let patient = services
                .patients
                .get_patient(id)?
                .ok_or_else(|| not_found("patient", id))?;
            query.patient = Some(patient.uuid().to_string());
        }
        if let Some(id) = ctx.param(PARAM_LOCATION) {
            let location = match services.locations.get_location(id)? {
                Some(found) => found,
                None => services
                    .locations
                    .get_location_by_name(id)?
                    .ok_or_else(|| not_found("location", id))?,
            };
            query.location = Some(location.uuid.to_string());
        }
        if let Some(id) = ctx.param(PARAM_VISIT_TYPE) {
            let visit_type = match services.metadata.get_metadata(MetadataKind::VisitType, id)? {
                Some(found) => found,
                None => services
                    .metadata
                    .get_metadata_by_name(MetadataKind::VisitType, id)?
                    .ok_or_else(|| not_found("visittype", id))?,
            };
            query.visit_type = Some(visit_type.uuid.to_string());
        }
        if let Some(raw) = ctx.param(PARAM_INCLUDE_INACTIVE) {
            query.include_inactive =
                convert::parse_boolean(PARAM_INCLUDE_INACTIVE, &Value::String(raw.to_owned()))?;
        }
        if let Some(raw) = ctx.param(PARAM_FROM_START_DATE) {
            query.from_start = Some(convert::parse_datetime(PARAM_FROM_START_DATE, raw)?);
        }

        if query.patient.is_none()
            && query.location.is_none()
            && query.visit_type.is_none()
            && query.from_start.is_none()
            && ctx.param(PARAM_INCLUDE_INACTIVE).is_none()
        {
            return Ok(PageableResult::Empty);
        }
        Ok(services.visits.get_visits(&query)?.into())
    }
}
