//! `patient` and its `identifier` and `allergy` sub-resources.
//!
//! A patient wraps a person and shares its uuid. Person properties are reached through the
//! nested `person` property, never flattened onto the patient.

use super::person::PersonResource;
use super::{
    child_uri, concept_id, keep_single_preferred, linked, location_id, metadata_id, metadata_name,
};
use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::constants::RESOURCE_VERSION_2_0;
use crate::context::RequestContext;
use crate::convert;
use crate::delegate::DelegateType;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{
    check_required, set_converted_properties, CrudHandler, Lifecycle, Representable,
    SubResourceHandler,
};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use emr_domain::{
    Allergen, AllergenType, Allergy, AllergyReaction, AuditInfo, DomainError, EntityUuid,
    MetadataKind, Patient, PatientIdentifier,
};
use serde_json::{Map, Value};

/// Search parameter naming the person properties duplicates are matched on.
pub const PARAM_DUPLICATE_ATTRIBUTES: &str = "attributesToFindDuplicatesBy";

// ===== PATIENT =====

pub struct PatientResource {
    accessors: PropertyAccessors<Patient>,
}

impl Default for PatientResource {
    fn default() -> Self {
        Self::new()
    }
}

impl PatientResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Patient>::new()
            .get("display", |p, _| Ok(patient_display(p).into()))
            .property(
                "person",
                |p, _| Ok(PropertyValue::delegate(p.person.clone())),
                set_person,
            )
            .property(
                "identifiers",
                |p, _| Ok(PropertyValue::delegates(p.active_identifiers().cloned())),
                set_identifiers,
            );
        Self { accessors }
    }
}

/// `<preferred identifier> - <full name>`, or empty when the patient has no identifier.
fn patient_display(patient: &Patient) -> String {
    match patient.preferred_identifier() {
        Some(identifier) => format!(
            "{} - {}",
            identifier.identifier,
            patient.person.display_name()
        ),
        None => String::new(),
    }
}

/// A posted person is either a reference to an existing person or an object of person
/// properties. On a new patient the object must carry every required person property; on an
/// existing one only updatable person properties are accepted.
fn set_person(patient: &mut Patient, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let is_new = ctx
        .services()
        .patients
        .get_patient(patient.uuid().as_str())?
        .is_none();

    if is_reference(value) {
        let Some(id) = convert::reference_id("person", value)? else {
            return Err(RestError::conversion("person", "person cannot be null"));
        };
        if id == patient.uuid().as_str() {
            return Ok(());
        }
        if !is_new {
            return Err(RestError::conversion(
                "person",
                "the person of an existing patient cannot be changed",
            ));
        }
        if ctx.services().patients.get_patient(&id)?.is_some() {
            return Err(DomainError::Conflict(format!("person {id} is already a patient")).into());
        }
        let person = ctx
            .services()
            .persons
            .get_person(&id)?
            .ok_or_else(|| RestError::conversion("person", format!("person {id} does not exist")))?;
        let identifiers = std::mem::take(&mut patient.identifiers);
        patient.person = person;
        patient.identifiers = identifiers
            .into_iter()
            .map(|mut i| {
                i.patient = Some(patient.person.uuid.clone());
                i
            })
            .collect();
        return Ok(());
    }

    let body = convert::object("person", value)?;
    let handler = PersonResource::new();
    let allowed = if is_new {
        let allowed = handler.creatable_properties()?;
        check_required(&allowed, body)?;
        allowed
    } else {
        handler.updatable_properties()?
    };
    set_converted_properties(&handler, &mut patient.person, body, &allowed, ctx)
}

/// A uuid string, or an object that carries nothing but a uuid.
fn is_reference(value: &Value) -> bool {
    match value {
        Value::String(_) | Value::Null => true,
        Value::Object(map) => map.len() == 1 && map.contains_key("uuid"),
        _ => false,
    }
}

fn set_identifiers(patient: &mut Patient, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let handler = PatientIdentifierResource::new();
    let allowed = handler.creatable_properties()?;
    let mut identifiers = Vec::new();
    for item in convert::array("identifiers", value)? {
        let body = convert::object("identifiers", item)?;
        check_required(&allowed, body)?;
        let mut identifier = handler.new_child(patient);
        set_converted_properties(&handler, &mut identifier, body, &allowed, ctx)?;
        identifiers.push(identifier);
    }
    match identifiers.iter().filter(|i| i.preferred).count() {
        0 => {
            if let Some(first) = identifiers.first_mut() {
                first.preferred = true;
            }
        }
        1 => {}
        _ => {
            return Err(RestError::conversion(
                "identifiers",
                "a patient can have only one preferred identifier",
            ))
        }
    }
    patient.identifiers = identifiers;
    Ok(())
}

impl Representable for PatientResource {
    type Delegate = Patient;

    fn name(&self) -> &'static str {
        "patient"
    }

    fn accessors(&self) -> &PropertyAccessors<Patient> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Patient) -> &'a str {
        delegate.uuid().as_str()
    }

    fn lifecycle(&self, delegate: &Patient) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.person.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a Patient) -> Option<&'a AuditInfo> {
        Some(&delegate.person.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Patient>,
    ) -> Option<ResourceDescription> {
        let mut description = ResourceDescription::new();
        match rep {
            Representation::Default => {
                description
                    .add_property("uuid")
                    .add_property("display")
                    .add_property_as("identifiers", Representation::Ref)
                    .add_property_as("person", Representation::Default)
                    .add_property("voided")
                    .add_self_link()
                    .add_link("full", ".?v=full");
            }
            Representation::Full => {
                description
                    .add_property("uuid")
                    .add_property("display")
                    .add_property_as("identifiers", Representation::Default)
                    .add_property_as("person", Representation::Full)
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
        fields.add_required("person").add_required("identifiers");
        Ok(fields)
    }

    /// Identifiers are managed through the `identifier` sub-resource once the patient exists.
    fn updatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields.add("person");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "person" => PropertyType::Owned("person"),
            "identifiers" => PropertyType::OwnedList("patientidentifier"),
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for PatientResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Patient>> {
        Ok(ctx.services().patients.get_patient(id)?)
    }

    fn new_delegate(&self, _body: &Map<String, Value>, _ctx: &RequestContext) -> RestResult<Patient> {
        Ok(Patient::default())
    }

    fn save(&self, delegate: Patient, ctx: &RequestContext) -> RestResult<Patient> {
        Ok(ctx.services().patients.save_patient(delegate)?)
    }

    fn delete_delegate(&self, mut delegate: Patient, reason: &str, ctx: &RequestContext) -> RestResult<()> {
        if delegate.person.void.void(reason) {
            ctx.services().patients.save_patient(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Patient, _ctx: &RequestContext) -> RestResult<Patient> {
        delegate.person.void.unvoid();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Patient>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(patient) = delegate {
            ctx.services().patients.purge_patient(patient.uuid().as_str())?;
        }
        Ok(())
    }

    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Patient>> {
        if let Some(attributes) = ctx.param(PARAM_DUPLICATE_ATTRIBUTES) {
            let attributes: Vec<String> = attributes
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_owned)
                .collect();
            if attributes.len() < 2 {
                return Err(RestError::IllegalRequest(format!(
                    "{PARAM_DUPLICATE_ATTRIBUTES} needs at least two attributes"
                )));
            }
            let duplicates = ctx.services().patients.find_duplicate_patients(&attributes)?;
            let total = duplicates.len();
            return Ok(PageableResult::AlreadyPaged {
                results: duplicates,
                has_more: false,
                total: Some(total),
            });
        }

        let query = super::query_text(ctx);
        if query.is_empty() {
            return Ok(PageableResult::Empty);
        }
        let patients = ctx
            .services()
            .patients
            .search_patients(&query, ctx.include_all())?;
        Ok(PageableResult::NeedsPaging(patients))
    }
}

// ===== PATIENT IDENTIFIER =====

pub struct PatientIdentifierResource {
    accessors: PropertyAccessors<PatientIdentifier>,
}

impl Default for PatientIdentifierResource {
    fn default() -> Self {
        Self::new()
    }
}

impl PatientIdentifierResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<PatientIdentifier>::new()
            .get("display", |i, ctx| {
                let type_name = metadata_name(
                    MetadataKind::PatientIdentifierType,
                    i.identifier_type.as_ref(),
                    ctx,
                )?;
                Ok(format!("{} = {}", type_name, i.identifier).into())
            })
            .property(
                "identifier",
                |i, _| Ok(i.identifier.as_str().into()),
                |i, v, _| {
                    let identifier = convert::string("identifier", v)?;
                    if identifier.trim().is_empty() {
                        return Err(RestError::conversion("identifier", "identifier cannot be blank"));
                    }
                    i.identifier = identifier.trim().to_owned();
                    Ok(())
                },
            )
            .property(
                "identifierType",
                |i, ctx| {
                    linked(i.identifier_type.as_ref(), |id| {
                        ctx.services()
                            .metadata
                            .get_metadata(MetadataKind::PatientIdentifierType, id)
                    })
                },
                |i, v, ctx| {
                    i.identifier_type = metadata_id(
                        MetadataKind::PatientIdentifierType,
                        "identifierType",
                        v,
                        ctx,
                    )?;
                    Ok(())
                },
            )
            .property(
                "location",
                |i, ctx| {
                    linked(i.location.as_ref(), |id| {
                        ctx.services().locations.get_location(id)
                    })
                },
                |i, v, ctx| {
                    i.location = location_id("location", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "preferred",
                |i, _| Ok(i.preferred.into()),
                |i, v, _| {
                    i.preferred = convert::parse_boolean("preferred", v)?;
                    Ok(())
                },
            );
        Self { accessors }
    }
}

impl Representable for PatientIdentifierResource {
    type Delegate = PatientIdentifier;

    fn name(&self) -> &'static str {
        "patientidentifier"
    }

    fn accessors(&self) -> &PropertyAccessors<PatientIdentifier> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a PatientIdentifier) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &PatientIdentifier) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a PatientIdentifier) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn uri(&self, delegate: &PatientIdentifier, ctx: &RequestContext) -> String {
        child_uri(ctx, "patient", delegate.patient.as_ref(), "identifier", &delegate.uuid)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&PatientIdentifier>,
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
            .add_property("identifier")
            .add_property_as("identifierType", nested.clone())
            .add_property_as("location", nested)
            .add_property("preferred")
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
            .add_required("identifier")
            .add_required("identifierType")
            .add("location")
            .add("preferred");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "identifierType" => PropertyType::Ref("patientidentifiertype"),
            "location" => PropertyType::Ref("location"),
            "preferred" => PropertyType::Boolean,
            other => PropertyType::common(other),
        }
    }
}

impl SubResourceHandler for PatientIdentifierResource {
    type Parent = Patient;

    fn parent_resource(&self) -> &'static str {
        "patient"
    }

    fn path(&self) -> &'static str {
        "identifier"
    }

    fn fetch_parent(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Patient>> {
        Ok(ctx.services().patients.get_patient(id)?)
    }

    fn children<'a>(&self, parent: &'a Patient) -> &'a [PatientIdentifier] {
        &parent.identifiers
    }

    fn children_mut<'a>(&self, parent: &'a mut Patient) -> &'a mut Vec<PatientIdentifier> {
        &mut parent.identifiers
    }

    fn new_child(&self, parent: &Patient) -> PatientIdentifier {
        PatientIdentifier {
            patient: Some(parent.uuid().clone()),
            ..Default::default()
        }
    }

    fn save_parent(&self, parent: Patient, ctx: &RequestContext) -> RestResult<Patient> {
        Ok(ctx.services().patients.save_patient(parent)?)
    }

    fn void_child(&self, child: &mut PatientIdentifier, reason: &str) -> RestResult<bool> {
        Ok(child.void.void(reason))
    }

    fn unvoid_child(&self, child: &mut PatientIdentifier) -> RestResult<()> {
        child.void.unvoid();
        Ok(())
    }

    fn after_change(&self, parent: &mut Patient, child_id: &str) -> RestResult<()> {
        keep_single_preferred(
            &mut parent.identifiers,
            child_id,
            |i| &i.uuid,
            |i| &mut i.preferred,
        );
        Ok(())
    }
}

// ===== ALLERGY =====

pub struct AllergyResource {
    accessors: PropertyAccessors<Allergy>,
}

impl Default for AllergyResource {
    fn default() -> Self {
        Self::new()
    }
}

impl AllergyResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Allergy>::new()
            .get("display", |a, ctx| Ok(allergen_display(&a.allergen, ctx)?.into()))
            .get("patient", |a, ctx| {
                linked(a.patient.as_ref(), |id| ctx.services().patients.get_patient(id))
            })
            .property("allergen", get_allergen, set_allergen)
            .property(
                "severity",
                |a, ctx| linked(a.severity.as_ref(), |id| ctx.services().concepts.get_concept(id)),
                |a, v, ctx| {
                    a.severity = concept_id("severity", v, ctx)?;
                    Ok(())
                },
            )
            .property("reactions", get_reactions, set_reactions);
        let accessors = optional_text!(accessors, "comment" => comment);
        Self { accessors }
    }
}

/// The coded allergen's name, else the free text.
fn allergen_display(allergen: &Allergen, ctx: &RequestContext) -> RestResult<String> {
    if let Some(id) = &allergen.coded_allergen {
        if let Some(concept) = ctx.services().concepts.get_concept(id.as_str())? {
            return Ok(concept.display_name());
        }
    }
    Ok(allergen.non_coded_allergen.clone().unwrap_or_default())
}

/// A concept rendered at `ref`, or `null` if the id names nothing.
fn concept_ref(id: Option<&EntityUuid>, ctx: &RequestContext) -> RestResult<Value> {
    let Some(id) = id else {
        return Ok(Value::Null);
    };
    match ctx.services().concepts.get_concept(id.as_str())? {
        Some(concept) => ctx
            .registry()
            .render(&concept.into_delegate(), &Representation::Ref, ctx),
        None => Ok(Value::Null),
    }
}

fn get_allergen(allergy: &Allergy, ctx: &RequestContext) -> RestResult<PropertyValue> {
    let allergen = &allergy.allergen;
    let mut out = Map::new();
    out.insert("allergenType".into(), allergen.allergen_type.as_str().into());
    out.insert(
        "codedAllergen".into(),
        concept_ref(allergen.coded_allergen.as_ref(), ctx)?,
    );
    out.insert(
        "nonCodedAllergen".into(),
        allergen.non_coded_allergen.clone().map_or(Value::Null, Value::String),
    );
    Ok(Value::Object(out).into())
}

/// The allergen is replaced as a whole; a missing `allergenType` means `OTHER`.
fn set_allergen(allergy: &mut Allergy, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let body = convert::object("allergen", value)?;
    let mut allergen = Allergen::default();
    if let Some(kind) = body.get("allergenType") {
        let raw = convert::string("allergenType", kind)?;
        allergen.allergen_type = AllergenType::parse(&raw).ok_or_else(|| {
            RestError::conversion("allergenType", format!("unknown allergen type: {raw}"))
        })?;
    }
    if let Some(coded) = body.get("codedAllergen") {
        allergen.coded_allergen = concept_id("codedAllergen", coded, ctx)?;
    }
    if let Some(text) = body.get("nonCodedAllergen") {
        allergen.non_coded_allergen = convert::optional_string("nonCodedAllergen", text)?;
    }
    if allergen.is_empty() {
        return Err(RestError::conversion(
            "allergen",
            "allergen needs a codedAllergen or a nonCodedAllergen",
        ));
    }
    allergy.allergen = allergen;
    Ok(())
}

fn get_reactions(allergy: &Allergy, ctx: &RequestContext) -> RestResult<PropertyValue> {
    let mut reactions = Vec::with_capacity(allergy.reactions.len());
    for reaction in &allergy.reactions {
        let mut out = Map::new();
        out.insert("uuid".into(), reaction.uuid.as_str().into());
        out.insert("reaction".into(), concept_ref(reaction.reaction.as_ref(), ctx)?);
        out.insert(
            "reactionNonCoded".into(),
            reaction.reaction_non_coded.clone().map_or(Value::Null, Value::String),
        );
        reactions.push(Value::Object(out));
    }
    Ok(Value::Array(reactions).into())
}

/// Replaces the reactions. Each needs a coded `reaction` or a `reactionNonCoded`.
fn set_reactions(allergy: &mut Allergy, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let mut reactions = Vec::new();
    for item in convert::array("reactions", value)? {
        let body = convert::object("reactions", item)?;
        let mut reaction = AllergyReaction::default();
        if let Some(coded) = body.get("reaction") {
            reaction.reaction = concept_id("reaction", coded, ctx)?;
        }
        if let Some(text) = body.get("reactionNonCoded") {
            reaction.reaction_non_coded = convert::optional_string("reactionNonCoded", text)?;
        }
        if reaction.reaction.is_none() && reaction.reaction_non_coded.is_none() {
            return Err(RestError::conversion(
                "reactions",
                "a reaction needs a reaction or a reactionNonCoded",
            ));
        }
        reactions.push(reaction);
    }
    allergy.reactions = reactions;
    Ok(())
}

impl Representable for AllergyResource {
    type Delegate = Allergy;

    fn name(&self) -> &'static str {
        "allergy"
    }

    fn resource_version(&self) -> &'static str {
        RESOURCE_VERSION_2_0
    }

    fn accessors(&self) -> &PropertyAccessors<Allergy> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Allergy) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Allergy) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a Allergy) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn uri(&self, delegate: &Allergy, ctx: &RequestContext) -> String {
        child_uri(ctx, "patient", delegate.patient.as_ref(), "allergy", &delegate.uuid)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Allergy>,
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
            .add_property("display")
            .add_property("uuid")
            .add_property("allergen")
            .add_property_as("severity", nested.clone())
            .add_property("comment")
            .add_property("reactions")
            .add_property_as("patient", nested);
        if full {
            description.add_property("voided").add_property("auditInfo");
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
            .add_required("allergen")
            .add("severity")
            .add("comment")
            .add("reactions");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "allergen" => PropertyType::Object,
            "severity" => PropertyType::Ref("concept"),
            "reactions" => PropertyType::ObjectList,
            "patient" => PropertyType::Ref("patient"),
            other => PropertyType::common(other),
        }
    }
}

impl SubResourceHandler for AllergyResource {
    type Parent = Patient;

    fn parent_resource(&self) -> &'static str {
        "patient"
    }

    fn path(&self) -> &'static str {
        "allergy"
    }

    fn fetch_parent(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Patient>> {
        Ok(ctx.services().patients.get_patient(id)?)
    }

    fn children<'a>(&self, parent: &'a Patient) -> &'a [Allergy] {
        &parent.allergies
    }

    fn children_mut<'a>(&self, parent: &'a mut Patient) -> &'a mut Vec<Allergy> {
        &mut parent.allergies
    }

    fn new_child(&self, parent: &Patient) -> Allergy {
        Allergy {
            patient: Some(parent.uuid().clone()),
            ..Default::default()
        }
    }

    fn save_parent(&self, parent: Patient, ctx: &RequestContext) -> RestResult<Patient> {
        Ok(ctx.services().patients.save_patient(parent)?)
    }

    fn void_child(&self, child: &mut Allergy, reason: &str) -> RestResult<bool> {
        Ok(child.void.void(reason))
    }

    fn unvoid_child(&self, child: &mut Allergy) -> RestResult<()> {
        child.void.unvoid();
        Ok(())
    }

    /// Allergies are only ever voided.
    fn supports_purge(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, SubResource};
    use crate::resources::testing::{
        Fixture, ALLERGY, FEVER, IDENTIFIER_TYPE, PATIENT, PERSON, RICE, XANADU,
    };
    use serde_json::json;

    #[test]
    fn test_display_is_identifier_and_name() {
        let fixture = Fixture::new();
        let patient = PatientResource::new()
            .retrieve(PATIENT, &fixture.ctx(&[]))
            .expect("patient should render");

        assert_eq!(patient["display"], "101-6 - Horatio Hornblower");
        assert_eq!(patient["identifiers"][0]["display"], "OpenMRS ID = 101-6");
        assert_eq!(patient["person"]["gender"], "M");
        assert!(patient.get("auditInfo").is_none());
    }

    #[test]
    fn test_full_nests_person_at_full() {
        let fixture = Fixture::new();
        let patient = PatientResource::new()
            .retrieve(PATIENT, &fixture.ctx(&[("v", "full")]))
            .expect("patient should render");

        assert_eq!(patient["person"]["names"][0]["givenName"], "Horatio");
        assert_eq!(patient["identifiers"][0]["identifier"], "101-6");
        assert_eq!(patient["identifiers"][0]["location"]["display"], "Xanadu");
    }

    #[test]
    fn test_create_with_inline_person() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx(&[]);
        let created = PatientResource::new()
            .create(
                &json!({
                    "person": {
                        "gender": "F",
                        "birthdate": "1988-02-03",
                        "names": [{ "givenName": "Ann", "familyName": "Lee" }],
                    },
                    "identifiers": [
                        { "identifier": "200-1", "identifierType": IDENTIFIER_TYPE, "location": XANADU },
                    ],
                }),
                &ctx,
            )
            .expect("patient should be created");

        assert_eq!(created["display"], "200-1 - Ann Lee");
        let uuid = created["uuid"].as_str().expect("uuid");
        assert_eq!(created["person"]["uuid"], uuid);
    }

    #[test]
    fn test_create_from_existing_person() {
        let fixture = Fixture::new();
        let created = PatientResource::new()
            .create(
                &json!({
                    "person": PERSON,
                    "identifiers": [{ "identifier": "300-2", "identifierType": "OpenMRS ID" }],
                }),
                &fixture.ctx(&[]),
            )
            .expect("existing person should become a patient");

        assert_eq!(created["uuid"], PERSON);
        assert_eq!(created["display"], "300-2 - Collet Chebaskwony");
    }

    #[test]
    fn test_create_requires_identifiers() {
        let fixture = Fixture::new();
        let err = PatientResource::new()
            .create(&json!({ "person": PERSON }), &fixture.ctx(&[]))
            .expect_err("identifiers are required");
        assert_eq!(err.to_string(), "Some required properties are missing: identifiers");
    }

    #[test]
    fn test_create_rejects_two_preferred_identifiers() {
        let fixture = Fixture::new();
        let err = PatientResource::new()
            .create(
                &json!({
                    "person": PERSON,
                    "identifiers": [
                        { "identifier": "1", "identifierType": IDENTIFIER_TYPE, "preferred": true },
                        { "identifier": "2", "identifierType": IDENTIFIER_TYPE, "preferred": true },
                    ],
                }),
                &fixture.ctx(&[]),
            )
            .expect_err("two preferred identifiers are rejected");
        assert_eq!(err.code(), "conversion");
    }

    #[test]
    fn test_duplicate_identifier_is_a_conflict() {
        let fixture = Fixture::new();
        let err = PatientResource::new()
            .create(
                &json!({
                    "person": PERSON,
                    "identifiers": [{ "identifier": "101-6", "identifierType": IDENTIFIER_TYPE }],
                }),
                &fixture.ctx(&[]),
            )
            .expect_err("identifier is taken");
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn test_update_person_through_patient() {
        let fixture = Fixture::new();
        let resource = PatientResource::new();
        let updated = resource
            .update(PATIENT, &json!({ "person": { "gender": "F" } }), &fixture.ctx(&[]))
            .expect("person should be updated");
        assert_eq!(updated["person"]["gender"], "F");

        let err = resource
            .update(
                PATIENT,
                &json!({ "identifiers": [] }),
                &fixture.ctx(&[]),
            )
            .expect_err("identifiers are not updatable");
        assert_eq!(err.code(), "conversion");
    }

    #[test]
    fn test_void_and_unvoid() {
        let fixture = Fixture::new();
        let resource = PatientResource::new();
        resource
            .delete(PATIENT, &fixture.ctx(&[]))
            .expect("void succeeds");

        let voided = resource
            .retrieve(PATIENT, &fixture.ctx(&[("v", "ref")]))
            .expect("voided patient still renders");
        assert_eq!(voided["voided"], true);

        let restored = resource
            .update(PATIENT, &json!({ "voided": false }), &fixture.ctx(&[]))
            .expect("unvoid succeeds");
        assert_eq!(restored["voided"], false);
    }

    #[test]
    fn test_search_by_query_and_duplicates() {
        let fixture = Fixture::new();
        let resource = PatientResource::new();

        let found = resource
            .list(&fixture.ctx(&[("q", "101-6")]))
            .expect("search succeeds");
        assert_eq!(found.results.len(), 1);

        let err = resource
            .list(&fixture.ctx(&[(PARAM_DUPLICATE_ATTRIBUTES, "gender")]))
            .expect_err("one attribute is not enough");
        assert_eq!(err.code(), "illegal_request");

        let none = resource
            .list(&fixture.ctx(&[(PARAM_DUPLICATE_ATTRIBUTES, "gender,birthdate")]))
            .expect("duplicate search succeeds");
        assert!(none.results.is_empty());
    }

    #[test]
    fn test_identifier_sub_resource() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx(&[]);
        let identifiers = PatientIdentifierResource::new();

        let created = SubResource::create(
            &identifiers,
            PATIENT,
            &json!({ "identifier": "101-7", "identifierType": IDENTIFIER_TYPE, "preferred": true }),
            &ctx,
        )
        .expect("identifier should be created");
        assert_eq!(created["display"], "OpenMRS ID = 101-7");

        let patient = PatientResource::new()
            .retrieve(PATIENT, &ctx)
            .expect("patient renders");
        assert_eq!(patient["display"], "101-7 - Horatio Hornblower");

        let listed = SubResource::list(&identifiers, PATIENT, &ctx).expect("list succeeds");
        assert_eq!(listed.results.len(), 2);
    }

    #[test]
    fn test_allergy_default_representation() {
        let fixture = Fixture::new();
        let allergies = AllergyResource::new();
        let allergy = SubResource::retrieve(&allergies, PATIENT, ALLERGY, &fixture.ctx(&[]))
            .expect("seeded allergy renders");

        assert_eq!(allergy["display"], "RICE");
        assert_eq!(allergy["allergen"]["allergenType"], "FOOD");
        assert_eq!(allergy["allergen"]["codedAllergen"]["uuid"], RICE);
        assert_eq!(allergy["allergen"]["nonCodedAllergen"], Value::Null);
        assert_eq!(allergy["comment"], "Hives after meals");
        assert_eq!(allergy["reactions"][0]["reactionNonCoded"], "Hives");
        assert_eq!(allergy["patient"]["uuid"], PATIENT);
        assert_eq!(allergy["resourceVersion"], "2.0");
        assert!(allergy.get("voided").is_none());
        let self_link = allergy["links"][0]["uri"].as_str().expect("self link");
        assert!(self_link.ends_with(&format!("/patient/{PATIENT}/allergy/{ALLERGY}")));
    }

    #[test]
    fn test_allergy_create_update_and_void() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx(&[]);
        let allergies = AllergyResource::new();

        let created = SubResource::create(
            &allergies,
            PATIENT,
            &json!({
                "allergen": { "allergenType": "drug", "nonCodedAllergen": "Penicillin" },
                "reactions": [{ "reaction": FEVER }],
            }),
            &ctx,
        )
        .expect("allergy is created");
        assert_eq!(created["display"], "Penicillin");
        assert_eq!(created["allergen"]["allergenType"], "DRUG");
        assert_eq!(created["reactions"][0]["reaction"]["display"], "FEVER PRESENT");
        let uuid = created["uuid"].as_str().expect("uuid").to_owned();

        let updated = SubResource::update(
            &allergies,
            PATIENT,
            &uuid,
            &json!({ "comment": "Since childhood", "severity": FEVER }),
            &fixture.ctx(&[("v", "full")]),
        )
        .expect("allergy is updated");
        assert_eq!(updated["comment"], "Since childhood");
        assert_eq!(updated["severity"]["uuid"], FEVER);
        assert_eq!(updated["voided"], false);

        SubResource::delete(&allergies, PATIENT, &uuid, &ctx).expect("void succeeds");
        let listed = SubResource::list(&allergies, PATIENT, &ctx).expect("list succeeds");
        assert_eq!(listed.results.len(), 1, "voided allergy is hidden");

        let err = SubResource::delete(&allergies, PATIENT, &uuid, &fixture.ctx(&[("purge", "true")]))
            .expect_err("allergies cannot be purged");
        assert_eq!(err.code(), "operation_not_supported");
    }

    #[test]
    fn test_allergy_payload_is_validated() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx(&[]);
        let allergies = AllergyResource::new();

        let err = SubResource::create(&allergies, PATIENT, &json!({ "comment": "?" }), &ctx)
            .expect_err("allergen is required");
        assert_eq!(err.to_string(), "Some required properties are missing: allergen");

        let err = SubResource::create(
            &allergies,
            PATIENT,
            &json!({ "allergen": { "allergenType": "FOOD" } }),
            &ctx,
        )
        .expect_err("an allergen must name something");
        assert_eq!(err.code(), "conversion");

        let err = SubResource::create(
            &allergies,
            PATIENT,
            &json!({ "allergen": { "allergenType": "MINERAL", "nonCodedAllergen": "Salt" } }),
            &ctx,
        )
        .expect_err("unknown allergen type");
        assert_eq!(err.code(), "conversion");

        let err = SubResource::create(
            &allergies,
            PATIENT,
            &json!({ "allergen": { "allergenType": "FOOD", "codedAllergen": RICE } }),
            &ctx,
        )
        .expect_err("rice is already recorded");
        assert_eq!(err.code(), "validation");
    }
}
