//! `person` and its `name`, `address` and `attribute` sub-resources.

use super::{child_uri, concept_id, keep_single_preferred, linked, metadata_id, metadata_name};
use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{
    check_required, set_converted_properties, CrudHandler, Lifecycle, Representable,
    SubResourceHandler,
};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use chrono::{Datelike, NaiveDate, Utc};
use emr_domain::{
    AuditInfo, EntityUuid, MetadataKind, Person, PersonAddress, PersonAttribute, PersonName,
};
use serde_json::{Map, Value};

// ===== PERSON =====

pub struct PersonResource {
    accessors: PropertyAccessors<Person>,
}

impl Default for PersonResource {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Person>::new()
            .get("display", |p, _| Ok(p.display_name().into()))
            .property(
                "gender",
                |p, _| Ok(p.gender.clone().into()),
                |p, v, _| {
                    p.gender = convert::string("gender", v)?.to_uppercase();
                    Ok(())
                },
            )
            .property(
                "age",
                |p, _| Ok(p.age().map_or(PropertyValue::Null, |a| Value::from(a).into())),
                set_age,
            )
            .property(
                "birthdate",
                |p, _| Ok(PropertyValue::date(p.birthdate)),
                |p, v, _| {
                    p.birthdate = convert::optional_date("birthdate", v)?;
                    Ok(())
                },
            )
            .property(
                "birthdateEstimated",
                |p, _| Ok(p.birthdate_estimated.into()),
                |p, v, _| {
                    p.birthdate_estimated = convert::parse_boolean("birthdateEstimated", v)?;
                    Ok(())
                },
            )
            .property(
                "dead",
                |p, _| Ok(p.dead.into()),
                |p, v, _| {
                    p.dead = convert::parse_boolean("dead", v)?;
                    Ok(())
                },
            )
            .property(
                "deathDate",
                |p, _| Ok(PropertyValue::datetime(p.death_date)),
                |p, v, _| {
                    p.death_date = convert::optional_datetime("deathDate", v)?;
                    Ok(())
                },
            )
            .property(
                "causeOfDeath",
                |p, ctx| {
                    linked(p.cause_of_death.as_ref(), |id| {
                        ctx.services().concepts.get_concept(id)
                    })
                },
                |p, v, ctx| {
                    p.cause_of_death = concept_id("causeOfDeath", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "preferredName",
                |p, _| Ok(PropertyValue::optional_delegate(p.preferred_name().cloned())),
                |p, v, _| {
                    let Some(id) = convert::reference_id("preferredName", v)? else {
                        return Ok(());
                    };
                    mark_preferred(&mut p.names, &id, |n| &n.uuid, |n| &mut n.preferred)
                        .ok_or_else(|| unknown_child("preferredName", &id))
                },
            )
            .property(
                "preferredAddress",
                |p, _| Ok(PropertyValue::optional_delegate(p.preferred_address().cloned())),
                |p, v, _| {
                    let Some(id) = convert::reference_id("preferredAddress", v)? else {
                        return Ok(());
                    };
                    mark_preferred(&mut p.addresses, &id, |a| &a.uuid, |a| &mut a.preferred)
                        .ok_or_else(|| unknown_child("preferredAddress", &id))
                },
            )
            .property(
                "names",
                |p, _| {
                    Ok(PropertyValue::delegates(
                        p.names.iter().filter(|n| !n.void.voided).cloned(),
                    ))
                },
                set_names,
            )
            .property(
                "addresses",
                |p, _| {
                    Ok(PropertyValue::delegates(
                        p.addresses.iter().filter(|a| !a.void.voided).cloned(),
                    ))
                },
                set_addresses,
            )
            .property(
                "attributes",
                |p, _| Ok(PropertyValue::delegates(p.active_attributes().cloned())),
                set_attributes,
            );
        Self { accessors }
    }
}

/// Posting an age sets an estimated birthdate on the first of January.
fn set_age(person: &mut Person, value: &Value, _ctx: &RequestContext) -> RestResult<()> {
    let Some(age) = convert::optional_number("age", value)? else {
        return Ok(());
    };
    if age < 0.0 {
        return Err(RestError::conversion("age", "age cannot be negative"));
    }
    let years = age.trunc();
    let birthdate = (years <= f64::from(i32::MAX))
        .then(|| Utc::now().year().checked_sub(years as i32))
        .flatten()
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
        .ok_or_else(|| RestError::conversion("age", format!("age {age} is out of range")))?;
    person.birthdate = Some(birthdate);
    person.birthdate_estimated = true;
    Ok(())
}

fn unknown_child(property: &str, id: &str) -> RestError {
    RestError::conversion(property, format!("{property} {id} does not belong to this person"))
}

/// Marks the child with `id` preferred and every other child not preferred.
fn mark_preferred<T>(
    items: &mut [T],
    id: &str,
    uuid: impl Fn(&T) -> &EntityUuid,
    preferred: impl Fn(&mut T) -> &mut bool,
) -> Option<()> {
    if !items.iter().any(|item| uuid(item).as_str() == id) {
        return None;
    }
    for item in items.iter_mut() {
        *preferred(item) = uuid(item).as_str() == id;
    }
    Some(())
}

/// Builds a child from a posted object with the child resource's creatable properties.
fn build_child<H>(
    handler: &H,
    property: &str,
    value: &Value,
    mut child: H::Delegate,
    ctx: &RequestContext,
) -> RestResult<H::Delegate>
where
    H: Representable,
{
    let body = convert::object(property, value)?;
    let allowed = handler.creatable_properties()?;
    check_required(&allowed, body)?;
    set_converted_properties(handler, &mut child, body, &allowed, ctx)?;
    Ok(child)
}

/// Replaces matching names by uuid and appends new ones. The first posted name is preferred
/// unless another one says so.
fn set_names(person: &mut Person, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let handler = PersonNameResource::new();
    let mut posted = Vec::new();
    for item in convert::array("names", value)? {
        let child = PersonName {
            person: Some(person.uuid.clone()),
            ..Default::default()
        };
        posted.push(build_child(&handler, "names", item, child, ctx)?);
    }
    if posted.is_empty() {
        return Ok(());
    }
    if !posted.iter().any(|n| n.preferred) {
        posted[0].preferred = true;
    }
    for existing in &mut person.names {
        existing.preferred = false;
    }
    for name in posted {
        match person.names.iter_mut().find(|n| n.uuid == name.uuid) {
            Some(existing) => *existing = name,
            None => person.names.push(name),
        }
    }
    Ok(())
}

fn set_addresses(person: &mut Person, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    let handler = PersonAddressResource::new();
    let mut posted = Vec::new();
    for item in convert::array("addresses", value)? {
        let child = PersonAddress {
            person: Some(person.uuid.clone()),
            ..Default::default()
        };
        posted.push(build_child(&handler, "addresses", item, child, ctx)?);
    }
    if posted.is_empty() {
        return Ok(());
    }
    if !posted.iter().any(|a| a.preferred) {
        posted[0].preferred = true;
    }
    for existing in &mut person.addresses {
        existing.preferred = false;
    }
    for address in posted {
        match person.addresses.iter_mut().find(|a| a.uuid == address.uuid) {
            Some(existing) => *existing = address,
            None => person.addresses.push(address),
        }
    }
    Ok(())
}

/// One active attribute per type: a posted attribute replaces the value of an existing one of
/// the same type, and a posted `null` value voids it.
fn set_attributes(person: &mut Person, value: &Value, ctx: &RequestContext) -> RestResult<()> {
    for item in convert::array("attributes", value)? {
        let body = convert::object("attributes", item)?;
        let attribute_type = body
            .get("attributeType")
            .map(|v| metadata_id(MetadataKind::PersonAttributeType, "attributeType", v, ctx))
            .transpose()?
            .flatten()
            .ok_or_else(|| {
                RestError::conversion("attributeType", "Some required properties are missing: attributeType")
            })?;
        let value = body
            .get("value")
            .map(attribute_value)
            .transpose()?
            .flatten();

        let existing = person
            .attributes
            .iter_mut()
            .find(|a| !a.void.voided && a.attribute_type.as_ref() == Some(&attribute_type));
        match (existing, value) {
            (Some(existing), Some(value)) => existing.value = Some(value),
            (Some(existing), None) => {
                existing.void.void("removed through REST");
            }
            (None, Some(value)) => person.attributes.push(PersonAttribute {
                person: Some(person.uuid.clone()),
                attribute_type: Some(attribute_type),
                value: Some(value),
                ..Default::default()
            }),
            (None, None) => {}
        }
    }
    Ok(())
}

/// Attribute values are stored as text; references are stored by uuid.
fn attribute_value(value: &Value) -> RestResult<Option<String>> {
    match value {
        Value::Object(_) => convert::reference_id("value", value),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => convert::optional_string("value", other),
    }
}

impl Representable for PersonResource {
    type Delegate = Person;

    fn name(&self) -> &'static str {
        "person"
    }

    fn accessors(&self) -> &PropertyAccessors<Person> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Person) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Person) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a Person) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Person>,
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
            .add_property("gender")
            .add_property("age")
            .add_property("birthdate")
            .add_property("birthdateEstimated")
            .add_property("dead")
            .add_property("deathDate")
            .add_property_as("causeOfDeath", Representation::Ref)
            .add_property_as("preferredName", nested.clone())
            .add_property_as("preferredAddress", nested.clone());
        if full {
            description.add_property("names").add_property("addresses");
        }
        description
            .add_property_as("attributes", nested)
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
            .add_required("names")
            .add_required("gender")
            .add("age")
            .add("birthdate")
            .add("birthdateEstimated")
            .add("dead")
            .add("deathDate")
            .add("causeOfDeath")
            .add("addresses")
            .add("attributes");
        Ok(fields)
    }

    /// Names and addresses are managed through their sub-resources once the person exists.
    fn updatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add("gender")
            .add("age")
            .add("birthdate")
            .add("birthdateEstimated")
            .add("dead")
            .add("deathDate")
            .add("causeOfDeath")
            .add("preferredName")
            .add("preferredAddress")
            .add("attributes");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "age" => PropertyType::Integer,
            "birthdate" => PropertyType::Date,
            "deathDate" => PropertyType::DateTime,
            "birthdateEstimated" | "dead" => PropertyType::Boolean,
            "causeOfDeath" => PropertyType::Ref("concept"),
            "preferredName" => PropertyType::Owned("personname"),
            "preferredAddress" => PropertyType::Owned("personaddress"),
            "names" => PropertyType::OwnedList("personname"),
            "addresses" => PropertyType::OwnedList("personaddress"),
            "attributes" => PropertyType::OwnedList("personattribute"),
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for PersonResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Person>> {
        Ok(ctx.services().persons.get_person(id)?)
    }

    fn new_delegate(&self, _body: &Map<String, Value>, _ctx: &RequestContext) -> RestResult<Person> {
        Ok(Person::default())
    }

    fn save(&self, delegate: Person, ctx: &RequestContext) -> RestResult<Person> {
        Ok(ctx.services().persons.save_person(delegate)?)
    }

    fn delete_delegate(&self, mut delegate: Person, reason: &str, ctx: &RequestContext) -> RestResult<()> {
        if delegate.void.void(reason) {
            ctx.services().persons.save_person(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Person, _ctx: &RequestContext) -> RestResult<Person> {
        delegate.void.unvoid();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Person>, ctx: &RequestContext) -> RestResult<()> {
        match delegate {
            Some(person) => Ok(ctx.services().persons.purge_person(person.uuid.as_str())?),
            None => Ok(()),
        }
    }

    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Person>> {
        let query = super::query_text(ctx);
        if query.is_empty() {
            return Ok(PageableResult::Empty);
        }
        let people = ctx
            .services()
            .persons
            .search_people(&query, ctx.include_all())?;
        Ok(PageableResult::NeedsPaging(people))
    }
}

// ===== PERSON NAME =====

pub struct PersonNameResource {
    accessors: PropertyAccessors<PersonName>,
}

impl Default for PersonNameResource {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonNameResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<PersonName>::new()
            .get("display", |n, _| Ok(n.full_name().into()))
            .property(
                "preferred",
                |n, _| Ok(n.preferred.into()),
                |n, v, _| {
                    n.preferred = convert::parse_boolean("preferred", v)?;
                    Ok(())
                },
            );
        let accessors = optional_text!(accessors,
            "prefix" => prefix,
            "givenName" => given_name,
            "middleName" => middle_name,
            "familyName" => family_name,
            "familyName2" => family_name2,
        );
        Self { accessors }
    }
}

impl Representable for PersonNameResource {
    type Delegate = PersonName;

    fn name(&self) -> &'static str {
        "personname"
    }

    fn accessors(&self) -> &PropertyAccessors<PersonName> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a PersonName) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &PersonName) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a PersonName) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn uri(&self, delegate: &PersonName, ctx: &RequestContext) -> String {
        child_uri(ctx, "person", delegate.person.as_ref(), "name", &delegate.uuid)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&PersonName>,
    ) -> Option<ResourceDescription> {
        let full = match rep {
            Representation::Default => false,
            Representation::Full => true,
            _ => return None,
        };
        let mut description = ResourceDescription::new();
        description.add_property("uuid").add_property("display");
        if full {
            description.add_property("prefix");
        }
        description
            .add_property("givenName")
            .add_property("middleName")
            .add_property("familyName")
            .add_property("familyName2");
        if full {
            description.add_property("preferred");
        }
        description.add_property("voided");
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
            .add_required("givenName")
            .add("middleName")
            .add_required("familyName")
            .add("familyName2")
            .add("prefix")
            .add("preferred");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "preferred" => PropertyType::Boolean,
            other => PropertyType::common(other),
        }
    }
}

impl SubResourceHandler for PersonNameResource {
    type Parent = Person;

    fn parent_resource(&self) -> &'static str {
        "person"
    }

    fn path(&self) -> &'static str {
        "name"
    }

    fn fetch_parent(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Person>> {
        Ok(ctx.services().persons.get_person(id)?)
    }

    fn children<'a>(&self, parent: &'a Person) -> &'a [PersonName] {
        &parent.names
    }

    fn children_mut<'a>(&self, parent: &'a mut Person) -> &'a mut Vec<PersonName> {
        &mut parent.names
    }

    fn new_child(&self, parent: &Person) -> PersonName {
        PersonName {
            person: Some(parent.uuid.clone()),
            ..Default::default()
        }
    }

    fn save_parent(&self, parent: Person, ctx: &RequestContext) -> RestResult<Person> {
        Ok(ctx.services().persons.save_person(parent)?)
    }

    fn void_child(&self, child: &mut PersonName, reason: &str) -> RestResult<bool> {
        Ok(child.void.void(reason))
    }

    fn unvoid_child(&self, child: &mut PersonName) -> RestResult<()> {
        child.void.unvoid();
        Ok(())
    }

    fn after_change(&self, parent: &mut Person, child_id: &str) -> RestResult<()> {
        keep_single_preferred(&mut parent.names, child_id, |n| &n.uuid, |n| &mut n.preferred);
        Ok(())
    }
}

// ===== PERSON ADDRESS =====

pub struct PersonAddressResource {
    accessors: PropertyAccessors<PersonAddress>,
}

impl Default for PersonAddressResource {
    fn default() -> Self {
        Self::new()
    }
}

const ADDRESS_FIELDS: [&str; 10] = [
    "address1",
    "address2",
    "cityVillage",
    "stateProvince",
    "country",
    "postalCode",
    "countyDistrict",
    "latitude",
    "longitude",
    "preferred",
];

impl PersonAddressResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<PersonAddress>::new()
            .get("display", |a, _| {
                Ok(a.address1.clone().or_else(|| a.city_village.clone()).into())
            })
            .property(
                "preferred",
                |a, _| Ok(a.preferred.into()),
                |a, v, _| {
                    a.preferred = convert::parse_boolean("preferred", v)?;
                    Ok(())
                },
            )
            .property(
                "startDate",
                |a, _| Ok(PropertyValue::datetime(a.start_date)),
                |a, v, _| {
                    a.start_date = convert::optional_datetime("startDate", v)?;
                    Ok(())
                },
            )
            .property(
                "endDate",
                |a, _| Ok(PropertyValue::datetime(a.end_date)),
                |a, v, _| {
                    a.end_date = convert::optional_datetime("endDate", v)?;
                    Ok(())
                },
            );
        let accessors = optional_text!(accessors,
            "address1" => address1,
            "address2" => address2,
            "cityVillage" => city_village,
            "stateProvince" => state_province,
            "country" => country,
            "postalCode" => postal_code,
            "countyDistrict" => county_district,
            "latitude" => latitude,
            "longitude" => longitude,
        );
        Self { accessors }
    }
}

impl Representable for PersonAddressResource {
    type Delegate = PersonAddress;

    fn name(&self) -> &'static str {
        "personaddress"
    }

    fn accessors(&self) -> &PropertyAccessors<PersonAddress> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a PersonAddress) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &PersonAddress) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a PersonAddress) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn uri(&self, delegate: &PersonAddress, ctx: &RequestContext) -> String {
        child_uri(ctx, "person", delegate.person.as_ref(), "address", &delegate.uuid)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&PersonAddress>,
    ) -> Option<ResourceDescription> {
        let full = match rep {
            Representation::Default => false,
            Representation::Full => true,
            _ => return None,
        };
        let mut description = ResourceDescription::new();
        description.add_property("uuid").add_property("display");
        for field in ADDRESS_FIELDS {
            description.add_property(field);
        }
        if full {
            description
                .add_property("startDate")
                .add_property("endDate")
                .add_property("voided")
                .add_property("auditInfo");
        } else {
            description.add_property("voided");
        }
        description.add_self_link();
        if !full {
            description.add_link("full", ".?v=full");
        }
        Some(description)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        for field in ADDRESS_FIELDS {
            fields.add(field);
        }
        fields.add("startDate").add("endDate");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "preferred" => PropertyType::Boolean,
            "startDate" | "endDate" => PropertyType::DateTime,
            other => PropertyType::common(other),
        }
    }
}

impl SubResourceHandler for PersonAddressResource {
    type Parent = Person;

    fn parent_resource(&self) -> &'static str {
        "person"
    }

    fn path(&self) -> &'static str {
        "address"
    }

    fn fetch_parent(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Person>> {
        Ok(ctx.services().persons.get_person(id)?)
    }

    fn children<'a>(&self, parent: &'a Person) -> &'a [PersonAddress] {
        &parent.addresses
    }

    fn children_mut<'a>(&self, parent: &'a mut Person) -> &'a mut Vec<PersonAddress> {
        &mut parent.addresses
    }

    fn new_child(&self, parent: &Person) -> PersonAddress {
        PersonAddress {
            person: Some(parent.uuid.clone()),
            ..Default::default()
        }
    }

    fn save_parent(&self, parent: Person, ctx: &RequestContext) -> RestResult<Person> {
        Ok(ctx.services().persons.save_person(parent)?)
    }

    fn void_child(&self, child: &mut PersonAddress, reason: &str) -> RestResult<bool> {
        Ok(child.void.void(reason))
    }

    fn unvoid_child(&self, child: &mut PersonAddress) -> RestResult<()> {
        child.void.unvoid();
        Ok(())
    }

    fn after_change(&self, parent: &mut Person, child_id: &str) -> RestResult<()> {
        keep_single_preferred(
            &mut parent.addresses,
            child_id,
            |a| &a.uuid,
            |a| &mut a.preferred,
        );
        Ok(())
    }
}

// ===== PERSON ATTRIBUTE =====

pub struct PersonAttributeResource {
    accessors: PropertyAccessors<PersonAttribute>,
}

impl Default for PersonAttributeResource {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonAttributeResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<PersonAttribute>::new()
            .get("display", |a, ctx| {
                let type_name = metadata_name(
                    MetadataKind::PersonAttributeType,
                    a.attribute_type.as_ref(),
                    ctx,
                )?;
                Ok(format!("{} = {}", type_name, a.value.as_deref().unwrap_or_default()).into())
            })
            .property(
                "attributeType",
                |a, ctx| {
                    linked(a.attribute_type.as_ref(), |id| {
                        ctx.services()
                            .metadata
                            .get_metadata(MetadataKind::PersonAttributeType, id)
                    })
                },
                |a, v, ctx| {
                    a.attribute_type =
                        metadata_id(MetadataKind::PersonAttributeType, "attributeType", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "value",
                |a, _| Ok(a.value.clone().into()),
                |a, v, _| {
                    a.value = attribute_value(v)?;
                    Ok(())
                },
            );
        Self { accessors }
    }
}

impl Representable for PersonAttributeResource {
    type Delegate = PersonAttribute;

    fn name(&self) -> &'static str {
        "personattribute"
    }

    fn accessors(&self) -> &PropertyAccessors<PersonAttribute> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a PersonAttribute) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &PersonAttribute) -> Lifecycle {
        Lifecycle::Voidable {
            voided: delegate.void.voided,
        }
    }

    fn audit<'a>(&self, delegate: &'a PersonAttribute) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn uri(&self, delegate: &PersonAttribute, ctx: &RequestContext) -> String {
        child_uri(ctx, "person", delegate.person.as_ref(), "attribute", &delegate.uuid)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&PersonAttribute>,
    ) -> Option<ResourceDescription> {
        let full = match rep {
            Representation::Default => false,
            Representation::Full => true,
            _ => return None,
        };
        let mut description = ResourceDescription::new();
        description
            .add_property("uuid")
            .add_property("display")
            .add_property("value")
            .add_property_as("attributeType", Representation::Ref)
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
        fields.add_required("attributeType").add_required("value");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "attributeType" => PropertyType::Ref("personattributetype"),
            other => PropertyType::common(other),
        }
    }
}

impl SubResourceHandler for PersonAttributeResource {
    type Parent = Person;

    fn parent_resource(&self) -> &'static str {
        "person"
    }

    fn path(&self) -> &'static str {
        "attribute"
    }

    fn fetch_parent(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Person>> {
        Ok(ctx.services().persons.get_person(id)?)
    }

    fn children<'a>(&self, parent: &'a Person) -> &'a [PersonAttribute] {
        &parent.attributes
    }

    fn children_mut<'a>(&self, parent: &'a mut Person) -> &'a mut Vec<PersonAttribute> {
        &mut parent.attributes
    }

    fn new_child(&self, parent: &Person) -> PersonAttribute {
        PersonAttribute {
            person: Some(parent.uuid.clone()),
            ..Default::default()
        }
    }

    fn save_parent(&self, parent: Person, ctx: &RequestContext) -> RestResult<Person> {
        Ok(ctx.services().persons.save_person(parent)?)
    }

    fn void_child(&self, child: &mut PersonAttribute, reason: &str) -> RestResult<bool> {
        Ok(child.void.void(reason))
    }

    fn unvoid_child(&self, child: &mut PersonAttribute) -> RestResult<()> {
        child.void.unvoid();
        Ok(())
    }

    /// A new attribute voids any other active attribute of the same type.
    fn after_change(&self, parent: &mut Person, child_id: &str) -> RestResult<()> {
        let Some(attribute_type) = parent
            .attributes
            .iter()
            .find(|a| a.uuid.as_str() == child_id)
            .and_then(|a| a.attribute_type.clone())
        else {
            return Ok(());
        };
        for other in parent.attributes.iter_mut().filter(|a| {
            a.uuid.as_str() != child_id && a.attribute_type.as_ref() == Some(&attribute_type)
        }) {
            other.void.void("replaced through REST");
        }
        Ok(())
    }
}
