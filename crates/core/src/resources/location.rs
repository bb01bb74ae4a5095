//! `location`: places where care happens, arranged in a parent/child hierarchy and tagged.

use super::{linked, location_id};
use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{CrudHandler, Lifecycle, Representable};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use emr_domain::{AuditInfo, Location};
use serde_json::{Map, Value};

pub const PARAM_TAG: &str = "tag";

const ADDRESS_FIELDS: [&str; 9] = [
    "address1",
    "address2",
    "cityVillage",
    "stateProvince",
    "country",
    "postalCode",
    "latitude",
    "longitude",
    "description",
];

pub struct LocationResource {
    accessors: PropertyAccessors<Location>,
}

impl Default for LocationResource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Location>::new()
            .get("display", |l, _| Ok(l.name.as_str().into()))
            .property(
                "name",
                |l, _| Ok(l.name.as_str().into()),
                |l, v, _| {
                    let name = convert::string("name", v)?;
                    if name.trim().is_empty() {
                        return Err(RestError::conversion("name", "name cannot be blank"));
                    }
                    l.name = name;
                    Ok(())
                },
            )
            .property(
                "tags",
                |l, _| Ok(Value::from(l.tags.clone()).into()),
                set_tags,
            )
            .property(
                "parentLocation",
                |l, ctx| {
                    linked(l.parent_location.as_ref(), |id| {
                        ctx.services().locations.get_location(id)
                    })
                },
                |l, v, ctx| {
                    let parent = location_id("parentLocation", v, ctx)?;
                    if parent.as_ref() == Some(&l.uuid) {
                        return Err(RestError::conversion(
                            "parentLocation",
                            "a location cannot be its own parent",
                        ));
                    }
                    l.parent_location = parent;
                    Ok(())
                },
            )
            .get("childLocations", |l, ctx| {
                let children: Vec<Location> = ctx
                    .services()
                    .locations
                    .get_all_locations(ctx.include_all())?
                    .into_iter()
                    .filter(|child| child.parent_location.as_ref() == Some(&l.uuid))
                    .collect();
                Ok(PropertyValue::delegates(children))
            });
        let accessors = optional_text!(
            accessors,
            "description" => description,
            "address1" => address1,
            "address2" => address2,
            "cityVillage" => city_village,
            "stateProvince" => state_province,
            "country" => country,
            "postalCode" => postal_code,
            "latitude" => latitude,
            "longitude" => longitude,
        );
        Self { accessors }
    }
}

/// Replaces the tag list; blank and repeated tags are dropped.
fn set_tags(location: &mut Location, value: &Value, _ctx: &RequestContext) -> RestResult<()> {
    let mut tags: Vec<String> = Vec::new();
    for item in convert::array("tags", value)? {
        let tag = match item {
            Value::Object(_) => convert::reference_id("tags", item)?.unwrap_or_default(),
            other => convert::string("tags", other)?,
        };
        let tag = tag.trim().to_owned();
        if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            tags.push(tag);
        }
    }
    location.tags = tags;
    Ok(())
}

impl Representable for LocationResource {
    type Delegate = Location;

    fn name(&self) -> &'static str {
        "location"
    }

    fn accessors(&self) -> &PropertyAccessors<Location> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Location) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Location) -> Lifecycle {
        Lifecycle::Retireable {
            retired: delegate.retire.retired,
        }
    }

    fn audit<'a>(&self, delegate: &'a Location) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Location>,
    ) -> Option<ResourceDescription> {
        let (nested, full) = match rep {
            Representation::Default => (Representation::Ref, false),
            Representation::Full => (Representation::Default, true),
            _ => return None,
        };
        let mut description = ResourceDescription::new();
        description
            .add_property("uuid")
            .add_property("display")
            .add_property("name");
        for field in ADDRESS_FIELDS {
            description.add_property(field);
        }
        description
            .add_property("tags")
            .add_property_as("parentLocation", nested.clone())
            .add_property_as("childLocations", nested)
            .add_property("retired");
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
        fields.add_required("name");
        for field in ADDRESS_FIELDS {
            fields.add(field);
        }
        fields.add("tags").add("parentLocation");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "parentLocation" => PropertyType::Ref("location"),
            "childLocations" => PropertyType::RefList("location"),
            "tags" => PropertyType::Object,
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for LocationResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Location>> {
        let locations = &ctx.services().locations;
        match locations.get_location(id)? {
            Some(location) => Ok(Some(location)),
            None => Ok(locations.get_location_by_name(id)?),
        }
    }

    fn new_delegate(
        &self,
        _body: &Map<String, Value>,
        _ctx: &RequestContext,
    ) -> RestResult<Location> {
        Ok(Location::default())
    }

    fn save(&self, delegate: Location, ctx: &RequestContext) -> RestResult<Location> {
        Ok(ctx.services().locations.save_location(delegate)?)
    }

    fn delete_delegate(
        &self,
        mut delegate: Location,
        reason: &str,
        ctx: &RequestContext,
    ) -> RestResult<()> {
        if delegate.retire.retire(reason) {
            ctx.services().locations.save_location(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Location, _ctx: &RequestContext) -> RestResult<Location> {
        delegate.retire.unretire();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Location>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(location) = delegate {
            ctx.services()
                .locations
                .purge_location(location.uuid.as_str())?;
        }
        Ok(())
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<Location>> {
        Ok(ctx
            .services()
            .locations
            .get_all_locations(ctx.include_all())?
            .into())
    }

    /// `tag` lists tagged locations; an unknown tag finds nothing. Otherwise `q` matches names.
    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Location>> {
        if let Some(tag) = ctx.param(PARAM_TAG) {
            return Ok(match ctx.services().locations.get_locations_by_tag(tag)? {
                Some(tagged) => tagged.into(),
                None => PageableResult::Empty,
            });
        }
        let query = super::query_text(ctx);
        if query.is_empty() {
            return Ok(PageableResult::Empty);
        }
        Ok(ctx
            .services()
            .locations
            .search_locations(&query, ctx.include_all())?
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::resources::testing::{Fixture, XANADU};
    use serde_json::json;

    #[test]
    fn test_default_representation() {
        let fixture = Fixture::new();
        let location = LocationResource::new()
            .retrieve(XANADU, &fixture.ctx(&[]))
            .expect("location exists");

        assert_eq!(location["display"], "Xanadu");
        assert_eq!(location["tags"], json!(["Login Location"]));
        assert_eq!(location["parentLocation"], Value::Null);
        assert_eq!(location["childLocations"], json!([]));
        assert_eq!(location["retired"], false);
    }

    #[test]
    fn test_child_locations_follow_parent() {
        let fixture = Fixture::new();
        let resource = LocationResource::new();
        let ward = resource
            .create(
                &json!({ "name": "Ward 1", "parentLocation": XANADU, "cityVillage": "Kapina" }),
                &fixture.ctx(&[]),
            )
            .expect("child is created");
        assert_eq!(ward["parentLocation"]["uuid"], XANADU);
        assert_eq!(ward["cityVillage"], "Kapina");

        let parent = resource
            .retrieve(XANADU, &fixture.ctx(&[]))
            .expect("parent exists");
        assert_eq!(parent["childLocations"][0]["uuid"], ward["uuid"]);
        assert_eq!(parent["childLocations"][0]["display"], "Ward 1");
    }

    #[test]
    fn test_cannot_be_own_parent() {
        let fixture = Fixture::new();
        let err = LocationResource::new()
            .update(XANADU, &json!({ "parentLocation": XANADU }), &fixture.ctx(&[]))
            .expect_err("self parent is rejected");
        assert_eq!(err.code(), "conversion");
    }

    #[test]
    fn test_search_by_tag() {
        let fixture = Fixture::new();
        let resource = LocationResource::new();

        let tagged = resource
            .list(&fixture.ctx(&[("tag", "login location")]))
            .expect("tag search succeeds");
        assert_eq!(tagged.results.len(), 1);
        assert_eq!(tagged.results[0]["uuid"], XANADU);

        let unknown = resource
            .list(&fixture.ctx(&[("tag", "Nowhere")]))
            .expect("unknown tag is not an error");
        assert!(unknown.results.is_empty());
    }

    #[test]
    fn test_tags_are_deduplicated() {
        let fixture = Fixture::new();
        let updated = LocationResource::new()
            .update(
                XANADU,
                &json!({ "tags": ["Login Location", "login location", " ", "Admission"] }),
                &fixture.ctx(&[]),
            )
            .expect("tags update");
        assert_eq!(updated["tags"], json!(["Login Location", "Admission"]));
    }

    #[test]
    fn test_fetch_by_name_and_list() {
        let fixture = Fixture::new();
        let resource = LocationResource::new();
        let found = resource
            .retrieve("unknown location", &fixture.ctx(&[]))
            .expect("found by name");
        assert_eq!(found["display"], "Unknown Location");

        let all = resource.list(&fixture.ctx(&[])).expect("list succeeds");
        assert_eq!(all.results.len(), 2);
    }
}
