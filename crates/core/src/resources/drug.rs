//! `drug`: formulary entries, each backed by a concept.

use super::{concept_id, linked};
use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{CrudHandler, Lifecycle, Representable};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use emr_domain::{AuditInfo, Drug};
use serde_json::{Map, Value};

macro_rules! optional_dose {
    ($accessors:expr, $($name:literal => $field:ident),+ $(,)?) => {
        $accessors$(.property(
            $name,
            |d, _| Ok(PropertyValue::number(d.$field)),
            |d, v, _| {
                d.$field = convert::optional_number($name, v)?;
                Ok(())
            },
        ))+
    };
}

pub struct DrugResource {
    accessors: PropertyAccessors<Drug>,
}

impl Default for DrugResource {
    fn default() -> Self {
        Self::new()
    }
}

impl DrugResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Drug>::new()
            .get("display", |d, _| Ok(d.name.as_str().into()))
            .property(
                "name",
                |d, _| Ok(d.name.as_str().into()),
                |d, v, _| {
                    let name = convert::string("name", v)?;
                    if name.trim().is_empty() {
                        return Err(RestError::conversion("name", "name cannot be blank"));
                    }
                    d.name = name;
                    Ok(())
                },
            )
            .property(
                "concept",
                |d, ctx| linked(d.concept.as_ref(), |id| ctx.services().concepts.get_concept(id)),
                |d, v, ctx| {
                    d.concept = concept_id("concept", v, ctx)?;
                    if d.concept.is_none() {
                        return Err(RestError::conversion("concept", "concept cannot be null"));
                    }
                    Ok(())
                },
            )
            .property(
                "dosageForm",
                |d, ctx| {
                    linked(d.dosage_form.as_ref(), |id| {
                        ctx.services().concepts.get_concept(id)
                    })
                },
                |d, v, ctx| {
                    d.dosage_form = concept_id("dosageForm", v, ctx)?;
                    Ok(())
                },
            )
            .property(
                "combination",
                |d, _| Ok(d.combination.into()),
                |d, v, _| {
                    d.combination = convert::parse_boolean("combination", v)?;
                    Ok(())
                },
            );
        let accessors = optional_dose!(
            accessors,
            "doseStrength" => dose_strength,
            "maximumDailyDose" => maximum_daily_dose,
            "minimumDailyDose" => minimum_daily_dose,
        );
        let accessors = optional_text!(accessors, "units" => units);
        Self { accessors }
    }
}

impl Representable for DrugResource {
    type Delegate = Drug;

    fn name(&self) -> &'static str {
        "drug"
    }

    fn accessors(&self) -> &PropertyAccessors<Drug> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Drug) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Drug) -> Lifecycle {
        Lifecycle::Retireable {
            retired: delegate.retire.retired,
        }
    }

    fn audit<'a>(&self, delegate: &'a Drug) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Drug>,
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
            .add_property("name")
            .add_property("retired")
            .add_property_as("dosageForm", nested.clone())
            .add_property("doseStrength")
            .add_property("maximumDailyDose")
            .add_property("minimumDailyDose")
            .add_property("units")
            .add_property_as("concept", nested)
            .add_property("combination");
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
            .add_required("name")
            .add_required("concept")
            .add("combination")
            .add("dosageForm")
            .add("doseStrength")
            .add("maximumDailyDose")
            .add("minimumDailyDose")
            .add("units");
        Ok(fields)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "concept" | "dosageForm" => PropertyType::Ref("concept"),
            "combination" => PropertyType::Boolean,
            "doseStrength" | "maximumDailyDose" | "minimumDailyDose" => PropertyType::Number,
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for DrugResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Drug>> {
        let concepts = &ctx.services().concepts;
        match concepts.get_drug(id)? {
            Some(drug) => Ok(Some(drug)),
            None => Ok(concepts.get_drug_by_name(id)?),
        }
    }

    fn new_delegate(&self, _body: &Map<String, Value>, _ctx: &RequestContext) -> RestResult<Drug> {
        Ok(Drug::default())
    }

    fn save(&self, delegate: Drug, ctx: &RequestContext) -> RestResult<Drug> {
        Ok(ctx.services().concepts.save_drug(delegate)?)
    }

    fn delete_delegate(&self, mut delegate: Drug, reason: &str, ctx: &RequestContext) -> RestResult<()> {
        if delegate.retire.retire(reason) {
            ctx.services().concepts.save_drug(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Drug, _ctx: &RequestContext) -> RestResult<Drug> {
        delegate.retire.unretire();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Drug>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(drug) = delegate {
            ctx.services().concepts.purge_drug(drug.uuid.as_str())?;
        }
        Ok(())
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<Drug>> {
        Ok(ctx.services().concepts.get_all_drugs(ctx.include_all())?.into())
    }

    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Drug>> {
        let query = super::query_text(ctx);
        if query.is_empty() {
            return Ok(PageableResult::Empty);
        }
        Ok(ctx
            .services()
            .concepts
            .search_drugs(&query, ctx.include_all())?
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::resources::testing::{Fixture, ASPIRIN, RICE, WEIGHT};
    use serde_json::json;

    #[test]
    fn test_default_representation_nests_concept_as_ref() {
        let fixture = Fixture::new();
        let drug = DrugResource::new()
            .retrieve(ASPIRIN, &fixture.ctx(&[]))
            .expect("drug exists");

        assert_eq!(drug["display"], "Aspirin");
        assert_eq!(drug["combination"], false);
        assert_eq!(drug["concept"]["uuid"], RICE);
        assert_eq!(drug["concept"]["display"], "RICE");
        assert!(drug["concept"].get("datatype").is_none(), "ref only");
        assert_eq!(drug["dosageForm"], Value::Null);
        assert!(drug.get("auditInfo").is_none());
    }

    #[test]
    fn test_fetch_falls_back_to_name() {
        let fixture = Fixture::new();
        let drug = DrugResource::new()
            .retrieve("aspirin", &fixture.ctx(&[("v", "full")]))
            .expect("found by name");
        assert_eq!(drug["uuid"], ASPIRIN);
        assert!(drug["concept"].get("datatype").is_some(), "full nests default");
        assert!(drug.get("auditInfo").is_some());
    }

    #[test]
    fn test_create_and_update_doses() {
        let fixture = Fixture::new();
        let resource = DrugResource::new();
        let created = resource
            .create(
                &json!({
                    "name": "Scale weight",
                    "concept": WEIGHT,
                    "doseStrength": 500,
                    "units": "mg",
                    "combination": "yes"
                }),
                &fixture.ctx(&[]),
            )
            .expect("drug is created");
        assert_eq!(created["doseStrength"], 500.0);
        assert_eq!(created["units"], "mg");
        assert_eq!(created["combination"], true);

        let uuid = created["uuid"].as_str().expect("uuid");
        let updated = resource
            .update(uuid, &json!({ "maximumDailyDose": "4000" }), &fixture.ctx(&[]))
            .expect("update succeeds");
        assert_eq!(updated["maximumDailyDose"], 4000.0);
        assert_eq!(updated["doseStrength"], 500.0);
    }

    #[test]
    fn test_create_requires_concept() {
        let fixture = Fixture::new();
        let err = DrugResource::new()
            .create(&json!({ "name": "Orphan" }), &fixture.ctx(&[]))
            .expect_err("concept is required");
        assert_eq!(err.code(), "conversion");

        let err = DrugResource::new()
            .create(
                &json!({ "name": "Orphan", "concept": "no-such-concept" }),
                &fixture.ctx(&[]),
            )
            .expect_err("concept must exist");
        assert_eq!(err.code(), "conversion");
    }

    #[test]
    fn test_retire_hides_from_search() {
        let fixture = Fixture::new();
        let resource = DrugResource::new();
        resource
            .delete(ASPIRIN, &fixture.ctx(&[("reason", "recalled")]))
            .expect("retire succeeds");

        let found = resource
            .list(&fixture.ctx(&[("q", "asp")]))
            .expect("search succeeds");
        assert!(found.results.is_empty());

        let restored = resource
            .update(ASPIRIN, &json!({ "retired": false }), &fixture.ctx(&[]))
            .expect("unretire succeeds");
        assert_eq!(restored["retired"], false);
        let found = resource
            .list(&fixture.ctx(&[("q", "asp")]))
            .expect("search succeeds");
        assert_eq!(found.results.len(), 1);
    }
}
