//! `conceptdatatype`: the fixed set of datatypes, read only.

use crate::accessors::PropertyAccessors;
use crate::context::RequestContext;
use crate::description::ResourceDescription;
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{CrudHandler, Lifecycle, Representable};
use crate::RestResult;
use emr_domain::{AuditInfo, ConceptDatatype};

pub struct ConceptDatatypeResource {
    accessors: PropertyAccessors<ConceptDatatype>,
}

impl Default for ConceptDatatypeResource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptDatatypeResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<ConceptDatatype>::new()
            .get("display", |d, _| Ok(d.name.as_str().into()))
            .get("name", |d, _| Ok(d.name.as_str().into()))
            .get("description", |d, _| Ok(d.description.clone().into()))
            .get("hl7Abbreviation", |d, _| Ok(d.hl7_abbreviation.as_str().into()));
        Self { accessors }
    }
}

impl Representable for ConceptDatatypeResource {
    type Delegate = ConceptDatatype;

    fn name(&self) -> &'static str {
        "conceptdatatype"
    }

    fn accessors(&self) -> &PropertyAccessors<ConceptDatatype> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a ConceptDatatype) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &ConceptDatatype) -> Lifecycle {
        Lifecycle::Retireable {
            retired: delegate.retire.retired,
        }
    }

    fn audit<'a>(&self, delegate: &'a ConceptDatatype) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&ConceptDatatype>,
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
            .add_property("name")
            .add_property("description")
            .add_property("hl7Abbreviation")
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
}

impl CrudHandler for ConceptDatatypeResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<ConceptDatatype>> {
        let concepts = &ctx.services().concepts;
        match concepts.get_datatype(id)? {
            Some(found) => Ok(Some(found)),
            None => Ok(concepts.get_datatype_by_name(id)?),
        }
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<ConceptDatatype>> {
        let include_all = ctx.include_all();
        let datatypes: Vec<ConceptDatatype> = ctx
            .services()
            .concepts
            .get_all_datatypes()?
            .into_iter()
            .filter(|d| include_all || !d.retire.retired)
            .collect();
        Ok(datatypes.into())
    }

    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<ConceptDatatype>> {
        let query = super::query_text(ctx).to_lowercase();
        if query.is_empty() {
            return Ok(PageableResult::Empty);
        }
        let datatypes: Vec<ConceptDatatype> = ctx
            .services()
            .concepts
            .get_all_datatypes()?
            .into_iter()
            .filter(|d| d.name.to_lowercase().contains(&query))
            .collect();
        Ok(datatypes.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::resources::testing::{Fixture, NUMERIC};
    use serde_json::json;

    #[test]
    fn test_list_and_fetch_by_name() {
        let fixture = Fixture::new();
        let resource = ConceptDatatypeResource::new();
        let all = resource.list(&fixture.ctx(&[])).expect("list succeeds");
        assert_eq!(all.results.len(), 10);

        let numeric = resource
            .retrieve("numeric", &fixture.ctx(&[]))
            .expect("found by name");
        assert_eq!(numeric["uuid"], NUMERIC);
        assert_eq!(numeric["hl7Abbreviation"], "NM");
    }

    #[test]
    fn test_is_read_only() {
        let fixture = Fixture::new();
        let resource = ConceptDatatypeResource::new();
        let ctx = fixture.ctx(&[]);

        let err = resource
            .create(&json!({ "name": "Blob" }), &ctx)
            .expect_err("create is not supported");
        assert_eq!(err.code(), "operation_not_supported");
        let err = resource.delete(NUMERIC, &ctx).expect_err("delete is not supported");
        assert_eq!(err.code(), "operation_not_supported");
        let err = resource
            .delete(NUMERIC, &fixture.ctx(&[("purge", "true")]))
            .expect_err("purge is not supported");
        assert_eq!(err.code(), "operation_not_supported");
    }

    #[test]
    fn test_search_by_query() {
        let fixture = Fixture::new();
        let found = ConceptDatatypeResource::new()
            .list(&fixture.ctx(&[("q", "date")]))
            .expect("search succeeds");
        assert_eq!(found.results.len(), 2, "Date and Datetime");
    }
}
