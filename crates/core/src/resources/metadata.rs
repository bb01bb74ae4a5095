//! One resource per [`MetadataKind`]: concept classes, encounter types, identifier types,
//! attribute types, order types and visit types share the same name/description shape.

use crate::accessors::PropertyAccessors;
use crate::context::RequestContext;
use crate::convert;
use crate::delegate::metadata_tag;
use crate::description::{FieldSet, ResourceDescription};
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{CrudHandler, Lifecycle, Representable};
use crate::{RestError, RestResult};
use emr_domain::{AuditInfo, Metadata, MetadataKind};
use serde_json::{Map, Value};

pub struct MetadataResource {
    kind: MetadataKind,
    accessors: PropertyAccessors<Metadata>,
}

impl MetadataResource {
    pub fn new(kind: MetadataKind) -> Self {
        let accessors = PropertyAccessors::<Metadata>::new()
            .get("display", |m, _| Ok(m.name.as_str().into()))
            .property(
                "name",
                |m, _| Ok(m.name.as_str().into()),
                |m, v, _| {
                    let name = convert::string("name", v)?;
                    if name.trim().is_empty() {
                        return Err(RestError::conversion("name", "name cannot be blank"));
                    }
                    m.name = name;
                    Ok(())
                },
            )
            .property(
                "description",
                |m, _| Ok(m.description.clone().into()),
                |m, v, _| {
                    m.description = convert::optional_string("description", v)?;
                    Ok(())
                },
            );
        Self { kind, accessors }
    }

    pub fn kind(&self) -> MetadataKind {
        self.kind
    }
}

impl Representable for MetadataResource {
    type Delegate = Metadata;

    fn name(&self) -> &'static str {
        metadata_tag(self.kind)
    }

    fn accessors(&self) -> &PropertyAccessors<Metadata> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Metadata) -> &'a str {
        delegate.uuid.as_str()
    }

    fn lifecycle(&self, delegate: &Metadata) -> Lifecycle {
        Lifecycle::Retireable {
            retired: delegate.retire.retired,
        }
    }

    fn audit<'a>(&self, delegate: &'a Metadata) -> Option<&'a AuditInfo> {
        Some(&delegate.audit)
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Metadata>,
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
        fields.add_required("name").add("description");
        Ok(fields)
    }
}

impl CrudHandler for MetadataResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Metadata>> {
        let metadata = &ctx.services().metadata;
        match metadata.get_metadata(self.kind, id)? {
            Some(found) => Ok(Some(found)),
            None => Ok(metadata.get_metadata_by_name(self.kind, id)?),
        }
    }

    fn new_delegate(&self, _body: &Map<String, Value>, _ctx: &RequestContext) -> RestResult<Metadata> {
        Ok(Metadata::new(self.kind, ""))
    }

    fn save(&self, delegate: Metadata, ctx: &RequestContext) -> RestResult<Metadata> {
        Ok(ctx.services().metadata.save_metadata(delegate)?)
    }

    fn delete_delegate(&self, mut delegate: Metadata, reason: &str, ctx: &RequestContext) -> RestResult<()> {
        if delegate.retire.retire(reason) {
            ctx.services().metadata.save_metadata(delegate)?;
        }
        Ok(())
    }

    fn undelete_delegate(&self, mut delegate: Metadata, _ctx: &RequestContext) -> RestResult<Metadata> {
        delegate.retire.unretire();
        Ok(delegate)
    }

    fn purge_delegate(&self, delegate: Option<Metadata>, ctx: &RequestContext) -> RestResult<()> {
        if let Some(item) = delegate {
            ctx.services()
                .metadata
                .purge_metadata(self.kind, item.uuid.as_str())?;
        }
        Ok(())
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<Metadata>> {
        Ok(ctx
            .services()
            .metadata
            .get_all_metadata(self.kind, ctx.include_all())?
            .into())
    }

    fn search_delegates(&self, ctx: &RequestContext) -> RestResult<PageableResult<Metadata>> {
        let query = super::query_text(ctx).to_lowercase();
        if query.is_empty() {
            return Ok(PageableResult::Empty);
        }
        let matches: Vec<Metadata> = ctx
            .services()
            .metadata
            .get_all_metadata(self.kind, ctx.include_all())?
            .into_iter()
            .filter(|m| m.name.to_lowercase().contains(&query))
            .collect();
        Ok(matches.into())
    }
}
