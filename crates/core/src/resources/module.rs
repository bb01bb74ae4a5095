//! `module`: installed modules, read only. A module's `uuid` is its module id.

use crate::accessors::PropertyAccessors;
use crate::context::RequestContext;
use crate::description::ResourceDescription;
use crate::paging::PageableResult;
use crate::representation::Representation;
use crate::resource::{CrudHandler, Representable};
use crate::schema::PropertyType;
use crate::RestResult;
use emr_domain::Module;

pub struct ModuleResource {
    accessors: PropertyAccessors<Module>,
}

impl Default for ModuleResource {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<Module>::new()
            .get("display", |m, _| Ok(m.name.as_str().into()))
            .get("name", |m, _| Ok(m.name.as_str().into()))
            .get("description", |m, _| Ok(m.description.clone().into()))
            .get("version", |m, _| Ok(m.version.as_str().into()))
            .get("author", |m, _| Ok(m.author.clone().into()))
            .get("started", |m, _| Ok(m.started.into()))
            .get("startupErrorMessage", |m, _| Ok(m.start_error.clone().into()))
            .get("downloadUrl", |m, _| Ok(m.download_url.clone().into()));
        Self { accessors }
    }
}

impl Representable for ModuleResource {
    type Delegate = Module;

    fn name(&self) -> &'static str {
        "module"
    }

    fn accessors(&self) -> &PropertyAccessors<Module> {
        &self.accessors
    }

    fn identifier<'a>(&self, delegate: &'a Module) -> &'a str {
        &delegate.module_id
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&Module>,
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
            .add_property("started")
            .add_property("startupErrorMessage");
        if full {
            description
                .add_property("version")
                .add_property("author")
                .add_property("downloadUrl");
        }
        description.add_self_link();
        if !full {
            description.add_link("full", ".?v=full");
        }
        Some(description)
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "started" => PropertyType::Boolean,
            "uuid" => PropertyType::String,
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for ModuleResource {
    fn fetch(&self, id: &str, ctx: &RequestContext) -> RestResult<Option<Module>> {
        Ok(ctx.services().modules.get_module(id)?)
    }

    fn list_all(&self, ctx: &RequestContext) -> RestResult<PageableResult<Module>> {
        Ok(ctx.services().modules.get_all_modules()?.into())
    }
}
