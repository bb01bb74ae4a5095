//! `moduleaction`: start, stop, restart, unload or install modules. Create only; the posted
//! action runs when the delegate is saved, and the affected modules are rendered back.

use crate::accessors::{PropertyAccessors, PropertyValue};
use crate::context::RequestContext;
use crate::convert;
use crate::description::{FieldSet, ResourceDescription};
use crate::representation::Representation;
use crate::resource::{not_supported, CrudHandler, Representable};
use crate::schema::PropertyType;
use crate::{RestError, RestResult};
use emr_domain::memory::REST_MODULE_ID;
use emr_domain::{DomainError, Module};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Restart,
    Unload,
    Install,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Start,
        Action::Stop,
        Action::Restart,
        Action::Unload,
        Action::Install,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Unload => "unload",
            Action::Install => "install",
        }
    }

    /// Case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One posted action. `requested` holds the ids as posted; `modules` is filled in once the
/// action has run.
#[derive(Clone, Debug, Default)]
pub struct ModuleAction {
    pub requested: Vec<String>,
    pub all_modules: bool,
    pub action: Option<Action>,
    pub install_uri: Option<String>,
    pub modules: Vec<Module>,
}

pub struct ModuleActionResource {
    accessors: PropertyAccessors<ModuleAction>,
}

impl Default for ModuleActionResource {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleActionResource {
    pub fn new() -> Self {
        let accessors = PropertyAccessors::<ModuleAction>::new()
            .property(
                "modules",
                |a, _| Ok(PropertyValue::delegates(a.modules.iter().cloned())),
                |a, v, _| {
                    let mut requested = Vec::new();
                    for item in convert::array("modules", v)? {
                        if let Some(id) = convert::reference_id("modules", item)? {
                            requested.push(id);
                        }
                    }
                    a.requested = requested;
                    Ok(())
                },
            )
            .property(
                "allModules",
                |a, _| Ok(a.all_modules.into()),
                |a, v, _| {
                    a.all_modules = convert::parse_boolean("allModules", v)?;
                    Ok(())
                },
            )
            .property(
                "action",
                |a, _| Ok(a.action.map(|action| action.as_str().to_owned()).into()),
                |a, v, _| {
                    let raw = convert::string("action", v)?;
                    let action = Action::parse(&raw).ok_or_else(|| {
                        RestError::conversion("action", format!("{raw} is not a module action"))
                    })?;
                    a.action = Some(action);
                    Ok(())
                },
            )
            .property(
                "installUri",
                |a, _| Ok(a.install_uri.clone().into()),
                |a, v, _| {
                    a.install_uri = convert::optional_string("installUri", v)?;
                    Ok(())
                },
            );
        Self { accessors }
    }

    /// The modules the action applies to; `None` marks an id that is not loaded.
    fn target_modules(
        &self,
        action: &ModuleAction,
        ctx: &RequestContext,
    ) -> RestResult<Vec<Option<Module>>> {
        let modules = &ctx.services().modules;
        if action.all_modules {
            return Ok(modules.get_all_modules()?.into_iter().map(Some).collect());
        }
        action
            .requested
            .iter()
            .map(|id| modules.get_module(id).map_err(RestError::from))
            .collect()
    }

    fn install(
        &self,
        targets: Vec<Option<Module>>,
        install_uri: Option<&str>,
        ctx: &RequestContext,
    ) -> RestResult<Module> {
        let uri = install_uri
            .filter(|uri| url::Url::parse(uri).is_ok())
            .ok_or_else(|| {
                RestError::IllegalRequest(
                    "The installUri needs to be a URL for this action to be performed".into(),
                )
            })?;
        let modules = &ctx.services().modules;
        if let Some(Some(existing)) = targets.into_iter().next() {
            if existing.started {
                modules.stop_module(&existing.module_id)?;
            }
            modules.unload_module(&existing.module_id)?;
            tracing::debug!("replacing module {} from {}", existing.module_id, uri);
        }
        Ok(modules.install_module(uri)?)
    }

    fn start(&self, targets: Vec<Module>, ctx: &RequestContext) -> RestResult<Vec<Module>> {
        let modules = &ctx.services().modules;
        let mut started = Vec::with_capacity(targets.len());
        let mut errors = Vec::new();
        for module in targets {
            let module = if module.started {
                module
            } else {
                modules.start_module(&module.module_id)?
            };
            if !module.started {
                if let Some(error) = &module.start_error {
                    errors.push(error.clone());
                }
            }
            started.push(module);
        }
        if !errors.is_empty() {
            return Err(DomainError::Conflict(errors.join("; ")).into());
        }
        Ok(started)
    }

    fn stop(&self, targets: Vec<Module>, ctx: &RequestContext) -> RestResult<Vec<Module>> {
        let modules = &ctx.services().modules;
        targets
            .into_iter()
            .map(|module| {
                if module.started {
                    modules.stop_module(&module.module_id).map_err(RestError::from)
                } else {
                    Ok(module)
                }
            })
            .collect()
    }

    fn unload(&self, targets: Vec<Module>, ctx: &RequestContext) -> RestResult<Vec<Module>> {
        let modules = &ctx.services().modules;
        for module in &targets {
            if module.started {
                modules.stop_module(&module.module_id)?;
            }
            modules.unload_module(&module.module_id)?;
        }
        Ok(targets)
    }

    fn run(&self, mut delegate: ModuleAction, ctx: &RequestContext) -> RestResult<ModuleAction> {
        let action = delegate
            .action
            .ok_or_else(|| RestError::conversion("action", "action cannot be null"))?;
        let targets = self.target_modules(&delegate, ctx)?;
        if targets.is_empty() {
            return Err(RestError::IllegalRequest(format!(
                "Cannot execute action {action} on empty set of modules."
            )));
        }

        delegate.modules = match action {
            Action::Install => vec![self.install(targets, delegate.install_uri.as_deref(), ctx)?],
            Action::Start => self.start(loaded_targets(targets, delegate.all_modules)?, ctx)?,
            Action::Stop => self.stop(loaded_targets(targets, delegate.all_modules)?, ctx)?,
            Action::Restart => {
                let stopped = self.stop(loaded_targets(targets, delegate.all_modules)?, ctx)?;
                self.start(stopped, ctx)?
            }
            Action::Unload => self.unload(loaded_targets(targets, delegate.all_modules)?, ctx)?,
        };
        tracing::info!(
            "module action {} applied to {} module(s)",
            action,
            delegate.modules.len()
        );
        Ok(delegate)
    }
}

/// Every target must be loaded, and the REST module itself is off limits. With `allModules`
/// the REST module is skipped instead of rejected.
fn loaded_targets(targets: Vec<Option<Module>>, all_modules: bool) -> RestResult<Vec<Module>> {
    let mut loaded = Vec::with_capacity(targets.len());
    for target in targets {
        let Some(module) = target else {
            return Err(RestError::IllegalRequest(
                "One or more of the modules you specified are not loaded on this server".into(),
            ));
        };
        if module.module_id == REST_MODULE_ID {
            if all_modules {
                continue;
            }
            return Err(RestError::IllegalRequest(format!(
                "You are not allowed to modify {REST_MODULE_ID} via this REST call"
            )));
        }
        loaded.push(module);
    }
    Ok(loaded)
}

impl Representable for ModuleActionResource {
    type Delegate = ModuleAction;

    fn name(&self) -> &'static str {
        "moduleaction"
    }

    fn accessors(&self) -> &PropertyAccessors<ModuleAction> {
        &self.accessors
    }

    /// Actions are never stored, so they have no id of their own.
    fn identifier<'a>(&self, _delegate: &'a ModuleAction) -> &'a str {
        ""
    }

    fn representation_description(
        &self,
        rep: &Representation,
        _delegate: Option<&ModuleAction>,
    ) -> Option<ResourceDescription> {
        if matches!(rep, Representation::Custom(_)) {
            return None;
        }
        let mut description = ResourceDescription::new();
        description
            .add_property_as("modules", Representation::Ref)
            .add_property("action");
        Some(description)
    }

    fn creatable_properties(&self) -> RestResult<FieldSet> {
        let mut fields = FieldSet::new();
        fields
            .add("modules")
            .add("allModules")
            .add("installUri")
            .add_required("action");
        Ok(fields)
    }

    fn updatable_properties(&self) -> RestResult<FieldSet> {
        Err(not_supported(self.name(), "update"))
    }

    fn property_type(&self, name: &str) -> PropertyType {
        match name {
            "modules" => PropertyType::RefList("module"),
            "allModules" => PropertyType::Boolean,
            other => PropertyType::common(other),
        }
    }
}

impl CrudHandler for ModuleActionResource {
    fn fetch(&self, _id: &str, _ctx: &RequestContext) -> RestResult<Option<ModuleAction>> {
        Err(not_supported(self.name(), "retrieve"))
    }

    fn new_delegate(
        &self,
        _body: &Map<String, Value>,
        _ctx: &RequestContext,
    ) -> RestResult<ModuleAction> {
        Ok(ModuleAction::default())
    }

    fn save(&self, delegate: ModuleAction, ctx: &RequestContext) -> RestResult<ModuleAction> {
        self.run(delegate, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::resources::testing::Fixture;
    use serde_json::json;

    fn module_started(fixture: &Fixture, id: &str) -> Option<bool> {
        fixture
            .services
            .modules
            .get_module(id)
            .expect("module lookup")
            .map(|m| m.started)
    }

    #[test]
    fn test_stop_and_start_module() {
        let fixture = Fixture::new();
        let resource = ModuleActionResource::new();
        let ctx = fixture.ctx(&[]);

        let stopped = resource
            .create(&json!({ "action": "stop", "modules": ["reporting"] }), &ctx)
            .expect("stop succeeds");
        assert_eq!(stopped["action"], "stop");
        assert_eq!(stopped["modules"][0]["uuid"], "reporting");
        assert_eq!(module_started(&fixture, "reporting"), Some(false));

        resource
            .create(&json!({ "action": "START", "modules": [{ "uuid": "reporting" }] }), &ctx)
            .expect("start succeeds");
        assert_eq!(module_started(&fixture, "reporting"), Some(true));
    }

    #[test]
    fn test_empty_module_set_is_rejected() {
        let fixture = Fixture::new();
        let err = ModuleActionResource::new()
            .create(&json!({ "action": "start", "modules": [] }), &fixture.ctx(&[]))
            .expect_err("no modules");
        assert_eq!(err.code(), "illegal_request");
        assert_eq!(
            err.to_string(),
            "illegal request: Cannot execute action start on empty set of modules."
        );
    }

    #[test]
    fn test_rest_module_cannot_be_modified() {
        let fixture = Fixture::new();
        let err = ModuleActionResource::new()
            .create(
                &json!({ "action": "stop", "modules": [REST_MODULE_ID] }),
                &fixture.ctx(&[]),
            )
            .expect_err("rest module is protected");
        assert_eq!(err.code(), "illegal_request");
        assert_eq!(module_started(&fixture, REST_MODULE_ID), Some(true));
    }

    #[test]
    fn test_all_modules_skips_rest_module() {
        let fixture = Fixture::new();
        let stopped = ModuleActionResource::new()
            .create(&json!({ "action": "stop", "allModules": true }), &fixture.ctx(&[]))
            .expect("stop all succeeds");
        assert_eq!(stopped["modules"].as_array().map(Vec::len), Some(1));
        assert_eq!(module_started(&fixture, "reporting"), Some(false));
        assert_eq!(module_started(&fixture, REST_MODULE_ID), Some(true));
    }

    #[test]
    fn test_unknown_module_is_rejected() {
        let fixture = Fixture::new();
        let err = ModuleActionResource::new()
            .create(
                &json!({ "action": "restart", "modules": ["reporting", "nope"] }),
                &fixture.ctx(&[]),
            )
            .expect_err("nope is not loaded");
        assert_eq!(err.code(), "illegal_request");
    }

    #[test]
    fn test_install_requires_url() {
        let fixture = Fixture::new();
        let resource = ModuleActionResource::new();
        let ctx = fixture.ctx(&[]);
        let err = resource
            .create(
                &json!({ "action": "install", "modules": ["idgen"], "installUri": "idgen.omod" }),
                &ctx,
            )
            .expect_err("not a url");
        assert_eq!(err.code(), "illegal_request");

        let installed = resource
            .create(
                &json!({
                    "action": "install",
                    "modules": ["idgen"],
                    "installUri": "https://modules.example.org/idgen-4.1.omod",
                }),
                &ctx,
            )
            .expect("install succeeds");
        assert_eq!(installed["modules"][0]["uuid"], "idgen");
        assert_eq!(module_started(&fixture, "idgen"), Some(true));
    }

    #[test]
    fn test_unload_removes_module() {
        let fixture = Fixture::new();
        ModuleActionResource::new()
            .create(&json!({ "action": "unload", "modules": ["reporting"] }), &fixture.ctx(&[]))
            .expect("unload succeeds");
        assert_eq!(module_started(&fixture, "reporting"), None);
    }

    #[test]
    fn test_action_is_required_and_validated() {
        let fixture = Fixture::new();
        let resource = ModuleActionResource::new();
        let err = resource
            .create(&json!({ "modules": ["reporting"] }), &fixture.ctx(&[]))
            .expect_err("action is required");
        assert_eq!(err.code(), "conversion");

        let err = resource
            .create(&json!({ "action": "reboot", "modules": ["reporting"] }), &fixture.ctx(&[]))
            .expect_err("unknown action");
        assert_eq!(err.code(), "conversion");

        let err = resource
            .retrieve("anything", &fixture.ctx(&[]))
            .expect_err("retrieve is not supported");
        assert_eq!(err.code(), "operation_not_supported");
    }
}
