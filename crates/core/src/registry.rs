//! Resource registry: name to handler lookup for resources, sub-resources and converters.

use crate::context::RequestContext;
use crate::delegate::Delegate;
use crate::representation::Representation;
use crate::resource::{Converter, CrudHandler, Resource, SubResource, SubResourceHandler};
use crate::resources;
use crate::{RestError, RestResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Summary of a registered resource, as listed by the CLI and the catalogue endpoint.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub name: String,
    pub version: String,
    pub sub_resources: Vec<String>,
}

#[derive(Default)]
pub struct ResourceRegistry {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    sub_resources: BTreeMap<(&'static str, &'static str), Arc<dyn SubResource>>,
    converters: BTreeMap<&'static str, Arc<dyn Converter>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every shipped resource, sub-resource and converter.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        resources::register_all(&mut registry);
        tracing::debug!(
            resources = registry.resources.len(),
            sub_resources = registry.sub_resources.len(),
            converters = registry.converters.len(),
            "resource registry built"
        );
        registry
    }

    /// Registers a top-level resource and its converter. A second registration of the same name
    /// replaces the first.
    pub fn register<H: CrudHandler>(&mut self, handler: H) -> &mut Self {
        let handler = Arc::new(handler);
        let name = handler.resource_name();
        if self.resources.contains_key(name) {
            tracing::warn!("resource {name} registered twice; keeping the later one");
        }
        self.converters.insert(name, handler.clone());
        self.resources.insert(name, handler);
        self
    }

    pub fn register_sub_resource<H: SubResourceHandler>(&mut self, handler: H) -> &mut Self {
        let handler = Arc::new(handler);
        let key = (handler.parent_name(), handler.sub_path());
        if self.sub_resources.contains_key(&key) {
            tracing::warn!(
                "sub-resource {}/{} registered twice; keeping the later one",
                key.0,
                key.1
            );
        }
        self.converters.insert(handler.resource_name(), handler.clone());
        self.sub_resources.insert(key, handler);
        self
    }

    /// Registers a converter for a delegate type that has no endpoint of its own.
    pub fn register_converter<C: Converter + 'static>(&mut self, converter: C) -> &mut Self {
        self.converters
            .insert(converter.resource_name(), Arc::new(converter));
        self
    }

    pub fn resource(&self, name: &str) -> RestResult<&Arc<dyn Resource>> {
        self.resources
            .get(name)
            .ok_or_else(|| RestError::ObjectNotFound(format!("unknown resource {name}")))
    }

    pub fn sub_resource(&self, parent: &str, path: &str) -> RestResult<&Arc<dyn SubResource>> {
        self.sub_resources
            .iter()
            .find(|((p, s), _)| *p == parent && *s == path)
            .map(|(_, sub)| sub)
            .ok_or_else(|| RestError::ObjectNotFound(format!("unknown sub-resource {parent}/{path}")))
    }

    pub fn converter(&self, name: &str) -> Option<&Arc<dyn Converter>> {
        self.converters.get(name)
    }

    pub fn converters(&self) -> impl Iterator<Item = &Arc<dyn Converter>> {
        self.converters.values()
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    pub fn resource_infos(&self) -> Vec<ResourceInfo> {
        self.resources
            .values()
            .map(|r| ResourceInfo {
                name: r.resource_name().into(),
                version: r.version().into(),
                sub_resources: self
                    .sub_resources
                    .keys()
                    .filter(|(parent, _)| *parent == r.resource_name())
                    .map(|(_, path)| (*path).to_owned())
                    .collect(),
            })
            .collect()
    }

    /// Renders a nested delegate with the converter registered for its tag.
    pub fn render(
        &self,
        delegate: &Delegate,
        rep: &Representation,
        ctx: &RequestContext,
    ) -> RestResult<Value> {
        let converter = self.converter(delegate.tag()).ok_or_else(|| {
            RestError::conversion(
                delegate.tag(),
                format!("no converter registered for {}", delegate.tag()),
            )
        })?;
        converter.render(delegate, rep, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_contains_core_resources() {
        let registry = ResourceRegistry::standard();
        for name in [
            "person",
            "patient",
            "concept",
            "conceptdatatype",
            "drug",
            "visit",
            "encounter",
            "obs",
            "order",
            "location",
            "systemsetting",
            "module",
            "moduleaction",
            "conceptclass",
            "encountertype",
            "patientidentifiertype",
            "personattributetype",
            "ordertype",
            "visittype",
        ] {
            registry
                .resource(name)
                .unwrap_or_else(|_| panic!("missing resource {name}"));
        }
    }

    #[test]
    fn test_standard_registry_wires_sub_resources_and_converters() {
        let registry = ResourceRegistry::standard();
        for (parent, path) in [
            ("person", "name"),
            ("person", "address"),
            ("person", "attribute"),
            ("patient", "identifier"),
            ("patient", "allergy"),
            ("concept", "name"),
            ("concept", "mapping"),
        ] {
            registry
                .sub_resource(parent, path)
                .unwrap_or_else(|_| panic!("missing sub-resource {parent}/{path}"));
        }
        assert!(registry.converter("conceptdescription").is_some());
        assert!(registry.converter("personname").is_some());
    }

    #[test]
    fn test_unknown_resource_is_not_found() {
        let registry = ResourceRegistry::standard();
        let err = registry.resource("nope").err().expect("should not resolve");
        assert_eq!(err.code(), "object_not_found");
    }

    #[test]
    fn test_resource_infos_list_sub_resources() {
        let registry = ResourceRegistry::standard();
        let infos = registry.resource_infos();
        let person = infos
            .iter()
            .find(|i| i.name == "person")
            .expect("person should be listed");
        assert_eq!(person.sub_resources, vec!["address", "attribute", "name"]);
        let patient = infos
            .iter()
            .find(|i| i.name == "patient")
            .expect("patient should be listed");
        assert_eq!(patient.sub_resources, vec!["allergy", "identifier"]);
        let setting = infos
            .iter()
            .find(|i| i.name == "systemsetting")
            .expect("systemsetting should be listed");
        assert_eq!(setting.version, "1.9");
    }
}
