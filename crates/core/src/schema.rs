//! OpenAPI model generation.
//!
//! Models are built from the same [`ResourceDescription`]s and [`FieldSet`]s that drive
//! conversion, so documentation and behaviour cannot drift apart. Property types come from each
//! resource's [`Representable::property_type`](crate::resource::Representable::property_type)
//! hints.

use crate::constants::{
    PROPERTY_AUDIT_INFO, PROPERTY_LINKS, PROPERTY_RETIRED, PROPERTY_UUID, PROPERTY_VOIDED,
};
use crate::description::{FieldSet, ResourceDescription};
use crate::registry::ResourceRegistry;
use crate::representation::Representation;
use crate::resource::Converter;
use utoipa::openapi::schema::{
    ArrayBuilder, KnownFormat, Object, ObjectBuilder, Ref, Schema, SchemaFormat, SchemaType,
};
use utoipa::openapi::{Components, OpenApi, RefOr};

/// Wire type of one property, used only for documentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Uuid,
    Boolean,
    Number,
    Integer,
    Date,
    DateTime,
    /// Free-form JSON object.
    Object,
    ObjectList,
    /// A `links` array of `{rel, uri}`.
    Links,
    /// A reference to another resource; posted as a uuid, rendered as that resource's model.
    Ref(&'static str),
    RefList(&'static str),
    /// An owned nested object; posted and rendered as that resource's model.
    Owned(&'static str),
    OwnedList(&'static str),
}

impl PropertyType {
    /// Type of the properties every resource shares.
    pub fn common(name: &str) -> Self {
        match name {
            PROPERTY_UUID => PropertyType::Uuid,
            PROPERTY_VOIDED | PROPERTY_RETIRED => PropertyType::Boolean,
            PROPERTY_AUDIT_INFO => PropertyType::Object,
            PROPERTY_LINKS => PropertyType::Links,
            _ => PropertyType::String,
        }
    }
}

/// `personname` + `Get` -> `PersonnameGet`.
pub fn model_name(resource: &str, suffix: &str) -> String {
    let mut chars = resource.chars();
    match chars.next() {
        Some(first) => format!("{}{}{suffix}", first.to_ascii_uppercase(), chars.as_str()),
        None => suffix.to_owned(),
    }
}

fn get_suffix(rep: &Representation) -> &'static str {
    match rep {
        Representation::Ref => "GetRef",
        Representation::Full => "GetFull",
        _ => "Get",
    }
}

fn schema_ref(name: String) -> RefOr<Schema> {
    RefOr::Ref(Ref::from_schema_name(name))
}

fn array_of(items: RefOr<Schema>) -> RefOr<Schema> {
    ArrayBuilder::new().items(items).build().into()
}

fn primitive(kind: PropertyType) -> RefOr<Schema> {
    let builder = ObjectBuilder::new();
    let builder = match kind {
        PropertyType::Uuid => builder
            .schema_type(SchemaType::String)
            .format(Some(SchemaFormat::Custom("uuid".into()))),
        PropertyType::Boolean => builder.schema_type(SchemaType::Boolean),
        PropertyType::Number => builder.schema_type(SchemaType::Number),
        PropertyType::Integer => builder.schema_type(SchemaType::Integer),
        PropertyType::Date => builder
            .schema_type(SchemaType::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Date))),
        PropertyType::DateTime => builder
            .schema_type(SchemaType::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime))),
        PropertyType::Object => builder.schema_type(SchemaType::Object),
        _ => builder.schema_type(SchemaType::String),
    };
    builder.build().into()
}

fn links_schema() -> RefOr<Schema> {
    let link = ObjectBuilder::new()
        .property("rel", primitive(PropertyType::String))
        .property("uri", primitive(PropertyType::String))
        .build();
    array_of(link.into())
}

/// Schema of a rendered property: nested resources point at their GET models.
fn rendered_schema(kind: PropertyType, nested: &Representation) -> RefOr<Schema> {
    match kind {
        PropertyType::Ref(resource) | PropertyType::Owned(resource) => {
            schema_ref(model_name(resource, get_suffix(nested)))
        }
        PropertyType::RefList(resource) | PropertyType::OwnedList(resource) => {
            array_of(schema_ref(model_name(resource, get_suffix(nested))))
        }
        PropertyType::Links => links_schema(),
        PropertyType::ObjectList => array_of(primitive(PropertyType::Object)),
        other => primitive(other),
    }
}

/// Schema of a posted property: references are uuids, owned objects use CREATE models.
fn posted_schema(kind: PropertyType) -> RefOr<Schema> {
    match kind {
        PropertyType::Ref(_) => primitive(PropertyType::Uuid),
        PropertyType::RefList(_) => array_of(primitive(PropertyType::Uuid)),
        PropertyType::Owned(resource) => schema_ref(model_name(resource, "Create")),
        PropertyType::OwnedList(resource) => array_of(schema_ref(model_name(resource, "Create"))),
        PropertyType::ObjectList => array_of(primitive(PropertyType::Object)),
        other => primitive(other),
    }
}

fn description_model(converter: &dyn Converter, description: &ResourceDescription) -> Object {
    let mut builder = ObjectBuilder::new();
    for property in description.properties() {
        let kind = converter.type_of(&property.source);
        builder = builder.property(
            property.name.clone(),
            rendered_schema(kind, &property.nested_representation()),
        );
    }
    if !description.links().is_empty() {
        builder = builder.property(PROPERTY_LINKS, links_schema());
    }
    builder.build()
}

fn field_model(converter: &dyn Converter, fields: &FieldSet) -> Object {
    let mut builder = ObjectBuilder::new();
    for field in fields.fields() {
        builder = builder.property(field.name.clone(), posted_schema(converter.type_of(&field.name)));
        if field.required {
            builder = builder.required(field.name.clone());
        }
    }
    builder.build()
}

/// The GET model for `rep`, or `None` if the resource has no such representation.
pub fn get_model(converter: &dyn Converter, rep: &Representation) -> Option<Object> {
    converter
        .describe(rep)
        .map(|description| description_model(converter, &description))
}

/// The CREATE model, or `None` if the resource cannot be created.
pub fn create_model(converter: &dyn Converter) -> Option<Object> {
    converter
        .creatable()
        .ok()
        .map(|fields| field_model(converter, &fields))
}

/// The UPDATE model, or `None` if the resource cannot be updated.
pub fn update_model(converter: &dyn Converter) -> Option<Object> {
    converter
        .updatable()
        .ok()
        .map(|fields| field_model(converter, &fields))
}

/// Every model of every registered converter, keyed by model name.
pub fn models(registry: &ResourceRegistry) -> Vec<(String, Object)> {
    let mut models = Vec::new();
    for converter in registry.converters() {
        let converter = converter.as_ref();
        let name = converter.resource_name();
        for rep in [Representation::Ref, Representation::Default, Representation::Full] {
            if let Some(model) = get_model(converter, &rep) {
                models.push((model_name(name, get_suffix(&rep)), model));
            }
        }
        if let Some(model) = create_model(converter) {
            models.push((model_name(name, "Create"), model));
        }
        if let Some(model) = update_model(converter) {
            models.push((model_name(name, "Update"), model));
        }
    }
    models
}

/// Adds every resource model to the document's components.
pub fn merge_into(doc: &mut OpenApi, registry: &ResourceRegistry) {
    let components = doc.components.get_or_insert_with(Components::default);
    for (name, model) in models(registry) {
        components.schemas.insert(name, model.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn model_json(model: Object) -> Value {
        serde_json::to_value(model).expect("model should serialize")
    }

    fn registry() -> ResourceRegistry {
        ResourceRegistry::standard()
    }

    #[test]
    fn test_model_name_capitalizes() {
        assert_eq!(model_name("patient", "GetRef"), "PatientGetRef");
        assert_eq!(model_name("personname", "Create"), "PersonnameCreate");
    }

    #[test]
    fn test_get_model_follows_description() {
        let registry = registry();
        let converter = registry.converter("patient").expect("patient converter");
        let model = model_json(
            get_model(converter.as_ref(), &Representation::Default).expect("default model"),
        );
        let properties = model["properties"].as_object().expect("properties object");
        let described = converter
            .describe(&Representation::Default)
            .expect("default description");
        for property in described.properties() {
            assert!(
                properties.contains_key(&property.name),
                "model should document {}",
                property.name
            );
        }
        assert_eq!(
            model["properties"]["person"]["$ref"],
            "#/components/schemas/PersonGet"
        );
        assert_eq!(model["properties"]["uuid"]["format"], "uuid");
    }

    #[test]
    fn test_create_model_marks_required() {
        let registry = registry();
        let converter = registry.converter("person").expect("person converter");
        let model = model_json(create_model(converter.as_ref()).expect("create model"));
        let required: Vec<&str> = model["required"]
            .as_array()
            .expect("required list")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"names"));
        assert!(required.contains(&"gender"));
        assert_eq!(
            model["properties"]["names"]["items"]["$ref"],
            "#/components/schemas/PersonnameCreate"
        );
    }

    #[test]
    fn test_read_only_resource_has_no_create_model() {
        let registry = registry();
        let converter = registry
            .converter("conceptdatatype")
            .expect("datatype converter");
        assert!(create_model(converter.as_ref()).is_none());
        assert!(get_model(converter.as_ref(), &Representation::Ref).is_some());
    }

    #[test]
    fn test_merge_into_adds_components() {
        let mut doc = OpenApi::default();
        merge_into(&mut doc, &registry());
        let schemas = &doc.components.expect("components should exist").schemas;
        for name in ["PatientGet", "PatientGetRef", "PatientGetFull", "PatientCreate", "ObsUpdate"] {
            assert!(schemas.contains_key(name), "missing model {name}");
        }
    }
}
