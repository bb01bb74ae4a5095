//! Resource descriptions and inbound field sets.
//!
//! A [`ResourceDescription`] is the ordered list of properties (and links) exposed for one
//! delegate type under one representation. The same structure drives outbound rendering and
//! schema generation. A [`FieldSet`] lists the properties a payload may carry on create or
//! update, partitioned into required and optional.

use crate::representation::Representation;
use crate::{RestError, RestResult};

/// One exposed property.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Delegate property the value is read from; usually the same as `name`.
    pub source: String,
    /// How a nested delegate is rendered. `None` renders it with the default representation.
    pub nested: Option<Representation>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            name,
            nested: None,
        }
    }

    pub fn nested_representation(&self) -> Representation {
        self.nested.clone().unwrap_or(Representation::Default)
    }
}

/// A navigational link. `suffix` is either absolute or starts with `.`, meaning "the delegate's
/// own URI", so `.?v=full` resolves to `<uri>?v=full`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub rel: String,
    pub suffix: String,
}

impl Link {
    pub fn resolve(&self, uri: &str) -> String {
        match self.suffix.strip_prefix('.') {
            Some(rest) => format!("{uri}{rest}"),
            None => self.suffix.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceDescription {
    properties: Vec<PropertyDescriptor>,
    links: Vec<Link>,
}

impl ResourceDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property rendered under the default representation.
    pub fn add_property(&mut self, name: &str) -> &mut Self {
        self.push(PropertyDescriptor::new(name))
    }

    /// Adds a property whose nested delegate is rendered under `rep`.
    pub fn add_property_as(&mut self, name: &str, rep: Representation) -> &mut Self {
        let mut property = PropertyDescriptor::new(name);
        property.nested = Some(rep);
        self.push(property)
    }

    /// Adds a property exposed as `name` but read from `source`.
    pub fn add_property_from(
        &mut self,
        name: &str,
        source: &str,
        rep: Option<Representation>,
    ) -> &mut Self {
        self.push(PropertyDescriptor {
            name: name.to_owned(),
            source: source.to_owned(),
            nested: rep,
        })
    }

    /// Re-adding a name replaces the earlier descriptor in place.
    fn push(&mut self, property: PropertyDescriptor) -> &mut Self {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
        self
    }

    pub fn remove_property(&mut self, name: &str) -> &mut Self {
        self.properties.retain(|p| p.name != name);
        self
    }

    pub fn add_self_link(&mut self) -> &mut Self {
        self.add_link("self", ".")
    }

    pub fn add_link(&mut self, rel: &str, suffix: &str) -> &mut Self {
        self.links.retain(|l| l.rel != rel);
        self.links.push(Link {
            rel: rel.to_owned(),
            suffix: suffix.to_owned(),
        });
        self
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Parses a custom representation spec such as `(uuid,display,concept:(uuid,display))`.
    ///
    /// Each field is `name`, `name:REP` or `name:(...)` nested to any depth. The field `links`
    /// adds the self and default links rather than a property.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::IllegalRequest`] for unbalanced parentheses or empty field names.
    pub fn from_custom(spec: &str) -> RestResult<Self> {
        let invalid = |why: &str| {
            RestError::IllegalRequest(format!("invalid custom representation '{spec}': {why}"))
        };

        let trimmed = spec.trim();
        let inner = match trimmed.strip_prefix('(') {
            Some(rest) => rest
                .strip_suffix(')')
                .ok_or_else(|| invalid("missing closing parenthesis"))?,
            None => trimmed,
        };

        let mut description = ResourceDescription::new();
        for field in split_top_level(inner).map_err(|why| invalid(why))? {
            let field = field.trim();
            let (name, rep) = match field.split_once(':') {
                Some((name, rep)) => (name.trim(), Some(rep.trim())),
                None => (field, None),
            };
            if name.is_empty() {
                return Err(invalid("empty property name"));
            }
            if name == "links" {
                description.add_self_link();
                description.add_link("default", ".?v=default");
                continue;
            }
            match rep {
                None => description.add_property(name),
                Some(rep) if rep.starts_with('(') => {
                    ResourceDescription::from_custom(rep)?;
                    description.add_property_as(name, Representation::Custom(rep.to_owned()))
                }
                Some(rep) => description.add_property_as(name, Representation::parse(rep)),
            };
        }
        Ok(description)
    }
}

/// Splits on commas that are not inside parentheses.
fn split_top_level(spec: &str) -> Result<Vec<&str>, &'static str> {
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in spec.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or("unbalanced parentheses")?,
            ',' if depth == 0 => {
                fields.push(&spec[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced parentheses");
    }
    let tail = &spec[start..];
    if !tail.trim().is_empty() || !fields.is_empty() {
        fields.push(tail);
    }
    Ok(fields)
}

/// One property a payload may carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub required: bool,
}

/// Ordered set of properties accepted on create or update.
///
/// Setters run in declaration order, so a property other setters depend on (an observation's
/// `concept` before its `value`) must be declared first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<Field>,
}

pub type CreatableFieldSet = FieldSet;
pub type UpdatableFieldSet = FieldSet;

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_required(&mut self, name: &str) -> &mut Self {
        self.insert(name, true)
    }

    pub fn add(&mut self, name: &str) -> &mut Self {
        self.insert(name, false)
    }

    fn insert(&mut self, name: &str, required: bool) -> &mut Self {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.required = required,
            None => self.fields.push(Field {
                name: name.to_owned(),
                required,
            }),
        }
        self
    }

    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.fields.retain(|f| f.name != name);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }

    /// The same fields with every one made optional.
    pub fn all_optional(&self) -> FieldSet {
        FieldSet {
            fields: self
                .fields
                .iter()
                .map(|f| Field {
                    name: f.name.clone(),
                    required: false,
                })
                .collect(),
        }
    }
}
