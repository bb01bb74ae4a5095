//! Subtype handlers: an open extension point for rendering domain subtypes.
//!
//! A resource whose delegate has subtypes (orders, for instance) keeps a [`TypeHandlers`] table
//! keyed by type tag. The handler is resolved at call time, by the delegate's subtype when
//! rendering and by the posted `type` when creating.

use crate::accessors::PropertyAccessors;
use crate::description::{FieldSet, ResourceDescription};
use crate::representation::Representation;
use crate::schema::PropertyType;
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait SubclassHandler<T>: Send + Sync {
    /// Type tag, as posted and rendered in `type`.
    fn type_name(&self) -> &'static str;

    fn matches(&self, delegate: &T) -> bool;

    /// A blank delegate of this subtype.
    fn new_delegate(&self) -> T;

    fn representation_description(&self, rep: &Representation) -> Option<ResourceDescription>;

    fn creatable_properties(&self) -> FieldSet;

    /// Accessors for the subtype's own properties, consulted before the resource's.
    fn accessors(&self) -> &PropertyAccessors<T>;

    fn property_type(&self, _name: &str) -> Option<PropertyType> {
        None
    }
}

pub struct TypeHandlers<T> {
    handlers: BTreeMap<&'static str, Arc<dyn SubclassHandler<T>>>,
}

impl<T> Default for TypeHandlers<T> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<T> TypeHandlers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. The first handler for a tag wins.
    pub fn register(&mut self, handler: Arc<dyn SubclassHandler<T>>) -> &mut Self {
        let name = handler.type_name();
        if self.handlers.contains_key(name) {
            tracing::warn!("subclass handler for {name} registered twice; ignoring the later one");
        } else {
            self.handlers.insert(name, handler);
        }
        self
    }

    pub fn for_type(&self, name: &str) -> Option<&Arc<dyn SubclassHandler<T>>> {
        self.handlers.get(name.to_ascii_lowercase().as_str())
    }

    pub fn for_delegate(&self, delegate: &T) -> Option<&Arc<dyn SubclassHandler<T>>> {
        self.handlers.values().find(|h| h.matches(delegate))
    }

    pub fn types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }
}
