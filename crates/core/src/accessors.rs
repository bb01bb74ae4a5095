//! Property getter and setter tables.
//!
//! Each resource registers, per property name, a getter (how the value is read off the delegate)
//! and optionally a setter (how a payload value is written back). The tables are built once when
//! the resource is constructed; there is no runtime reflection.

use crate::context::RequestContext;
use crate::convert;
use crate::delegate::{Delegate, DelegateType};
use crate::RestResult;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// A property value read off a delegate, before conversion to JSON.
#[derive(Clone, Debug)]
pub enum PropertyValue {
    Null,
    Json(Value),
    /// A nested delegate, rendered by its own converter under the property's representation.
    Delegate(Box<Delegate>),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn delegate<D: DelegateType>(delegate: D) -> Self {
        PropertyValue::Delegate(Box::new(delegate.into_delegate()))
    }

    pub fn delegates<D, I>(items: I) -> Self
    where
        D: DelegateType,
        I: IntoIterator<Item = D>,
    {
        PropertyValue::List(items.into_iter().map(PropertyValue::delegate).collect())
    }

    pub fn optional_delegate<D: DelegateType>(delegate: Option<D>) -> Self {
        delegate.map_or(PropertyValue::Null, PropertyValue::delegate)
    }

    pub fn datetime(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(PropertyValue::Null, |v| {
            PropertyValue::Json(Value::String(convert::format_datetime(&v)))
        })
    }

    pub fn date(value: Option<NaiveDate>) -> Self {
        value.map_or(PropertyValue::Null, |v| {
            PropertyValue::Json(Value::String(convert::format_date(&v)))
        })
    }

    pub fn number(value: Option<f64>) -> Self {
        value.map_or(PropertyValue::Null, |v| PropertyValue::Json(Value::from(v)))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Json(Value::Bool(value))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Json(Value::String(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Json(Value::String(value.to_owned()))
    }
}

impl From<Option<String>> for PropertyValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(PropertyValue::Null, PropertyValue::from)
    }
}

impl From<Option<&String>> for PropertyValue {
    fn from(value: Option<&String>) -> Self {
        value.map_or(PropertyValue::Null, |s| PropertyValue::from(s.as_str()))
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        PropertyValue::Json(value)
    }
}

pub type Getter<T> = fn(&T, &RequestContext) -> RestResult<PropertyValue>;
pub type Setter<T> = fn(&mut T, &Value, &RequestContext) -> RestResult<()>;

struct Accessor<T> {
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
}

/// Name-keyed getter/setter table for one delegate type.
pub struct PropertyAccessors<T> {
    entries: HashMap<&'static str, Accessor<T>>,
}

impl<T> Default for PropertyAccessors<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> PropertyAccessors<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, name: &'static str) -> &mut Accessor<T> {
        self.entries.entry(name).or_insert(Accessor {
            getter: None,
            setter: None,
        })
    }

    /// Registers a getter.
    pub fn get(mut self, name: &'static str, getter: Getter<T>) -> Self {
        self.entry(name).getter = Some(getter);
        self
    }

    /// Registers a setter.
    pub fn set(mut self, name: &'static str, setter: Setter<T>) -> Self {
        self.entry(name).setter = Some(setter);
        self
    }

    /// Registers both a getter and a setter.
    pub fn property(self, name: &'static str, getter: Getter<T>, setter: Setter<T>) -> Self {
        self.get(name, getter).set(name, setter)
    }

    pub fn getter(&self, name: &str) -> Option<Getter<T>> {
        self.entries.get(name).and_then(|a| a.getter)
    }

    pub fn setter(&self, name: &str) -> Option<Setter<T>> {
        self.entries.get(name).and_then(|a| a.setter)
    }

    pub fn has_getter(&self, name: &str) -> bool {
        self.getter(name).is_some()
    }
}
