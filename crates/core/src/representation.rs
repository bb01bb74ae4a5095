//! Representation names.
//!
//! A representation selects which properties of a delegate are exposed and how deeply nested
//! delegates are expanded. The request parameter `v` carries it.

use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Representation {
    Ref,
    Default,
    Full,
    /// A resource-specific view such as `fullchildren`, stored lowercased.
    Named(String),
    /// A client-specified property list, stored as the parenthesised spec:
    /// `(uuid,display,concept:(uuid,display))`.
    Custom(String),
}

const CUSTOM_PREFIX: &str = "custom:";

impl Representation {
    /// Parses a `v` parameter value.
    ///
    /// `ref`, `default` and `full` are matched ignoring case. `custom:` introduces a property
    /// list, which keeps its case. Anything else is a named representation.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        let is_custom = trimmed
            .get(..CUSTOM_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(CUSTOM_PREFIX));
        if is_custom {
            let spec = trimmed.get(CUSTOM_PREFIX.len()..).unwrap_or_default();
            return Representation::Custom(spec.trim().to_owned());
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "ref" => Representation::Ref,
            "default" | "" => Representation::Default,
            "full" => Representation::Full,
            other => Representation::Named(other.to_owned()),
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Representation::Ref)
    }

    pub fn is_named(&self, name: &str) -> bool {
        matches!(self, Representation::Named(n) if n == name)
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Ref => f.write_str("ref"),
            Representation::Default => f.write_str("default"),
            Representation::Full => f.write_str("full"),
            Representation::Named(name) => f.write_str(name),
            Representation::Custom(spec) => write!(f, "{CUSTOM_PREFIX}{spec}"),
        }
    }
}

impl FromStr for Representation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Representation::parse(s))
    }
}
