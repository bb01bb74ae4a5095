//! Implementation of the [`EntityUuid`] identifier type.

use crate::{UuidError, UuidResult};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Maximum length of an entity identifier.
const MAX_LEN: usize = 38;

/// A validated entity identifier.
///
/// Once constructed the wrapped string is non-empty, at most 38 characters long, and made of
/// ASCII alphanumerics and hyphens only. This is what makes it safe to embed in resource URIs.
///
/// # Construction
/// - [`EntityUuid::new`] allocates a fresh random identifier for a new delegate.
/// - [`EntityUuid::parse`] validates an externally supplied identifier (URL path segment, payload
///   property, seed file).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityUuid(String);

impl Default for EntityUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityUuid {
    /// Allocates a new identifier in lowercase hyphenated v4 form.
    pub fn new() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Validates and wraps an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is empty, longer than 38 characters, or
    /// contains anything other than ASCII letters, digits and `-`.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if Self::is_valid(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(UuidError::InvalidInput(format!(
            "identifier must be 1-{MAX_LEN} characters of [A-Za-z0-9-], got: '{input}'"
        )))
    }

    /// Returns true if `input` is syntactically a valid identifier.
    pub fn is_valid(input: &str) -> bool {
        !input.is_empty()
            && input.len() <= MAX_LEN
            && input.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    }

    /// Returns true if `input` parses as a standard UUID (hyphenated or simple form).
    ///
    /// Resources that also accept a human readable name use this to decide whether a miss on
    /// the identifier lookup should be retried as a name lookup.
    pub fn looks_like_uuid(input: &str) -> bool {
        Uuid::parse_str(input).is_ok()
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityUuid {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityUuid::parse(s)
    }
}

impl AsRef<str> for EntityUuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for EntityUuid {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EntityUuid {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for EntityUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for EntityUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EntityUuid::parse(&s).map_err(serde::de::Error::custom)
    }
}
