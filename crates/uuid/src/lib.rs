//! Entity identifier utilities.
//!
//! Every delegate exposed through the REST layer carries a string identifier, its `uuid`.
//! Freshly allocated identifiers are random (v4) UUIDs in lowercase hyphenated form, but the
//! identifier column is an opaque string of up to 38 characters: dictionaries imported from
//! external terminologies routinely use ids such as `5089AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA`.
//!
//! This crate provides:
//! - [`EntityUuid`], a wrapper type that *guarantees* a syntactically valid identifier once
//!   constructed.
//! - [`EntityUuid::looks_like_uuid`], used by resources that fall back to a lookup by name when
//!   the supplied id is clearly not an identifier.
//!
//! ## Accepted form
//! - Length: 1 to 38
//! - Characters: ASCII letters, digits and `-`
//!
//! Identifiers are compared exactly; no case folding is applied.

mod service;

pub use service::{EntityUuid, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
