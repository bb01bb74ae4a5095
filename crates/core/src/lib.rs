//! # EMR Core
//!
//! The representation and conversion engine of the EMR REST facade.
//!
//! This crate contains:
//! - Representations (`ref`, `default`, `full`, named and custom) and resource descriptions
//! - Property getter/setter tables and the conversion engine that walks them
//! - CRUD delegation from resources to the domain services in [`emr_domain`]
//! - Sub-resources, subclass handlers and concept cycle detection
//! - Every shipped resource, registered in a [`ResourceRegistry`]
//! - OpenAPI model generation from the same descriptions
//!
//! **No API concerns**: HTTP routing, status codes and the server binary belong in `api-rest`.

pub mod accessors;
pub mod config;
pub mod constants;
pub mod context;
pub mod convert;
pub mod cycles;
pub mod delegate;
pub mod description;
pub mod error;
pub mod paging;
pub mod registry;
pub mod representation;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod subclass;

pub use accessors::{PropertyAccessors, PropertyValue};
pub use config::RestConfig;
pub use context::{RequestContext, RequestParams};
pub use error::{RestError, RestResult};
pub use registry::{ResourceInfo, ResourceRegistry};
pub use representation::Representation;
