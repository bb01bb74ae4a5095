//! Constants used throughout the REST core crate.

/// Version segment of every resource path.
pub const API_VERSION: &str = "v1";

/// Default prefix prepended to resource links.
pub const DEFAULT_BASE_URL: &str = "/ws/rest";

/// Results returned per page when the request gives no `limit`.
pub const DEFAULT_LIMIT: usize = 50;

/// Upper bound on `limit`, whatever the request asks for.
pub const DEFAULT_ABSOLUTE_LIMIT: usize = 100;

/// Reason recorded when a delete request gives none.
pub const DEFAULT_VOID_REASON: &str = "REST web service";

/// Resource version of resources that have not been revised since 1.8.
pub const RESOURCE_VERSION_1_8: &str = "1.8";

/// Resource version of resources introduced or revised in 1.9.
pub const RESOURCE_VERSION_1_9: &str = "1.9";

pub const RESOURCE_VERSION_2_0: &str = "2.0";

// ===== PROPERTY NAMES =====

pub const PROPERTY_UUID: &str = "uuid";
pub const PROPERTY_DISPLAY: &str = "display";
pub const PROPERTY_LINKS: &str = "links";
pub const PROPERTY_AUDIT_INFO: &str = "auditInfo";
pub const PROPERTY_RESOURCE_VERSION: &str = "resourceVersion";
pub const PROPERTY_TYPE: &str = "type";
pub const PROPERTY_VOIDED: &str = "voided";
pub const PROPERTY_RETIRED: &str = "retired";

/// Properties a client may echo back in a payload that are never written to a delegate.
pub const IGNORED_PROPERTIES: &[&str] = &[
    PROPERTY_DISPLAY,
    PROPERTY_LINKS,
    PROPERTY_AUDIT_INFO,
    PROPERTY_RESOURCE_VERSION,
    PROPERTY_TYPE,
];

// ===== REQUEST PARAMETERS =====

pub const PARAM_REPRESENTATION: &str = "v";
pub const PARAM_START_INDEX: &str = "startIndex";
pub const PARAM_LIMIT: &str = "limit";
pub const PARAM_INCLUDE_ALL: &str = "includeAll";
pub const PARAM_TOTAL_COUNT: &str = "totalCount";
pub const PARAM_TYPE: &str = "t";
pub const PARAM_PURGE: &str = "purge";
pub const PARAM_REASON: &str = "reason";
pub const PARAM_QUERY: &str = "q";
pub const PARAM_PATIENT: &str = "patient";
pub const PARAM_ENCOUNTER: &str = "encounter";
pub const PARAM_LOCATION: &str = "location";
pub const PARAM_VISIT_TYPE: &str = "visitType";
pub const PARAM_INCLUDE_INACTIVE: &str = "includeInactive";
pub const PARAM_FROM_START_DATE: &str = "fromStartDate";

/// Parameters that control paging and rendering rather than selecting results.
pub const RESERVED_PARAMETERS: &[&str] = &[
    PARAM_REPRESENTATION,
    PARAM_START_INDEX,
    PARAM_LIMIT,
    PARAM_INCLUDE_ALL,
    PARAM_TOTAL_COUNT,
    PARAM_TYPE,
    PARAM_PURGE,
    PARAM_REASON,
];

// ===== NAMED REPRESENTATIONS =====

pub const REPRESENTATION_FULL_CHILDREN: &str = "fullchildren";
/// Recursive view behind `fullchildren`. Mixed case, so [`Representation::parse`], which
/// lowercases named views, can never produce it from a request.
///
/// [`Representation::parse`]: crate::representation::Representation::parse
pub const REPRESENTATION_FULL_CHILDREN_INTERNAL: &str = "fullChildrenInternal";
