use emr_domain::DomainError;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("operation not supported: {0}")]
    OperationNotSupported(String),
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("{message}")]
    Conversion { property: String, message: String },
    #[error("illegal request: {0}")]
    IllegalRequest(String),
    #[error("cyclic structure detected: {uuid} appears among its own descendants")]
    CyclicStructure { uuid: String },
    #[error("representation '{representation}' is not supported by {resource}")]
    UnsupportedRepresentation {
        resource: String,
        representation: String,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type RestResult<T> = std::result::Result<T, RestError>;

impl RestError {
    pub fn conversion(property: impl Into<String>, message: impl Into<String>) -> Self {
        RestError::Conversion {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            RestError::OperationNotSupported(_) => "operation_not_supported",
            RestError::ObjectNotFound(_) => "object_not_found",
            RestError::Conversion { .. } => "conversion",
            RestError::IllegalRequest(_) => "illegal_request",
            RestError::CyclicStructure { .. } => "cyclic_structure",
            RestError::UnsupportedRepresentation { .. } => "unsupported_representation",
            RestError::InvalidConfig(_) => "invalid_config",
            RestError::Domain(DomainError::NotFound(_)) => "object_not_found",
            RestError::Domain(DomainError::Validation(_)) => "validation",
            RestError::Domain(DomainError::Conflict(_)) => "conflict",
            RestError::Domain(_) => "internal",
        }
    }
}
