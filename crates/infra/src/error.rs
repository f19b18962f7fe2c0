//! Service-boundary error model.

use thiserror::Error;

use wareflow_auth::AuthzError;
use wareflow_core::{DomainError, ErrorKind};

use crate::store::StoreError;

/// Error returned by every service operation.
///
/// Domain errors, store errors and authorization failures all fold into the
/// same five kinds callers are expected to branch on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    /// Unknown id, or an id the caller may not see.
    #[error("not found")]
    NotFound,

    /// Wrong status, stale snapshot, or a referenced workflow.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Permission(_) => ErrorKind::Permission,
            ServiceError::NotFound => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Re-reading and retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::Permission(msg) => ServiceError::Permission(msg),
            DomainError::NotFound => ServiceError::NotFound,
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::DuplicateNumber(number) => {
                ServiceError::Conflict(format!("requisition number {number} already exists"))
            }
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Backend(msg) => ServiceError::Persistence(msg),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        ServiceError::Permission(value.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(ServiceError::from(StoreError::Conflict("state changed, retry".into())).is_retryable());
        assert!(!ServiceError::from(StoreError::Backend("io".into())).is_retryable());
        assert!(!ServiceError::NotFound.is_retryable());
    }

    #[test]
    fn kinds_have_stable_names() {
        assert_eq!(
            ServiceError::from(DomainError::validation("x")).kind().as_str(),
            "validation_error"
        );
        assert_eq!(
            ServiceError::from(AuthzError::NotOwner).kind().as_str(),
            "permission_error"
        );
        assert_eq!(
            ServiceError::from(StoreError::Backend("down".into())).kind().as_str(),
            "persistence_error"
        );
    }
}
