use thiserror::Error;

use gatekeep_core::DomainError;
use gatekeep_infra::{DirectoryError, PolicyError};

pub type AuthzResult<T> = Result<T, AuthzError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Carries no detail on purpose; the policy tokens involved are logged only.
    #[error("access denied")]
    PermissionDenied,

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl AuthzError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<DomainError> for AuthzError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(what) => AuthzError::NotFound(what),
            DomainError::PermissionDenied => AuthzError::PermissionDenied,
            DomainError::Conflict(msg) => AuthzError::Conflict(msg),
            DomainError::InvalidArgument(msg) | DomainError::Locked(msg) => {
                AuthzError::InvalidArgument(msg)
            }
            DomainError::Internal(msg) => AuthzError::Policy(PolicyError::Evaluation(msg)),
        }
    }
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::NotFound(what) => DomainError::NotFound(what),
            AuthzError::InvalidArgument(msg) => DomainError::InvalidArgument(msg),
            AuthzError::Conflict(msg) => DomainError::Conflict(msg),
            AuthzError::PermissionDenied => DomainError::PermissionDenied,
            AuthzError::Policy(e) => e.into(),
            AuthzError::Directory(e) => e.into(),
        }
    }
}
