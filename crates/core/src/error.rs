//! Error taxonomy shared by every component.

use thiserror::Error;

/// Result type used across the components.
pub type DomainResult<T> = Result<T, DomainError>;

/// Caller-facing error.
///
/// Component errors (`AuthzError`, `SessionError`, ...) convert into this
/// type; collaborator failures always land in [`DomainError::Internal`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An unresolvable tenant, role, permission, menu or session.
    #[error("not found: {0}")]
    NotFound(String),

    /// An authorization check returned `false`.
    ///
    /// Deliberately carries no detail: policy tokens must not reach
    /// untrusted callers.
    #[error("access denied")]
    PermissionDenied,

    /// A login attempt was blocked by lockout.
    #[error("locked: {0}")]
    Locked(String),

    /// Malformed input (identifier, token, argument).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A uniqueness or state conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Policy store or cache store failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn locked(reason: impl Into<String>) -> Self {
        Self::Locked(reason.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure came from a backing store rather than the request.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_is_generic() {
        assert_eq!(DomainError::PermissionDenied.to_string(), "access denied");
    }

    #[test]
    fn constructors_fill_messages() {
        assert_eq!(
            DomainError::not_found("role 'auditor'").to_string(),
            "not found: role 'auditor'"
        );
        assert!(DomainError::internal("redis down").is_internal());
        assert!(!DomainError::conflict("dup").is_internal());
    }
}
