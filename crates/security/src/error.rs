use thiserror::Error;

use gatekeep_core::DomainError;
use gatekeep_infra::CacheError;

pub type SessionResult<T> = Result<T, SessionError>;
pub type LoginSecurityResult<T> = Result<T, LoginSecurityError>;
pub type VerificationResult<T> = Result<T, VerificationError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Missing, expired or unreachable through a stale index.
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("invalid session: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl SessionError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<SessionError> for DomainError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::NotFound(what) => DomainError::NotFound(format!("session {what}")),
            SessionError::InvalidArgument(msg) => DomainError::InvalidArgument(msg),
            SessionError::Cache(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoginSecurityError {
    #[error("{0}")]
    Locked(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<LoginSecurityError> for DomainError {
    fn from(value: LoginSecurityError) -> Self {
        match value {
            LoginSecurityError::Locked(reason) => DomainError::Locked(reason),
            LoginSecurityError::Cache(e) => e.into(),
        }
    }
}

/// Verification code failures. Each rejection has its own message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("verification code requested too frequently, try again later")]
    TooFrequent,

    #[error("verification code not found")]
    NotFound,

    #[error("verification code expired")]
    Expired,

    #[error("verification code already used")]
    AlreadyUsed,

    #[error("verification code does not match")]
    Mismatch,

    #[error("verification code record is corrupted")]
    Corrupted,

    #[error("invalid verification request: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Cache(CacheError),
}

impl From<CacheError> for VerificationError {
    fn from(value: CacheError) -> Self {
        match value {
            CacheError::Corrupted { .. } => VerificationError::Corrupted,
            other => VerificationError::Cache(other),
        }
    }
}

impl From<VerificationError> for DomainError {
    fn from(value: VerificationError) -> Self {
        match value {
            VerificationError::NotFound => DomainError::not_found("verification code"),
            VerificationError::TooFrequent => DomainError::conflict(value.to_string()),
            VerificationError::Expired
            | VerificationError::AlreadyUsed
            | VerificationError::Mismatch => DomainError::invalid_argument(value.to_string()),
            VerificationError::InvalidArgument(msg) => DomainError::InvalidArgument(msg),
            VerificationError::Corrupted => DomainError::internal(value.to_string()),
            VerificationError::Cache(e) => e.into(),
        }
    }
}
