//! `gatekeep-security`: cache-backed session and login-security state.
//!
//! Both managers are stateless themselves: every record lives in a shared
//! [`gatekeep_infra::CacheStore`], and expiry is computed against an injected
//! [`gatekeep_core::Clock`].

pub mod config;
pub mod error;
pub mod login;
pub mod session;

pub use config::{ClientType, LoginSecurityConfig, SessionConfig};
pub use error::{
    LoginSecurityError, LoginSecurityResult, SessionError, SessionResult, VerificationError,
    VerificationResult,
};
pub use login::{CodeType, LockScope, LockStatus, LoginSecurityManager, LoginSecurityStats};
pub use session::{NewSession, SessionManager, UserSession};
