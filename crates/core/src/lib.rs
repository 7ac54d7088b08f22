//! `gatekeep-core`: identifiers, the policy token codec, errors and time.
//!
//! Building blocks shared by every other crate (no storage or network I/O).

pub mod clock;
pub mod env;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{
    DEFAULT_TENANT_CODE, DEFAULT_TENANT_ID, EntityId, EntityKind, MenuId, PermissionId, RoleId,
    TenantId, UserId, parse_decimal,
};
