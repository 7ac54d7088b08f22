//! Domain-scoped RBAC policy evaluator boundary.
//!
//! Two tuple shapes live in the evaluator:
//! - policy tuples `(subject, object, domain)`: a role or user holds a permission
//! - grouping tuples `(member, role, domain)`: a user (or role) belongs to a role
//!
//! Every string is a policy token produced by `gatekeep_core::EntityId::encode`.

#[cfg(feature = "casbin")]
pub mod casbin_store;
pub mod in_memory;
pub mod r#trait;

#[cfg(feature = "casbin")]
pub use casbin_store::CasbinPolicyStore;
pub use in_memory::{InMemoryPolicyStore, PolicyTable};
pub use r#trait::{GroupingRule, PolicyError, PolicyEvaluator, PolicyRule};
