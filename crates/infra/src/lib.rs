//! `gatekeep-infra`: collaborator boundaries and their adapters.
//!
//! - [`cache`]: keyed TTL store (in-memory, Redis)
//! - [`policy`]: RBAC-with-domains evaluator (in-memory, casbin)
//! - [`directory`]: relational lookups (in-memory, Postgres)

pub mod cache;
pub mod directory;
pub mod policy;

pub use cache::{CacheError, CacheStore, InMemoryCacheStore};
pub use directory::{Directory, DirectoryError, InMemoryDirectory};
pub use policy::{GroupingRule, InMemoryPolicyStore, PolicyError, PolicyEvaluator, PolicyRule};
