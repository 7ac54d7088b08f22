use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatekeep_core::DomainError;

/// `(subject, object, domain)`: `subject` may access `object` inside `domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRule {
    pub subject: String,
    pub object: String,
    pub domain: String,
}

impl PolicyRule {
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            domain: domain.into(),
        }
    }
}

/// `(member, role, domain)`: `member` inherits everything `role` holds in `domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupingRule {
    pub member: String,
    pub role: String,
    pub domain: String,
}

impl GroupingRule {
    pub fn new(
        member: impl Into<String>,
        role: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            member: member.into(),
            role: role.into(),
            domain: domain.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy storage error: {0}")]
    Storage(String),

    #[error("policy evaluation error: {0}")]
    Evaluation(String),
}

impl From<PolicyError> for DomainError {
    fn from(value: PolicyError) -> Self {
        DomainError::internal(value.to_string())
    }
}

/// RBAC-with-domains evaluator backed by durable storage.
///
/// Mutations return `true` when they changed the stored policy. Reads may be
/// served from a cache that is only refreshed by [`PolicyEvaluator::reload`];
/// mutations made through the same instance are visible to it immediately.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Whether `subject`, directly or through any inherited role, holds a
    /// policy for `(object, domain)`.
    async fn enforce(&self, subject: &str, object: &str, domain: &str)
    -> Result<bool, PolicyError>;

    async fn add_policy(&self, rule: PolicyRule) -> Result<bool, PolicyError>;

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, PolicyError>;

    /// Remove every policy tuple of `subject` in `domain`.
    async fn remove_policies_for_subject(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<bool, PolicyError>;

    async fn add_grouping(&self, rule: GroupingRule) -> Result<bool, PolicyError>;

    async fn remove_grouping(&self, rule: &GroupingRule) -> Result<bool, PolicyError>;

    /// Remove every grouping tuple where `member` is the member, in `domain`.
    async fn remove_groupings_for_member(
        &self,
        member: &str,
        domain: &str,
    ) -> Result<bool, PolicyError>;

    /// Remove every grouping tuple naming `role` as the role, in `domain`.
    async fn remove_groupings_for_role(&self, role: &str, domain: &str)
    -> Result<bool, PolicyError>;

    /// Roles directly assigned to `member`.
    async fn roles_for(&self, member: &str, domain: &str) -> Result<Vec<String>, PolicyError>;

    /// Members directly assigned to `role`.
    async fn members_of(&self, role: &str, domain: &str) -> Result<Vec<String>, PolicyError>;

    /// Roles reachable from `member` through any chain of grouping tuples.
    async fn implicit_roles_for(
        &self,
        member: &str,
        domain: &str,
    ) -> Result<Vec<String>, PolicyError>;

    /// Policy tuples whose subject is exactly `subject`.
    async fn permissions_for(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<Vec<PolicyRule>, PolicyError>;

    /// Policy tuples held by `subject` or any of its implicit roles.
    async fn implicit_permissions_for(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<Vec<PolicyRule>, PolicyError>;

    /// Every member appearing in a grouping tuple of `domain`.
    async fn members_in_domain(&self, domain: &str) -> Result<Vec<String>, PolicyError>;

    /// Refresh any cached view from durable storage.
    async fn reload(&self) -> Result<(), PolicyError>;
}
