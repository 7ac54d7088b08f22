//! Casbin-backed evaluator.
//!
//! The enforcer owns its own in-memory policy cache; `reload()` re-reads it
//! from the adapter. Every call takes the write lock because several casbin
//! RBAC queries need `&mut Enforcer`; this also serializes the mutation path
//! of one instance.

use async_trait::async_trait;
use casbin::{Adapter, CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi, RbacApi};
use tokio::sync::RwLock;
use tracing::instrument;

use super::r#trait::{GroupingRule, PolicyError, PolicyEvaluator, PolicyRule};

/// Policies are stored as `p, sub, dom, obj` and groupings as `g, member, role, dom`.
pub const MODEL_CONF: &str = r#"
[request_definition]
r = sub, dom, obj

[policy_definition]
p = sub, dom, obj

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj
"#;

pub struct CasbinPolicyStore {
    enforcer: RwLock<Enforcer>,
}

impl core::fmt::Debug for CasbinPolicyStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CasbinPolicyStore").finish_non_exhaustive()
    }
}

fn storage(e: casbin::Error) -> PolicyError {
    PolicyError::Storage(e.to_string())
}

fn policy_row(rule: &PolicyRule) -> Vec<String> {
    vec![rule.subject.clone(), rule.domain.clone(), rule.object.clone()]
}

fn grouping_row(rule: &GroupingRule) -> Vec<String> {
    vec![rule.member.clone(), rule.role.clone(), rule.domain.clone()]
}

fn rule_from_row(row: Vec<String>) -> Option<PolicyRule> {
    let mut it = row.into_iter();
    let subject = it.next()?;
    let domain = it.next()?;
    let object = it.next()?;
    Some(PolicyRule {
        subject,
        object,
        domain,
    })
}

impl CasbinPolicyStore {
    /// Build an evaluator over any casbin adapter (database adapters in
    /// production) and load its policy.
    pub async fn new<A>(adapter: A) -> Result<Self, PolicyError>
    where
        A: Adapter + 'static,
    {
        let model = DefaultModel::from_str(MODEL_CONF).await.map_err(storage)?;
        let enforcer = Enforcer::new(model, adapter).await.map_err(storage)?;
        Ok(Self {
            enforcer: RwLock::new(enforcer),
        })
    }

    /// Evaluator persisting to the `casbin_rule` table of a Postgres
    /// database (created on first use). `reload()` re-reads that table, so
    /// every replica pointed at the same database converges.
    #[cfg(feature = "casbin-postgres")]
    pub async fn postgres(database_url: &str, pool_size: u32) -> Result<Self, PolicyError> {
        let adapter = sqlx_adapter::SqlxAdapter::new(database_url, pool_size)
            .await
            .map_err(storage)?;
        Self::new(adapter).await
    }

    /// Evaluator with a non-durable memory adapter (tests/dev).
    pub async fn in_memory() -> Result<Self, PolicyError> {
        Self::new(MemoryAdapter::default()).await
    }
}

#[async_trait]
impl PolicyEvaluator for CasbinPolicyStore {
    #[instrument(skip(self))]
    async fn enforce(
        &self,
        subject: &str,
        object: &str,
        domain: &str,
    ) -> Result<bool, PolicyError> {
        let enforcer = self.enforcer.read().await;
        enforcer
            .enforce((subject, domain, object))
            .map_err(|e| PolicyError::Evaluation(e.to_string()))
    }

    async fn add_policy(&self, rule: PolicyRule) -> Result<bool, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer.add_policy(policy_row(&rule)).await.map_err(storage)
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer.remove_policy(policy_row(rule)).await.map_err(storage)
    }

    async fn remove_policies_for_subject(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<bool, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer
            .remove_filtered_policy(0, vec![subject.to_string(), domain.to_string()])
            .await
            .map_err(storage)
    }

    async fn add_grouping(&self, rule: GroupingRule) -> Result<bool, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer
            .add_grouping_policy(grouping_row(&rule))
            .await
            .map_err(storage)
    }

    async fn remove_grouping(&self, rule: &GroupingRule) -> Result<bool, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer
            .remove_grouping_policy(grouping_row(rule))
            .await
            .map_err(storage)
    }

    async fn remove_groupings_for_member(
        &self,
        member: &str,
        domain: &str,
    ) -> Result<bool, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        let rows: Vec<Vec<String>> = enforcer
            .get_filtered_grouping_policy(0, vec![member.to_string()])
            .into_iter()
            .filter(|row| row.get(2).is_some_and(|d| d == domain))
            .collect();
        remove_grouping_rows(&mut enforcer, rows).await
    }

    async fn remove_groupings_for_role(
        &self,
        role: &str,
        domain: &str,
    ) -> Result<bool, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer
            .remove_filtered_grouping_policy(1, vec![role.to_string(), domain.to_string()])
            .await
            .map_err(storage)
    }

    async fn roles_for(&self, member: &str, domain: &str) -> Result<Vec<String>, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        Ok(enforcer.get_roles_for_user(member, Some(domain)))
    }

    async fn members_of(&self, role: &str, domain: &str) -> Result<Vec<String>, PolicyError> {
        let enforcer = self.enforcer.read().await;
        Ok(enforcer
            .get_filtered_grouping_policy(1, vec![role.to_string(), domain.to_string()])
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    async fn implicit_roles_for(
        &self,
        member: &str,
        domain: &str,
    ) -> Result<Vec<String>, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        Ok(enforcer.get_implicit_roles_for_user(member, Some(domain)))
    }

    async fn permissions_for(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<Vec<PolicyRule>, PolicyError> {
        let enforcer = self.enforcer.read().await;
        Ok(enforcer
            .get_filtered_policy(0, vec![subject.to_string(), domain.to_string()])
            .into_iter()
            .filter_map(rule_from_row)
            .collect())
    }

    async fn implicit_permissions_for(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<Vec<PolicyRule>, PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        Ok(enforcer
            .get_implicit_permissions_for_user(subject, Some(domain))
            .into_iter()
            .filter_map(rule_from_row)
            .collect())
    }

    async fn members_in_domain(&self, domain: &str) -> Result<Vec<String>, PolicyError> {
        let enforcer = self.enforcer.read().await;
        let mut members: Vec<String> = enforcer
            .get_filtered_grouping_policy(2, vec![domain.to_string()])
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect();
        members.sort();
        members.dedup();
        Ok(members)
    }

    #[instrument(skip(self))]
    async fn reload(&self) -> Result<(), PolicyError> {
        let mut enforcer = self.enforcer.write().await;
        enforcer.load_policy().await.map_err(storage)
    }
}

async fn remove_grouping_rows(
    enforcer: &mut Enforcer,
    rows: Vec<Vec<String>>,
) -> Result<bool, PolicyError> {
    if rows.is_empty() {
        return Ok(false);
    }
    enforcer.remove_grouping_policies(rows).await.map_err(storage)
}
