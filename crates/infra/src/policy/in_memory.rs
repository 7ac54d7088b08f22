//! In-memory RBAC-with-domains evaluator.
//!
//! [`PolicyTable`] plays the durable store and may be shared by several
//! [`InMemoryPolicyStore`] instances (one per replica). Each instance serves
//! reads from its own snapshot; writes go to the table and to the writer's
//! snapshot, so other instances only observe them after `reload()`.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::r#trait::{GroupingRule, PolicyError, PolicyEvaluator, PolicyRule};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PolicySet {
    policies: BTreeSet<PolicyRule>,
    groupings: BTreeSet<GroupingRule>,
}

impl PolicySet {
    fn apply(&mut self, change: &Change) -> bool {
        match change {
            Change::AddPolicy(rule) => self.policies.insert(rule.clone()),
            Change::RemovePolicy(rule) => self.policies.remove(rule),
            Change::RemovePoliciesForSubject { subject, domain } => {
                let before = self.policies.len();
                self.policies
                    .retain(|p| !(p.subject == *subject && p.domain == *domain));
                before != self.policies.len()
            }
            Change::AddGrouping(rule) => self.groupings.insert(rule.clone()),
            Change::RemoveGrouping(rule) => self.groupings.remove(rule),
            Change::RemoveGroupingsForMember { member, domain } => {
                let before = self.groupings.len();
                self.groupings
                    .retain(|g| !(g.member == *member && g.domain == *domain));
                before != self.groupings.len()
            }
            Change::RemoveGroupingsForRole { role, domain } => {
                let before = self.groupings.len();
                self.groupings
                    .retain(|g| !(g.role == *role && g.domain == *domain));
                before != self.groupings.len()
            }
        }
    }

    fn direct_roles(&self, member: &str, domain: &str) -> Vec<String> {
        self.groupings
            .iter()
            .filter(|g| g.member == member && g.domain == domain)
            .map(|g| g.role.clone())
            .collect()
    }

    /// Breadth-first walk over grouping tuples; the visited set makes cyclic
    /// role inheritance terminate.
    fn implicit_roles(&self, member: &str, domain: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<String> = self.direct_roles(member, domain).into();

        while let Some(role) = queue.pop_front() {
            if role == member || !seen.insert(role.clone()) {
                continue;
            }
            queue.extend(self.direct_roles(&role, domain));
            order.push(role);
        }
        order
    }

    fn subjects_for(&self, subject: &str, domain: &str) -> Vec<String> {
        let mut subjects = vec![subject.to_string()];
        subjects.extend(self.implicit_roles(subject, domain));
        subjects
    }

    fn enforce(&self, subject: &str, object: &str, domain: &str) -> bool {
        self.subjects_for(subject, domain).iter().any(|s| {
            self.policies
                .iter()
                .any(|p| p.subject == *s && p.object == object && p.domain == domain)
        })
    }

    fn permissions(&self, subject: &str, domain: &str) -> Vec<PolicyRule> {
        self.policies
            .iter()
            .filter(|p| p.subject == subject && p.domain == domain)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Change {
    AddPolicy(PolicyRule),
    RemovePolicy(PolicyRule),
    RemovePoliciesForSubject { subject: String, domain: String },
    AddGrouping(GroupingRule),
    RemoveGrouping(GroupingRule),
    RemoveGroupingsForMember { member: String, domain: String },
    RemoveGroupingsForRole { role: String, domain: String },
}

fn poisoned<T>(_: T) -> PolicyError {
    PolicyError::Storage("policy lock poisoned".to_string())
}

/// Durable policy storage shared between evaluator instances.
#[derive(Debug, Default)]
pub struct PolicyTable {
    set: RwLock<PolicySet>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn policy_count(&self) -> usize {
        self.set.read().map(|s| s.policies.len()).unwrap_or(0)
    }

    pub fn grouping_count(&self) -> usize {
        self.set.read().map(|s| s.groupings.len()).unwrap_or(0)
    }

    fn apply(&self, change: &Change) -> Result<bool, PolicyError> {
        Ok(self.set.write().map_err(poisoned)?.apply(change))
    }

    fn load(&self) -> Result<PolicySet, PolicyError> {
        Ok(self.set.read().map_err(poisoned)?.clone())
    }
}

/// Evaluator instance with a read-through snapshot of a [`PolicyTable`].
#[derive(Debug)]
pub struct InMemoryPolicyStore {
    table: Arc<PolicyTable>,
    snapshot: RwLock<PolicySet>,
}

impl InMemoryPolicyStore {
    /// Standalone evaluator with its own table.
    pub fn new() -> Self {
        Self::with_table(PolicyTable::arc())
    }

    /// Evaluator over a shared table, starting from its current contents.
    pub fn with_table(table: Arc<PolicyTable>) -> Self {
        let snapshot = table.load().unwrap_or_default();
        Self {
            table,
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn table(&self) -> &Arc<PolicyTable> {
        &self.table
    }

    fn mutate(&self, change: Change) -> Result<bool, PolicyError> {
        // Durable write first; the local snapshot mirrors it so this instance
        // observes its own writes without a reload.
        let changed = self.table.apply(&change)?;
        self.snapshot.write().map_err(poisoned)?.apply(&change);
        Ok(changed)
    }

    fn read<T>(&self, f: impl FnOnce(&PolicySet) -> T) -> Result<T, PolicyError> {
        Ok(f(&*self.snapshot.read().map_err(poisoned)?))
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyEvaluator for InMemoryPolicyStore {
    async fn enforce(
        &self,
        subject: &str,
        object: &str,
        domain: &str,
    ) -> Result<bool, PolicyError> {
        self.read(|s| s.enforce(subject, object, domain))
    }

    async fn add_policy(&self, rule: PolicyRule) -> Result<bool, PolicyError> {
        self.mutate(Change::AddPolicy(rule))
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, PolicyError> {
        self.mutate(Change::RemovePolicy(rule.clone()))
    }

    async fn remove_policies_for_subject(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<bool, PolicyError> {
        self.mutate(Change::RemovePoliciesForSubject {
            subject: subject.to_string(),
            domain: domain.to_string(),
        })
    }

    async fn add_grouping(&self, rule: GroupingRule) -> Result<bool, PolicyError> {
        self.mutate(Change::AddGrouping(rule))
    }

    async fn remove_grouping(&self, rule: &GroupingRule) -> Result<bool, PolicyError> {
        self.mutate(Change::RemoveGrouping(rule.clone()))
    }

    async fn remove_groupings_for_member(
        &self,
        member: &str,
        domain: &str,
    ) -> Result<bool, PolicyError> {
        self.mutate(Change::RemoveGroupingsForMember {
            member: member.to_string(),
            domain: domain.to_string(),
        })
    }

    async fn remove_groupings_for_role(
        &self,
        role: &str,
        domain: &str,
    ) -> Result<bool, PolicyError> {
        self.mutate(Change::RemoveGroupingsForRole {
            role: role.to_string(),
            domain: domain.to_string(),
        })
    }

    async fn roles_for(&self, member: &str, domain: &str) -> Result<Vec<String>, PolicyError> {
        self.read(|s| s.direct_roles(member, domain))
    }

    async fn members_of(&self, role: &str, domain: &str) -> Result<Vec<String>, PolicyError> {
        self.read(|s| {
            s.groupings
                .iter()
                .filter(|g| g.role == role && g.domain == domain)
                .map(|g| g.member.clone())
                .collect()
        })
    }

    async fn implicit_roles_for(
        &self,
        member: &str,
        domain: &str,
    ) -> Result<Vec<String>, PolicyError> {
        self.read(|s| s.implicit_roles(member, domain))
    }

    async fn permissions_for(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<Vec<PolicyRule>, PolicyError> {
        self.read(|s| s.permissions(subject, domain))
    }

    async fn implicit_permissions_for(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<Vec<PolicyRule>, PolicyError> {
        self.read(|s| {
            s.subjects_for(subject, domain)
                .iter()
                .flat_map(|sub| s.permissions(sub, domain))
                .collect()
        })
    }

    async fn members_in_domain(&self, domain: &str) -> Result<Vec<String>, PolicyError> {
        self.read(|s| {
            let members: BTreeSet<String> = s
                .groupings
                .iter()
                .filter(|g| g.domain == domain)
                .map(|g| g.member.clone())
                .collect();
            members.into_iter().collect()
        })
    }

    async fn reload(&self) -> Result<(), PolicyError> {
        let fresh = self.table.load()?;
        *self.snapshot.write().map_err(poisoned)? = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforce_follows_role_chain_within_domain() {
        let store = InMemoryPolicyStore::new();
        store.add_policy(PolicyRule::new("r2", "a10", "t1")).await.unwrap();
        store.add_grouping(GroupingRule::new("r1", "r2", "t1")).await.unwrap();
        store.add_grouping(GroupingRule::new("u7", "r1", "t1")).await.unwrap();

        assert!(store.enforce("u7", "a10", "t1").await.unwrap());
        assert!(!store.enforce("u7", "a10", "t2").await.unwrap());
        assert!(!store.enforce("u8", "a10", "t1").await.unwrap());
        assert_eq!(
            store.implicit_roles_for("u7", "t1").await.unwrap(),
            vec!["r1".to_string(), "r2".to_string()]
        );
    }

    #[tokio::test]
    async fn cyclic_inheritance_terminates() {
        let store = InMemoryPolicyStore::new();
        store.add_grouping(GroupingRule::new("r1", "r2", "t1")).await.unwrap();
        store.add_grouping(GroupingRule::new("r2", "r1", "t1")).await.unwrap();
        store.add_grouping(GroupingRule::new("u1", "r1", "t1")).await.unwrap();

        assert!(!store.enforce("u1", "a1", "t1").await.unwrap());
        assert_eq!(store.implicit_roles_for("u1", "t1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mutations_report_changes() {
        let store = InMemoryPolicyStore::new();
        let rule = GroupingRule::new("u1", "r1", "t1");
        assert!(store.add_grouping(rule.clone()).await.unwrap());
        assert!(!store.add_grouping(rule.clone()).await.unwrap());
        assert!(store.remove_grouping(&rule).await.unwrap());
        assert!(!store.remove_grouping(&rule).await.unwrap());
    }

    #[tokio::test]
    async fn filtered_removal_is_domain_scoped() {
        let store = InMemoryPolicyStore::new();
        store.add_grouping(GroupingRule::new("u1", "r1", "t1")).await.unwrap();
        store.add_grouping(GroupingRule::new("u2", "r1", "t1")).await.unwrap();
        store.add_grouping(GroupingRule::new("u1", "r1", "t2")).await.unwrap();

        assert!(store.remove_groupings_for_role("r1", "t1").await.unwrap());
        assert!(store.members_of("r1", "t1").await.unwrap().is_empty());
        assert_eq!(store.members_of("r1", "t2").await.unwrap(), vec!["u1".to_string()]);
        assert_eq!(store.members_in_domain("t2").await.unwrap(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn other_instances_see_writes_only_after_reload() {
        let table = PolicyTable::arc();
        let writer = InMemoryPolicyStore::with_table(table.clone());
        let reader = InMemoryPolicyStore::with_table(table.clone());

        writer.add_policy(PolicyRule::new("u1", "a1", "t1")).await.unwrap();
        assert!(writer.enforce("u1", "a1", "t1").await.unwrap());
        assert!(!reader.enforce("u1", "a1", "t1").await.unwrap());

        reader.reload().await.unwrap();
        assert!(reader.enforce("u1", "a1", "t1").await.unwrap());
        assert_eq!(table.policy_count(), 1);
    }
}
