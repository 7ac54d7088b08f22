//! Per-tenant menu → permission matrix.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use gatekeep_core::{MenuId, PermissionId, TenantId};
use gatekeep_infra::directory::{LinkedPermission, MenuRecord, PermissionRecord};

/// Permissions linked to one menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuPermissionEntry {
    pub menu: MenuRecord,
    /// Every linked permission, in link order.
    pub all: Vec<PermissionRecord>,
    /// Permissions gating visibility.
    pub required: Vec<PermissionRecord>,
    /// Permissions only gating specific actions.
    pub optional: Vec<PermissionRecord>,
}

impl MenuPermissionEntry {
    pub fn new(menu: MenuRecord) -> Self {
        Self {
            menu,
            all: Vec::new(),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    pub fn push(&mut self, link: LinkedPermission) {
        if link.is_required {
            self.required.push(link.permission.clone());
        } else {
            self.optional.push(link.permission.clone());
        }
        self.all.push(link.permission);
    }

    pub fn is_unrestricted(&self) -> bool {
        self.all.is_empty()
    }

    /// True when every required permission code is granted (vacuously true
    /// without required permissions).
    pub fn has_required_permissions(&self, granted: &HashSet<String>) -> bool {
        self.required.iter().all(|p| granted.contains(&p.code))
    }

    /// Required permission codes missing from `granted`.
    pub fn missing_permissions(&self, granted: &HashSet<String>) -> Vec<String> {
        self.required
            .iter()
            .filter(|p| !granted.contains(&p.code))
            .map(|p| p.code.clone())
            .collect()
    }

    /// Granted permission codes linked to this menu.
    pub fn granted_permissions(&self, granted: &HashSet<String>) -> Vec<String> {
        self.all
            .iter()
            .filter(|p| granted.contains(&p.code))
            .map(|p| p.code.clone())
            .collect()
    }

    /// Actions unlocked by the granted permissions, deduplicated in link order.
    pub fn available_actions(&self, granted: &HashSet<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        self.all
            .iter()
            .filter(|p| granted.contains(&p.code))
            .filter_map(|p| p.action.clone())
            .filter(|a| seen.insert(a.clone()))
            .collect()
    }

    /// Every action this menu offers, regardless of grants.
    pub fn all_actions(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.all
            .iter()
            .filter_map(|p| p.action.clone())
            .filter(|a| seen.insert(a.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuPermissionMatrix {
    pub tenant_id: TenantId,
    /// One entry per menu, in menu storage order.
    pub entries: Vec<MenuPermissionEntry>,
}

impl MenuPermissionMatrix {
    /// Join menus with their links. Links to menus outside `menus` are ignored.
    pub fn build(
        tenant_id: TenantId,
        menus: Vec<MenuRecord>,
        links: impl IntoIterator<Item = (MenuId, LinkedPermission)>,
    ) -> Self {
        let mut index: HashMap<MenuId, usize> = HashMap::new();
        let mut entries = Vec::with_capacity(menus.len());
        for menu in menus {
            if index.contains_key(&menu.id) {
                continue;
            }
            index.insert(menu.id, entries.len());
            entries.push(MenuPermissionEntry::new(menu));
        }

        for (menu_id, link) in links {
            if let Some(&i) = index.get(&menu_id) {
                entries[i].push(link);
            }
        }

        Self { tenant_id, entries }
    }

    pub fn entry(&self, menu_id: MenuId) -> Option<&MenuPermissionEntry> {
        self.entries.iter().find(|e| e.menu.id == menu_id)
    }

    /// Codes of every permission referenced by the matrix, keyed by id.
    pub fn permission_codes(&self) -> HashMap<PermissionId, String> {
        self.entries
            .iter()
            .flat_map(|e| e.all.iter())
            .map(|p| (p.id, p.code.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{menu, permission};

    fn link(id: u64, code: &str, action: &str, is_required: bool) -> LinkedPermission {
        LinkedPermission {
            permission: permission(id, code, Some(action)),
            is_required,
        }
    }

    fn granted(codes: &[&str]) -> HashSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn required_and_optional_are_split() {
        let mut entry = MenuPermissionEntry::new(menu(1, None, 0));
        entry.push(link(1, "user:list", "view", true));
        entry.push(link(2, "user:edit", "edit", false));
        entry.push(link(3, "user:delete", "delete", false));

        assert_eq!(entry.all.len(), 3);
        assert_eq!(entry.required.len(), 1);
        assert_eq!(entry.optional.len(), 2);
        assert_eq!(entry.all_actions(), vec!["view", "edit", "delete"]);
    }

    #[test]
    fn required_permissions_gate_visibility() {
        let mut entry = MenuPermissionEntry::new(menu(1, None, 0));
        assert!(entry.has_required_permissions(&granted(&[])));

        entry.push(link(1, "user:list", "view", true));
        entry.push(link(2, "user:edit", "edit", false));
        assert!(!entry.has_required_permissions(&granted(&["user:edit"])));
        assert_eq!(entry.missing_permissions(&granted(&["user:edit"])), vec!["user:list"]);
        assert!(entry.has_required_permissions(&granted(&["user:list"])));
    }

    #[test]
    fn actions_follow_grants() {
        let mut entry = MenuPermissionEntry::new(menu(1, None, 0));
        entry.push(link(1, "user:list", "view", true));
        entry.push(link(2, "user:edit", "edit", false));
        entry.push(link(3, "user:export", "view", false));

        assert_eq!(
            entry.available_actions(&granted(&["user:list", "user:export"])),
            vec!["view"]
        );
        assert_eq!(
            entry.available_actions(&granted(&["user:list", "user:edit"])),
            vec!["view", "edit"]
        );
    }

    #[test]
    fn build_ignores_links_to_unknown_menus() {
        let matrix = MenuPermissionMatrix::build(
            TenantId::DEFAULT,
            vec![menu(1, None, 0), menu(2, None, 1)],
            vec![
                (MenuId::new(2), link(5, "audit:view", "view", true)),
                (MenuId::new(9), link(6, "ghost", "view", true)),
            ],
        );
        assert!(matrix.entry(MenuId::new(1)).unwrap().is_unrestricted());
        assert_eq!(matrix.entry(MenuId::new(2)).unwrap().required.len(), 1);
        assert_eq!(matrix.permission_codes().len(), 1);
    }
}
