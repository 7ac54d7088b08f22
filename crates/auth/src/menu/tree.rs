//! Menu tree assembly.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use gatekeep_core::MenuId;
use gatekeep_infra::directory::MenuRecord;

/// Anything that can be placed in a menu tree.
pub trait MenuItem {
    fn menu_id(&self) -> MenuId;
    /// `None` for roots.
    fn parent_id(&self) -> Option<MenuId>;
    fn sort_order(&self) -> i32;
}

impl MenuItem for MenuRecord {
    fn menu_id(&self) -> MenuId {
        self.id
    }

    fn parent_id(&self) -> Option<MenuId> {
        self.parent_id
    }

    fn sort_order(&self) -> i32 {
        self.sort_order
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub children: Vec<MenuNode<T>>,
}

impl<T: MenuItem> MenuNode<T> {
    pub fn id(&self) -> MenuId {
        self.item.menu_id()
    }

    /// Depth-first, pre-order ids (test/debug helper).
    pub fn flatten_ids(&self) -> Vec<MenuId> {
        let mut ids = vec![self.id()];
        for child in &self.children {
            ids.extend(child.flatten_ids());
        }
        ids
    }
}

/// Assemble `items` into a forest.
///
/// Items without a parent are roots. Children attach to their parent by id;
/// an item whose parent is not in `items` is dropped with its subtree.
/// Every sibling list is sorted by `sort_order` with a stable sort, so ties
/// keep input order. Duplicate ids keep the first occurrence. The tree is
/// only grown downward from roots, so items caught in a parent cycle are
/// unreachable and dropped rather than looping.
pub fn build_menu_tree<T: MenuItem>(items: Vec<T>) -> Vec<MenuNode<T>> {
    let mut seen: HashSet<MenuId> = HashSet::new();
    let mut slots: Vec<Option<T>> = Vec::with_capacity(items.len());
    let mut children_of: HashMap<Option<MenuId>, Vec<usize>> = HashMap::new();

    for item in items {
        if !seen.insert(item.menu_id()) {
            continue;
        }
        children_of
            .entry(item.parent_id())
            .or_default()
            .push(slots.len());
        slots.push(Some(item));
    }

    let roots = children_of.remove(&None).unwrap_or_default();
    grow(roots, &mut slots, &mut children_of)
}

fn grow<T: MenuItem>(
    indices: Vec<usize>,
    slots: &mut [Option<T>],
    children_of: &mut HashMap<Option<MenuId>, Vec<usize>>,
) -> Vec<MenuNode<T>> {
    let mut nodes = Vec::with_capacity(indices.len());
    for i in indices {
        let Some(item) = slots[i].take() else {
            continue;
        };
        let child_indices = children_of
            .remove(&Some(item.menu_id()))
            .unwrap_or_default();
        let children = grow(child_indices, slots, children_of);
        nodes.push(MenuNode { item, children });
    }
    nodes.sort_by_key(|n| n.item.sort_order());
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::menu;
    use proptest::prelude::*;

    fn ids<T: MenuItem>(nodes: &[MenuNode<T>]) -> Vec<u64> {
        nodes.iter().map(|n| n.id().get()).collect()
    }

    #[test]
    fn roots_and_children_are_sorted() {
        let tree = build_menu_tree(vec![menu(1, None, 2), menu(2, None, 1), menu(3, Some(1), 1)]);

        assert_eq!(ids(&tree), vec![2, 1]);
        assert!(tree[0].children.is_empty());
        assert_eq!(ids(&tree[1].children), vec![3]);
    }

    #[test]
    fn ties_keep_input_order() {
        let tree = build_menu_tree(vec![
            menu(5, None, 1),
            menu(4, None, 1),
            menu(6, None, 0),
            menu(7, Some(4), 3),
            menu(8, Some(4), 3),
        ]);
        assert_eq!(ids(&tree), vec![6, 5, 4]);
        assert_eq!(ids(&tree[2].children), vec![7, 8]);
    }

    #[test]
    fn orphans_and_duplicates_are_dropped() {
        let tree = build_menu_tree(vec![
            menu(1, None, 0),
            menu(1, None, 9),
            menu(2, Some(40), 0),
            menu(3, Some(2), 0),
        ]);
        assert_eq!(ids(&tree), vec![1]);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let tree = build_menu_tree(vec![
            menu(1, None, 0),
            menu(2, Some(3), 0),
            menu(3, Some(2), 0),
            menu(4, Some(4), 0),
        ]);
        assert_eq!(ids(&tree), vec![1]);
    }

    #[test]
    fn deep_chains_build() {
        let mut items = vec![menu(1, None, 0)];
        for id in 2..200 {
            items.push(menu(id, Some(id - 1), 0));
        }
        let tree = build_menu_tree(items);
        assert_eq!(tree[0].flatten_ids().len(), 199);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn every_sibling_list_is_sorted(sorts in prop::collection::vec((0u64..6, -3i32..3), 1..40)) {
            // parent is always an earlier id, so the input is a forest
            let items: Vec<_> = sorts
                .iter()
                .enumerate()
                .map(|(i, (p, sort))| {
                    let id = i as u64 + 1;
                    let parent = if *p == 0 || *p >= id { None } else { Some(id - p) };
                    menu(id, parent, *sort)
                })
                .collect();
            let count = items.len();

            fn check(nodes: &[MenuNode<gatekeep_infra::directory::MenuRecord>]) -> usize {
                assert!(nodes.windows(2).all(|w| w[0].item.sort_order <= w[1].item.sort_order));
                nodes.iter().map(|n| 1 + check(&n.children)).sum()
            }

            let tree = build_menu_tree(items);
            prop_assert_eq!(check(&tree), count);
        }
    }
}
