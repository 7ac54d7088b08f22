//! Menus: the menu-permission matrix, tree assembly and per-user views.

pub mod matrix;
pub mod service;
pub mod tree;

pub use matrix::{MenuPermissionEntry, MenuPermissionMatrix};
pub use service::{AccessibleMenu, MAX_MENU_DEPTH, MenuAccessReport, MenuService};
pub use tree::{MenuItem, MenuNode, build_menu_tree};
