//! NodeSpace Nested Set - Hierarchy Engine
//!
//! This crate stores trees in a relational table using the nested-set model:
//! every node carries a `left`/`right` interval that encloses the intervals of
//! its descendants, plus a `level` and a `parent` pointer. Subtree, ancestor
//! and leaf reads become single range queries; writes keep the intervals
//! consistent with bulk shifts.
//!
//! # Architecture
//!
//! - **Intent handles**: a [`TreeNode`] records what should happen
//!   (`append_to`, `make_root`, ...); nothing is written until the handle is
//!   passed to [`NestedSet`]
//! - **Store trait**: [`TreeStore`] abstracts the table; libsql/Turso and an
//!   in-memory driver ship with the crate
//! - **Forests**: with `multi_tree` the table is partitioned by `tree_id` and
//!   every statement is scoped to one tree
//! - **Repair**: `fix_tree` rebuilds bounds from parent pointers when they drift
//!
//! # Modules
//!
//! - [`config`] - Table, column and behaviour configuration
//! - [`models`] - Keys, records and intent handles
//! - [`db`] - Store trait and drivers
//! - [`operations`] - Shift, insert, move, delete, repair and health algorithms
//! - [`services`] - The `NestedSet` service and tree id generators

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::{ChildrenPolicy, ColumnNames, TreeConfig, TreeIdStrategy};
pub use db::{DatabaseError, MemoryTreeStore, TreeScope, TreeStore};
#[cfg(feature = "turso")]
pub use db::SqliteTreeStore;
pub use models::{Key, NodeRecord, Operation, TreeNode};
pub use operations::{FixReport, HealthReport, NestedSetError};
pub use services::NestedSet;
