//! TreeStore Trait - Backing Store Abstraction
//!
//! This module defines the `TreeStore` trait, the only boundary between the
//! nested-set operations and a concrete backing store. The trait bundles the
//! two collaborator contracts the tree engine depends on:
//!
//! - **Entity accessor**: find / insert a node, save its attributes
//! - **Range query/update executor**: bulk `UPDATE`/`SELECT`/`DELETE`
//!   statements over bound ranges, optionally scoped by `tree_id`
//!
//! # Design Decisions
//!
//! 1. **Async-First**: all methods are async so that both embedded (libsql)
//!    and in-process drivers fit behind one trait object
//! 2. **Arithmetic in the store**: every bound change is expressed as a
//!    request value (`Shift`, `Relocation`) and executed by the driver in one
//!    statement; callers never read-modify-write bounds
//! 3. **Caller-driven transactions**: `begin`/`commit`/`rollback` wrap each
//!    structural operation; drivers keep a single connection so the
//!    statements of one operation share the transaction
//!
//! # Examples
//!
//! ```rust
//! use nodespace_nested_set::db::{Shift, TreeScope};
//!
//! // Open a two-slot gap at bound 4 for the whole table
//! let shift = Shift::open(4, 2, TreeScope::All);
//! assert!(!shift.is_noop());
//! ```

use super::error::DatabaseError;
use crate::models::{Key, NodeRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tree partition a statement is restricted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeScope {
    /// Every row (single-tree tables, or forest-wide checks)
    All,
    /// Only rows with `tree_id = key`
    Tree(Key),
}

impl TreeScope {
    /// Scope for a record: its own tree in multi-tree mode, everything otherwise
    pub fn of(record: &NodeRecord, multi_tree: bool) -> Self {
        match (&record.tree_id, multi_tree) {
            (Some(tree_id), true) => Self::Tree(tree_id.clone()),
            _ => Self::All,
        }
    }

    pub fn tree_id(&self) -> Option<&Key> {
        match self {
            Self::All => None,
            Self::Tree(key) => Some(key),
        }
    }
}

/// Soft-delete filter applied to a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashFilter {
    /// Trashed and live rows alike
    #[default]
    All,
    WithoutTrashed,
    OnlyTrashed,
}

/// Move-marker filter applied to a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkFilter {
    #[default]
    Any,
    Unmarked,
    Marked,
}

/// Bulk bound shift: every `left` (and independently every `right`) in
/// `[from, to]` moves by `delta`
///
/// `to = None` means the range is unbounded above. Trashed rows keep their
/// bounds reserved, so a shift always moves them too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift {
    pub from: i64,
    pub to: Option<i64>,
    pub delta: i64,
    pub scope: TreeScope,
    pub marks: MarkFilter,
}

impl Shift {
    /// Shift everything at or after `from`
    pub fn open(from: i64, delta: i64, scope: TreeScope) -> Self {
        Self {
            from,
            to: None,
            delta,
            scope,
            marks: MarkFilter::Any,
        }
    }

    /// Shift everything inside `[from, to]`
    pub fn range(from: i64, to: i64, delta: i64, scope: TreeScope) -> Self {
        Self {
            to: Some(to),
            ..Self::open(from, delta, scope)
        }
    }

    pub fn with_marks(mut self, marks: MarkFilter) -> Self {
        self.marks = marks;
        self
    }

    /// Whether executing the shift cannot change any row
    pub fn is_noop(&self) -> bool {
        self.delta == 0 || matches!(self.to, Some(to) if to < self.from)
    }

    /// Whether `value` falls inside the shifted range
    pub fn covers(&self, value: i64) -> bool {
        value >= self.from && self.to.map_or(true, |to| value <= to)
    }
}

/// Which rows a bulk statement targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Rows currently carrying the move marker
    Marked,
    /// Rows with `left >= left && right <= right` (a subtree and its root)
    Range { left: i64, right: i64 },
    /// A single row
    Node(Key),
    /// An explicit set of rows
    Ids(Vec<Key>),
}

/// Bulk relabel of a selected subtree
///
/// Adds `delta` to both bounds and `level_delta` to the level, optionally
/// reassigns `tree_id`, and always clears the move marker of the rows it
/// touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub scope: TreeScope,
    pub selector: Selector,
    pub delta: i64,
    pub level_delta: i64,
    pub tree_id: Option<Key>,
}

/// Interval predicate for selections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeFilter {
    /// `left >= left && right <= right`
    Within { left: i64, right: i64 },
    /// `left < left && right > right` (strict ancestors)
    Containing { left: i64, right: i64 },
}

/// Parent-pointer predicate for selections
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParentFilter {
    #[default]
    Any,
    /// `parent IS NULL`
    Root,
    Is(Key),
}

/// Read request; results are ordered by `tree_id`, then `left`, then `id`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    pub tree_id: Option<Key>,
    pub range: Option<RangeFilter>,
    pub parent: ParentFilter,
    pub leaves_only: bool,
    pub trash: TrashFilter,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_scope(mut self, scope: &TreeScope) -> Self {
        self.tree_id = scope.tree_id().cloned();
        self
    }

    pub fn within(mut self, left: i64, right: i64) -> Self {
        self.range = Some(RangeFilter::Within { left, right });
        self
    }

    pub fn containing(mut self, left: i64, right: i64) -> Self {
        self.range = Some(RangeFilter::Containing { left, right });
        self
    }

    pub fn roots(mut self) -> Self {
        self.parent = ParentFilter::Root;
        self
    }

    pub fn children_of(mut self, parent: &Key) -> Self {
        self.parent = ParentFilter::Is(parent.clone());
        self
    }

    pub fn leaves(mut self) -> Self {
        self.leaves_only = true;
        self
    }

    pub fn trash(mut self, trash: TrashFilter) -> Self {
        self.trash = trash;
        self
    }
}

/// Recomputed bookkeeping for one row, written by the repairer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundsUpdate {
    pub id: Key,
    pub left: i64,
    pub right: i64,
    pub level: i64,
    pub parent_id: Option<Key>,
}

/// Soft-delete stamp predicate for trash/restore statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashMatch {
    Any,
    Untrashed,
    /// Rows trashed at exactly this instant (trashed together)
    TrashedAt(DateTime<Utc>),
}

/// Integrity predicates evaluated by [`TreeStore::health_count`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheck {
    /// `left >= right` or an even `right - left`
    Oddness,
    /// Two rows of one tree sharing a bound value
    Duplicates,
    /// Child not strictly inside its parent, or another node in between
    WrongParent,
    /// Parent pointer that resolves to no row in scope
    MissingParent,
    /// `level != parent.level + 1`
    WrongLevel,
}

impl HealthCheck {
    pub const ALL: [HealthCheck; 5] = [
        HealthCheck::Oddness,
        HealthCheck::Duplicates,
        HealthCheck::WrongParent,
        HealthCheck::MissingParent,
        HealthCheck::WrongLevel,
    ];
}

/// Backing store for nested-set rows
///
/// Implementations must execute each bulk request as a single statement (or
/// an equivalent atomic step) and must honor the scope and filters exactly;
/// the operations layer relies on that to keep intervals consistent.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Whether the table carries a soft-delete column
    fn supports_soft_delete(&self) -> bool;

    async fn begin(&self) -> Result<(), DatabaseError>;

    async fn commit(&self) -> Result<(), DatabaseError>;

    async fn rollback(&self) -> Result<(), DatabaseError>;

    /// Fresh copy of a row (the "refresh" of the entity accessor)
    async fn find(&self, id: &Key) -> Result<Option<NodeRecord>, DatabaseError>;

    async fn insert(&self, record: &NodeRecord) -> Result<(), DatabaseError>;

    /// Plain attribute update; never touches bounds
    async fn save_attributes(
        &self,
        id: &Key,
        properties: &serde_json::Value,
    ) -> Result<u64, DatabaseError>;

    async fn select(&self, selection: &Selection) -> Result<Vec<NodeRecord>, DatabaseError>;

    async fn count(&self, selection: &Selection) -> Result<u64, DatabaseError>;

    /// Distinct non-null tree ids, ascending
    async fn tree_ids(&self) -> Result<Vec<Key>, DatabaseError>;

    /// Largest integer tree id, if any
    async fn max_tree_id(&self) -> Result<Option<i64>, DatabaseError>;

    async fn shift(&self, shift: &Shift) -> Result<u64, DatabaseError>;

    /// Set the move marker on the selected rows
    async fn mark(&self, scope: &TreeScope, selector: &Selector) -> Result<u64, DatabaseError>;

    /// Clear every move marker in scope
    async fn unmark(&self, scope: &TreeScope) -> Result<u64, DatabaseError>;

    async fn relocate(&self, relocation: &Relocation) -> Result<u64, DatabaseError>;

    async fn set_parent(&self, id: &Key, parent_id: Option<&Key>) -> Result<u64, DatabaseError>;

    /// Point every direct child of `from` at `to`
    async fn reparent_children(
        &self,
        scope: &TreeScope,
        from: &Key,
        to: Option<&Key>,
    ) -> Result<u64, DatabaseError>;

    /// Physically delete the selected rows
    async fn delete(&self, scope: &TreeScope, selector: &Selector) -> Result<u64, DatabaseError>;

    /// Persist recomputed bounds, levels and parents in one batch
    async fn write_bounds(&self, updates: &[BoundsUpdate]) -> Result<u64, DatabaseError>;

    /// Stamp (or clear, with `None`) `deleted_at` on the selected rows that match `matching`
    async fn set_deleted_at(
        &self,
        scope: &TreeScope,
        selector: &Selector,
        matching: TrashMatch,
        value: Option<DateTime<Utc>>,
    ) -> Result<u64, DatabaseError>;

    /// Number of rows (or row pairs, for duplicates) failing `check`
    async fn health_count(&self, check: HealthCheck, scope: &TreeScope)
        -> Result<u64, DatabaseError>;
}
