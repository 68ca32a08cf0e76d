//! Nested-Set Operations
//!
//! Structural algorithms over a [`TreeStore`]. Each submodule implements one
//! part of the engine and runs inside a transaction opened by the caller
//! ([`NestedSet`](crate::services::NestedSet) in practice):
//!
//! - `shifter` - bulk bound shifts, gap opening and closing
//! - `insert` - placing new nodes (roots and positional intents)
//! - `mover` - relocating persisted subtrees, same-tree, cross-tree, re-root
//! - `deleter` - hard delete, trash and restore
//! - `repairer` - rebuilding bounds from parent pointers
//! - `health` - integrity counters
//!
//! Every function validates its request completely before issuing the first
//! bulk statement.

mod deleter;
pub mod error;
mod health;
mod insert;
mod mover;
mod repairer;
mod shifter;

pub use deleter::{force_delete, restore, trash};
pub use error::NestedSetError;
pub use health::{check, HealthReport};
pub use insert::create;
pub use mover::move_node;
pub use repairer::{fix_forest, fix_subtree, fix_tree, plan_renumbering, FixReport, Renumbering};
pub use shifter::Shifter;

use crate::config::TreeConfig;
use crate::db::{Selection, TrashFilter, TreeScope, TreeStore};
use crate::models::{Key, NodeRecord};
use crate::services::TreeIdGenerator;

/// Collaborators shared by every operation
#[derive(Clone, Copy)]
pub struct TreeContext<'a> {
    pub store: &'a dyn TreeStore,
    pub config: &'a TreeConfig,
    pub generator: Option<&'a dyn TreeIdGenerator>,
}

impl<'a> TreeContext<'a> {
    pub fn new(
        store: &'a dyn TreeStore,
        config: &'a TreeConfig,
        generator: Option<&'a dyn TreeIdGenerator>,
    ) -> Self {
        Self {
            store,
            config,
            generator,
        }
    }

    pub fn shifter(&self) -> Shifter<'a> {
        Shifter::new(self.store)
    }

    /// Statement scope for a record's tree
    ///
    /// In multi-tree mode every row must carry a tree id; an unscoped
    /// statement there would touch every tree at once.
    pub fn scope_of(&self, record: &NodeRecord) -> Result<TreeScope, NestedSetError> {
        if self.config.multi_tree && record.tree_id.is_none() {
            return Err(NestedSetError::tree_need_value(format!(
                "node '{}' has no tree id in a multi-tree table",
                record.id
            )));
        }
        Ok(TreeScope::of(record, self.config.multi_tree))
    }

    /// Scope for an optional tree id; ignored in single-tree mode
    pub fn scope_for(&self, tree_id: Option<&Key>) -> TreeScope {
        match tree_id {
            Some(tree_id) if self.config.multi_tree => TreeScope::Tree(tree_id.clone()),
            _ => TreeScope::All,
        }
    }

    /// Re-read a row; stale in-memory bounds are never used
    pub async fn refresh(&self, id: &Key) -> Result<NodeRecord, NestedSetError> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| NestedSetError::node_not_found(id))
    }

    /// Whether the scope already has a root row (trashed roots included)
    pub async fn has_root(&self, scope: &TreeScope) -> Result<bool, NestedSetError> {
        let roots = self
            .store
            .count(&Selection::all().in_scope(scope).roots().trash(TrashFilter::All))
            .await?;
        Ok(roots > 0)
    }

    /// Tree id for a node that is about to become a root
    ///
    /// An explicit id must not have a root yet; without one the configured
    /// generator is consulted.
    pub async fn claim_tree_id(
        &self,
        explicit: Option<&Key>,
        context: &str,
    ) -> Result<Key, NestedSetError> {
        if let Some(tree_id) = explicit {
            if self.has_root(&TreeScope::Tree(tree_id.clone())).await? {
                return Err(NestedSetError::unique_root(format!(
                    "tree '{}' already has a root",
                    tree_id
                )));
            }
            return Ok(tree_id.clone());
        }

        let generator = self.generator.ok_or_else(|| {
            NestedSetError::tree_need_value(format!(
                "{} needs a tree id and no generator is configured",
                context
            ))
        })?;
        Ok(generator.next_tree_id(self.store).await?)
    }
}
