//! Nested Set Service - Structural Writes and Hierarchy Queries
//!
//! This module provides the public entry point of the engine:
//!
//! - `save` executes the pending intent of a [`TreeNode`] (create, move,
//!   re-root) or performs a plain attribute update
//! - `delete`, `trash`, `restore`, `force_delete` remove and bring back nodes
//! - `fix_tree`, `fix_subtree`, `fix_forest` rebuild bounds from parents
//! - `check`/`is_broken` run the integrity counters
//! - read helpers expressed as interval queries (`children`, `ancestors`, ...)
//!
//! # Transactions
//!
//! Every structural call opens a store transaction, runs the operation and
//! commits; on error it rolls back and returns the original error. After a
//! successful write the handle is refreshed from the store, so the caller
//! never keeps stale bounds.

use crate::config::TreeConfig;
use crate::db::{Selection, TrashFilter, TreeScope, TreeStore};
use crate::models::{Key, NodeRecord, Operation, TreeNode};
use crate::operations::{self, FixReport, HealthReport, NestedSetError, TreeContext};
use crate::services::tree_id::{generator_for, TreeIdGenerator};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Nested-set engine bound to one store and configuration
///
/// # Examples
///
/// ```rust
/// use nodespace_nested_set::config::TreeConfig;
/// use nodespace_nested_set::db::MemoryTreeStore;
/// use nodespace_nested_set::models::{Key, TreeNode};
/// use nodespace_nested_set::services::NestedSet;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TreeConfig::default();
/// let tree = NestedSet::new(Arc::new(MemoryTreeStore::new(&config)), config)?;
///
/// let mut root = TreeNode::new(1);
/// tree.save(root.make_root()).await?;
///
/// let mut child = TreeNode::new(2);
/// tree.save(child.append_to(1)).await?;
///
/// assert_eq!(tree.get(&Key::from(1)).await?.record.bounds(), (1, 4));
/// # Ok(())
/// # }
/// ```
pub struct NestedSet {
    store: Arc<dyn TreeStore>,
    config: TreeConfig,
    generator: Option<Arc<dyn TreeIdGenerator>>,
}

impl NestedSet {
    /// Create the service; the tree id generator follows `config.tree_id_strategy`
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid or asks for soft delete on a
    /// store without a soft-delete column.
    pub fn new(store: Arc<dyn TreeStore>, config: TreeConfig) -> Result<Self, NestedSetError> {
        config.validate().map_err(NestedSetError::config)?;
        if config.soft_delete && !store.supports_soft_delete() {
            return Err(NestedSetError::config(
                "soft_delete is enabled but the store has no soft-delete column",
            ));
        }

        let generator = generator_for(config.tree_id_strategy);
        Ok(Self {
            store,
            config,
            generator,
        })
    }

    /// Replace the tree id generator (multi-tree mode)
    pub fn with_generator(mut self, generator: Arc<dyn TreeIdGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    fn context(&self) -> TreeContext<'_> {
        TreeContext::new(self.store.as_ref(), &self.config, self.generator.as_deref())
    }

    /// Commit on success; roll back on failure, including a failed commit
    async fn finish<T>(
        &self,
        operation: &str,
        result: Result<T, NestedSetError>,
    ) -> Result<T, NestedSetError> {
        let err = match result {
            Ok(value) => match self.store.commit().await {
                Ok(()) => return Ok(value),
                Err(commit_err) => NestedSetError::from(commit_err),
            },
            Err(err) => err,
        };

        if let Err(rollback_err) = self.store.rollback().await {
            tracing::warn!("Rollback of {} failed: {}", operation, rollback_err);
        }
        tracing::debug!("{} rolled back: {}", operation, err);
        Err(err)
    }

    /// Persist a node according to its pending intent
    ///
    /// - New node: `MakeRoot` or a positional intent is required
    /// - Persisted node with a positional or `MakeRoot` intent: the subtree
    ///   moves, attributes are saved in the same transaction
    /// - Persisted node without intent: plain attribute update, bounds untouched
    ///
    /// On success the handle holds the stored row and its intent is cleared.
    pub async fn save(&self, node: &mut TreeNode) -> Result<(), NestedSetError> {
        let ctx = self.context();
        let operation = node.operation().cloned();

        match (&operation, node.is_new_record()) {
            (_, true) => {
                self.store.begin().await?;
                let result = operations::create(&ctx, node).await;
                self.finish("create", result).await?;
            }
            (None, false) => {
                let updated = self
                    .store
                    .save_attributes(node.id(), &node.record.properties)
                    .await?;
                if updated == 0 {
                    return Err(NestedSetError::node_not_found(node.id()));
                }
            }
            (Some(Operation::DeleteAll | Operation::RestoreSelfOnly), false) => {
                return Err(NestedSetError::unsupported(format!(
                    "'{}' cannot be executed by save",
                    operation.as_ref().map_or("none", Operation::name)
                )));
            }
            (Some(_), false) => {
                self.store.begin().await?;
                let result = self.move_with_attributes(&ctx, node).await;
                self.finish("move", result).await?;
            }
        }

        let record = ctx.refresh(node.id()).await?;
        if let Some(operation) = &operation {
            tracing::info!(
                "Saved '{}' via {} at [{}, {}]",
                record.id,
                operation.name(),
                record.left,
                record.right
            );
        }
        node.settle(record);
        Ok(())
    }

    async fn move_with_attributes(
        &self,
        ctx: &TreeContext<'_>,
        node: &TreeNode,
    ) -> Result<(), NestedSetError> {
        self.store
            .save_attributes(node.id(), &node.record.properties)
            .await?;
        operations::move_node(ctx, node).await
    }

    /// Delete a node: trash it when soft delete is enabled, otherwise remove it
    ///
    /// Returns the number of rows trashed or removed.
    pub async fn delete(&self, node: &mut TreeNode) -> Result<u64, NestedSetError> {
        if !self.config.soft_delete {
            return self.force_delete(node).await;
        }

        let stamp = self.trash(node).await?;
        let scope = self.context().scope_of(&node.record)?;
        let (left, right) = node.record.bounds();
        let trashed = self
            .query(
                &Selection::all()
                    .in_scope(&scope)
                    .within(left, right)
                    .trash(TrashFilter::OnlyTrashed),
            )
            .await?;
        Ok(trashed
            .iter()
            .filter(|record| record.deleted_at == Some(stamp))
            .count() as u64)
    }

    /// Physically remove a node (and, with `DeleteAll`, its subtree)
    pub async fn force_delete(&self, node: &mut TreeNode) -> Result<u64, NestedSetError> {
        let ctx = self.context();
        self.store.begin().await?;
        let result = operations::force_delete(&ctx, node).await;
        let removed = self.finish("delete", result).await?;

        tracing::info!("Deleted '{}' ({} rows)", node.id(), removed);
        node.detach();
        Ok(removed)
    }

    /// Soft-delete a node and its live descendants; returns the trash stamp
    pub async fn trash(&self, node: &mut TreeNode) -> Result<DateTime<Utc>, NestedSetError> {
        let ctx = self.context();
        self.store.begin().await?;
        let result = operations::trash(&ctx, node).await;
        let stamp = self.finish("trash", result).await?;

        tracing::info!("Trashed '{}' at {}", node.id(), stamp);
        let record = ctx.refresh(node.id()).await?;
        node.settle(record);
        Ok(stamp)
    }

    /// Bring a trashed node back; returns the number of rows restored
    pub async fn restore(&self, node: &mut TreeNode) -> Result<u64, NestedSetError> {
        let ctx = self.context();
        self.store.begin().await?;
        let result = operations::restore(&ctx, node).await;
        let restored = self.finish("restore", result).await?;

        tracing::info!("Restored '{}' ({} rows)", node.id(), restored);
        let record = ctx.refresh(node.id()).await?;
        node.settle(record);
        Ok(restored)
    }

    /// Rebuild bounds of one tree from parent pointers
    ///
    /// In multi-tree mode a tree id is required; use [`fix_forest`](Self::fix_forest)
    /// to repair every tree.
    pub async fn fix_tree(&self, tree_id: Option<&Key>) -> Result<FixReport, NestedSetError> {
        if self.config.multi_tree && tree_id.is_none() {
            return Err(NestedSetError::tree_need_value(
                "fix_tree needs a tree id in a multi-tree table",
            ));
        }

        let ctx = self.context();
        let scope = ctx.scope_for(tree_id);
        self.store.begin().await?;
        let result = operations::fix_tree(&ctx, &scope).await;
        self.finish("fix_tree", result).await
    }

    /// Rebuild bounds below one node, widening the rest of its tree if needed
    pub async fn fix_subtree(&self, root_id: &Key) -> Result<FixReport, NestedSetError> {
        let ctx = self.context();
        self.store.begin().await?;
        let result = operations::fix_subtree(&ctx, root_id).await;
        self.finish("fix_subtree", result).await
    }

    /// Rebuild every tree of the table
    pub async fn fix_forest(&self) -> Result<FixReport, NestedSetError> {
        let ctx = self.context();
        self.store.begin().await?;
        let result = operations::fix_forest(&ctx).await;
        self.finish("fix_forest", result).await
    }

    /// Integrity counters for one tree, or the whole table with `None`
    pub async fn check(&self, tree_id: Option<&Key>) -> Result<HealthReport, NestedSetError> {
        let ctx = self.context();
        operations::check(&ctx, &ctx.scope_for(tree_id)).await
    }

    pub async fn is_broken(&self, tree_id: Option<&Key>) -> Result<bool, NestedSetError> {
        Ok(self.check(tree_id).await?.is_broken())
    }

    /// Load a node handle, if the row exists
    pub async fn find(&self, id: &Key) -> Result<Option<TreeNode>, NestedSetError> {
        Ok(self.store.find(id).await?.map(TreeNode::from_persisted))
    }

    /// Load a node handle; `NodeNotFound` if the row does not exist
    pub async fn get(&self, id: &Key) -> Result<TreeNode, NestedSetError> {
        let record = self.context().refresh(id).await?;
        Ok(TreeNode::from_persisted(record))
    }

    /// Run an arbitrary selection (trashed rows included unless filtered)
    pub async fn query(&self, selection: &Selection) -> Result<Vec<NodeRecord>, NestedSetError> {
        Ok(self.store.select(selection).await?)
    }

    async fn live(&self, selection: Selection) -> Result<Vec<NodeRecord>, NestedSetError> {
        self.query(&selection.trash(TrashFilter::WithoutTrashed))
            .await
    }

    /// Root rows of every tree
    pub async fn roots(&self) -> Result<Vec<NodeRecord>, NestedSetError> {
        self.live(Selection::all().roots()).await
    }

    /// Every row of one tree, in pre-order
    pub async fn by_tree(&self, tree_id: &Key) -> Result<Vec<NodeRecord>, NestedSetError> {
        self.live(Selection::all().in_scope(&TreeScope::Tree(tree_id.clone())))
            .await
    }

    /// Direct children, in order
    pub async fn children(&self, id: &Key) -> Result<Vec<NodeRecord>, NestedSetError> {
        let ctx = self.context();
        let node = ctx.refresh(id).await?;
        let scope = ctx.scope_of(&node)?;
        self.live(Selection::all().in_scope(&scope).children_of(&node.id))
            .await
    }

    /// Every row inside the node's interval, in pre-order
    pub async fn descendants(
        &self,
        id: &Key,
        include_self: bool,
    ) -> Result<Vec<NodeRecord>, NestedSetError> {
        let ctx = self.context();
        let node = ctx.refresh(id).await?;
        let scope = ctx.scope_of(&node)?;
        let selection = if include_self {
            Selection::all().within(node.left, node.right)
        } else {
            Selection::all().within(node.left + 1, node.right - 1)
        };
        self.live(selection.in_scope(&scope)).await
    }

    /// Strict ancestors, root first
    pub async fn ancestors(&self, id: &Key) -> Result<Vec<NodeRecord>, NestedSetError> {
        let ctx = self.context();
        let node = ctx.refresh(id).await?;
        let scope = ctx.scope_of(&node)?;
        self.live(Selection::all().in_scope(&scope).containing(node.left, node.right))
            .await
    }

    /// Other children of the node's parent, in order
    pub async fn siblings(&self, id: &Key) -> Result<Vec<NodeRecord>, NestedSetError> {
        let ctx = self.context();
        let node = ctx.refresh(id).await?;
        let scope = ctx.scope_of(&node)?;
        let selection = match &node.parent_id {
            Some(parent) => Selection::all().children_of(parent),
            None => Selection::all().roots(),
        };

        let mut siblings = self.live(selection.in_scope(&scope)).await?;
        siblings.retain(|record| record.id != node.id);
        Ok(siblings)
    }

    /// Leaf rows of one tree, or of the whole table with `None`
    pub async fn leaves(&self, tree_id: Option<&Key>) -> Result<Vec<NodeRecord>, NestedSetError> {
        let scope = self.context().scope_for(tree_id);
        self.live(Selection::all().in_scope(&scope).leaves()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeIdStrategy;
    use crate::db::{
        BoundsUpdate, DatabaseError, HealthCheck, MemoryTreeStore, Relocation, Selector, Shift,
        TrashMatch,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service(config: TreeConfig) -> NestedSet {
        NestedSet::new(Arc::new(MemoryTreeStore::new(&config)), config).unwrap()
    }

    #[tokio::test]
    async fn test_save_refreshes_handle_and_clears_intent() {
        let tree = service(TreeConfig::default());
        let mut root = TreeNode::new(1);
        tree.save(root.make_root()).await.unwrap();

        let mut child = TreeNode::new(2);
        child.set_property("title", json!("first"));
        tree.save(child.append_to(&root)).await.unwrap();

        assert!(!child.is_new_record());
        assert!(child.operation().is_none());
        assert_eq!(child.record.bounds(), (2, 3));
        assert_eq!(child.record.parent_id, Some(Key::from(1)));
        assert_eq!(root.record.bounds(), (1, 2));

        // A second save of the same handle only updates attributes.
        child.set_property("title", json!("renamed"));
        tree.save(&mut child).await.unwrap();
        let stored = tree.get(&Key::from(2)).await.unwrap();
        assert_eq!(stored.property("title"), Some(&json!("renamed")));
        assert_eq!(stored.record.bounds(), (2, 3));
    }

    #[tokio::test]
    async fn test_plain_save_of_new_node_is_unsupported() {
        let tree = service(TreeConfig::default());
        let err = tree.save(&mut TreeNode::new(1)).await.unwrap_err();
        assert!(matches!(err, NestedSetError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_failed_move_rolls_back() {
        let tree = service(TreeConfig::default());
        let mut root = TreeNode::new(1);
        tree.save(root.make_root()).await.unwrap();
        let mut child = TreeNode::new(2);
        tree.save(child.append_to(1)).await.unwrap();

        child.set_property("title", json!("changed"));
        let err = tree.save(child.append_to(1)).await.unwrap_err();
        assert!(matches!(err, NestedSetError::InvariantViolation { .. }));

        let stored = tree.get(&Key::from(2)).await.unwrap();
        assert_eq!(stored.property("title"), None);
    }

    #[tokio::test]
    async fn test_queries_follow_intervals() {
        let tree = service(TreeConfig::default());
        let mut root = TreeNode::new(1);
        tree.save(root.make_root()).await.unwrap();
        for (id, parent) in [(2, 1), (3, 2), (4, 2), (5, 1)] {
            tree.save(TreeNode::new(id).append_to(parent)).await.unwrap();
        }

        let ids = |records: Vec<NodeRecord>| -> Vec<Key> { records.into_iter().map(|r| r.id).collect() };
        assert_eq!(ids(tree.children(&Key::from(1)).await.unwrap()), vec![Key::from(2), Key::from(5)]);
        assert_eq!(
            ids(tree.descendants(&Key::from(2), true).await.unwrap()),
            vec![Key::from(2), Key::from(3), Key::from(4)]
        );
        assert_eq!(ids(tree.ancestors(&Key::from(4)).await.unwrap()), vec![Key::from(1), Key::from(2)]);
        assert_eq!(ids(tree.siblings(&Key::from(3)).await.unwrap()), vec![Key::from(4)]);
        assert_eq!(
            ids(tree.leaves(None).await.unwrap()),
            vec![Key::from(3), Key::from(4), Key::from(5)]
        );
        assert_eq!(ids(tree.roots().await.unwrap()), vec![Key::from(1)]);
    }

    /// Memory store whose next commit fails once
    struct FlakyCommitStore {
        inner: MemoryTreeStore,
        fail_next_commit: AtomicBool,
    }

    #[async_trait]
    impl TreeStore for FlakyCommitStore {
        fn supports_soft_delete(&self) -> bool {
            self.inner.supports_soft_delete()
        }
        async fn begin(&self) -> Result<(), DatabaseError> {
            self.inner.begin().await
        }
        async fn commit(&self) -> Result<(), DatabaseError> {
            if self.fail_next_commit.swap(false, Ordering::SeqCst) {
                return Err(DatabaseError::transaction("COMMIT failed: database is locked"));
            }
            self.inner.commit().await
        }
        async fn rollback(&self) -> Result<(), DatabaseError> {
            self.inner.rollback().await
        }
        async fn find(&self, id: &Key) -> Result<Option<NodeRecord>, DatabaseError> {
            self.inner.find(id).await
        }
        async fn insert(&self, record: &NodeRecord) -> Result<(), DatabaseError> {
            self.inner.insert(record).await
        }
        async fn save_attributes(
            &self,
            id: &Key,
            properties: &serde_json::Value,
        ) -> Result<u64, DatabaseError> {
            self.inner.save_attributes(id, properties).await
        }
        async fn select(&self, selection: &Selection) -> Result<Vec<NodeRecord>, DatabaseError> {
            self.inner.select(selection).await
        }
        async fn count(&self, selection: &Selection) -> Result<u64, DatabaseError> {
            self.inner.count(selection).await
        }
        async fn tree_ids(&self) -> Result<Vec<Key>, DatabaseError> {
            self.inner.tree_ids().await
        }
        async fn max_tree_id(&self) -> Result<Option<i64>, DatabaseError> {
            self.inner.max_tree_id().await
        }
        async fn shift(&self, shift: &Shift) -> Result<u64, DatabaseError> {
            self.inner.shift(shift).await
        }
        async fn mark(&self, scope: &TreeScope, selector: &Selector) -> Result<u64, DatabaseError> {
            self.inner.mark(scope, selector).await
        }
        async fn unmark(&self, scope: &TreeScope) -> Result<u64, DatabaseError> {
            self.inner.unmark(scope).await
        }
        async fn relocate(&self, relocation: &Relocation) -> Result<u64, DatabaseError> {
            self.inner.relocate(relocation).await
        }
        async fn set_parent(&self, id: &Key, parent_id: Option<&Key>) -> Result<u64, DatabaseError> {
            self.inner.set_parent(id, parent_id).await
        }
        async fn reparent_children(
            &self,
            scope: &TreeScope,
            from: &Key,
            to: Option<&Key>,
        ) -> Result<u64, DatabaseError> {
            self.inner.reparent_children(scope, from, to).await
        }
        async fn delete(&self, scope: &TreeScope, selector: &Selector) -> Result<u64, DatabaseError> {
            self.inner.delete(scope, selector).await
        }
        async fn write_bounds(&self, updates: &[BoundsUpdate]) -> Result<u64, DatabaseError> {
            self.inner.write_bounds(updates).await
        }
        async fn set_deleted_at(
            &self,
            scope: &TreeScope,
            selector: &Selector,
            matching: TrashMatch,
            value: Option<DateTime<Utc>>,
        ) -> Result<u64, DatabaseError> {
            self.inner.set_deleted_at(scope, selector, matching, value).await
        }
        async fn health_count(
            &self,
            check: HealthCheck,
            scope: &TreeScope,
        ) -> Result<u64, DatabaseError> {
            self.inner.health_count(check, scope).await
        }
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let config = TreeConfig::default();
        let store = Arc::new(FlakyCommitStore {
            inner: MemoryTreeStore::new(&config),
            fail_next_commit: AtomicBool::new(false),
        });
        let tree = NestedSet::new(store.clone(), config).unwrap();
        tree.save(TreeNode::new(1).make_root()).await.unwrap();

        store.fail_next_commit.store(true, Ordering::SeqCst);
        let err = tree.save(TreeNode::new(2).append_to(1)).await.unwrap_err();
        assert!(matches!(err, NestedSetError::Database(_)));
        assert!(tree.find(&Key::from(2)).await.unwrap().is_none());
        assert_eq!(tree.get(&Key::from(1)).await.unwrap().record.bounds(), (1, 2));

        // The transaction was closed, so the next write starts cleanly.
        tree.save(TreeNode::new(2).append_to(1)).await.unwrap();
        assert_eq!(tree.get(&Key::from(1)).await.unwrap().record.bounds(), (1, 4));
    }

    #[tokio::test]
    async fn test_soft_delete_requires_store_support() {
        let config = TreeConfig::default().with_soft_delete();
        let store = MemoryTreeStore::new(&TreeConfig::default());
        let result = NestedSet::new(Arc::new(store), config);
        assert!(matches!(result, Err(NestedSetError::Config(_))));
    }

    #[tokio::test]
    async fn test_fix_tree_needs_tree_id_in_forest() {
        let tree = service(TreeConfig::multi_tree(TreeIdStrategy::Sequential));
        let err = tree.fix_tree(None).await.unwrap_err();
        assert!(matches!(err, NestedSetError::TreeNeedValue { .. }));
        assert_eq!(tree.fix_forest().await.unwrap().total(), 0);
    }
}
