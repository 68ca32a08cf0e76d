//! Hard delete, trash and restore

use super::error::NestedSetError;
use super::TreeContext;
use crate::config::ChildrenPolicy;
use crate::db::{Relocation, Selector, TrashMatch};
use crate::models::{Operation, TreeNode};
use chrono::{DateTime, SubsecRound, Utc};

/// Physically remove a node and close the gap it leaves
///
/// A leaf, a `DeleteAll` intent or the `DeleteDescendants` policy removes the
/// whole interval. Otherwise only the node row goes: its children take its
/// parent and the descendants move one slot left and one level up.
///
/// Returns the number of rows removed.
pub async fn force_delete(ctx: &TreeContext<'_>, node: &TreeNode) -> Result<u64, NestedSetError> {
    if node.is_new_record() {
        return Err(NestedSetError::unsupported(format!(
            "node '{}' has not been saved",
            node.id()
        )));
    }

    let current = ctx.refresh(node.id()).await?;
    let delete_all = matches!(node.operation(), Some(Operation::DeleteAll))
        || ctx.config.children_policy == ChildrenPolicy::DeleteDescendants;

    if current.is_root() && !current.is_leaf() && !delete_all {
        return Err(NestedSetError::delete_root(&current.id));
    }

    let scope = ctx.scope_of(&current)?;
    let (l, r) = current.bounds();
    let shifter = ctx.shifter();

    if current.is_leaf() || delete_all {
        let removed = ctx
            .store
            .delete(&scope, &Selector::Range { left: l, right: r })
            .await?;
        shifter.close_gap(r, current.width(), &scope).await?;
        return Ok(removed);
    }

    let removed = ctx
        .store
        .delete(&scope, &Selector::Node(current.id.clone()))
        .await?;
    ctx.store
        .reparent_children(&scope, &current.id, current.parent_id.as_ref())
        .await?;
    ctx.store
        .relocate(&Relocation {
            scope: scope.clone(),
            selector: Selector::Range {
                left: l + 1,
                right: r - 1,
            },
            delta: -1,
            level_delta: -1,
            tree_id: None,
        })
        .await?;
    shifter.close_gap(r, 2, &scope).await?;
    Ok(removed)
}

/// Stamp `deleted_at` on the node and every live descendant
///
/// Bounds stay reserved so the subtree can be restored in place. Returns the
/// stamp, which identifies the rows trashed together.
pub async fn trash(
    ctx: &TreeContext<'_>,
    node: &TreeNode,
) -> Result<DateTime<Utc>, NestedSetError> {
    ensure_soft_delete(ctx)?;
    if node.is_new_record() {
        return Err(NestedSetError::unsupported(format!(
            "node '{}' has not been saved",
            node.id()
        )));
    }

    let current = ctx.refresh(node.id()).await?;
    if current.is_trashed() {
        return Err(NestedSetError::unsupported(format!(
            "node '{}' is already trashed",
            current.id
        )));
    }

    // Stored timestamps keep microsecond precision.
    let now = Utc::now().trunc_subsecs(6);
    let scope = ctx.scope_of(&current)?;
    let stamped = ctx
        .store
        .set_deleted_at(
            &scope,
            &Selector::Range {
                left: current.left,
                right: current.right,
            },
            TrashMatch::Untrashed,
            Some(now),
        )
        .await?;

    tracing::debug!("Trashed '{}' and {} rows below it", current.id, stamped.saturating_sub(1));
    Ok(now)
}

/// Clear the trash stamp of a node
///
/// Restores the rows trashed together with the node, or the node alone with
/// a `RestoreSelfOnly` intent. Returns the number of rows restored.
pub async fn restore(ctx: &TreeContext<'_>, node: &TreeNode) -> Result<u64, NestedSetError> {
    ensure_soft_delete(ctx)?;
    if node.is_new_record() {
        return Err(NestedSetError::unsupported(format!(
            "node '{}' has not been saved",
            node.id()
        )));
    }

    let current = ctx.refresh(node.id()).await?;
    let stamp = current.deleted_at.ok_or_else(|| {
        NestedSetError::unsupported(format!("node '{}' is not trashed", current.id))
    })?;

    let scope = ctx.scope_of(&current)?;
    let (selector, matching) = if matches!(node.operation(), Some(Operation::RestoreSelfOnly)) {
        (Selector::Node(current.id.clone()), TrashMatch::Any)
    } else {
        (
            Selector::Range {
                left: current.left,
                right: current.right,
            },
            TrashMatch::TrashedAt(stamp),
        )
    };

    Ok(ctx
        .store
        .set_deleted_at(&scope, &selector, matching, None)
        .await?)
}

fn ensure_soft_delete(ctx: &TreeContext<'_>) -> Result<(), NestedSetError> {
    if ctx.config.soft_delete && ctx.store.supports_soft_delete() {
        Ok(())
    } else {
        Err(NestedSetError::unsupported(
            "the node table has no soft-delete column",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::{MemoryTreeStore, Selection, TreeStore};
    use crate::models::{Key, NodeRecord};
    use crate::operations::create;

    async fn record(store: &MemoryTreeStore, id: i64) -> Option<NodeRecord> {
        store.find(&Key::from(id)).await.unwrap()
    }

    async fn persisted(store: &MemoryTreeStore, id: i64) -> TreeNode {
        TreeNode::from_persisted(record(store, id).await.unwrap())
    }

    /// 1 [1,10]: 2 [2,7] (3 [3,4], 4 [5,6]), 5 [8,9]
    async fn sample(config: &TreeConfig) -> MemoryTreeStore {
        let store = MemoryTreeStore::new(config);
        let ctx = TreeContext::new(&store, config, None);
        create(&ctx, TreeNode::new(1).make_root()).await.unwrap();
        create(&ctx, TreeNode::new(2).append_to(1)).await.unwrap();
        create(&ctx, TreeNode::new(3).append_to(2)).await.unwrap();
        create(&ctx, TreeNode::new(4).append_to(2)).await.unwrap();
        create(&ctx, TreeNode::new(5).append_to(1)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_delete_reparents_children() {
        let config = TreeConfig::default();
        let store = sample(&config).await;
        let ctx = TreeContext::new(&store, &config, None);

        let removed = force_delete(&ctx, &persisted(&store, 2).await).await.unwrap();
        assert_eq!(removed, 1);

        let child = record(&store, 3).await.unwrap();
        assert_eq!((child.left, child.right, child.level), (2, 3, 1));
        assert_eq!(child.parent_id, Some(Key::from(1)));
        assert_eq!(record(&store, 4).await.unwrap().bounds(), (4, 5));
        assert_eq!(record(&store, 5).await.unwrap().bounds(), (6, 7));
        assert_eq!(record(&store, 1).await.unwrap().bounds(), (1, 8));
    }

    #[tokio::test]
    async fn test_delete_all_removes_interval() {
        let config = TreeConfig::default();
        let store = sample(&config).await;
        let ctx = TreeContext::new(&store, &config, None);

        let mut node = persisted(&store, 2).await;
        let removed = force_delete(&ctx, node.delete_with_children()).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(record(&store, 5).await.unwrap().bounds(), (2, 3));
        assert_eq!(record(&store, 1).await.unwrap().bounds(), (1, 4));
    }

    #[tokio::test]
    async fn test_root_with_children_is_protected() {
        let config = TreeConfig::default();
        let store = sample(&config).await;
        let ctx = TreeContext::new(&store, &config, None);

        let err = force_delete(&ctx, &persisted(&store, 1).await)
            .await
            .unwrap_err();
        assert!(matches!(err, NestedSetError::DeleteRoot { .. }));
        assert_eq!(store.len().await, 5);

        let mut root = persisted(&store, 1).await;
        assert_eq!(force_delete(&ctx, root.delete_with_children()).await.unwrap(), 5);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_descendants_policy_deletes_subtree() {
        let config = TreeConfig::default().with_children_policy(ChildrenPolicy::DeleteDescendants);
        let store = sample(&config).await;
        let ctx = TreeContext::new(&store, &config, None);

        let removed = force_delete(&ctx, &persisted(&store, 2).await).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(record(&store, 1).await.unwrap().bounds(), (1, 4));
    }

    #[tokio::test]
    async fn test_trash_and_restore_keep_bounds() {
        let config = TreeConfig::default().with_soft_delete();
        let store = sample(&config).await;
        let ctx = TreeContext::new(&store, &config, None);

        let early = trash(&ctx, &persisted(&store, 4).await).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let stamp = trash(&ctx, &persisted(&store, 2).await).await.unwrap();
        assert_ne!(early, stamp);

        let live = store
            .count(&Selection::all().trash(crate::db::TrashFilter::WithoutTrashed))
            .await
            .unwrap();
        assert_eq!(live, 2);
        assert_eq!(record(&store, 2).await.unwrap().bounds(), (2, 7));

        let restored = restore(&ctx, &persisted(&store, 2).await).await.unwrap();
        assert_eq!(restored, 2);
        assert!(record(&store, 4).await.unwrap().is_trashed());
        assert!(!record(&store, 3).await.unwrap().is_trashed());
    }

    #[tokio::test]
    async fn test_restore_self_only() {
        let config = TreeConfig::default().with_soft_delete();
        let store = sample(&config).await;
        let ctx = TreeContext::new(&store, &config, None);

        trash(&ctx, &persisted(&store, 2).await).await.unwrap();
        let mut node = persisted(&store, 2).await;
        assert_eq!(restore(&ctx, node.restore_self_only()).await.unwrap(), 1);
        assert!(record(&store, 3).await.unwrap().is_trashed());
    }

    #[tokio::test]
    async fn test_trash_requires_soft_delete() {
        let config = TreeConfig::default();
        let store = sample(&config).await;
        let ctx = TreeContext::new(&store, &config, None);

        let err = trash(&ctx, &persisted(&store, 3).await).await.unwrap_err();
        assert!(matches!(err, NestedSetError::UnsupportedOperation { .. }));
    }
}
