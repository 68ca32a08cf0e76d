//! Relocating persisted subtrees
//!
//! A move always works on freshly read bounds of both the node and its
//! target. Three shapes exist:
//!
//! - **Same tree**: the subtree is marked, the bounds between its old and
//!   new position are shifted over it, and the marked rows are relabelled in
//!   one statement
//! - **Cross tree**: a gap is opened in the destination, the subtree is
//!   relabelled into it, and the source gap is closed
//! - **As root**: the subtree becomes a tree of its own starting at bound 1

use super::error::NestedSetError;
use super::TreeContext;
use crate::db::{MarkFilter, Relocation, Selector, Shift};
use crate::models::{Anchor, Key, NodeRecord, Operation, TreeNode};

/// Execute the pending positional or `MoveAsRoot` intent of a persisted node
pub async fn move_node(ctx: &TreeContext<'_>, node: &TreeNode) -> Result<(), NestedSetError> {
    let operation = node.operation().ok_or_else(|| {
        NestedSetError::unsupported(format!("node '{}' has no pending move", node.id()))
    })?;
    let current = ctx.refresh(node.id()).await?;

    match operation {
        Operation::MoveAsRoot => {
            let explicit = node
                .record
                .tree_id
                .as_ref()
                .filter(|id| Some(*id) != current.tree_id.as_ref());
            move_as_root(ctx, &current, explicit).await
        }
        Operation::PrependTo(target)
        | Operation::AppendTo(target)
        | Operation::InsertBefore(target)
        | Operation::InsertAfter(target) => {
            move_to(ctx, &current, operation, target).await
        }
        other => Err(NestedSetError::unsupported(format!(
            "'{}' is not a move",
            other.name()
        ))),
    }
}

async fn move_to(
    ctx: &TreeContext<'_>,
    current: &NodeRecord,
    operation: &Operation,
    target_id: &Key,
) -> Result<(), NestedSetError> {
    if target_id == &current.id {
        return Err(NestedSetError::invariant(format!(
            "node '{}' cannot be positioned relative to itself",
            current.id
        )));
    }

    let target = ctx.refresh(target_id).await?;
    if target.is_child_of(current) {
        return Err(NestedSetError::invariant(format!(
            "cannot move '{}' into its own subtree",
            current.id
        )));
    }

    let anchor = Anchor::resolve(operation, &target).ok_or_else(|| {
        NestedSetError::unsupported(format!("'{}' is not positional", operation.name()))
    })?;

    if anchor.is_sibling_level() && target.is_root() {
        if !ctx.config.multi_tree {
            return Err(NestedSetError::unique_root(format!(
                "cannot place '{}' beside the root of a single-tree table",
                current.id
            )));
        }
        return move_as_root(ctx, current, None).await;
    }

    if !ctx.config.multi_tree || current.same_tree(&target) {
        move_within_tree(ctx, current, &anchor).await
    } else {
        move_across_trees(ctx, current, &target, &anchor).await
    }
}

async fn move_within_tree(
    ctx: &TreeContext<'_>,
    current: &NodeRecord,
    anchor: &Anchor,
) -> Result<(), NestedSetError> {
    let (l, r) = current.bounds();
    let width = current.width();
    let to = anchor.to;

    if to == l || to == r + 1 {
        return Err(NestedSetError::invariant(format!(
            "'{}' already occupies the requested position",
            current.id
        )));
    }
    if l < to && to <= r {
        return Err(NestedSetError::invariant(format!(
            "cannot move '{}' into its own subtree",
            current.id
        )));
    }

    let scope = ctx.scope_of(current)?;
    ctx.store
        .mark(&scope, &Selector::Range { left: l, right: r })
        .await?;

    let shifter = ctx.shifter();
    let new_left = if to > r {
        shifter
            .shift(&Shift::range(r + 1, to - 1, -width, scope.clone()).with_marks(MarkFilter::Unmarked))
            .await?;
        to - width
    } else {
        shifter
            .shift(&Shift::range(to, l - 1, width, scope.clone()).with_marks(MarkFilter::Unmarked))
            .await?;
        to
    };

    relocate(
        ctx,
        Relocation {
            scope,
            selector: Selector::Marked,
            delta: new_left - l,
            level_delta: anchor.level - current.level,
            tree_id: None,
        },
    )
    .await?;

    ctx.store
        .set_parent(&current.id, anchor.parent_id.as_ref())
        .await?;
    Ok(())
}

async fn move_across_trees(
    ctx: &TreeContext<'_>,
    current: &NodeRecord,
    target: &NodeRecord,
    anchor: &Anchor,
) -> Result<(), NestedSetError> {
    let (l, r) = current.bounds();
    let width = current.width();
    let source = ctx.scope_of(current)?;
    let destination = ctx.scope_of(target)?;

    let shifter = ctx.shifter();
    shifter.open_gap(anchor.to, width, &destination).await?;

    relocate(
        ctx,
        Relocation {
            scope: source.clone(),
            selector: Selector::Range { left: l, right: r },
            delta: anchor.to - l,
            level_delta: anchor.level - current.level,
            tree_id: target.tree_id.clone(),
        },
    )
    .await?;

    shifter.close_gap(r, width, &source).await?;

    ctx.store
        .set_parent(&current.id, anchor.parent_id.as_ref())
        .await?;
    Ok(())
}

async fn move_as_root(
    ctx: &TreeContext<'_>,
    current: &NodeRecord,
    explicit: Option<&Key>,
) -> Result<(), NestedSetError> {
    if !ctx.config.multi_tree {
        return Err(NestedSetError::unique_root(format!(
            "cannot turn '{}' into a root of a single-tree table",
            current.id
        )));
    }
    if current.is_root() {
        return Err(NestedSetError::invariant(format!(
            "'{}' is already a root",
            current.id
        )));
    }

    let source = ctx.scope_of(current)?;
    let tree_id = ctx.claim_tree_id(explicit, "move_as_root").await?;
    let (l, r) = current.bounds();

    relocate(
        ctx,
        Relocation {
            scope: source.clone(),
            selector: Selector::Range { left: l, right: r },
            delta: 1 - l,
            level_delta: -current.level,
            tree_id: Some(tree_id),
        },
    )
    .await?;

    ctx.shifter()
        .close_gap(r, current.width(), &source)
        .await?;

    ctx.store.set_parent(&current.id, None).await?;
    Ok(())
}

async fn relocate(ctx: &TreeContext<'_>, relocation: Relocation) -> Result<u64, NestedSetError> {
    let touched = ctx.store.relocate(&relocation).await?;
    tracing::debug!(
        "Relocated {} rows by {} (level {:+}) in {:?}{}",
        touched,
        relocation.delta,
        relocation.level_delta,
        relocation.scope,
        relocation
            .tree_id
            .as_ref()
            .map_or(String::new(), |id| format!(" into tree {}", id))
    );
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TreeConfig, TreeIdStrategy};
    use crate::db::{MemoryTreeStore, TreeStore};
    use crate::operations::create;
    use crate::services::SequentialGenerator;

    async fn record(store: &MemoryTreeStore, id: i64) -> NodeRecord {
        store.find(&Key::from(id)).await.unwrap().unwrap()
    }

    async fn persisted(store: &MemoryTreeStore, id: i64) -> TreeNode {
        TreeNode::from_persisted(record(store, id).await)
    }

    /// 1 [1,10]: 2 [2,7] (3 [3,4], 4 [5,6]), 5 [8,9]
    async fn sample(config: &TreeConfig, store: &MemoryTreeStore) {
        let ctx = TreeContext::new(store, config, Some(&SequentialGenerator));
        create(&ctx, TreeNode::new(1).make_root()).await.unwrap();
        create(&ctx, TreeNode::new(2).append_to(1)).await.unwrap();
        create(&ctx, TreeNode::new(3).append_to(2)).await.unwrap();
        create(&ctx, TreeNode::new(4).append_to(2)).await.unwrap();
        create(&ctx, TreeNode::new(5).append_to(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_move_subtree_forward() {
        let config = TreeConfig::default();
        let store = MemoryTreeStore::new(&config);
        sample(&config, &store).await;
        let ctx = TreeContext::new(&store, &config, None);

        let mut node = persisted(&store, 2).await;
        move_node(&ctx, node.append_to(5)).await.unwrap();

        assert_eq!(record(&store, 1).await.bounds(), (1, 10));
        assert_eq!(record(&store, 5).await.bounds(), (2, 9));
        let moved = record(&store, 2).await;
        assert_eq!((moved.left, moved.right, moved.level), (3, 8, 2));
        assert_eq!(moved.parent_id, Some(Key::from(5)));
        let leaf = record(&store, 4).await;
        assert_eq!((leaf.left, leaf.right, leaf.level), (6, 7, 3));
    }

    #[tokio::test]
    async fn test_move_subtree_backward() {
        let config = TreeConfig::default();
        let store = MemoryTreeStore::new(&config);
        sample(&config, &store).await;
        let ctx = TreeContext::new(&store, &config, None);

        let mut node = persisted(&store, 5).await;
        move_node(&ctx, node.insert_before(3)).await.unwrap();

        let moved = record(&store, 5).await;
        assert_eq!((moved.left, moved.right, moved.level), (3, 4, 2));
        assert_eq!(moved.parent_id, Some(Key::from(2)));
        assert_eq!(record(&store, 2).await.bounds(), (2, 9));
        assert_eq!(record(&store, 3).await.bounds(), (5, 6));
        assert_eq!(record(&store, 1).await.bounds(), (1, 10));
    }

    #[tokio::test]
    async fn test_rejects_invalid_positions() {
        let config = TreeConfig::default();
        let store = MemoryTreeStore::new(&config);
        sample(&config, &store).await;
        let ctx = TreeContext::new(&store, &config, None);

        let mut node = persisted(&store, 2).await;
        let err = move_node(&ctx, node.append_to(3)).await.unwrap_err();
        assert!(matches!(err, NestedSetError::InvariantViolation { .. }));

        let err = move_node(&ctx, node.append_to(2)).await.unwrap_err();
        assert!(matches!(err, NestedSetError::InvariantViolation { .. }));

        let err = move_node(&ctx, node.prepend_to(1)).await.unwrap_err();
        assert!(matches!(err, NestedSetError::InvariantViolation { .. }));

        let mut last = persisted(&store, 5).await;
        let err = move_node(&ctx, last.append_to(1)).await.unwrap_err();
        assert!(matches!(err, NestedSetError::InvariantViolation { .. }));

        let err = move_node(&ctx, last.insert_after(1)).await.unwrap_err();
        assert!(matches!(err, NestedSetError::UniqueRoot { .. }));

        let err = move_node(&ctx, last.make_root()).await.unwrap_err();
        assert!(matches!(err, NestedSetError::UniqueRoot { .. }));

        assert_eq!(record(&store, 2).await.bounds(), (2, 7));
    }

    #[tokio::test]
    async fn test_move_across_trees_and_back_to_root() {
        let config = TreeConfig::multi_tree(TreeIdStrategy::Sequential);
        let store = MemoryTreeStore::new(&config);
        sample(&config, &store).await;
        let ctx = TreeContext::new(&store, &config, Some(&SequentialGenerator));
        create(&ctx, TreeNode::new(10).make_root()).await.unwrap();

        let mut node = persisted(&store, 2).await;
        move_node(&ctx, node.append_to(10)).await.unwrap();

        let other = record(&store, 10).await;
        assert_eq!(other.bounds(), (1, 8));
        let moved = record(&store, 4).await;
        assert_eq!(moved.tree_id, Some(Key::from(2)));
        assert_eq!((moved.left, moved.right, moved.level), (5, 6, 2));
        assert_eq!(record(&store, 1).await.bounds(), (1, 4));
        assert_eq!(record(&store, 5).await.bounds(), (2, 3));

        let mut node = persisted(&store, 2).await;
        move_node(&ctx, node.make_root()).await.unwrap();

        let root = record(&store, 2).await;
        assert_eq!(root.tree_id, Some(Key::from(3)));
        assert_eq!((root.left, root.right, root.level), (1, 6, 0));
        assert!(root.is_root());
        assert_eq!(record(&store, 10).await.bounds(), (1, 2));
        assert_eq!(record(&store, 3).await.level, 1);
    }
}
