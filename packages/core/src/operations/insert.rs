//! Placing new nodes

use super::error::NestedSetError;
use super::TreeContext;
use crate::db::TreeScope;
use crate::models::{Anchor, Key, NodeRecord, Operation, TreeNode};

/// Persist a new node according to its intent; returns the node's id
///
/// `MakeRoot` opens a tree, positional intents open a two-slot gap at the
/// anchor and insert the node into it.
pub async fn create(ctx: &TreeContext<'_>, node: &TreeNode) -> Result<Key, NestedSetError> {
    let operation = node.operation().ok_or_else(|| {
        NestedSetError::unsupported(format!(
            "new node '{}' needs a structural intent before it can be saved",
            node.id()
        ))
    })?;

    match operation {
        Operation::MakeRoot => make_root(ctx, &node.record).await,
        Operation::PrependTo(target)
        | Operation::AppendTo(target)
        | Operation::InsertBefore(target)
        | Operation::InsertAfter(target) => insert_at(ctx, &node.record, operation, target).await,
        other => Err(NestedSetError::unsupported(format!(
            "'{}' is not valid for a new node",
            other.name()
        ))),
    }
}

async fn make_root(ctx: &TreeContext<'_>, record: &NodeRecord) -> Result<Key, NestedSetError> {
    let tree_id = if ctx.config.multi_tree {
        Some(ctx.claim_tree_id(record.tree_id.as_ref(), "make_root").await?)
    } else {
        if ctx.has_root(&TreeScope::All).await? {
            return Err(NestedSetError::unique_root(
                "a single-tree table already has a root",
            ));
        }
        record.tree_id.clone()
    };

    insert_root(ctx, record, tree_id).await
}

async fn insert_root(
    ctx: &TreeContext<'_>,
    record: &NodeRecord,
    tree_id: Option<Key>,
) -> Result<Key, NestedSetError> {
    let root = NodeRecord {
        left: 1,
        right: 2,
        level: 0,
        parent_id: None,
        tree_id,
        deleted_at: None,
        ..record.clone()
    };
    ctx.store.insert(&root).await?;

    tracing::debug!("Inserted root '{}' (tree {:?})", root.id, root.tree_id);
    Ok(root.id)
}

async fn insert_at(
    ctx: &TreeContext<'_>,
    record: &NodeRecord,
    operation: &Operation,
    target_id: &Key,
) -> Result<Key, NestedSetError> {
    if target_id == &record.id {
        return Err(NestedSetError::invariant(format!(
            "node '{}' cannot be positioned relative to itself",
            record.id
        )));
    }

    let target = ctx.refresh(target_id).await?;
    let anchor = Anchor::resolve(operation, &target).ok_or_else(|| {
        NestedSetError::unsupported(format!("'{}' is not positional", operation.name()))
    })?;

    if anchor.is_sibling_level() && target.is_root() {
        if !ctx.config.multi_tree {
            return Err(NestedSetError::unique_root(format!(
                "cannot place '{}' beside the root of a single-tree table",
                record.id
            )));
        }
        // A sibling of a root opens a tree of its own.
        let explicit = record.tree_id.as_ref().filter(|id| Some(*id) != target.tree_id.as_ref());
        let tree_id = ctx.claim_tree_id(explicit, operation.name()).await?;
        return insert_root(ctx, record, Some(tree_id)).await;
    }

    let scope = ctx.scope_of(&target)?;
    ctx.shifter().open_gap(anchor.to, 2, &scope).await?;

    let placed = NodeRecord {
        left: anchor.to,
        right: anchor.to + 1,
        level: anchor.level,
        parent_id: anchor.parent_id,
        tree_id: target.tree_id.clone(),
        deleted_at: None,
        ..record.clone()
    };
    ctx.store.insert(&placed).await?;

    tracing::debug!(
        "Inserted '{}' at [{}, {}] via {} '{}'",
        placed.id,
        placed.left,
        placed.right,
        operation.name(),
        target.id
    );
    Ok(placed.id)
}
