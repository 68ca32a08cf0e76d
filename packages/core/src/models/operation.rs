//! Pending structural intent carried by a node until its next write.

use super::key::Key;
use super::node::NodeRecord;
use serde::{Deserialize, Serialize};

/// Structural intent attached to a [`TreeNode`](super::TreeNode)
///
/// The intent is consumed by the next `save`/`delete`/`restore` on the node
/// and cleared afterwards, so a later save of the same instance is a plain
/// attribute update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "target", rename_all = "snake_case")]
pub enum Operation {
    /// Create a new root node
    MakeRoot,
    /// Become the first child of the target
    PrependTo(Key),
    /// Become the last child of the target
    AppendTo(Key),
    /// Become the sibling immediately before the target
    InsertBefore(Key),
    /// Become the sibling immediately after the target
    InsertAfter(Key),
    /// Re-root an existing node (and its subtree) into its own tree
    MoveAsRoot,
    /// Delete the node together with all of its descendants
    DeleteAll,
    /// Restore only this node from the trash, leaving descendants trashed
    RestoreSelfOnly,
}

impl Operation {
    /// Target node id for positional intents
    pub fn target(&self) -> Option<&Key> {
        match self {
            Self::PrependTo(target)
            | Self::AppendTo(target)
            | Self::InsertBefore(target)
            | Self::InsertAfter(target) => Some(target),
            _ => None,
        }
    }

    /// Short name used in log lines and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::MakeRoot => "make_root",
            Self::PrependTo(_) => "prepend_to",
            Self::AppendTo(_) => "append_to",
            Self::InsertBefore(_) => "insert_before",
            Self::InsertAfter(_) => "insert_after",
            Self::MoveAsRoot => "move_as_root",
            Self::DeleteAll => "delete_all",
            Self::RestoreSelfOnly => "restore_self_only",
        }
    }
}

/// Insertion point computed from a positional intent and its target
///
/// `to` is the left bound the node takes before any shifting happens;
/// `depth` is 1 for child-level intents and 0 for sibling-level intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub to: i64,
    pub depth: i64,
    pub level: i64,
    pub parent_id: Option<Key>,
}

impl Anchor {
    /// Resolve the insertion point for `operation` against the refreshed `target`
    ///
    /// Returns `None` for intents that are not positional.
    pub fn resolve(operation: &Operation, target: &NodeRecord) -> Option<Self> {
        let (to, depth) = match operation {
            Operation::PrependTo(_) => (target.left + 1, 1),
            Operation::AppendTo(_) => (target.right, 1),
            Operation::InsertBefore(_) => (target.left, 0),
            Operation::InsertAfter(_) => (target.right + 1, 0),
            _ => return None,
        };

        let parent_id = if depth == 1 {
            Some(target.id.clone())
        } else {
            target.parent_id.clone()
        };

        Some(Self {
            to,
            depth,
            level: target.level + depth,
            parent_id,
        })
    }

    /// Whether the intent places the node beside the target rather than under it
    pub fn is_sibling_level(&self) -> bool {
        self.depth == 0
    }
}
