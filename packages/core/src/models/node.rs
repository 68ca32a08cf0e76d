//! Node Data Structures
//!
//! This module defines the persisted shape of a nested-set node and the
//! in-memory handle used to express structural intent against it.
//!
//! # Architecture
//!
//! - **`NodeRecord`**: one row of the node table, bounds plus attributes
//! - **`TreeNode`**: a record together with its persisted flag and the
//!   pending [`Operation`] that the next write will execute
//! - **Pure JSON attributes**: everything that is not tree bookkeeping lives
//!   in the `properties` object
//!
//! # Examples
//!
//! ```rust
//! use nodespace_nested_set::models::TreeNode;
//! use serde_json::json;
//!
//! let mut root = TreeNode::new(1);
//! root.set_property("title", json!("Inbox"));
//! root.make_root();
//!
//! let mut child = TreeNode::new(2);
//! child.append_to(&root);
//! ```

use super::key::Key;
use super::operation::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted node: interval bounds, hierarchy pointers and attributes
///
/// # Fields
///
/// - `left`/`right`: interval bounds, `left < right`, odd width
/// - `level`: depth below the root (root is 0)
/// - `parent_id`: adjacency pointer, `None` only for roots
/// - `tree_id`: forest partition, only used in multi-tree mode
/// - `deleted_at`: soft-delete stamp, bounds stay reserved while set
/// - `properties`: free-form JSON attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: Key,
    pub left: i64,
    pub right: i64,
    pub level: i64,
    pub parent_id: Option<Key>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<Key>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default = "empty_properties")]
    pub properties: serde_json::Value,
}

fn empty_properties() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl NodeRecord {
    /// Unplaced record with zeroed bounds
    pub fn new(id: impl Into<Key>) -> Self {
        Self {
            id: id.into(),
            left: 0,
            right: 0,
            level: 0,
            parent_id: None,
            tree_id: None,
            deleted_at: None,
            properties: empty_properties(),
        }
    }

    /// `(left, right)` pair
    pub fn bounds(&self) -> (i64, i64) {
        (self.left, self.right)
    }

    /// Number of bound slots the subtree occupies (`right - left + 1`)
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    pub fn descendant_count(&self) -> i64 {
        (self.right - self.left - 1) / 2
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.right - self.left == 1
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether both records live in the same tree partition
    pub fn same_tree(&self, other: &NodeRecord) -> bool {
        self.tree_id == other.tree_id
    }

    /// Whether `self` sits strictly inside `other`'s interval
    pub fn is_child_of(&self, other: &NodeRecord) -> bool {
        self.same_tree(other) && other.left < self.left && self.right < other.right
    }

    pub fn is_ancestor_of(&self, other: &NodeRecord) -> bool {
        other.is_child_of(self)
    }
}

/// A node handle with a pending structural intent
///
/// Intent methods only record what should happen; nothing touches the store
/// until the handle is passed to [`NestedSet`](crate::services::NestedSet).
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub record: NodeRecord,
    persisted: bool,
    operation: Option<Operation>,
}

impl TreeNode {
    /// New, not yet persisted node
    pub fn new(id: impl Into<Key>) -> Self {
        Self {
            record: NodeRecord::new(id),
            persisted: false,
            operation: None,
        }
    }

    /// New node that will become the root of an explicit tree (multi-tree mode)
    pub fn with_tree_id(mut self, tree_id: impl Into<Key>) -> Self {
        self.record.tree_id = Some(tree_id.into());
        self
    }

    /// Handle for a record loaded from the store
    pub fn from_persisted(record: NodeRecord) -> Self {
        Self {
            record,
            persisted: true,
            operation: None,
        }
    }

    pub fn id(&self) -> &Key {
        &self.record.id
    }

    pub fn is_new_record(&self) -> bool {
        !self.persisted
    }

    pub fn operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    /// Named attribute from `properties`
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.record.properties.get(name)
    }

    /// Set a named attribute in `properties`
    pub fn set_property(&mut self, name: impl Into<String>, value: serde_json::Value) {
        if !self.record.properties.is_object() {
            self.record.properties = empty_properties();
        }
        if let Some(map) = self.record.properties.as_object_mut() {
            map.insert(name.into(), value);
        }
    }

    /// Create as a root, or re-root an existing node into its own tree
    pub fn make_root(&mut self) -> &mut Self {
        self.operation = Some(if self.persisted {
            Operation::MoveAsRoot
        } else {
            Operation::MakeRoot
        });
        self
    }

    pub fn prepend_to(&mut self, target: impl Into<Key>) -> &mut Self {
        self.operation = Some(Operation::PrependTo(target.into()));
        self
    }

    pub fn append_to(&mut self, target: impl Into<Key>) -> &mut Self {
        self.operation = Some(Operation::AppendTo(target.into()));
        self
    }

    pub fn insert_before(&mut self, target: impl Into<Key>) -> &mut Self {
        self.operation = Some(Operation::InsertBefore(target.into()));
        self
    }

    pub fn insert_after(&mut self, target: impl Into<Key>) -> &mut Self {
        self.operation = Some(Operation::InsertAfter(target.into()));
        self
    }

    /// Make the next delete remove the whole subtree
    pub fn delete_with_children(&mut self) -> &mut Self {
        self.operation = Some(Operation::DeleteAll);
        self
    }

    /// Make the next restore bring back only this node
    pub fn restore_self_only(&mut self) -> &mut Self {
        self.operation = Some(Operation::RestoreSelfOnly);
        self
    }

    /// Replace the record with its stored state and drop any pending intent
    pub(crate) fn settle(&mut self, record: NodeRecord) {
        self.record = record;
        self.persisted = true;
        self.operation = None;
    }

    /// Mark the handle as no longer backed by a row
    pub(crate) fn detach(&mut self) {
        self.persisted = false;
        self.operation = None;
    }

    pub(crate) fn clear_operation(&mut self) {
        self.operation = None;
    }
}

impl From<&TreeNode> for Key {
    fn from(node: &TreeNode) -> Self {
        node.record.id.clone()
    }
}

impl From<&NodeRecord> for Key {
    fn from(record: &NodeRecord) -> Self {
        record.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(left: i64, right: i64) -> NodeRecord {
        let mut record = NodeRecord::new(Key::from(left));
        record.left = left;
        record.right = right;
        record
    }

    #[test]
    fn test_bounds_helpers() {
        let node = record(2, 9);
        assert_eq!(node.width(), 8);
        assert_eq!(node.descendant_count(), 3);
        assert!(!node.is_leaf());
        assert!(record(4, 5).is_leaf());
    }

    #[test]
    fn test_containment_requires_same_tree() {
        let parent = record(1, 10);
        let child = record(2, 3);
        assert!(child.is_child_of(&parent));
        assert!(parent.is_ancestor_of(&child));
        assert!(!parent.is_child_of(&child));

        let mut other_tree = record(2, 3);
        other_tree.tree_id = Some(Key::from(2));
        assert!(!other_tree.is_child_of(&parent));
    }

    #[test]
    fn test_make_root_depends_on_persisted_state() {
        let mut fresh = TreeNode::new(1);
        fresh.make_root();
        assert_eq!(fresh.operation(), Some(&Operation::MakeRoot));

        let mut stored = TreeNode::from_persisted(record(2, 3));
        stored.make_root();
        assert_eq!(stored.operation(), Some(&Operation::MoveAsRoot));
    }

    #[test]
    fn test_intents_replace_each_other() {
        let target = TreeNode::from_persisted(record(1, 2));
        let mut node = TreeNode::new(5);

        node.append_to(&target).insert_after(7);
        assert_eq!(node.operation(), Some(&Operation::InsertAfter(Key::from(7))));

        node.clear_operation();
        assert!(node.operation().is_none());
    }

    #[test]
    fn test_properties_accessors() {
        let mut node = TreeNode::new("a");
        node.set_property("title", json!("Projects"));

        assert_eq!(node.property("title"), Some(&json!("Projects")));
        assert_eq!(node.property("missing"), None);
    }
}
