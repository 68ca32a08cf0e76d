//! Error types for the nested-set operations layer
//!
//! This module defines the errors raised when a structural request violates a
//! tree rule. Every rule is checked before the first bulk statement runs, so
//! a rule error never leaves a partially applied change behind.

use crate::db::DatabaseError;
use crate::models::Key;
use thiserror::Error;

/// Errors that can occur during nested-set operations
///
/// # Examples
///
/// ```rust
/// use nodespace_nested_set::models::Key;
/// use nodespace_nested_set::operations::NestedSetError;
///
/// let err = NestedSetError::delete_root(&Key::from(1));
/// assert_eq!(err.to_string(), "Root node '1' still has children and cannot be deleted");
/// ```
#[derive(Error, Debug)]
pub enum NestedSetError {
    /// A second root was requested where only one may exist
    ///
    /// Raised for a second `make_root` in single-tree mode, for an insert
    /// beside a root in single-tree mode, and for a root created in a tree id
    /// that already has one.
    #[error("Unique root violation: {reason}")]
    UniqueRoot { reason: String },

    /// Deleting a root that still has children without `DeleteAll`
    #[error("Root node '{node_id}' still has children and cannot be deleted")]
    DeleteRoot { node_id: String },

    /// Multi-tree mode needs a tree id and none was supplied or generated
    #[error("A tree id is required: {context}")]
    TreeNeedValue { context: String },

    /// The request is not valid for this node or store
    #[error("Unsupported operation: {reason}")]
    UnsupportedOperation { reason: String },

    /// The request would break the interval structure
    ///
    /// Self reference, moving into one's own subtree or moving to the
    /// position the node already occupies.
    #[error("Invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// Referenced node does not exist
    #[error("Node '{node_id}' does not exist")]
    NodeNotFound { node_id: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Store error, propagated unmodified
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl NestedSetError {
    pub fn unique_root(reason: impl Into<String>) -> Self {
        Self::UniqueRoot {
            reason: reason.into(),
        }
    }

    pub fn delete_root(node_id: &Key) -> Self {
        Self::DeleteRoot {
            node_id: node_id.to_string(),
        }
    }

    pub fn tree_need_value(context: impl Into<String>) -> Self {
        Self::TreeNeedValue {
            context: context.into(),
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            reason: reason.into(),
        }
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            reason: reason.into(),
        }
    }

    pub fn node_not_found(node_id: &Key) -> Self {
        Self::NodeNotFound {
            node_id: node_id.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_root_error() {
        let err = NestedSetError::unique_root("tree already has a root");
        assert!(matches!(err, NestedSetError::UniqueRoot { .. }));
        assert_eq!(
            format!("{}", err),
            "Unique root violation: tree already has a root"
        );
    }

    #[test]
    fn test_delete_root_error() {
        let err = NestedSetError::delete_root(&Key::from("root-1"));
        assert!(matches!(err, NestedSetError::DeleteRoot { .. }));
        assert_eq!(
            format!("{}", err),
            "Root node 'root-1' still has children and cannot be deleted"
        );
    }

    #[test]
    fn test_tree_need_value_error() {
        let err = NestedSetError::tree_need_value("no tree id generator configured");
        assert_eq!(
            format!("{}", err),
            "A tree id is required: no tree id generator configured"
        );
    }

    #[test]
    fn test_node_not_found_error() {
        let err = NestedSetError::node_not_found(&Key::from(42));
        assert!(matches!(err, NestedSetError::NodeNotFound { .. }));
        assert_eq!(format!("{}", err), "Node '42' does not exist");
    }

    #[test]
    fn test_invariant_and_unsupported_errors() {
        let err = NestedSetError::invariant("cannot move a node into its own subtree");
        assert_eq!(
            format!("{}", err),
            "Invariant violation: cannot move a node into its own subtree"
        );

        let err = NestedSetError::unsupported("trash requires a soft-delete column");
        assert_eq!(
            format!("{}", err),
            "Unsupported operation: trash requires a soft-delete column"
        );
    }

    #[test]
    fn test_database_error_is_transparent() {
        let err: NestedSetError = DatabaseError::transaction("no transaction in progress").into();
        assert!(matches!(err, NestedSetError::Database(_)));
        assert_eq!(
            format!("{}", err),
            "Transaction error: no transaction in progress"
        );
    }
}
