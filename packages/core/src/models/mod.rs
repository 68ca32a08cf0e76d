//! Data Models
//!
//! This module contains the data structures shared by the store drivers and
//! the tree operations:
//!
//! - `Key` - opaque node / tree identity (integer or text)
//! - `NodeRecord` - persisted bounds, pointers and attributes of one node
//! - `TreeNode` - a record plus the pending structural intent
//! - `Operation` / `Anchor` - the intent enum and its resolved insertion point

mod key;
mod node;
mod operation;

pub use key::Key;
pub use node::{NodeRecord, TreeNode};
pub use operation::{Anchor, Operation};
