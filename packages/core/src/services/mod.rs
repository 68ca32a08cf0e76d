//! Business Services
//!
//! This module contains the services built on top of the store drivers and
//! the structural operations:
//!
//! - `NestedSet` - structural writes, repair, health checks and hierarchy queries
//! - `TreeIdGenerator` - fresh tree ids for multi-tree tables (sequential, UUID v7, ULID)
//!
//! Services own the transaction boundary: every structural call runs in one
//! store transaction and is rolled back as a whole on error.

mod nested_set;
mod tree_id;

pub use nested_set::NestedSet;
pub use tree_id::{
    generator_for, SequentialGenerator, TreeIdGenerator, UlidGenerator, UuidV7Generator,
};
