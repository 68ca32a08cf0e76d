//! Database Layer
//!
//! This module holds the storage boundary of the nested-set engine:
//!
//! - `TreeStore` trait: entity accessor plus bulk range query/update executor
//! - `SqliteTreeStore`: libsql driver (feature `turso`, on by default)
//! - `MemoryTreeStore`: in-process driver for tests, benches and demos
//!
//! # Architecture
//!
//! Operations never read-modify-write bounds row by row. Every structural
//! change is phrased as a request value (`Shift`, `Relocation`, `Selector`)
//! and executed by the driver as one statement, inside a transaction opened
//! by the caller.

mod error;
mod memory_store;
#[cfg(feature = "turso")]
mod sqlite_store;
mod store;

pub use error::DatabaseError;
pub use memory_store::MemoryTreeStore;
#[cfg(feature = "turso")]
pub use sqlite_store::SqliteTreeStore;
pub use store::{
    BoundsUpdate, HealthCheck, MarkFilter, ParentFilter, RangeFilter, Relocation, Selection,
    Selector, Shift, TrashFilter, TrashMatch, TreeScope, TreeStore,
};
