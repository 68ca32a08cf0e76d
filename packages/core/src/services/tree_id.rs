//! Tree id generators for multi-tree tables
//!
//! A generator is consulted whenever a new tree has to be opened and the
//! caller did not supply a `tree_id`: `make_root` without an explicit id,
//! `move_as_root`, and sibling inserts beside a root.

use crate::config::TreeIdStrategy;
use crate::db::{DatabaseError, TreeStore};
use crate::models::Key;
use async_trait::async_trait;
use std::sync::Arc;
use ulid::Ulid;
use uuid::Uuid;

/// Produces fresh tree ids
#[async_trait]
pub trait TreeIdGenerator: Send + Sync {
    async fn next_tree_id(&self, store: &dyn TreeStore) -> Result<Key, DatabaseError>;
}

/// `max(tree_id) + 1` over the integer tree ids already stored (1 when empty)
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialGenerator;

#[async_trait]
impl TreeIdGenerator for SequentialGenerator {
    async fn next_tree_id(&self, store: &dyn TreeStore) -> Result<Key, DatabaseError> {
        let max = store.max_tree_id().await?;
        Ok(Key::Int(max.map_or(1, |max| max + 1)))
    }
}

/// Time-ordered UUIDs (version 7)
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

#[async_trait]
impl TreeIdGenerator for UuidV7Generator {
    async fn next_tree_id(&self, _store: &dyn TreeStore) -> Result<Key, DatabaseError> {
        Ok(Key::from(Uuid::now_v7()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UlidGenerator;

#[async_trait]
impl TreeIdGenerator for UlidGenerator {
    async fn next_tree_id(&self, _store: &dyn TreeStore) -> Result<Key, DatabaseError> {
        Ok(Key::from(Ulid::new()))
    }
}

/// Generator for a configured strategy; `None` when callers must supply ids
pub fn generator_for(strategy: TreeIdStrategy) -> Option<Arc<dyn TreeIdGenerator>> {
    match strategy {
        TreeIdStrategy::None => None,
        TreeIdStrategy::Sequential => Some(Arc::new(SequentialGenerator)),
        TreeIdStrategy::UuidV7 => Some(Arc::new(UuidV7Generator)),
        TreeIdStrategy::Ulid => Some(Arc::new(UlidGenerator)),
    }
}
