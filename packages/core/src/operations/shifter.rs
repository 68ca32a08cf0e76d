//! Bulk bound shifts
//!
//! Every insert, move and delete ends up as one or more shifts: all `left`
//! values (and, independently, all `right` values) inside a cut range move by
//! a signed delta in a single statement.

use super::error::NestedSetError;
use crate::db::{Shift, TreeScope, TreeStore};

pub struct Shifter<'a> {
    store: &'a dyn TreeStore,
}

impl<'a> Shifter<'a> {
    pub fn new(store: &'a dyn TreeStore) -> Self {
        Self { store }
    }

    /// Execute a shift; returns the number of rows touched
    pub async fn shift(&self, shift: &Shift) -> Result<u64, NestedSetError> {
        if shift.is_noop() {
            return Ok(0);
        }

        let touched = self.store.shift(shift).await?;
        tracing::debug!(
            "Shifted bounds [{}, {}] by {} in {:?}: {} rows",
            shift.from,
            shift.to.map_or("inf".to_string(), |to| to.to_string()),
            shift.delta,
            shift.scope,
            touched
        );
        Ok(touched)
    }

    /// Make room for `width` bound slots starting at `at`
    pub async fn open_gap(
        &self,
        at: i64,
        width: i64,
        scope: &TreeScope,
    ) -> Result<u64, NestedSetError> {
        self.shift(&Shift::open(at, width, scope.clone())).await
    }

    /// Reclaim the `width` slots that ended at `right`
    pub async fn close_gap(
        &self,
        right: i64,
        width: i64,
        scope: &TreeScope,
    ) -> Result<u64, NestedSetError> {
        self.shift(&Shift::open(right + 1, -width, scope.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::{MemoryTreeStore, TreeStore};
    use crate::models::{Key, NodeRecord};

    async fn store_with(bounds: &[(i64, i64, i64)]) -> MemoryTreeStore {
        let store = MemoryTreeStore::new(&TreeConfig::default());
        for (id, left, right) in bounds {
            let mut record = NodeRecord::new(*id);
            record.left = *left;
            record.right = *right;
            store.insert(&record).await.unwrap();
        }
        store
    }

    async fn bounds(store: &MemoryTreeStore, id: i64) -> (i64, i64) {
        store.find(&Key::from(id)).await.unwrap().unwrap().bounds()
    }

    #[tokio::test]
    async fn test_open_then_close_is_identity() {
        let store = store_with(&[(1, 1, 8), (2, 2, 3), (3, 4, 7), (4, 5, 6)]).await;
        let shifter = Shifter::new(&store);

        shifter.open_gap(4, 2, &TreeScope::All).await.unwrap();
        assert_eq!(bounds(&store, 3).await, (6, 9));
        assert_eq!(bounds(&store, 1).await, (1, 10));

        shifter.close_gap(5, 2, &TreeScope::All).await.unwrap();
        assert_eq!(bounds(&store, 1).await, (1, 8));
        assert_eq!(bounds(&store, 3).await, (4, 7));
        assert_eq!(bounds(&store, 4).await, (5, 6));
    }

    #[tokio::test]
    async fn test_noop_shift_touches_nothing() {
        let store = store_with(&[(1, 1, 2)]).await;
        let shifter = Shifter::new(&store);

        let touched = shifter
            .shift(&Shift::range(5, 3, 4, TreeScope::All))
            .await
            .unwrap();
        assert_eq!(touched, 0);
        assert_eq!(shifter.open_gap(1, 0, &TreeScope::All).await.unwrap(), 0);
    }
}
