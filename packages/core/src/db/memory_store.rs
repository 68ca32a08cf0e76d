//! In-process TreeStore driver
//!
//! Keeps every row in a `BTreeMap` behind a tokio `RwLock`. Each bulk request
//! is applied under one write lock, so it is as atomic as a single SQL
//! statement. Transactions snapshot the map on `begin` and restore it on
//! `rollback`.
//!
//! Used by unit/property tests and benchmarks; it mirrors
//! the SQL semantics of [`SqliteTreeStore`](super::SqliteTreeStore) row for row.

use super::error::DatabaseError;
use super::store::{
    BoundsUpdate, HealthCheck, MarkFilter, ParentFilter, RangeFilter, Relocation, Selection,
    Selector, Shift, TrashFilter, TrashMatch, TreeScope, TreeStore,
};
use crate::config::TreeConfig;
use crate::models::{Key, NodeRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct MemoryRow {
    record: NodeRecord,
    marked: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<Key, MemoryRow>,
    snapshot: Option<BTreeMap<Key, MemoryRow>>,
}

/// `TreeStore` backed by process memory
#[derive(Debug)]
pub struct MemoryTreeStore {
    multi_tree: bool,
    soft_delete: bool,
    state: RwLock<MemoryState>,
}

impl MemoryTreeStore {
    pub fn new(config: &TreeConfig) -> Self {
        Self {
            multi_tree: config.multi_tree,
            soft_delete: config.soft_delete,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Number of stored rows, trashed included
    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn in_scope(record: &NodeRecord, scope: &TreeScope) -> bool {
        match scope {
            TreeScope::All => true,
            TreeScope::Tree(tree_id) => record.tree_id.as_ref() == Some(tree_id),
        }
    }

    fn trash_matches(&self, record: &NodeRecord, filter: TrashFilter) -> bool {
        if !self.soft_delete {
            return true;
        }
        match filter {
            TrashFilter::All => true,
            TrashFilter::WithoutTrashed => record.deleted_at.is_none(),
            TrashFilter::OnlyTrashed => record.deleted_at.is_some(),
        }
    }

    fn selected(row: &MemoryRow, selector: &Selector) -> bool {
        match selector {
            Selector::Marked => row.marked,
            Selector::Range { left, right } => {
                row.record.left >= *left && row.record.right <= *right
            }
            Selector::Node(id) => &row.record.id == id,
            Selector::Ids(ids) => ids.contains(&row.record.id),
        }
    }

    fn selection_matches(&self, record: &NodeRecord, selection: &Selection) -> bool {
        if let Some(tree_id) = &selection.tree_id {
            if record.tree_id.as_ref() != Some(tree_id) {
                return false;
            }
        }

        let in_range = match selection.range {
            None => true,
            Some(RangeFilter::Within { left, right }) => {
                record.left >= left && record.right <= right
            }
            Some(RangeFilter::Containing { left, right }) => {
                record.left < left && record.right > right
            }
        };

        let parent_ok = match &selection.parent {
            ParentFilter::Any => true,
            ParentFilter::Root => record.parent_id.is_none(),
            ParentFilter::Is(parent) => record.parent_id.as_ref() == Some(parent),
        };

        in_range
            && parent_ok
            && (!selection.leaves_only || record.right == record.left + 1)
            && self.trash_matches(record, selection.trash)
    }

    fn same_tree(&self, a: &NodeRecord, b: &NodeRecord) -> bool {
        !self.multi_tree || a.tree_id == b.tree_id
    }

    fn count_health(&self, rows: &BTreeMap<Key, MemoryRow>, check: HealthCheck, scope: &TreeScope) -> u64 {
        let scoped: Vec<&NodeRecord> = rows
            .values()
            .map(|row| &row.record)
            .filter(|record| Self::in_scope(record, scope))
            .collect();

        let parent_of = |child: &NodeRecord| -> Option<&NodeRecord> {
            let parent = rows.get(child.parent_id.as_ref()?)?;
            self.same_tree(&parent.record, child)
                .then_some(&parent.record)
        };

        let count = match check {
            HealthCheck::Oddness => scoped
                .iter()
                .filter(|r| r.left >= r.right || (r.right - r.left) % 2 == 0)
                .count(),
            HealthCheck::Duplicates => {
                let mut pairs = 0;
                for (i, a) in scoped.iter().enumerate() {
                    for b in &scoped[i + 1..] {
                        if self.same_tree(a, b)
                            && (a.left == b.left
                                || a.right == b.right
                                || a.left == b.right
                                || a.right == b.left)
                        {
                            pairs += 1;
                        }
                    }
                }
                pairs
            }
            HealthCheck::WrongParent => scoped
                .iter()
                .filter(|child| {
                    let Some(parent) = parent_of(child) else {
                        return false;
                    };
                    let outside = !(parent.left < child.left && child.right < parent.right);
                    let skipped = rows.values().map(|row| &row.record).any(|middle| {
                        middle.id != parent.id
                            && middle.id != child.id
                            && self.same_tree(middle, child)
                            && middle.left > parent.left
                            && middle.right < parent.right
                            && middle.left < child.left
                            && middle.right > child.right
                    });
                    outside || skipped
                })
                .count(),
            HealthCheck::MissingParent => scoped
                .iter()
                .filter(|child| child.parent_id.is_some() && parent_of(child).is_none())
                .count(),
            HealthCheck::WrongLevel => scoped
                .iter()
                .filter(|child| {
                    parent_of(child).is_some_and(|parent| child.level != parent.level + 1)
                })
                .count(),
        };

        count as u64
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    fn supports_soft_delete(&self) -> bool {
        self.soft_delete
    }

    async fn begin(&self) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        if state.snapshot.is_some() {
            return Err(DatabaseError::transaction("transaction already in progress"));
        }
        state.snapshot = Some(state.rows.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| DatabaseError::transaction("no transaction in progress"))
    }

    async fn rollback(&self) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| DatabaseError::transaction("no transaction in progress"))?;
        state.rows = snapshot;
        Ok(())
    }

    async fn find(&self, id: &Key) -> Result<Option<NodeRecord>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.rows.get(id).map(|row| row.record.clone()))
    }

    async fn insert(&self, record: &NodeRecord) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        if state.rows.contains_key(&record.id) {
            return Err(DatabaseError::sql_execution(format!(
                "UNIQUE constraint failed: node '{}' already exists",
                record.id
            )));
        }
        state.rows.insert(
            record.id.clone(),
            MemoryRow {
                record: record.clone(),
                marked: false,
            },
        );
        Ok(())
    }

    async fn save_attributes(
        &self,
        id: &Key,
        properties: &serde_json::Value,
    ) -> Result<u64, DatabaseError> {
        let mut state = self.state.write().await;
        Ok(match state.rows.get_mut(id) {
            Some(row) => {
                row.record.properties = properties.clone();
                1
            }
            None => 0,
        })
    }

    async fn select(&self, selection: &Selection) -> Result<Vec<NodeRecord>, DatabaseError> {
        let state = self.state.read().await;
        let mut records: Vec<NodeRecord> = state
            .rows
            .values()
            .filter(|row| self.selection_matches(&row.record, selection))
            .map(|row| row.record.clone())
            .collect();
        records.sort_by(|a, b| {
            (&a.tree_id, a.left, &a.id).cmp(&(&b.tree_id, b.left, &b.id))
        });
        Ok(records)
    }

    async fn count(&self, selection: &Selection) -> Result<u64, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .filter(|row| self.selection_matches(&row.record, selection))
            .count() as u64)
    }

    async fn tree_ids(&self) -> Result<Vec<Key>, DatabaseError> {
        let state = self.state.read().await;
        let ids: BTreeSet<Key> = state
            .rows
            .values()
            .filter_map(|row| row.record.tree_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn max_tree_id(&self) -> Result<Option<i64>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .filter_map(|row| row.record.tree_id.as_ref().and_then(Key::as_int))
            .max())
    }

    async fn shift(&self, shift: &Shift) -> Result<u64, DatabaseError> {
        if shift.is_noop() {
            return Ok(0);
        }

        let mut state = self.state.write().await;
        let mut touched = 0;
        for row in state.rows.values_mut() {
            let marks_ok = match shift.marks {
                MarkFilter::Any => true,
                MarkFilter::Unmarked => !row.marked,
                MarkFilter::Marked => row.marked,
            };
            if !marks_ok || !Self::in_scope(&row.record, &shift.scope) {
                continue;
            }

            let shift_left = shift.covers(row.record.left);
            let shift_right = shift.covers(row.record.right);
            if shift_left {
                row.record.left += shift.delta;
            }
            if shift_right {
                row.record.right += shift.delta;
            }
            if shift_left || shift_right {
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn mark(&self, scope: &TreeScope, selector: &Selector) -> Result<u64, DatabaseError> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for row in state.rows.values_mut() {
            if Self::in_scope(&row.record, scope) && Self::selected(row, selector) {
                row.marked = true;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn unmark(&self, scope: &TreeScope) -> Result<u64, DatabaseError> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for row in state.rows.values_mut() {
            if row.marked && Self::in_scope(&row.record, scope) {
                row.marked = false;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn relocate(&self, relocation: &Relocation) -> Result<u64, DatabaseError> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for row in state.rows.values_mut() {
            if !Self::in_scope(&row.record, &relocation.scope)
                || !Self::selected(row, &relocation.selector)
            {
                continue;
            }
            row.record.left += relocation.delta;
            row.record.right += relocation.delta;
            row.record.level += relocation.level_delta;
            if let Some(tree_id) = &relocation.tree_id {
                row.record.tree_id = Some(tree_id.clone());
            }
            row.marked = false;
            touched += 1;
        }
        Ok(touched)
    }

    async fn set_parent(&self, id: &Key, parent_id: Option<&Key>) -> Result<u64, DatabaseError> {
        let mut state = self.state.write().await;
        Ok(match state.rows.get_mut(id) {
            Some(row) => {
                row.record.parent_id = parent_id.cloned();
                1
            }
            None => 0,
        })
    }

    async fn reparent_children(
        &self,
        scope: &TreeScope,
        from: &Key,
        to: Option<&Key>,
    ) -> Result<u64, DatabaseError> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for row in state.rows.values_mut() {
            if Self::in_scope(&row.record, scope) && row.record.parent_id.as_ref() == Some(from) {
                row.record.parent_id = to.cloned();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete(&self, scope: &TreeScope, selector: &Selector) -> Result<u64, DatabaseError> {
        let mut state = self.state.write().await;
        let before = state.rows.len();
        state
            .rows
            .retain(|_, row| !(Self::in_scope(&row.record, scope) && Self::selected(row, selector)));
        Ok((before - state.rows.len()) as u64)
    }

    async fn write_bounds(&self, updates: &[BoundsUpdate]) -> Result<u64, DatabaseError> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for update in updates {
            if let Some(row) = state.rows.get_mut(&update.id) {
                row.record.left = update.left;
                row.record.right = update.right;
                row.record.level = update.level;
                row.record.parent_id = update.parent_id.clone();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn set_deleted_at(
        &self,
        scope: &TreeScope,
        selector: &Selector,
        matching: TrashMatch,
        value: Option<DateTime<Utc>>,
    ) -> Result<u64, DatabaseError> {
        if !self.soft_delete {
            return Err(DatabaseError::sql_execution(
                "soft delete is not enabled for this store",
            ));
        }

        let mut state = self.state.write().await;
        let mut touched = 0;
        for row in state.rows.values_mut() {
            let stamp_ok = match matching {
                TrashMatch::Any => true,
                TrashMatch::Untrashed => row.record.deleted_at.is_none(),
                TrashMatch::TrashedAt(at) => row.record.deleted_at == Some(at),
            };
            if stamp_ok && Self::in_scope(&row.record, scope) && Self::selected(row, selector) {
                row.record.deleted_at = value;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn health_count(
        &self,
        check: HealthCheck,
        scope: &TreeScope,
    ) -> Result<u64, DatabaseError> {
        let state = self.state.read().await;
        Ok(self.count_health(&state.rows, check, scope))
    }
}
