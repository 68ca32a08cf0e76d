//! Rebuilding bounds from parent pointers
//!
//! Parent pointers are the source of truth during repair. Rows are numbered
//! in pre-order with an explicit stack, children in order of their current
//! `left` (ties broken by id). Rows whose parent is missing, or that sit on a
//! parent cycle, are quarantined: they lose their parent and are numbered as
//! extra roots after the real ones.

use super::error::NestedSetError;
use super::TreeContext;
use crate::db::{BoundsUpdate, MarkFilter, Selection, Selector, Shift, TreeScope};
use crate::models::{Key, NodeRecord};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::ops::AddAssign;

/// Rows written by a repair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FixReport {
    /// Rows whose bounds, level or parent were rewritten
    pub changed: u64,
    /// Rows outside a repaired subtree moved to absorb its new width
    pub shifted: u64,
}

impl FixReport {
    pub fn total(&self) -> u64 {
        self.changed + self.shifted
    }
}

impl AddAssign for FixReport {
    fn add_assign(&mut self, other: Self) {
        self.changed += other.changed;
        self.shifted += other.shifted;
    }
}

/// Outcome of renumbering a set of rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Renumbering {
    /// New bookkeeping for every visited row, in pre-order
    pub placed: Vec<BoundsUpdate>,
    /// Rows that became roots because their parent was missing or cyclic
    pub quarantined: Vec<Key>,
}

enum Visit<'r> {
    Enter(&'r NodeRecord, i64, Option<Key>),
    Exit(usize),
}

struct Walker<'r> {
    children: HashMap<&'r Key, Vec<&'r NodeRecord>>,
    visited: HashSet<&'r Key>,
    placed: Vec<BoundsUpdate>,
    cut: i64,
}

impl<'r> Walker<'r> {
    /// `rows` must already be ordered by `(left, id)`
    fn new(rows: &[&'r NodeRecord], ids: &HashSet<&'r Key>, start: i64) -> Self {
        let mut children: HashMap<&'r Key, Vec<&'r NodeRecord>> = HashMap::new();
        for record in rows {
            if let Some(parent) = record.parent_id.as_ref().and_then(|p| ids.get(p)) {
                children.entry(*parent).or_default().push(*record);
            }
        }

        Self {
            children,
            visited: HashSet::new(),
            placed: Vec::new(),
            cut: start,
        }
    }

    fn walk(&mut self, root: &'r NodeRecord, level: i64, parent_id: Option<Key>) {
        let mut stack = vec![Visit::Enter(root, level, parent_id)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(record, level, parent_id) => {
                    if !self.visited.insert(&record.id) {
                        continue;
                    }

                    let index = self.placed.len();
                    self.placed.push(BoundsUpdate {
                        id: record.id.clone(),
                        left: self.cut,
                        right: self.cut,
                        level,
                        parent_id,
                    });
                    self.cut += 1;
                    stack.push(Visit::Exit(index));

                    if let Some(children) = self.children.get(&record.id) {
                        for child in children.iter().rev() {
                            stack.push(Visit::Enter(*child, level + 1, Some(record.id.clone())));
                        }
                    }
                }
                Visit::Exit(index) => {
                    self.placed[index].right = self.cut;
                    self.cut += 1;
                }
            }
        }
    }

    fn is_visited(&self, id: &Key) -> bool {
        self.visited.contains(id)
    }
}

fn ordered(rows: &[NodeRecord]) -> Vec<&NodeRecord> {
    let mut sorted: Vec<&NodeRecord> = rows.iter().collect();
    sorted.sort_by(|a, b| (a.left, &a.id).cmp(&(b.left, &b.id)));
    sorted
}

/// Renumber every row of one tree, starting at bound 1
pub fn plan_renumbering(rows: &[NodeRecord]) -> Renumbering {
    let sorted = ordered(rows);
    let ids: HashSet<&Key> = sorted.iter().map(|r| &r.id).collect();
    let mut walker = Walker::new(&sorted, &ids, 1);
    let mut quarantined = Vec::new();

    for record in sorted.iter().filter(|r| r.parent_id.is_none()) {
        walker.walk(*record, 0, None);
    }

    let orphans = sorted
        .iter()
        .filter(|r| r.parent_id.as_ref().is_some_and(|p| !ids.contains(p)));
    for record in orphans {
        quarantined.push(record.id.clone());
        walker.walk(*record, 0, None);
    }

    // Whatever is still unvisited hangs off a parent cycle.
    for record in &sorted {
        if !walker.is_visited(&record.id) {
            quarantined.push(record.id.clone());
            walker.walk(*record, 0, None);
        }
    }

    Renumbering {
        placed: walker.placed,
        quarantined,
    }
}

/// Renumber the subtree hanging off `root`, keeping the root's own left,
/// level and parent
fn plan_subtree(rows: &[NodeRecord], root: &NodeRecord) -> Vec<BoundsUpdate> {
    let sorted = ordered(rows);
    let ids: HashSet<&Key> = sorted.iter().map(|r| &r.id).collect();
    let mut walker = Walker::new(&sorted, &ids, root.left);
    walker.walk(root, root.level, root.parent_id.clone());
    walker.placed
}

fn changed_rows(placed: &[BoundsUpdate], rows: &[NodeRecord]) -> Vec<BoundsUpdate> {
    let current: HashMap<&Key, &NodeRecord> = rows.iter().map(|r| (&r.id, r)).collect();
    placed
        .iter()
        .filter(|update| {
            current.get(&update.id).map_or(true, |record| {
                record.left != update.left
                    || record.right != update.right
                    || record.level != update.level
                    || record.parent_id != update.parent_id
            })
        })
        .cloned()
        .collect()
}

/// Rebuild every row of a scope from parent pointers
pub async fn fix_tree(ctx: &TreeContext<'_>, scope: &TreeScope) -> Result<FixReport, NestedSetError> {
    let rows = ctx.store.select(&Selection::all().in_scope(scope)).await?;
    let plan = plan_renumbering(&rows);

    for id in &plan.quarantined {
        tracing::warn!("Quarantined node '{}' as an extra root in {:?}", id, scope);
    }

    let changed = changed_rows(&plan.placed, &rows);
    if !changed.is_empty() {
        ctx.store.write_bounds(&changed).await?;
    }

    let report = FixReport {
        changed: changed.len() as u64,
        shifted: 0,
    };
    tracing::info!(
        "Repaired {:?}: {} of {} rows rewritten",
        scope,
        report.changed,
        rows.len()
    );
    Ok(report)
}

/// Whether the rows stored inside `root`'s interval are exactly the rows
/// its parent pointers reach
fn subtree_is_self_contained(
    rows: &[NodeRecord],
    root: &NodeRecord,
    placed: &[BoundsUpdate],
) -> bool {
    let planned: HashSet<&Key> = placed.iter().map(|update| &update.id).collect();
    let within = |bound: i64| root.left <= bound && bound <= root.right;

    let mut stored = 0;
    for record in rows {
        if !within(record.left) && !within(record.right) {
            continue;
        }
        if !planned.contains(&record.id) || !(within(record.left) && within(record.right)) {
            return false;
        }
        stored += 1;
    }
    stored == planned.len()
}

/// Rebuild the subtree below `root_id`
///
/// When the recomputed width differs from the stored one, every bound from
/// the old right edge onwards is shifted over the (marked) subtree first.
/// If a parent pointer crosses the stored interval in either direction the
/// local rewrite cannot close the gap it leaves, so the whole tree is
/// rebuilt instead.
pub async fn fix_subtree(ctx: &TreeContext<'_>, root_id: &Key) -> Result<FixReport, NestedSetError> {
    let root = ctx.refresh(root_id).await?;
    let scope = ctx.scope_of(&root)?;
    let rows = ctx.store.select(&Selection::all().in_scope(&scope)).await?;

    let placed = plan_subtree(&rows, &root);
    if !subtree_is_self_contained(&rows, &root, &placed) {
        tracing::warn!(
            "Subtree of '{}' does not match its stored interval; rebuilding {:?}",
            root.id,
            scope
        );
        return fix_tree(ctx, &scope).await;
    }
    let new_right = placed.first().map_or(root.right, |update| update.right);

    let mut report = FixReport::default();
    let resized = new_right != root.right;
    if resized {
        let ids = placed.iter().map(|update| update.id.clone()).collect();
        ctx.store.mark(&scope, &Selector::Ids(ids)).await?;
        report.shifted = ctx
            .shifter()
            .shift(
                &Shift::open(root.right, new_right - root.right, scope.clone())
                    .with_marks(MarkFilter::Unmarked),
            )
            .await?;
    }

    let changed = changed_rows(&placed, &rows);
    if !changed.is_empty() {
        ctx.store.write_bounds(&changed).await?;
    }
    report.changed = changed.len() as u64;

    if resized {
        ctx.store.unmark(&scope).await?;
    }

    tracing::info!(
        "Repaired subtree of '{}': {} rows rewritten, {} shifted",
        root.id,
        report.changed,
        report.shifted
    );
    Ok(report)
}

/// Repair every tree of a multi-tree table
pub async fn fix_forest(ctx: &TreeContext<'_>) -> Result<FixReport, NestedSetError> {
    if !ctx.config.multi_tree {
        return fix_tree(ctx, &TreeScope::All).await;
    }

    let mut report = FixReport::default();
    for tree_id in ctx.store.tree_ids().await? {
        report += fix_tree(ctx, &TreeScope::Tree(tree_id)).await?;
    }
    Ok(report)
}
