//! Integrity counters

use super::error::NestedSetError;
use super::TreeContext;
use crate::db::{HealthCheck, TreeScope};
use serde::Serialize;

/// Failure counts of every health check for one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub oddness: u64,
    /// Pairs of rows sharing a bound value
    pub duplicates: u64,
    pub wrong_parent: u64,
    pub missing_parent: u64,
    pub wrong_level: u64,
}

impl HealthReport {
    pub fn count(&self, check: HealthCheck) -> u64 {
        match check {
            HealthCheck::Oddness => self.oddness,
            HealthCheck::Duplicates => self.duplicates,
            HealthCheck::WrongParent => self.wrong_parent,
            HealthCheck::MissingParent => self.missing_parent,
            HealthCheck::WrongLevel => self.wrong_level,
        }
    }

    fn set(&mut self, check: HealthCheck, count: u64) {
        match check {
            HealthCheck::Oddness => self.oddness = count,
            HealthCheck::Duplicates => self.duplicates = count,
            HealthCheck::WrongParent => self.wrong_parent = count,
            HealthCheck::MissingParent => self.missing_parent = count,
            HealthCheck::WrongLevel => self.wrong_level = count,
        }
    }

    pub fn total(&self) -> u64 {
        HealthCheck::ALL.iter().map(|check| self.count(*check)).sum()
    }

    pub fn is_broken(&self) -> bool {
        self.total() > 0
    }
}

/// Run every check against `scope`, one query each
pub async fn check(ctx: &TreeContext<'_>, scope: &TreeScope) -> Result<HealthReport, NestedSetError> {
    let mut report = HealthReport::default();
    for check in HealthCheck::ALL {
        report.set(check, ctx.store.health_count(check, scope).await?);
    }

    if report.is_broken() {
        tracing::warn!("Tree integrity check failed for {:?}: {:?}", scope, report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::{BoundsUpdate, MemoryTreeStore, TreeStore};
    use crate::models::{Key, TreeNode};
    use crate::operations::create;

    #[tokio::test]
    async fn test_clean_tree_reports_nothing() {
        let config = TreeConfig::default();
        let store = MemoryTreeStore::new(&config);
        let ctx = TreeContext::new(&store, &config, None);
        create(&ctx, TreeNode::new(1).make_root()).await.unwrap();
        create(&ctx, TreeNode::new(2).append_to(1)).await.unwrap();
        create(&ctx, TreeNode::new(3).append_to(2)).await.unwrap();

        let report = check(&ctx, &TreeScope::All).await.unwrap();
        assert_eq!(report, HealthReport::default());
        assert!(!report.is_broken());
    }

    #[tokio::test]
    async fn test_skipped_generation_is_wrong_parent() {
        let config = TreeConfig::default();
        let store = MemoryTreeStore::new(&config);
        let ctx = TreeContext::new(&store, &config, None);
        create(&ctx, TreeNode::new(1).make_root()).await.unwrap();
        create(&ctx, TreeNode::new(2).append_to(1)).await.unwrap();
        create(&ctx, TreeNode::new(3).append_to(2)).await.unwrap();

        // 3 sits inside 2 but points straight at the root.
        store
            .write_bounds(&[BoundsUpdate {
                id: Key::from(3),
                left: 3,
                right: 4,
                level: 1,
                parent_id: Some(Key::from(1)),
            }])
            .await
            .unwrap();

        let report = check(&ctx, &TreeScope::All).await.unwrap();
        assert_eq!(report.wrong_parent, 1);
        assert_eq!(report.wrong_level, 0);
        assert_eq!(report.total(), 1);
        assert!(report.is_broken());
    }
}
