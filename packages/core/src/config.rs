/// Configuration for the nested-set engine and its store drivers
use serde::{Deserialize, Serialize};

/// Column layout of the node table
///
/// Every name must be a plain SQL identifier; drivers interpolate them into
/// statements, so [`TreeConfig::validate`] rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub id: String,
    pub left: String,
    pub right: String,
    pub level: String,
    pub parent: String,
    pub tree: String,
    pub deleted_at: String,
    pub marker: String,
    pub properties: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            left: "lft".to_string(),
            right: "rgt".to_string(),
            level: "lvl".to_string(),
            parent: "parent_id".to_string(),
            tree: "tree_id".to_string(),
            deleted_at: "deleted_at".to_string(),
            marker: "ns_marked".to_string(),
            properties: "properties".to_string(),
        }
    }
}

impl ColumnNames {
    fn all(&self) -> [(&'static str, &str); 9] {
        [
            ("id", &self.id),
            ("left", &self.left),
            ("right", &self.right),
            ("level", &self.level),
            ("parent", &self.parent),
            ("tree", &self.tree),
            ("deleted_at", &self.deleted_at),
            ("marker", &self.marker),
            ("properties", &self.properties),
        ]
    }
}

/// How fresh tree ids are produced in multi-tree mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TreeIdStrategy {
    /// No generator: callers must always supply a tree id
    #[default]
    None,
    /// `max(tree_id) + 1` over integer tree ids
    Sequential,
    /// Time-ordered UUID (version 7)
    UuidV7,
    Ulid,
}

/// What happens to the children of a non-leaf node that is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChildrenPolicy {
    /// Children move one level up and take the deleted node's parent
    #[default]
    Reparent,
    /// Children are deleted together with the node
    DeleteDescendants,
}

/// Nested-set configuration shared by the service and the drivers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Node table name
    pub table: String,

    pub columns: ColumnNames,

    /// Partition the table into independent trees by `tree_id`
    pub multi_tree: bool,

    pub tree_id_strategy: TreeIdStrategy,

    /// Keep a `deleted_at` column and support trash/restore
    pub soft_delete: bool,

    pub children_policy: ChildrenPolicy,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table: "nested_nodes".to_string(),
            columns: ColumnNames::default(),
            multi_tree: false,
            tree_id_strategy: TreeIdStrategy::None,
            soft_delete: false,
            children_policy: ChildrenPolicy::Reparent,
        }
    }
}

impl TreeConfig {
    /// Single tree per table
    pub fn single_tree() -> Self {
        Self::default()
    }

    /// Forest partitioned by `tree_id`, with the given id strategy
    pub fn multi_tree(strategy: TreeIdStrategy) -> Self {
        Self {
            multi_tree: true,
            tree_id_strategy: strategy,
            ..Self::default()
        }
    }

    pub fn with_soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    pub fn with_children_policy(mut self, policy: ChildrenPolicy) -> Self {
        self.children_policy = policy;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Parse a JSON configuration document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid tree config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !is_identifier(&self.table) {
            return Err(format!("table name '{}' is not a valid identifier", self.table));
        }

        let columns = self.columns.all();
        for (role, name) in columns.iter() {
            if !is_identifier(name) {
                return Err(format!(
                    "{} column name '{}' is not a valid identifier",
                    role, name
                ));
            }
        }

        for (i, (role, name)) in columns.iter().enumerate() {
            if let Some((other, _)) = columns[i + 1..].iter().find(|(_, n)| n == name) {
                return Err(format!(
                    "{} and {} columns share the name '{}'",
                    role, other, name
                ));
            }
        }

        if !self.multi_tree && self.tree_id_strategy != TreeIdStrategy::None {
            return Err("tree_id_strategy requires multi_tree to be enabled".to_string());
        }

        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TreeConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.multi_tree);
        assert_eq!(config.columns.left, "lft");
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let mut config = TreeConfig::default();
        config.columns.left = "lft; DROP TABLE x".to_string();
        assert!(config.validate().unwrap_err().contains("left column"));

        let config = TreeConfig::default().with_table("1nodes");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_columns() {
        let mut config = TreeConfig::default();
        config.columns.right = "lft".to_string();
        assert!(config.validate().unwrap_err().contains("share the name"));
    }

    #[test]
    fn test_strategy_requires_multi_tree() {
        let config = TreeConfig {
            tree_id_strategy: TreeIdStrategy::Ulid,
            ..TreeConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(TreeConfig::multi_tree(TreeIdStrategy::Ulid).validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = TreeConfig::from_json(
            r#"{"multi_tree": true, "tree_id_strategy": "sequential", "columns": {"left": "l"}}"#,
        )
        .unwrap();

        assert!(config.multi_tree);
        assert_eq!(config.tree_id_strategy, TreeIdStrategy::Sequential);
        assert_eq!(config.columns.left, "l");
        assert_eq!(config.columns.right, "rgt");
        assert_eq!(config.table, "nested_nodes");
    }
}
