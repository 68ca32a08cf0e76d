//! Nested Set Demo Binary
//!
//! Builds a small outline in a libsql database, moves a section around,
//! prints the resulting bounds and runs the integrity checks.
//!
//! # Usage
//!
//! ```bash
//! # In-memory database
//! cargo run --bin nested-set-demo
//!
//! # Persist to a file
//! NESTED_SET_DB=/tmp/outline.db cargo run --bin nested-set-demo
//! ```
//!
//! # Environment Variables
//!
//! - `NESTED_SET_DB`: Database file path (default: in-memory)
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use nodespace_nested_set::{Key, NestedSet, SqliteTreeStore, TreeConfig, TreeNode};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = TreeConfig::default();
    let store = match env::var("NESTED_SET_DB").ok().map(PathBuf::from) {
        Some(path) => {
            tracing::info!("Database: {}", path.display());
            SqliteTreeStore::open(path, config.clone()).await?
        }
        None => SqliteTreeStore::open_in_memory(config.clone()).await?,
    };
    let tree = NestedSet::new(Arc::new(store), config)?;

    let mut root = TreeNode::new(1);
    root.set_property("title", json!("Outline"));
    tree.save(root.make_root()).await?;

    for (id, title, parent) in [
        (2, "Introduction", 1),
        (3, "Background", 2),
        (4, "Method", 1),
        (5, "Results", 1),
        (6, "Tables", 5),
    ] {
        let mut node = TreeNode::new(id);
        node.set_property("title", json!(title));
        tree.save(node.append_to(parent)).await?;
    }

    // Results goes before Method.
    let mut results = tree.get(&Key::from(5)).await?;
    tree.save(results.insert_before(4)).await?;

    println!("{:<4} {:<14} {:>5} {:>5} {:>5}", "id", "title", "left", "right", "level");
    for record in tree.descendants(&Key::from(1), true).await? {
        let title = record
            .properties
            .get("title")
            .and_then(|value| value.as_str())
            .unwrap_or("");
        println!(
            "{:<4} {:<14} {:>5} {:>5} {:>5}",
            record.id,
            format!("{}{}", "  ".repeat(record.level as usize), title),
            record.left,
            record.right,
            record.level
        );
    }

    let report = tree.check(None).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_broken() {
        anyhow::bail!("tree failed its integrity checks");
    }

    Ok(())
}
