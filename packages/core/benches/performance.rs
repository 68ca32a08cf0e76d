//! Performance benchmarks for nested-set structural writes
//!
//! Run with: `cargo bench -p nodespace-nested-set`
//!
//! These benchmarks measure the critical write paths:
//! - Appending children (gap opening over the parent chain)
//! - Moving a subtree across the tree (marker-based relocation)
//! - Rebuilding bounds from parent pointers (fix_tree)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nodespace_nested_set::{Key, MemoryTreeStore, NestedSet, TreeConfig, TreeNode};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Fresh service over an in-memory store
fn setup_tree() -> NestedSet {
    let config = TreeConfig::default();
    NestedSet::new(Arc::new(MemoryTreeStore::new(&config)), config).unwrap()
}

/// Root with `sections` children of `per_section` leaves each
async fn build_outline(tree: &NestedSet, sections: i64, per_section: i64) {
    tree.save(TreeNode::new(1).make_root()).await.unwrap();
    let mut next = 2;
    for _ in 0..sections {
        let section = next;
        tree.save(TreeNode::new(section).append_to(1)).await.unwrap();
        next += 1;
        for _ in 0..per_section {
            tree.save(TreeNode::new(next).append_to(section)).await.unwrap();
            next += 1;
        }
    }
}

fn bench_append(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("append_100_children", |b| {
        b.iter(|| {
            rt.block_on(async {
                let tree = setup_tree();
                tree.save(TreeNode::new(1).make_root()).await.unwrap();
                for id in 2..=101 {
                    tree.save(TreeNode::new(id).append_to(1)).await.unwrap();
                }
                black_box(tree)
            })
        });
    });
}

fn bench_move(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tree = setup_tree();
    rt.block_on(build_outline(&tree, 20, 10));

    // Section 2 bounces between the first and last slot of the root.
    c.bench_function("move_section_of_10", |b| {
        let mut to_end = true;
        b.iter(|| {
            rt.block_on(async {
                let mut section = tree.get(&Key::from(2)).await.unwrap();
                if to_end {
                    tree.save(section.append_to(1)).await.unwrap();
                } else {
                    tree.save(section.prepend_to(1)).await.unwrap();
                }
            });
            to_end = !to_end;
        });
    });
}

fn bench_fix_tree(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tree = setup_tree();
    rt.block_on(build_outline(&tree, 20, 10));

    c.bench_function("fix_tree_221_nodes", |b| {
        b.iter(|| rt.block_on(async { black_box(tree.fix_tree(None).await.unwrap()) }));
    });
}

criterion_group!(benches, bench_append, bench_move, bench_fix_tree);
criterion_main!(benches);
