use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use nestedset_core::{MemoryRowStore, NestedSet, NodeHandle, TreeConfig};

const COUNTS: &[usize] = &[100, 1_000];

/// Root with `count` children, each appended as the last child.
fn wide_tree(count: usize) -> (NestedSet<MemoryRowStore>, NodeHandle, Vec<NodeHandle>) {
    let mut tree = NestedSet::new(MemoryRowStore::new(), TreeConfig::new("bench"));
    let root = NodeHandle::named("root");
    tree.make_root(&root).unwrap();
    let children = (0..count)
        .map(|i| {
            let node = NodeHandle::named(format!("n{i}"));
            tree.append_to(&node, &root).unwrap();
            node
        })
        .collect();
    (tree, root, children)
}

fn append_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    for &count in COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let (tree, _, _) = wide_tree(count);
                black_box(tree.store().len())
            })
        });
    }
    group.finish();
}

fn move_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("move-first-to-last");
    for &count in COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || wide_tree(count),
                |(mut tree, root, children)| {
                    for node in children.iter().take(10) {
                        tree.move_as_last(node, &root).unwrap();
                    }
                    black_box(root.bounds())
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn prepend_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepend-into-populated");
    for &count in COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || wide_tree(count),
                |(mut tree, root, _children)| {
                    let node = NodeHandle::named("front");
                    tree.prepend_to(&node, &root).unwrap();
                    black_box(node.bounds())
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, append_benchmark, move_benchmark, prepend_benchmark);
criterion_main!(benches);
