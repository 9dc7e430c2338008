//! Benchmarks for artifact key and path computation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use roundup::core::{ArtifactKey, Slot, StageName};
use roundup::store::OutputLayout;

const STAGES: [StageName; 5] = [
    StageName::Search,
    StageName::Summarize,
    StageName::Image,
    StageName::Speech,
    StageName::Slide,
];

fn all_keys(topics: usize) -> Vec<ArtifactKey> {
    (1..=topics)
        .flat_map(|n| STAGES.iter().map(move |stage| ArtifactKey::new(*stage, Slot::Topic(n))))
        .collect()
}

fn layout_benchmark(c: &mut Criterion) {
    let layout = OutputLayout::new("/tmp/roundup");
    let keys = all_keys(99);

    c.bench_function("relative_path_99_topics", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(OutputLayout::relative_path(black_box(key)));
            }
        });
    });

    c.bench_function("path_for_99_topics", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(layout.path_for(black_box(key)));
            }
        });
    });

    c.bench_function("sort_keys_99_topics", |b| {
        b.iter(|| {
            let mut shuffled: Vec<ArtifactKey> = keys.iter().rev().copied().collect();
            shuffled.sort();
            black_box(shuffled)
        });
    });
}

criterion_group!(benches, layout_benchmark);
criterion_main!(benches);
