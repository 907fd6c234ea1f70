//! Benchmarks for recompute-on-read views

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rewardscope::api::{ComponentBreakdown, RewardHistory};
use rewardscope::storage::{MemoryStore, MetricsStore};
use rewardscope::StepRecord;

const COMPONENTS: [&str; 6] = [
    "forward_progress",
    "ctrl_cost",
    "contact_cost",
    "alive_bonus",
    "goal_distance",
    "energy",
];

fn setup_store(count: usize) -> MemoryStore {
    let store = MemoryStore::new();
    for i in 0..count {
        let mut step = StepRecord::new(i as i64 + 1, i as i64 / 200, (i % 7) as f64 * 0.1);
        for (j, name) in COMPONENTS.iter().enumerate().take(1 + i % COMPONENTS.len()) {
            step = step.with_component(*name, (i + j) as f64 * 0.01 - 0.5);
        }
        store.push_step(step);
    }
    store
}

fn bench_component_breakdown(c: &mut Criterion) {
    let mut group = c.benchmark_group("component_breakdown");
    let store = setup_store(5_000);

    for window in [100usize, 1_000, 5_000] {
        let steps = store.recent_steps(window).unwrap();
        group.throughput(Throughput::Elements(window as u64));
        group.bench_with_input(BenchmarkId::from_parameter(window), &steps, |b, steps| {
            b.iter(|| ComponentBreakdown::from_steps(black_box(steps)))
        });
    }

    group.finish();
}

fn bench_reward_history(c: &mut Criterion) {
    let store = setup_store(5_000);
    let steps = store.recent_steps(100).unwrap();

    c.bench_function("reward_history_100", |b| {
        b.iter(|| RewardHistory::from_steps(black_box(&steps)))
    });
}

criterion_group!(benches, bench_component_breakdown, bench_reward_history);
criterion_main!(benches);
