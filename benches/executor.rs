use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dispatch_core::action::{Action, Priority};
use dispatch_core::clock::FakeClock;
use dispatch_core::executor::core::{ExecutorCore, NoopSleeper};
use dispatch_core::hotkey::ManagedSequenceSink;
use dispatch_core::key::Key;
use std::sync::Arc;

fn exec() -> ExecutorCore {
    ExecutorCore::with_sleeper(Arc::new(NoopSleeper))
}

fn bench_tick_normal_priority(c: &mut Criterion) {
    let key = Key::canonicalize("q").unwrap();
    c.bench_function("executor::tick_normal_priority", |b| {
        let clock = FakeClock::new();
        b.iter(|| {
            let exec = exec();
            exec.enqueue(Priority::Normal, Action::Press(key));
            black_box(exec.tick(&clock));
        })
    });
}

fn bench_tick_mixed_priority_drain(c: &mut Criterion) {
    let q = Key::canonicalize("q").unwrap();
    let w = Key::canonicalize("w").unwrap();
    let one = Key::canonicalize("1").unwrap();

    c.bench_function("executor::tick_mixed_priority_drain", |b| {
        let clock = FakeClock::new();
        b.iter(|| {
            let exec = exec();
            for _ in 0..16 {
                exec.enqueue(Priority::Low, Action::Press(w));
                exec.enqueue(Priority::Normal, Action::Press(q));
            }
            exec.enqueue(Priority::Emergency, Action::Press(one));
            while !exec.tick(&clock).is_empty() {}
        })
    });
}

fn bench_managed_sequence_activation(c: &mut Criterion) {
    let source = Key::canonicalize("e").unwrap();
    let target = Key::canonicalize("shift").unwrap();

    c.bench_function("executor::managed_sequence_activation", |b| {
        b.iter(|| {
            let exec = exec();
            black_box(exec.try_begin_managed_sequence(source, target, 50));
        })
    });
}

criterion_group!(
    benches,
    bench_tick_normal_priority,
    bench_tick_mixed_priority_drain,
    bench_managed_sequence_activation
);
criterion_main!(benches);
