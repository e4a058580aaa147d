use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dispatch_core::scheduler::core::SchedulerCore;

fn bench_fire_due_single_task(c: &mut Criterion) {
    c.bench_function("scheduler::fire_due_single_task", |b| {
        let scheduler = SchedulerCore::new();
        scheduler.add("t", 10, Box::new(|| Ok(())), true, 0);
        let mut now = 0u64;
        b.iter(|| {
            now += 10;
            black_box(scheduler.fire_due(now));
        })
    });
}

fn bench_fire_due_many_tasks(c: &mut Criterion) {
    c.bench_function("scheduler::fire_due_many_tasks", |b| {
        let scheduler = SchedulerCore::new();
        for i in 0..200 {
            scheduler.add(format!("t{i}"), 10 + (i % 7), Box::new(|| Ok(())), true, 0);
        }
        let mut now = 0u64;
        b.iter(|| {
            now += 10;
            black_box(scheduler.fire_due(now));
        })
    });
}

fn bench_add_and_remove(c: &mut Criterion) {
    c.bench_function("scheduler::add_and_remove", |b| {
        let scheduler = SchedulerCore::new();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let id = format!("task-{n}");
            scheduler.add(id.clone(), 100, Box::new(|| Ok(())), false, 0);
            black_box(scheduler.remove(&id));
        })
    });
}

criterion_group!(
    benches,
    bench_fire_due_single_task,
    bench_fire_due_many_tasks,
    bench_add_and_remove
);
criterion_main!(benches);
