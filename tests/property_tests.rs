//! Property-based tests for the invariants in spec §8 that hold over
//! arbitrary input sequences rather than one fixed scenario.

use dispatch_core::action::{Action, Priority};
use dispatch_core::clock::FakeClock;
use dispatch_core::executor::core::{Dispatch, ExecutorCore, NoopSleeper};
use dispatch_core::key::Key;
use dispatch_core::scheduler::core::SchedulerCore;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn exec() -> ExecutorCore {
    ExecutorCore::with_sleeper(Arc::new(NoopSleeper))
}

fn any_key() -> impl Strategy<Value = Key> {
    prop_oneof![
        Just(Key::canonicalize("1").unwrap()),
        Just(Key::canonicalize("q").unwrap()),
        Just(Key::canonicalize("w").unwrap()),
        Just(Key::canonicalize("e").unwrap()),
    ]
}

proptest! {
    /// P-1: whenever the emergency queue is non-empty at a tick and no
    /// delay is pending, the tick's dispatch comes from that queue.
    #[test]
    fn p1_emergency_always_wins_a_tick_it_occupies(
        others in prop::collection::vec(any_key(), 0..8),
        emergency_key in any_key(),
    ) {
        let e = exec();
        for k in &others {
            e.enqueue(Priority::Normal, Action::Press(*k));
        }
        e.enqueue(Priority::Emergency, Action::Press(emergency_key));

        let clock = FakeClock::new();
        let out = e.tick(&clock);
        prop_assert_eq!(out, vec![Dispatch::Press(emergency_key)]);
    }

    /// P-2: under manual pause, emergency actions still drain in FIFO
    /// order and nothing else does.
    #[test]
    fn p2_emergency_drains_fifo_through_manual_pause(
        emergency_keys in prop::collection::vec(any_key(), 1..6),
        normal_key in any_key(),
    ) {
        let e = exec();
        e.pause_manual();
        for k in &emergency_keys {
            e.enqueue(Priority::Emergency, Action::Press(*k));
        }
        e.enqueue(Priority::Normal, Action::Press(normal_key));

        let clock = FakeClock::new();
        for k in &emergency_keys {
            prop_assert_eq!(e.tick(&clock), vec![Dispatch::Press(*k)]);
        }
        // Queue drained; manual pause still blocks the normal action.
        prop_assert_eq!(e.tick(&clock), Vec::<Dispatch>::new());
    }

    /// P-5: however many times a managed key fires while still active,
    /// exactly the first activation begins a sequence.
    #[test]
    fn p5_managed_dedup_allows_exactly_one_activation(repeats in 1usize..10) {
        let e = exec();
        let source = Key::canonicalize("e").unwrap();
        let target = Key::canonicalize("shift").unwrap();
        let mut began_count = 0;
        for _ in 0..repeats {
            if e.try_begin_managed_sequence(source, target, 10) {
                began_count += 1;
            }
        }
        prop_assert_eq!(began_count, 1);
    }

    /// P-9: a periodic task's consecutive firings are at least `interval`
    /// apart, for any interval and any sequence of `fire_due` polls.
    #[test]
    fn p9_periodic_task_never_fires_early(
        interval_ms in 10u64..500,
        poll_steps in prop::collection::vec(1u64..50, 1..40),
    ) {
        let scheduler = SchedulerCore::new();
        let fire_times = Arc::new(std::sync::Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        let fire_times_cb = Arc::clone(&fire_times);
        let counter_cb = Arc::clone(&counter);

        scheduler.add(
            "t",
            interval_ms,
            Box::new(move || {
                counter_cb.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            true,
            0,
        );

        let mut now = 0u64;
        for step in poll_steps {
            now += step;
            for (_, result) in scheduler.fire_due(now) {
                prop_assert!(result.is_ok());
                fire_times_cb.lock().unwrap().push(now);
            }
        }

        let times = fire_times.lock().unwrap();
        for window in times.windows(2) {
            prop_assert!(window[1] - window[0] >= interval_ms);
        }
    }
}
