#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use dispatch_core::action::{Action, Priority, SequenceStep};
use dispatch_core::clock::FakeClock;
use dispatch_core::executor::core::{ExecutorCore, NoopSleeper};
use dispatch_core::key::Key;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

const KEY_NAMES: &[&str] = &["1", "2", "q", "w", "e", "shift", "space", "f8"];
const MAX_OPS: usize = 64;

fn pick_key(u: &mut Unstructured) -> Key {
    let idx = u.int_in_range(0..=(KEY_NAMES.len() - 1)).unwrap_or(0);
    Key::canonicalize(KEY_NAMES[idx]).unwrap()
}

fn pick_priority(u: &mut Unstructured) -> Priority {
    match u.int_in_range(0u8..=3).unwrap_or(2) {
        0 => Priority::Emergency,
        1 => Priority::High,
        2 => Priority::Normal,
        _ => Priority::Low,
    }
}

fn pick_action(u: &mut Unstructured) -> Option<Action> {
    let tag = u.int_in_range(0u8..=6).ok()?;
    Some(match tag {
        0 => Action::Press(pick_key(u)),
        1 => Action::Hold(pick_key(u)),
        2 => Action::Release(pick_key(u)),
        3 => {
            let n = u.int_in_range(0u8..=4).unwrap_or(0);
            let mut steps = Vec::with_capacity(n as usize);
            for _ in 0..n {
                if u.arbitrary::<bool>().unwrap_or(false) {
                    steps.push(SequenceStep::Delay(u.int_in_range(0u64..=200).unwrap_or(0)));
                } else {
                    steps.push(SequenceStep::Press(pick_key(u)));
                }
            }
            Action::Sequence(steps)
        }
        4 => Action::Delay(u.int_in_range(0u64..=500).unwrap_or(0)),
        5 => Action::Notify(format!("topic:{}", u.int_in_range(0u8..=9).unwrap_or(0))),
        _ => Action::Cleanup(format!("seq{}", u.int_in_range(0u8..=9).unwrap_or(0))),
    })
}

// Fuzzes `ExecutorCore` with arbitrary interleavings of enqueue, tick, and
// managed-sequence activation. Looking for panics and hangs, not a
// specific dispatch sequence - those invariants are covered in
// tests/property_tests.rs against structured input.
fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let exec = ExecutorCore::with_sleeper(Arc::new(NoopSleeper));
    let clock = FakeClock::new();

    for _ in 0..MAX_OPS {
        if u.is_empty() {
            break;
        }
        match u.int_in_range(0u8..=3).unwrap_or(0) {
            0 => {
                if let Some(action) = pick_action(&mut u) {
                    let priority = pick_priority(&mut u);
                    exec.enqueue(priority, action);
                }
            }
            1 => {
                clock.advance(u.int_in_range(0u64..=50).unwrap_or(1));
            }
            2 => {
                let _ = exec.tick(&clock);
            }
            _ => {
                let source = pick_key(&mut u);
                let target = pick_key(&mut u);
                let _ = exec.try_begin_managed_sequence(source, target, 10);
            }
        }
    }

    for _ in 0..256 {
        if exec.tick(&clock).is_empty() {
            break;
        }
    }
});
