//! Pure executor decision core (§4.4). No threads, no OS calls: every
//! tick is a deterministic function of the current state and the clock,
//! kept separate from the threaded wrapper that drives it against a
//! real output device.

use crate::action::{Action, MouseButton, Priority, SequenceStep};
use crate::clock::MonotonicClock;
use crate::config::{StationaryMode, StationaryVariant};
use crate::hotkey::ManagedSequenceSink;
use crate::key::Key;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// What a tick actually wants performed against the OS/bus. Distinct from
/// `Action`: a `Sequence` or `Press` can expand into several of these in
/// one tick, and `Delay`/`Cleanup` never produce one at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Press(Key),
    Hold(Key),
    Release(Key),
    MouseClick(MouseButton),
    Notify(String, String),
}

/// Hook for the bounded, in-sequence synchronous delay (§4.4, §9
/// "Delay-vs-sleep"). Production uses a real sleep; tests inject a no-op
/// so sequence atomicity can be asserted without slowing the suite down
/// or fighting a `FakeClock`.
pub trait Sleeper: Send + Sync {
    fn sleep_ms(&self, ms: u64);
}

pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }
}

pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep_ms(&self, _ms: u64) {}
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ExecutorStatsSnapshot {
    pub enqueued_per_priority: [u64; 4],
    pub processed_total: u64,
    /// §7 error kind 4: an executor action whose OS input call failed.
    /// The action is dropped (not retried) and this counter increments;
    /// `PriorityExecutor` also publishes `core:handler_error` for it.
    pub action_failures: u64,
}

struct Inner {
    queues: [VecDeque<Action>; 4],
    manual_paused: bool,
    special_paused: bool,
    delay_until: Option<u64>,
    active_sequences: HashSet<String>,
    force_move_active: bool,
    force_move_key: Option<Key>,
    force_move_replacement: Option<Key>,
    stationary: StationaryMode,
    emergency_keys: HashSet<Key>,
    stats: ExecutorStatsSnapshot,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            queues: [
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
            ],
            manual_paused: false,
            special_paused: false,
            delay_until: None,
            active_sequences: HashSet::new(),
            force_move_active: false,
            force_move_key: None,
            force_move_replacement: None,
            stationary: StationaryMode::default(),
            emergency_keys: HashSet::new(),
            stats: ExecutorStatsSnapshot::default(),
        }
    }
}

pub struct ExecutorCore {
    inner: Mutex<Inner>,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for ExecutorCore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorCore {
    pub fn new() -> Self {
        Self::with_sleeper(Arc::new(RealSleeper))
    }

    pub fn with_sleeper(sleeper: Arc<dyn Sleeper>) -> Self {
        ExecutorCore {
            inner: Mutex::new(Inner::default()),
            sleeper,
        }
    }

    pub fn enqueue(&self, priority: Priority, action: Action) {
        let mut inner = self.inner.lock().unwrap();
        inner.queues[priority as usize].push_back(action);
        inner.stats.enqueued_per_priority[priority as usize] += 1;
    }

    pub fn clear(&self, priority: Priority) {
        self.inner.lock().unwrap().queues[priority as usize].clear();
    }

    pub fn clear_non_emergency(&self) {
        let mut inner = self.inner.lock().unwrap();
        for p in [Priority::High, Priority::Normal, Priority::Low] {
            inner.queues[p as usize].clear();
        }
    }

    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        for q in inner.queues.iter_mut() {
            q.clear();
        }
    }

    pub fn pause_manual(&self) {
        self.inner.lock().unwrap().manual_paused = true;
    }

    pub fn resume_manual(&self) {
        self.inner.lock().unwrap().manual_paused = false;
    }

    pub fn is_manual_paused(&self) -> bool {
        self.inner.lock().unwrap().manual_paused
    }

    pub fn set_special_paused(&self, paused: bool) {
        self.inner.lock().unwrap().special_paused = paused;
    }

    pub fn is_special_paused(&self) -> bool {
        self.inner.lock().unwrap().special_paused
    }

    pub fn set_force_move(&self, active: bool) {
        self.inner.lock().unwrap().force_move_active = active;
    }

    pub fn set_force_move_key(&self, key: Key) {
        self.inner.lock().unwrap().force_move_key = Some(key);
    }

    pub fn set_force_move_replacement(&self, key: Key) {
        self.inner.lock().unwrap().force_move_replacement = Some(key);
    }

    pub fn set_stationary(&self, active: bool, variant: StationaryVariant) {
        self.inner.lock().unwrap().stationary = StationaryMode { active, variant };
    }

    pub fn cache_emergency_keys(&self, hp: Option<Key>, mp: Option<Key>) {
        let mut inner = self.inner.lock().unwrap();
        inner.emergency_keys.clear();
        if let Some(k) = hp {
            inner.emergency_keys.insert(k);
        }
        if let Some(k) = mp {
            inner.emergency_keys.insert(k);
        }
    }

    pub fn is_active_sequence(&self, id: &str) -> bool {
        self.inner.lock().unwrap().active_sequences.contains(id)
    }

    /// Generic dedup-and-register primitive used by skill callbacks (S5)
    /// as well as by [`ManagedSequenceSink::try_begin_managed_sequence`].
    pub fn begin_sequence(&self, id: impl Into<String>) -> bool {
        self.inner.lock().unwrap().active_sequences.insert(id.into())
    }

    pub fn stats(&self) -> ExecutorStatsSnapshot {
        self.inner.lock().unwrap().stats.clone()
    }

    /// Records an OS input call failure (§7 error kind 4). The action is
    /// already dropped by the caller; this only updates the counter the
    /// thread wrapper's bus publish is derived from.
    pub fn record_action_failure(&self) {
        self.inner.lock().unwrap().stats.action_failures += 1;
    }

    fn is_emergency(action: &Action, emergency_keys: &HashSet<Key>) -> bool {
        matches!(action, Action::Press(k) if emergency_keys.contains(k))
    }

    fn dispatch_press(k: Key, inner: &Inner, out: &mut Vec<Dispatch>) {
        if inner.force_move_active {
            let replacement = inner.force_move_replacement.unwrap_or(k);
            out.push(Dispatch::Press(replacement));
            return;
        }
        if inner.stationary.active && inner.stationary.variant == StationaryVariant::ShiftModifier
        {
            let shift = Key::canonicalize("shift").expect("shift is always canonicalizable");
            out.push(Dispatch::Hold(shift));
            out.push(Dispatch::Press(k));
            out.push(Dispatch::Release(shift));
            return;
        }
        out.push(Dispatch::Press(k));
    }

    fn execute(
        &self,
        action: Action,
        inner: &mut Inner,
        out: &mut Vec<Dispatch>,
        clock: &dyn MonotonicClock,
    ) {
        match action {
            Action::Press(k) => Self::dispatch_press(k, inner, out),
            Action::Hold(k) => out.push(Dispatch::Hold(k)),
            Action::Release(k) => out.push(Dispatch::Release(k)),
            Action::Sequence(steps) => {
                for step in steps {
                    match step {
                        SequenceStep::Press(k) => Self::dispatch_press(k, inner, out),
                        SequenceStep::Delay(ms) => self.sleeper.sleep_ms(ms),
                    }
                }
            }
            Action::MouseClick(b) => out.push(Dispatch::MouseClick(b)),
            Action::Delay(ms) => {
                inner.delay_until = Some(clock.now_ms() + ms);
            }
            Action::Notify(event) => {
                let (topic, payload) = event.split_once(':').unwrap_or((event.as_str(), ""));
                out.push(Dispatch::Notify(topic.to_string(), payload.to_string()));
            }
            Action::Cleanup(seq_id) => {
                inner.active_sequences.remove(&seq_id);
            }
        }
    }

    /// Performs exactly one action selection, per the decision tree in
    /// §4.4. Returns whatever the selected action (or sequence) produced.
    pub fn tick(&self, clock: &dyn MonotonicClock) -> Vec<Dispatch> {
        let mut inner = self.inner.lock().unwrap();
        let mut out = Vec::new();

        let total: usize = inner.queues.iter().map(|q| q.len()).sum();
        if total == 0 && inner.delay_until.is_none() {
            return out;
        }

        if let Some(deadline) = inner.delay_until {
            if clock.now_ms() < deadline {
                inner.queues[Priority::High as usize].clear();
                inner.queues[Priority::Normal as usize].clear();
                inner.queues[Priority::Low as usize].clear();
                return out;
            }
            inner.delay_until = None;
        }

        if let Some(action) = inner.queues[Priority::Emergency as usize].pop_front() {
            self.execute(action, &mut inner, &mut out, clock);
            inner.stats.processed_total += 1;
            return out;
        }

        if inner.manual_paused {
            return out;
        }

        if inner.special_paused {
            for p in [Priority::High, Priority::Normal, Priority::Low] {
                let idx = inner.queues[p as usize]
                    .iter()
                    .position(|a| Self::is_emergency(a, &inner.emergency_keys));
                if let Some(idx) = idx {
                    let action = inner.queues[p as usize].remove(idx).unwrap();
                    self.execute(action, &mut inner, &mut out, clock);
                    inner.stats.processed_total += 1;
                    return out;
                }
            }
            return out;
        }

        for p in [Priority::High, Priority::Normal, Priority::Low] {
            if let Some(action) = inner.queues[p as usize].pop_front() {
                self.execute(action, &mut inner, &mut out, clock);
                inner.stats.processed_total += 1;
                return out;
            }
        }
        out
    }
}

impl ManagedSequenceSink for ExecutorCore {
    fn try_begin_managed_sequence(&self, source: Key, target: Key, delay_ms: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.active_sequences.insert(source.name().to_string()) {
            return false;
        }
        // Clear-then-enqueue, atomic under this single lock (DESIGN.md #2).
        for p in [Priority::High, Priority::Normal, Priority::Low] {
            inner.queues[p as usize].clear();
        }
        let sequence = Action::managed_sequence(source, target, delay_ms);
        inner.stats.enqueued_per_priority[Priority::Emergency as usize] += sequence.len() as u64;
        for action in sequence {
            inner.queues[Priority::Emergency as usize].push_back(action);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn key(name: &str) -> Key {
        Key::canonicalize(name).unwrap()
    }

    fn core() -> ExecutorCore {
        ExecutorCore::with_sleeper(Arc::new(NoopSleeper))
    }

    /// P-1: E always wins the tick it's non-empty in.
    #[test]
    fn strict_priority_emergency_first() {
        let exec = core();
        exec.enqueue(Priority::Normal, Action::Press(key("q")));
        exec.enqueue(Priority::Emergency, Action::Press(key("1")));
        let clock = FakeClock::new();
        let out = exec.tick(&clock);
        assert_eq!(out, vec![Dispatch::Press(key("1"))]);
    }

    /// S1: emergency survives manual pause; non-emergency actions do not
    /// drain until resume.
    #[test]
    fn emergency_drains_through_manual_pause() {
        let exec = core();
        exec.pause_manual();
        exec.enqueue(Priority::Emergency, Action::Press(key("1")));
        exec.enqueue(Priority::Normal, Action::Press(key("q")));
        let clock = FakeClock::new();

        assert_eq!(exec.tick(&clock), vec![Dispatch::Press(key("1"))]);
        assert_eq!(exec.tick(&clock), Vec::<Dispatch>::new());

        exec.resume_manual();
        assert_eq!(exec.tick(&clock), vec![Dispatch::Press(key("q"))]);
    }

    /// S2: managed-key activation clears H/N/L and emits the delayed
    /// press sandwiched between two async delays, with no non-emergency
    /// draining while `delay_until` is live.
    #[test]
    fn managed_activation_clears_queues_and_delays_around_press() {
        let exec = core();
        exec.enqueue(Priority::High, Action::Press(key("q")));
        exec.enqueue(Priority::Normal, Action::Press(key("2")));

        let began =
            exec.try_begin_managed_sequence(key("e"), key("shift"), 50);
        assert!(began);

        let clock = FakeClock::new();
        // First Delay(50) executes, installing delay_until = 50.
        assert_eq!(exec.tick(&clock), Vec::<Dispatch>::new());
        // Still within the delay window: H/N/L already empty, E untouched.
        clock.set(10);
        assert_eq!(exec.tick(&clock), Vec::<Dispatch>::new());

        clock.set(50);
        assert_eq!(exec.tick(&clock), vec![Dispatch::Press(key("shift"))]);

        // Second Delay(50) executes, installing delay_until = 100.
        assert_eq!(exec.tick(&clock), Vec::<Dispatch>::new());

        clock.set(100);
        let notify = exec.tick(&clock);
        assert_eq!(notify.len(), 1);
        assert!(matches!(&notify[0], Dispatch::Notify(t, p) if t == "managed_key_complete" && p == "e"));

        assert!(exec.is_active_sequence("e"));
        exec.tick(&clock); // Cleanup
        assert!(!exec.is_active_sequence("e"));
    }

    /// P-5: a burst of presses while the key is already active enqueues
    /// nothing further.
    #[test]
    fn managed_dedup_drops_repeat_activation() {
        let exec = core();
        assert!(exec.try_begin_managed_sequence(key("e"), key("shift"), 50));
        assert!(!exec.try_begin_managed_sequence(key("e"), key("shift"), 50));
    }

    /// S3 / I-3: while special_paused, only emergency-qualifying presses
    /// drain; everything else stays queued.
    #[test]
    fn special_paused_filters_to_emergency_qualifying_actions_only() {
        let exec = core();
        exec.cache_emergency_keys(Some(key("1")), None);
        exec.enqueue(Priority::High, Action::Press(key("q")));
        exec.enqueue(Priority::Emergency, Action::Press(key("1")));
        exec.set_special_paused(true);

        let clock = FakeClock::new();
        assert_eq!(exec.tick(&clock), vec![Dispatch::Press(key("1"))]);
        assert_eq!(exec.tick(&clock), Vec::<Dispatch>::new());

        exec.set_special_paused(false);
        assert_eq!(exec.tick(&clock), vec![Dispatch::Press(key("q"))]);
    }

    /// S5: a sequence's synchronous delay is atomic within one tick, and
    /// de-dup is released exactly once the matching Cleanup executes.
    #[test]
    fn sequence_is_atomic_and_respects_dedup() {
        let exec = core();
        assert!(exec.begin_sequence("q_seq"));
        exec.enqueue(
            Priority::Normal,
            Action::Sequence(vec![
                SequenceStep::Delay(50),
                SequenceStep::Press(key("q")),
            ]),
        );
        exec.enqueue(Priority::Normal, Action::Cleanup("q_seq".to_string()));

        // Second firing while still in-flight is dropped by the caller
        // (scheduler-side), modeled here as a direct dedup check.
        assert!(!exec.begin_sequence("q_seq"));

        let clock = FakeClock::new();
        assert_eq!(exec.tick(&clock), vec![Dispatch::Press(key("q"))]);
        assert!(exec.is_active_sequence("q_seq"));
        exec.tick(&clock);
        assert!(!exec.is_active_sequence("q_seq"));
    }

    /// I-5: force-move substitutes every Press regardless of the queued
    /// key, without mutating the action still sitting in the queue.
    #[test]
    fn force_move_substitutes_every_press() {
        let exec = core();
        exec.set_force_move_replacement(key("w"));
        exec.set_force_move(true);
        exec.enqueue(Priority::Normal, Action::Press(key("q")));
        let clock = FakeClock::new();
        assert_eq!(exec.tick(&clock), vec![Dispatch::Press(key("w"))]);
    }
}
