//! Pure scheduler decision core (§4.5). A min-heap of tasks keyed by
//! `next_fire_ms`, mirroring the executor core's pure/thread-wrapper split:
//! no threads, no sleeping, every operation is a deterministic function of
//! the current state and the clock it is handed.

use crate::error::CoreError;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;

pub type TaskId = String;
pub type Callback = Box<dyn Fn() -> Result<(), CoreError> + Send + Sync>;

/// `None` marks a one-shot task: it fires once and is discarded rather
/// than re-inserted.
struct Task {
    interval_ms: Option<u64>,
    next_fire_ms: u64,
    callback: Callback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeapEntry {
    next_fire_ms: u64,
    task_id: TaskId,
}

// Min-heap ordering: `BinaryHeap` is a max-heap, so entries compare in
// reverse of their natural fire order (earliest deadline first).
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .next_fire_ms
            .cmp(&self.next_fire_ms)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStatus {
    pub interval_ms: Option<u64>,
    pub next_fire_delta_ms: u64,
    pub enabled: bool,
}

struct Inner {
    tasks: HashMap<TaskId, Task>,
    heap: BinaryHeap<HeapEntry>,
    paused: bool,
    paused_at_ms: Option<u64>,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            tasks: HashMap::new(),
            heap: BinaryHeap::new(),
            paused: false,
            paused_at_ms: None,
        }
    }
}

pub struct SchedulerCore {
    inner: Mutex<Inner>,
}

impl Default for SchedulerCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerCore {
    pub fn new() -> Self {
        SchedulerCore {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Registers a periodic task. Returns `false` (no-op) if `task_id` is
    /// already present.
    pub fn add(
        &self,
        task_id: impl Into<TaskId>,
        interval_ms: u64,
        callback: Callback,
        start_immediately: bool,
        now_ms: u64,
    ) -> bool {
        let task_id = task_id.into();
        let mut inner = self.inner.lock().unwrap();
        if inner.tasks.contains_key(&task_id) {
            return false;
        }
        let next_fire_ms = if start_immediately {
            now_ms
        } else {
            now_ms + interval_ms
        };
        inner.heap.push(HeapEntry {
            next_fire_ms,
            task_id: task_id.clone(),
        });
        inner.tasks.insert(
            task_id,
            Task {
                interval_ms: Some(interval_ms),
                next_fire_ms,
                callback,
            },
        );
        true
    }

    /// Registers a single-fire task discarded after it runs once.
    pub fn add_one_shot(
        &self,
        task_id: impl Into<TaskId>,
        delay_ms: u64,
        callback: Callback,
        now_ms: u64,
    ) -> bool {
        let task_id = task_id.into();
        let mut inner = self.inner.lock().unwrap();
        if inner.tasks.contains_key(&task_id) {
            return false;
        }
        let next_fire_ms = now_ms + delay_ms;
        inner.heap.push(HeapEntry {
            next_fire_ms,
            task_id: task_id.clone(),
        });
        inner.tasks.insert(
            task_id,
            Task {
                interval_ms: None,
                next_fire_ms,
                callback,
            },
        );
        true
    }

    pub fn remove(&self, task_id: &str) -> bool {
        self.inner.lock().unwrap().tasks.remove(task_id).is_some()
    }

    /// Adjusts both the stored interval and the next fire time so the new
    /// interval takes effect starting now. Stale heap entries from before
    /// the update are filtered lazily by `fire_due`.
    pub fn update_interval(&self, task_id: &str, new_ms: u64, now_ms: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.tasks.get_mut(task_id) else {
            return false;
        };
        task.interval_ms = Some(new_ms);
        task.next_fire_ms = now_ms + new_ms;
        inner.heap.push(HeapEntry {
            next_fire_ms: task.next_fire_ms,
            task_id: task_id.to_string(),
        });
        true
    }

    /// Freezes firing. Idempotent: calling while already paused keeps the
    /// original `paused_at_ms`.
    pub fn pause(&self, now_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused {
            return;
        }
        inner.paused = true;
        inner.paused_at_ms = Some(now_ms);
    }

    /// Unfreezes firing, translating every task's deadline forward by the
    /// paused duration so resuming never produces a catch-up burst (S6).
    pub fn resume(&self, now_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        let Some(paused_at) = inner.paused_at_ms.take() else {
            return;
        };
        inner.paused = false;
        let elapsed = now_ms.saturating_sub(paused_at);
        if elapsed == 0 {
            return;
        }
        for task in inner.tasks.values_mut() {
            task.next_fire_ms += elapsed;
        }
        // Rebuild the heap from the adjusted tasks rather than pushing one
        // stale + one fresh entry per task.
        inner.heap = inner
            .tasks
            .iter()
            .map(|(id, t)| HeapEntry {
                next_fire_ms: t.next_fire_ms,
                task_id: id.clone(),
            })
            .collect();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused
    }

    pub fn status(&self, task_id: &str, now_ms: u64) -> Option<TaskStatus> {
        let inner = self.inner.lock().unwrap();
        let task = inner.tasks.get(task_id)?;
        Some(TaskStatus {
            interval_ms: task.interval_ms,
            next_fire_delta_ms: task.next_fire_ms.saturating_sub(now_ms),
            enabled: !inner.paused,
        })
    }

    /// The duration the driver thread should sleep before checking again:
    /// the earliest due deadline, or `None` if there is nothing to wait
    /// for (no tasks, or frozen).
    pub fn next_wake_delay_ms(&self, now_ms: u64) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        if inner.paused {
            return None;
        }
        inner
            .heap
            .peek()
            .map(|entry| entry.next_fire_ms.saturating_sub(now_ms))
    }

    /// Pops and invokes every task due at or before `now_ms`, re-inserting
    /// periodic tasks at `now_ms + interval` and discarding one-shots.
    /// Stale heap entries (superseded by `update_interval`/`resume`, or
    /// left behind by `remove`) are silently skipped. Failing callbacks
    /// are isolated: the task stays scheduled and its error is returned
    /// alongside its id for the caller to route to the bus.
    pub fn fire_due(&self, now_ms: u64) -> Vec<(TaskId, Result<(), CoreError>)> {
        let mut fired = Vec::new();
        let mut inner = self.inner.lock().unwrap();
        if inner.paused {
            return fired;
        }

        loop {
            let Some(entry) = inner.heap.peek() else {
                break;
            };
            if entry.next_fire_ms > now_ms {
                break;
            }
            let entry = inner.heap.pop().unwrap();

            let Some(task) = inner.tasks.get(&entry.task_id) else {
                continue; // removed since this entry was pushed
            };
            if task.next_fire_ms != entry.next_fire_ms {
                continue; // superseded by update_interval/resume
            }

            let result = (task.callback)();
            fired.push((entry.task_id.clone(), result));

            match task.interval_ms {
                Some(interval) => {
                    let next_fire_ms = now_ms + interval;
                    inner.tasks.get_mut(&entry.task_id).unwrap().next_fire_ms = next_fire_ms;
                    inner.heap.push(HeapEntry {
                        next_fire_ms,
                        task_id: entry.task_id,
                    });
                }
                None => {
                    inner.tasks.remove(&entry.task_id);
                }
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callback() -> (Callback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let cb: Callback = Box::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (cb, count)
    }

    #[test]
    fn periodic_task_refires_at_interval() {
        let sched = SchedulerCore::new();
        let (cb, count) = counting_callback();
        assert!(sched.add("hp_potion", 100, cb, false, 0));

        assert_eq!(sched.fire_due(50).len(), 0);
        assert_eq!(sched.fire_due(100).len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(sched.fire_due(150).len(), 0);
        assert_eq!(sched.fire_due(200).len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn start_immediately_fires_on_first_due_check() {
        let sched = SchedulerCore::new();
        let (cb, count) = counting_callback();
        sched.add("buff", 1000, cb, true, 500);
        assert_eq!(sched.fire_due(500).len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn add_rejects_duplicate_task_id() {
        let sched = SchedulerCore::new();
        let (cb1, _) = counting_callback();
        let (cb2, _) = counting_callback();
        assert!(sched.add("t", 100, cb1, false, 0));
        assert!(!sched.add("t", 100, cb2, false, 0));
    }

    #[test]
    fn one_shot_fires_once_and_is_discarded() {
        let sched = SchedulerCore::new();
        let (cb, count) = counting_callback();
        sched.add_one_shot("burst", 20, cb, 0);
        assert_eq!(sched.fire_due(20).len(), 1);
        assert_eq!(sched.fire_due(1000).len(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(sched.status("burst", 0).is_none());
    }

    #[test]
    fn remove_drops_the_task_before_it_fires() {
        let sched = SchedulerCore::new();
        let (cb, count) = counting_callback();
        sched.add("t", 100, cb, false, 0);
        assert!(sched.remove("t"));
        assert_eq!(sched.fire_due(1000).len(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    /// S6: pausing and resuming must not produce a catch-up burst; the
    /// next fire lands `interval` after the resume point, not at the
    /// original (now past) deadline.
    #[test]
    fn pause_resume_preserves_phase_without_burst() {
        let sched = SchedulerCore::new();
        let (cb, count) = counting_callback();
        sched.add("t", 100, cb, false, 0); // next_fire_ms = 100

        sched.pause(30); // paused 70ms before the original deadline
        assert_eq!(sched.fire_due(100).len(), 0); // frozen: no fire despite due
        assert_eq!(sched.fire_due(500).len(), 0);

        sched.resume(130); // paused for 100ms; deadline shifts to 200
        assert_eq!(sched.fire_due(199).len(), 0);
        assert_eq!(sched.fire_due(200).len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_interval_reschedules_from_now() {
        let sched = SchedulerCore::new();
        let (cb, count) = counting_callback();
        sched.add("t", 1000, cb, false, 0); // next_fire_ms = 1000

        assert!(sched.update_interval("t", 50, 10)); // next_fire_ms = 60
        assert_eq!(sched.fire_due(59).len(), 0);
        assert_eq!(sched.fire_due(60).len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let status = sched.status("t", 60).unwrap();
        assert_eq!(status.interval_ms, Some(50));
    }

    #[test]
    fn failing_callback_is_isolated_and_task_stays_scheduled() {
        let sched = SchedulerCore::new();
        let cb: Callback = Box::new(|| Err(CoreError::SchedulerCallbackFailed {
            task_id: "t".to_string(),
            reason: "boom".to_string(),
        }));
        sched.add("t", 50, cb, false, 0);

        let fired = sched.fire_due(50);
        assert_eq!(fired.len(), 1);
        assert!(fired[0].1.is_err());
        // Still scheduled: fires again next interval.
        assert_eq!(sched.fire_due(100).len(), 1);
    }

    #[test]
    fn next_wake_delay_reflects_earliest_deadline_and_pause_state() {
        let sched = SchedulerCore::new();
        let (cb, _) = counting_callback();
        assert_eq!(sched.next_wake_delay_ms(0), None);
        sched.add("t", 100, cb, false, 0);
        assert_eq!(sched.next_wake_delay_ms(40), Some(60));
        sched.pause(40);
        assert_eq!(sched.next_wake_delay_ms(40), None);
    }
}
