//! Periodic Scheduler (C5): owns the deadline-wait driver thread for
//! [`core::SchedulerCore`] and wires its soft pause/resume to the bus,
//! driven by the same channel-based wake pattern as the other
//! component threads (here the "messages" are wake notifications
//! rather than log events).

pub mod core;

pub use core::{Callback, SchedulerCore, TaskId, TaskStatus};

use crate::bus::{Bus, Event};
use crate::clock::{MonotonicClock, SystemClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound on how long the driver sleeps with nothing scheduled, so
/// it still notices `stop()` promptly.
const MAX_IDLE: Duration = Duration::from_millis(250);

/// Thread-owning wrapper around [`SchedulerCore`]. Subscribes itself to
/// `scheduler:pause_requested`/`scheduler:resume_requested` (§4.5: "the
/// scheduler subscribes to these topics itself") and routes failing
/// callbacks to `core:handler_error` via the same failure-isolation path
/// the bus uses for subscriber errors.
pub struct PeriodicScheduler {
    pub core: Arc<SchedulerCore>,
    clock: Arc<SystemClock>,
    wake_tx: crossbeam_channel::Sender<()>,
    wake_rx: crossbeam_channel::Receiver<()>,
    running: Arc<AtomicBool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicScheduler {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(16);
        PeriodicScheduler {
            core: Arc::new(SchedulerCore::new()),
            clock: Arc::new(SystemClock::new()),
            wake_tx,
            wake_rx,
            running: Arc::new(AtomicBool::new(false)),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Registers a periodic task and wakes the driver so a
    /// `start_immediately` task or a shorter-than-current-wait deadline
    /// is not left waiting out the old sleep.
    pub fn add(
        &self,
        task_id: impl Into<TaskId>,
        interval_ms: u64,
        callback: Callback,
        start_immediately: bool,
    ) -> bool {
        let ok = self.core.add(
            task_id,
            interval_ms,
            callback,
            start_immediately,
            self.clock.now_ms(),
        );
        self.notify_wake();
        ok
    }

    pub fn add_one_shot(&self, task_id: impl Into<TaskId>, delay_ms: u64, callback: Callback) -> bool {
        let ok = self
            .core
            .add_one_shot(task_id, delay_ms, callback, self.clock.now_ms());
        self.notify_wake();
        ok
    }

    pub fn remove(&self, task_id: &str) -> bool {
        let ok = self.core.remove(task_id);
        self.notify_wake();
        ok
    }

    pub fn update_interval(&self, task_id: &str, new_ms: u64) -> bool {
        let ok = self
            .core
            .update_interval(task_id, new_ms, self.clock.now_ms());
        self.notify_wake();
        ok
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.core.status(task_id, self.clock.now_ms())
    }

    /// Exposes the wrapper's single shared clock so callers that need to
    /// call into `core` directly (the controller's `pause`/`resume` on
    /// lifecycle transitions) stay on the same epoch as the driver
    /// thread's own timestamps.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn notify_wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Starts the driver thread and subscribes to the pause/resume bus
    /// topics. `clock_start` anchors a fresh [`SystemClock`] so deadlines
    /// set before `spawn` (via `add`) remain valid against the thread's
    /// own clock instance.
    pub fn spawn(&self, bus: Arc<Bus>) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        let wake_rx = self.wake_rx.clone();
        let clock = Arc::clone(&self.clock);

        {
            let core = Arc::clone(&core);
            let clock = Arc::clone(&self.clock);
            let wake_tx = self.wake_tx.clone();
            bus.subscribe(
                "scheduler:pause_requested",
                Box::new(move |_| {
                    core.pause(clock.now_ms());
                    let _ = wake_tx.try_send(());
                    Ok(())
                }),
            );
        }
        {
            let core = Arc::clone(&core);
            let clock = Arc::clone(&self.clock);
            let wake_tx = self.wake_tx.clone();
            bus.subscribe(
                "scheduler:resume_requested",
                Box::new(move |_| {
                    core.resume(clock.now_ms());
                    let _ = wake_tx.try_send(());
                    Ok(())
                }),
            );
        }

        let join = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let now = clock.now_ms();
                let wait = core
                    .next_wake_delay_ms(now)
                    .map(Duration::from_millis)
                    .unwrap_or(MAX_IDLE)
                    .min(MAX_IDLE);

                match wake_rx.recv_timeout(wait) {
                    Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }

                let now = clock.now_ms();
                for (task_id, result) in core.fire_due(now) {
                    if let Err(e) = result {
                        bus.publish(
                            "core:handler_error",
                            Event::HandlerError {
                                topic: format!("scheduler:{task_id}"),
                                cause: e.to_string(),
                            },
                        );
                    }
                }
            }
        });
        *handle = Some(join);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify_wake();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Default for PeriodicScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
