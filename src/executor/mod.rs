//! Priority Input Executor (C4): owns the tick thread driving
//! [`core::ExecutorCore`] against a real clock and forwards its dispatches
//! to an output sink and the event bus. A pure accumulator driven by a
//! dedicated thread reading a channel on a fixed cadence, same split as
//! the other component threads.

pub mod core;

pub use core::{
    Dispatch, ExecutorCore, ExecutorStatsSnapshot, NoopSleeper, RealSleeper, Sleeper,
};

use crate::bus::Bus;
use crate::clock::{MonotonicClock, SystemClock};
use crate::hotkey::backend::OutputSink;
use crate::hotkey::SyntheticGuard;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Tick cadence for the executor thread. §4.4 leaves this to the
/// implementer within `[10ms, 20ms]`; the reference uses 20ms.
const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Thread wrapper around [`ExecutorCore`]. Reads dispatches off the tick
/// loop and fans them out to the output sink (wrapped in a
/// [`SyntheticGuard`] token so the hotkey reader can recognize and ignore
/// our own synthesized edges) and to the bus for `Notify` dispatches.
pub struct PriorityExecutor {
    pub core: Arc<ExecutorCore>,
    running: Arc<AtomicBool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PriorityExecutor {
    pub fn new() -> Self {
        PriorityExecutor {
            core: Arc::new(ExecutorCore::with_sleeper(Arc::new(RealSleeper))),
            running: Arc::new(AtomicBool::new(false)),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawns T-Executor. `&self`, not `&mut self`: the join handle lives
    /// behind a single-writer `Mutex` so the enclosing `MacroController`
    /// can be shared via `Arc` before any thread starts.
    pub fn spawn(&self, sink: Arc<dyn OutputSink>, bus: Arc<Bus>, guard: SyntheticGuard) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        let ticker = crossbeam_channel::tick(TICK_INTERVAL);
        let clock = SystemClock::new();

        *handle = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => {
                        for dispatch in core.tick(&clock) {
                            apply_dispatch(dispatch, &sink, &bus, &core, &guard);
                        }
                    }
                }
            }
        }));
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Default for PriorityExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PriorityExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply_dispatch(
    dispatch: Dispatch,
    sink: &Arc<dyn OutputSink>,
    bus: &Arc<Bus>,
    core: &Arc<ExecutorCore>,
    guard: &SyntheticGuard,
) {
    let _token = guard.enter();
    let report = |key: crate::key::Key, verb: &str, e: std::io::Error| {
        tracing::warn!(?key, error = %e, "executor: {verb} write failed");
        core.record_action_failure();
        bus.publish(
            "core:handler_error",
            crate::bus::Event::HandlerError {
                topic: "executor:action".to_string(),
                cause: format!("{verb} {key} failed: {e}"),
            },
        );
    };
    match dispatch {
        Dispatch::Press(key) => {
            if let Err(e) = sink.send(key, true) {
                report(key, "press", e);
            }
            if let Err(e) = sink.send(key, false) {
                report(key, "release", e);
            }
        }
        Dispatch::Hold(key) => {
            if let Err(e) = sink.send(key, true) {
                report(key, "hold", e);
            }
        }
        Dispatch::Release(key) => {
            if let Err(e) = sink.send(key, false) {
                report(key, "release", e);
            }
        }
        Dispatch::MouseClick(button) => {
            let key = button.as_key();
            if let Err(e) = sink.send(key, true) {
                report(key, "mouse down", e);
            }
            if let Err(e) = sink.send(key, false) {
                report(key, "mouse up", e);
            }
        }
        Dispatch::Notify(topic, payload) => {
            bus.publish(topic, crate::bus::Event::Text(payload));
        }
    }
}
