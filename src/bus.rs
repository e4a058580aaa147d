//! Topic-based pub/sub event bus (C2).
//!
//! Delivery is synchronous on the publisher's thread, except for a small
//! set of *bridged* topics that are marshaled onto a single coordinator
//! thread via a bounded `crossbeam-channel` handoff. Bridging exists so
//! the handful of topics that mutate executor/scheduler flags are always
//! observed from exactly one thread (§5's shared-resource policy).

use crate::error::CoreError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::error;

use crate::controller::MacroState;
use crate::key::Key;

pub const TOPIC_HANDLER_ERROR: &str = "core:handler_error";

/// Topics whose delivery is marshaled onto the bus's coordinator thread
/// because their subscribers mutate shared executor/scheduler state.
const BRIDGED_TOPICS: &[&str] = &[
    "scheduler:pause_requested",
    "scheduler:resume_requested",
    "special_key_pause",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PausePhase {
    Start,
    End,
}

/// Closed payload catalog, mirroring the fixed topic table of §4.2.
#[derive(Debug, Clone)]
pub enum Event {
    Empty,
    StateChanged { old: MacroState, new: MacroState },
    ConfigApplied,
    Key(Key),
    SpecialPause(PausePhase),
    /// Free-form payload for `Notify`-originated topics (e.g.
    /// `managed_key_complete:e`) and `hotkey:<name>` publishes.
    Text(String),
    HandlerError { topic: String, cause: String },
}

pub type SubscriptionId = u64;
pub type Handler = Box<dyn Fn(&Event) -> Result<(), CoreError> + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
struct PublishState {
    active: HashSet<String>,
    deferred: VecDeque<(String, Event)>,
}

thread_local! {
    static PUBLISH_STATE: RefCell<PublishState> = RefCell::new(PublishState::default());
}

/// The pure dispatch core: subscriber table, reentrancy guard, handler
/// isolation. Contains no threads of its own.
pub struct BusCore {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl Default for BusCore {
    fn default() -> Self {
        Self::new()
    }
}

impl BusCore {
    pub fn new() -> Self {
        BusCore {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, topic: impl Into<String>, handler: Handler) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap()
            .entry(topic.into())
            .or_default()
            .push(Subscriber { id, handler });
        id
    }

    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        if let Some(list) = self.subscribers.lock().unwrap().get_mut(topic) {
            list.retain(|s| s.id != id);
        }
    }

    /// Delivers synchronously on the calling thread, honoring the
    /// same-topic reentrancy guard.
    pub fn publish(&self, topic: impl Into<String>, payload: Event) {
        let topic = topic.into();
        let already_active = PUBLISH_STATE.with(|s| s.borrow().active.contains(&topic));
        if already_active {
            PUBLISH_STATE.with(|s| s.borrow_mut().deferred.push_back((topic, payload)));
            return;
        }

        let is_outermost = PUBLISH_STATE.with(|s| s.borrow().active.is_empty());
        PUBLISH_STATE.with(|s| s.borrow_mut().active.insert(topic.clone()));
        self.dispatch_one(&topic, &payload);
        PUBLISH_STATE.with(|s| s.borrow_mut().active.remove(&topic));

        if is_outermost {
            loop {
                let next = PUBLISH_STATE.with(|s| s.borrow_mut().deferred.pop_front());
                match next {
                    Some((t, p)) => self.publish(t, p),
                    None => break,
                }
            }
        }
    }

    fn dispatch_one(&self, topic: &str, payload: &Event) {
        let mut failures = Vec::new();
        {
            let subs = self.subscribers.lock().unwrap();
            if let Some(list) = subs.get(topic) {
                for sub in list {
                    if let Err(e) = (sub.handler)(payload) {
                        failures.push(e.to_string());
                    }
                }
            }
        }
        if failures.is_empty() {
            return;
        }
        if topic == TOPIC_HANDLER_ERROR {
            for cause in failures {
                error!(cause, "subscriber to core:handler_error itself failed");
            }
            return;
        }
        for cause in failures {
            self.publish(
                TOPIC_HANDLER_ERROR,
                Event::HandlerError {
                    topic: topic.to_string(),
                    cause,
                },
            );
        }
    }
}

/// Thread-owning wrapper around [`BusCore`]. Bridged topics are pushed to
/// a bounded channel and delivered by a dedicated coordinator thread;
/// everything else publishes synchronously on the caller's thread.
pub struct Bus {
    core: Arc<BusCore>,
    bridge_tx: Sender<(String, Event)>,
    running: Arc<AtomicBool>,
    coordinator: Option<JoinHandle<()>>,
}

impl Bus {
    pub fn new() -> Self {
        let core = Arc::new(BusCore::new());
        let (tx, rx): (Sender<(String, Event)>, Receiver<(String, Event)>) = bounded(1024);
        let running = Arc::new(AtomicBool::new(true));

        let coordinator = {
            let core = Arc::clone(&core);
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                while running.load(Ordering::Acquire) {
                    match rx.recv_timeout(std::time::Duration::from_millis(50)) {
                        Ok((topic, payload)) => core.publish(topic, payload),
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
                // Drain whatever was queued before shutdown.
                while let Ok((topic, payload)) = rx.try_recv() {
                    core.publish(topic, payload);
                }
            })
        };

        Bus {
            core,
            bridge_tx: tx,
            running,
            coordinator: Some(coordinator),
        }
    }

    pub fn subscribe(&self, topic: impl Into<String>, handler: Handler) -> SubscriptionId {
        self.core.subscribe(topic, handler)
    }

    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        self.core.unsubscribe(topic, id);
    }

    pub fn publish(&self, topic: impl Into<String>, payload: Event) {
        let topic = topic.into();
        if BRIDGED_TOPICS.contains(&topic.as_str()) {
            if self.bridge_tx.send((topic, payload)).is_err() {
                error!("bus coordinator channel closed; dropping bridged publish");
            }
        } else {
            self.core.publish(topic, payload);
        }
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.coordinator.take() {
            let _ = handle.join();
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.shutdown();
    }
}
