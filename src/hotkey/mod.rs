//! Hotkey Interceptor (C3): per-key hook registration, mode classification,
//! and self-interception avoidance.

mod backend;

pub use backend::{list_input_devices, EventSource, EvdevSink, EvdevSource, KeyEdge, OutputSink};

use crate::bus::{Bus, Event, PausePhase};
use crate::config::ConfigHandle;
use crate::key::Key;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    Intercept,
    Priority,
    Special,
    Monitor,
    Block,
}

#[derive(Debug, Clone, Copy)]
pub struct HookRegistration {
    pub key: Key,
    pub mode: HookMode,
}

/// Seam the hotkey core uses to start a managed-key activation without
/// depending on the executor's concrete type. Implemented by
/// `executor::ExecutorCore`; the dedup check, the H/N/L clear, and the
/// enqueue happen atomically inside a single call (DESIGN.md decision 2).
pub trait ManagedSequenceSink: Send + Sync {
    fn try_begin_managed_sequence(&self, source: Key, target: Key, delay_ms: u64) -> bool;
}

/// Shared depth counter letting a same-process loopback harness tell
/// synthesized writes apart from real user input (§4.3 "self-interception
/// avoidance"). In the real split-fd deployment this is structurally
/// unnecessary (executor writes go straight to the uinput fd and never
/// reach T-Hook's read loop), but it's cheap insurance for an in-process
/// test harness and is checked explicitly by the self-interception tests.
#[derive(Clone, Default)]
pub struct SyntheticGuard(Arc<AtomicUsize>);

impl SyntheticGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_synthesizing(&self) -> bool {
        self.0.load(Ordering::Acquire) > 0
    }

    pub fn enter(&self) -> SyntheticGuardToken {
        self.0.fetch_add(1, Ordering::AcqRel);
        SyntheticGuardToken(self.0.clone())
    }
}

pub struct SyntheticGuardToken(Arc<AtomicUsize>);

impl Drop for SyntheticGuardToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Pure registration table + mode-handler decision logic. No threads, no
/// OS calls; everything it needs (bus, managed-sequence sink, config) is
/// injected so it is unit-testable deterministically.
pub struct HotkeyCore {
    registrations: RwLock<HashMap<Key, HookMode>>,
    special_held: Mutex<HashSet<Key>>,
    monitor_held: Mutex<HashSet<Key>>,
    lifecycle_key: Key,
}

impl HotkeyCore {
    pub fn new(lifecycle_key: Key) -> Self {
        HotkeyCore {
            registrations: RwLock::new(HashMap::new()),
            special_held: Mutex::new(HashSet::new()),
            monitor_held: Mutex::new(HashSet::new()),
            lifecycle_key,
        }
    }

    /// Idempotent w.r.t. `(key, mode)`; replaces a prior different mode.
    pub fn register(&self, key: Key, mode: HookMode) {
        self.registrations.write().unwrap().insert(key, mode);
    }

    pub fn unregister(&self, key: Key) {
        self.registrations.write().unwrap().remove(&key);
        self.special_held.lock().unwrap().remove(&key);
        self.monitor_held.lock().unwrap().remove(&key);
    }

    /// Removes every registration except the lifecycle hotkey.
    pub fn clear_all(&self) {
        let mut regs = self.registrations.write().unwrap();
        regs.retain(|k, _| *k == self.lifecycle_key);
        self.special_held.lock().unwrap().clear();
        self.monitor_held.lock().unwrap().clear();
    }

    pub fn mode_of(&self, key: Key) -> Option<HookMode> {
        self.registrations.read().unwrap().get(&key).copied()
    }

    /// Classifies one user keystroke edge and performs its side effects
    /// (bus publishes, managed-sequence activation). Returns `true` if the
    /// original event should be swallowed (not forwarded to the OS).
    pub fn handle_edge(
        &self,
        key: Key,
        down: bool,
        bus: &Bus,
        config: &ConfigHandle,
        sink: &dyn ManagedSequenceSink,
    ) -> bool {
        let Some(mode) = self.mode_of(key) else {
            return false;
        };
        match mode {
            HookMode::Intercept => {
                if down {
                    bus.publish("intercept_key_down", Event::Key(key));
                }
                true
            }
            HookMode::Block => true,
            HookMode::Priority => {
                if down {
                    self.handle_priority_down(key, bus, config, sink);
                }
                true
            }
            HookMode::Special => {
                self.handle_special_edge(key, down, bus);
                false
            }
            HookMode::Monitor => {
                self.handle_monitor_edge(key, down, bus);
                false
            }
        }
    }

    fn handle_priority_down(
        &self,
        key: Key,
        bus: &Bus,
        config: &ConfigHandle,
        sink: &dyn ManagedSequenceSink,
    ) {
        let snapshot = config.load();
        let Some(managed) = snapshot.managed_keys.get(key.name()) else {
            warn!(key = %key, "priority-mode key has no managed_keys entry; dropping");
            return;
        };
        let began = sink.try_begin_managed_sequence(key, managed.target_key, managed.delay_ms);
        if began {
            bus.publish("managed_key_down", Event::Key(key));
        }
        // De-duplicated activations are silently dropped per §4.3.
    }

    fn handle_special_edge(&self, key: Key, down: bool, bus: &Bus) {
        let mut held = self.special_held.lock().unwrap();
        if down {
            if held.is_empty() {
                bus.publish("special_key_pause", Event::SpecialPause(PausePhase::Start));
            }
            held.insert(key);
            drop(held);
            bus.publish("special_key_down", Event::Key(key));
        } else {
            held.remove(&key);
            let now_empty = held.is_empty();
            drop(held);
            bus.publish("special_key_up", Event::Key(key));
            if now_empty {
                bus.publish("special_key_pause", Event::SpecialPause(PausePhase::End));
            }
        }
    }

    fn handle_monitor_edge(&self, key: Key, down: bool, bus: &Bus) {
        let mut held = self.monitor_held.lock().unwrap();
        if down {
            if held.insert(key) {
                drop(held);
                bus.publish("monitor_key_down", Event::Key(key));
            }
        } else if held.remove(&key) {
            drop(held);
            bus.publish("monitor_key_up", Event::Key(key));
        }
    }
}

/// Thread-owning wrapper driving [`HotkeyCore`] against a real
/// [`EventSource`]. Runs on the dedicated T-Hook thread.
pub struct HotkeyInterceptor {
    pub core: Arc<HotkeyCore>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HotkeyInterceptor {
    pub fn new(lifecycle_key: Key) -> Self {
        HotkeyInterceptor {
            core: Arc::new(HotkeyCore::new(lifecycle_key)),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Spawns T-Hook. Takes `&self` (the handle is behind a single-writer
    /// `Mutex`) so callers can hold the controller behind an `Arc` rather
    /// than needing unique ownership just to start the thread.
    pub fn spawn(
        &self,
        mut source: Box<dyn EventSource>,
        bus: Arc<Bus>,
        config: ConfigHandle,
        sink: Arc<dyn ManagedSequenceSink>,
        guard: SyntheticGuard,
    ) {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return;
        }
        let core = Arc::clone(&self.core);
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);

        *handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                match source.next_edge() {
                    Ok(Some(edge)) => {
                        if guard.is_synthesizing() {
                            continue;
                        }
                        core.handle_edge(edge.key, edge.down, &bus, &config, sink.as_ref());
                    }
                    Ok(None) => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "hotkey event source failed; stopping T-Hook");
                        break;
                    }
                }
            }
        }));
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(h) = self.handle.lock().unwrap().take() {
            let _ = h.join();
        }
    }
}

impl Drop for HotkeyInterceptor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSnapshot, ManagedKeyConfig};
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        active: StdMutex<HashSet<Key>>,
        begins: StdMutex<Vec<(Key, Key, u64)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            RecordingSink {
                active: StdMutex::new(HashSet::new()),
                begins: StdMutex::new(Vec::new()),
            }
        }
    }

    impl ManagedSequenceSink for RecordingSink {
        fn try_begin_managed_sequence(&self, source: Key, target: Key, delay_ms: u64) -> bool {
            let mut active = self.active.lock().unwrap();
            if !active.insert(source) {
                return false;
            }
            self.begins.lock().unwrap().push((source, target, delay_ms));
            true
        }
    }

    fn config_with_managed(source: &str, target: &str, delay_ms: u64) -> ConfigHandle {
        let mut snap = ConfigSnapshot::default();
        snap.managed_keys.insert(
            source.to_string(),
            ManagedKeyConfig {
                target_key: Key::canonicalize(target).unwrap(),
                delay_ms,
            },
        );
        ConfigHandle::new(snap)
    }

    #[test]
    fn priority_mode_swallows_and_dedups_bursts() {
        let core = HotkeyCore::new(Key::canonicalize("f8").unwrap());
        let e = Key::canonicalize("e").unwrap();
        core.register(e, HookMode::Priority);
        let bus = Bus::new();
        let config = config_with_managed("e", "shift", 50);
        let sink = RecordingSink::new();

        assert!(core.handle_edge(e, true, &bus, &config, &sink));
        assert!(core.handle_edge(e, true, &bus, &config, &sink));
        assert_eq!(sink.begins.lock().unwrap().len(), 1);
    }

    #[test]
    fn special_mode_emits_pause_only_on_first_down_and_last_up() {
        let core = HotkeyCore::new(Key::canonicalize("f8").unwrap());
        let space = Key::canonicalize("space").unwrap();
        let shift = Key::canonicalize("shift").unwrap();
        core.register(space, HookMode::Special);
        core.register(shift, HookMode::Special);
        let bus = Bus::new();
        let config = ConfigHandle::new(ConfigSnapshot::default());
        let sink = RecordingSink::new();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        bus.subscribe(
            "special_key_pause",
            Box::new(move |ev| {
                if let Event::SpecialPause(p) = ev {
                    seen2.lock().unwrap().push(*p);
                }
                Ok(())
            }),
        );

        assert!(!core.handle_edge(space, true, &bus, &config, &sink));
        assert!(!core.handle_edge(shift, true, &bus, &config, &sink));
        assert!(!core.handle_edge(space, false, &bus, &config, &sink));
        assert!(!core.handle_edge(shift, false, &bus, &config, &sink));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], PausePhase::Start);
        assert_eq!(seen[1], PausePhase::End);
    }

    #[test]
    fn monitor_mode_fires_exactly_one_down_and_one_up_edge() {
        let core = HotkeyCore::new(Key::canonicalize("f8").unwrap());
        let w = Key::canonicalize("w").unwrap();
        core.register(w, HookMode::Monitor);
        let bus = Bus::new();
        let config = ConfigHandle::new(ConfigSnapshot::default());
        let sink = RecordingSink::new();

        let downs = Arc::new(AtomicUsize::new(0));
        let ups = Arc::new(AtomicUsize::new(0));
        let (d2, u2) = (Arc::clone(&downs), Arc::clone(&ups));
        bus.subscribe(
            "monitor_key_down",
            Box::new(move |_| {
                d2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        bus.subscribe(
            "monitor_key_up",
            Box::new(move |_| {
                u2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        // Held for a while: repeated down edges must not be passed here
        // (the backend filters OS auto-repeat), so two downs in a row
        // exercise the edge-detection itself.
        core.handle_edge(w, true, &bus, &config, &sink);
        core.handle_edge(w, true, &bus, &config, &sink);
        core.handle_edge(w, false, &bus, &config, &sink);

        assert_eq!(downs.load(Ordering::SeqCst), 1);
        assert_eq!(ups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_all_preserves_lifecycle_key() {
        let lifecycle = Key::canonicalize("f8").unwrap();
        let core = HotkeyCore::new(lifecycle);
        let w = Key::canonicalize("w").unwrap();
        core.register(w, HookMode::Monitor);
        core.register(lifecycle, HookMode::Intercept);
        core.clear_all();
        assert!(core.mode_of(w).is_none());
        assert!(core.mode_of(lifecycle).is_some());
    }
}
