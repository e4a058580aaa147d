//! Macro Controller (C6): owns the finite state machine and the rest of
//! the core by value, wiring config application, hook registration, and
//! the cross-component flags (`special_paused`, `force_move_active`)
//! that must have exactly one writer (§5). Owns every other component
//! by value and wires channels/threads around them rather than
//! scattering ownership across the process.

use crate::bus::{Bus, Event, PausePhase};
use crate::config::{ConfigHandle, TriggerMode};
use crate::error::{CoreError, CoreResult};
use crate::executor::PriorityExecutor;
use crate::hotkey::{HookMode, HotkeyInterceptor};
use crate::key::Key;
use crate::scheduler::PeriodicScheduler;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroState {
    Stopped,
    Ready,
    Running,
    Paused,
}

fn is_valid_transition(from: MacroState, to: MacroState) -> bool {
    use MacroState::*;
    matches!(
        (from, to),
        (Stopped, Ready) | (Ready, Running) | (Ready, Stopped) | (Running, Paused)
            | (Running, Stopped) | (Paused, Running) | (Paused, Stopped)
    )
}

pub struct MacroController {
    state: Mutex<MacroState>,
    bus: Arc<Bus>,
    config: ConfigHandle,
    pub hotkey: HotkeyInterceptor,
    pub executor: PriorityExecutor,
    pub scheduler: PeriodicScheduler,
    lifecycle_key: Key,
}

impl MacroController {
    pub fn new(bus: Arc<Bus>, config: ConfigHandle, lifecycle_key: Key) -> Arc<Self> {
        let hotkey = HotkeyInterceptor::new(lifecycle_key);
        hotkey.core.register(lifecycle_key, HookMode::Intercept);

        let controller = Arc::new(MacroController {
            state: Mutex::new(MacroState::Stopped),
            bus,
            config,
            hotkey,
            executor: PriorityExecutor::new(),
            scheduler: PeriodicScheduler::new(),
            lifecycle_key,
        });
        controller.wire_subscriptions();
        controller
    }

    pub fn state(&self) -> MacroState {
        *self.state.lock().unwrap()
    }

    /// Subscribes the handlers only the controller is allowed to write
    /// through (DESIGN.md decision 5): `special_key_pause` toggles
    /// `executor.special_paused`, `monitor_key_{down,up}` toggle
    /// `executor.force_move_active` when the key matches the configured
    /// force-move key, and `intercept_key_down` drives the lifecycle
    /// hotkey's start/stop cycle.
    fn wire_subscriptions(self: &Arc<Self>) {
        {
            let this = Arc::clone(self);
            self.bus.subscribe(
                "special_key_pause",
                Box::new(move |ev| {
                    if let Event::SpecialPause(phase) = ev {
                        let paused = matches!(phase, PausePhase::Start);
                        this.executor.core.set_special_paused(paused);
                    }
                    Ok(())
                }),
            );
        }
        {
            let this = Arc::clone(self);
            self.bus.subscribe(
                "monitor_key_down",
                Box::new(move |ev| {
                    if let Event::Key(k) = ev {
                        if this.config.load().force_move_key == Some(*k) {
                            this.executor.core.set_force_move(true);
                        }
                    }
                    Ok(())
                }),
            );
        }
        {
            let this = Arc::clone(self);
            self.bus.subscribe(
                "monitor_key_up",
                Box::new(move |ev| {
                    if let Event::Key(k) = ev {
                        if this.config.load().force_move_key == Some(*k) {
                            this.executor.core.set_force_move(false);
                        }
                    }
                    Ok(())
                }),
            );
        }
        {
            let this = Arc::clone(self);
            self.bus.subscribe(
                "intercept_key_down",
                Box::new(move |ev| {
                    if let Event::Key(k) = ev {
                        if *k == this.lifecycle_key {
                            this.cycle_lifecycle();
                        }
                    }
                    Ok(())
                }),
            );
        }
    }

    /// The lifecycle key's start/stop cycle: from `Stopped` it starts the
    /// macro (`Ready` then straight into `Running`); from `Running`/`Paused`
    /// it toggles between the two. Transition refusals are impossible by
    /// construction here since every branch only ever requests a step the
    /// table allows from the state it checks.
    fn cycle_lifecycle(&self) {
        match self.state() {
            MacroState::Stopped => {
                if self.transition(MacroState::Ready).is_ok() {
                    let _ = self.transition(MacroState::Running);
                }
            }
            MacroState::Ready | MacroState::Paused => {
                let _ = self.transition(MacroState::Running);
            }
            MacroState::Running => {
                let _ = self.transition(MacroState::Paused);
            }
        }
    }

    pub fn transition(&self, target: MacroState) -> CoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let from = *state;
        if !is_valid_transition(from, target) {
            self.bus.publish(
                "state:rejected",
                Event::StateChanged { old: from, new: target },
            );
            return Err(CoreError::InvalidTransition { from, to: target });
        }

        match target {
            MacroState::Ready => self.enter_ready(),
            MacroState::Running => self.enter_running(),
            MacroState::Paused => self.enter_paused(),
            MacroState::Stopped => self.enter_stopped(),
        }

        *state = target;
        drop(state);
        self.bus.publish(
            "state:changed",
            Event::StateChanged { old: from, new: target },
        );
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Applies the current config snapshot: emergency-key cache, hook
    /// registrations, queue reset, and a frozen scheduler (§4.6 "Ready").
    fn enter_ready(&self) {
        let snapshot = self.config.load();
        self.executor
            .core
            .cache_emergency_keys(snapshot.emergency_hp_key, snapshot.emergency_mp_key);

        for (name, managed) in &snapshot.managed_keys {
            match Key::canonicalize(name) {
                Some(k) => self.hotkey.core.register(k, HookMode::Priority),
                None => warn!(key = %name, "managed_keys: unknown key name, skipping"),
            }
            let _ = managed; // consulted by HotkeyCore::handle_priority_down via config, not here
        }
        for name in &snapshot.special_keys {
            match Key::canonicalize(name) {
                Some(k) => self.hotkey.core.register(k, HookMode::Special),
                None => warn!(key = %name, "special_keys: unknown key name, skipping"),
            }
        }
        if let Some(k) = snapshot.force_move_key {
            self.hotkey.core.register(k, HookMode::Monitor);
            self.executor.core.set_force_move_key(k);
        }
        if let Some(r) = snapshot.force_move_replacement_key {
            self.executor.core.set_force_move_replacement(r);
        }
        self.executor
            .core
            .set_stationary(snapshot.stationary_mode.active, snapshot.stationary_mode.variant);

        self.executor.core.clear_all();

        // Timer-mode skills are the only ones with an interval the
        // scheduler itself can drive; cooldown/hold skills are detected
        // by the (out-of-scope) decision layer and never reach this loop.
        // `add` is a no-op on an id already registered from a prior
        // `Ready` entry, so repeated transitions don't duplicate tasks.
        for skill in &snapshot.skills {
            if skill.trigger_mode != TriggerMode::Timer {
                continue;
            }
            let Some(interval_ms) = skill.interval_ms else {
                warn!(skill = %skill.id, "timer skill missing interval_ms, skipping");
                continue;
            };
            let bus = Arc::clone(&self.bus);
            let id = skill.id.clone();
            let priority = skill.priority;
            self.scheduler.add(
                id.clone(),
                interval_ms,
                Box::new(move || {
                    bus.publish(format!("skill:{id}:due"), Event::Text(priority.to_string()));
                    Ok(())
                }),
                false,
            );
        }

        self.scheduler.core.pause(self.now_ms());
    }

    fn enter_running(&self) {
        self.executor.core.resume_manual();
        self.scheduler.core.resume(self.now_ms());
    }

    fn enter_paused(&self) {
        self.executor.core.pause_manual();
        self.scheduler.core.pause(self.now_ms());
    }

    /// A soft stop: queues and registrations reset and the scheduler
    /// freezes, but the driver threads themselves keep running so a
    /// later `Stopped -> Ready` needs no respawn. Process-level shutdown
    /// (signal handling) is a separate concern owned by `main`.
    fn enter_stopped(&self) {
        self.hotkey.core.clear_all();
        self.executor.core.clear_all();
        self.scheduler.core.pause(self.now_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSnapshot, ManagedKeyConfig};

    fn controller() -> Arc<MacroController> {
        let bus = Arc::new(Bus::new());
        let mut snap = ConfigSnapshot::default();
        snap.managed_keys.insert(
            "e".to_string(),
            ManagedKeyConfig {
                target_key: Key::canonicalize("shift").unwrap(),
                delay_ms: 50,
            },
        );
        let config = ConfigHandle::new(snap);
        MacroController::new(bus, config, Key::canonicalize("f8").unwrap())
    }

    #[test]
    fn valid_transition_chain_succeeds() {
        let c = controller();
        assert_eq!(c.state(), MacroState::Stopped);
        assert!(c.transition(MacroState::Ready).is_ok());
        assert!(c.transition(MacroState::Running).is_ok());
        assert!(c.transition(MacroState::Paused).is_ok());
        assert!(c.transition(MacroState::Running).is_ok());
        assert!(c.transition(MacroState::Stopped).is_ok());
    }

    /// P-10: an invalid transition is refused and leaves state unchanged.
    #[test]
    fn invalid_transition_is_refused_and_state_unchanged() {
        let c = controller();
        let err = c.transition(MacroState::Running).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(c.state(), MacroState::Stopped);
    }

    #[test]
    fn ready_entry_registers_managed_key_in_priority_mode() {
        let c = controller();
        c.transition(MacroState::Ready).unwrap();
        let e = Key::canonicalize("e").unwrap();
        assert_eq!(c.hotkey.core.mode_of(e), Some(HookMode::Priority));
    }

    #[test]
    fn stopped_entry_preserves_lifecycle_key_registration() {
        let c = controller();
        c.transition(MacroState::Ready).unwrap();
        c.transition(MacroState::Running).unwrap();
        c.transition(MacroState::Stopped).unwrap();
        assert_eq!(
            c.hotkey.core.mode_of(Key::canonicalize("f8").unwrap()),
            Some(HookMode::Intercept)
        );
        assert_eq!(c.hotkey.core.mode_of(Key::canonicalize("e").unwrap()), None);
    }

    #[test]
    fn lifecycle_key_cycles_stopped_to_running_then_toggles_pause() {
        let c = controller();
        c.bus.publish("intercept_key_down", Event::Key(Key::canonicalize("f8").unwrap()));
        assert_eq!(c.state(), MacroState::Running);
        c.bus.publish("intercept_key_down", Event::Key(Key::canonicalize("f8").unwrap()));
        assert_eq!(c.state(), MacroState::Paused);
        c.bus.publish("intercept_key_down", Event::Key(Key::canonicalize("f8").unwrap()));
        assert_eq!(c.state(), MacroState::Running);
    }
}
