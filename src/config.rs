//! Immutable configuration snapshot consumed whole on lifecycle transitions
//! (§3 "Config snapshot", §6 "Configuration surface").

use crate::key::Key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationaryVariant {
    ShiftModifier,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationaryMode {
    pub active: bool,
    pub variant: StationaryVariant,
}

impl Default for StationaryMode {
    fn default() -> Self {
        StationaryMode {
            active: false,
            variant: StationaryVariant::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendMode {
    /// Inject at the input-queue level (uinput/evdev writeback).
    Direct,
    /// Deliver to a specific window handle.
    Control,
}

impl Default for SendMode {
    fn default() -> Self {
        SendMode::Direct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedKeyConfig {
    pub target_key: Key,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    Timer,
    Cooldown,
    Hold,
}

/// A decision-layer skill record. The executor only ever sees the
/// `Press`/`Sequence` actions a skill's callback emits; the trigger
/// parameters below belong to the (out-of-scope) decision layer and are
/// carried here only so the scheduler can register the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    pub id: String,
    pub trigger_mode: TriggerMode,
    pub interval_ms: Option<u64>,
    pub priority: crate::action::Priority,
}

// `Priority` needs (de)serialize for `SkillConfig`'s use in a TOML profile.
impl Serialize for crate::action::Priority {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for crate::action::Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use crate::action::Priority;
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "emergency" => Ok(Priority::Emergency),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(serde::de::Error::custom(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

fn key_opt_ser<S: serde::Serializer>(key: &Option<Key>, s: S) -> Result<S::Ok, S::Error> {
    match key {
        Some(k) => s.serialize_str(k.name()),
        None => s.serialize_none(),
    }
}

fn key_opt_de<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Key>, D::Error> {
    let s: Option<String> = Option::deserialize(d)?;
    match s {
        Some(s) if !s.is_empty() => Key::canonicalize(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown key: {s}"))),
        _ => Ok(None),
    }
}

/// A bare key name used only as a serde-friendly map key / list element;
/// resolved through [`Key::canonicalize`] wherever it is consumed.
pub type KeyName = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(serialize_with = "key_opt_ser", deserialize_with = "key_opt_de", default)]
    pub emergency_hp_key: Option<Key>,
    #[serde(serialize_with = "key_opt_ser", deserialize_with = "key_opt_de", default)]
    pub emergency_mp_key: Option<Key>,

    #[serde(default)]
    pub special_keys: Vec<KeyName>,

    #[serde(default)]
    pub managed_keys: HashMap<KeyName, ManagedKeyConfig>,

    #[serde(serialize_with = "key_opt_ser", deserialize_with = "key_opt_de", default)]
    pub force_move_key: Option<Key>,
    #[serde(serialize_with = "key_opt_ser", deserialize_with = "key_opt_de", default)]
    pub force_move_replacement_key: Option<Key>,

    #[serde(default)]
    pub stationary_mode: StationaryMode,
    #[serde(default)]
    pub send_mode: SendMode,
    #[serde(default)]
    pub send_mode_target: Option<String>,

    #[serde(default)]
    pub skills: Vec<SkillConfig>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        ConfigSnapshot {
            emergency_hp_key: None,
            emergency_mp_key: None,
            special_keys: Vec::new(),
            managed_keys: HashMap::new(),
            force_move_key: None,
            force_move_replacement_key: None,
            stationary_mode: StationaryMode::default(),
            send_mode: SendMode::default(),
            send_mode_target: None,
            skills: Vec::new(),
        }
    }
}

impl ConfigSnapshot {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Overlays the scalar CLI convenience flags onto a (possibly default)
    /// snapshot.
    pub fn overlay_cli(mut self, args: &crate::cli::Args) -> Self {
        if let Some(name) = &args.emergency_hp_key {
            self.emergency_hp_key = Key::canonicalize(name);
        }
        if let Some(name) = &args.emergency_mp_key {
            self.emergency_mp_key = Key::canonicalize(name);
        }
        self
    }
}

/// Atomically swappable holder for the current snapshot, read by C3/C4/C5
/// and written only by C6 on `config:applied` (§4.6: "the new snapshot
/// replaces the old in one step"). `arc-swap` is not in the corpus, so a
/// single-writer `RwLock<Arc<_>>` fills the same role without introducing
/// an ungrounded dependency (see DESIGN.md).
#[derive(Clone)]
pub struct ConfigHandle(Arc<RwLock<Arc<ConfigSnapshot>>>);

impl ConfigHandle {
    pub fn new(initial: ConfigSnapshot) -> Self {
        ConfigHandle(Arc::new(RwLock::new(Arc::new(initial))))
    }

    pub fn load(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.0.read().unwrap())
    }

    pub fn store(&self, snapshot: ConfigSnapshot) {
        *self.0.write().unwrap() = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_handle_swap_is_visible_to_readers() {
        let handle = ConfigHandle::new(ConfigSnapshot::default());
        assert!(handle.load().emergency_hp_key.is_none());
        let mut next = ConfigSnapshot::default();
        next.emergency_hp_key = Key::canonicalize("1");
        handle.store(next);
        assert_eq!(handle.load().emergency_hp_key, Key::canonicalize("1"));
    }

    #[test]
    fn parses_minimal_toml_profile() {
        let toml = r#"
            emergency_hp_key = "1"
            special_keys = ["space"]
        "#;
        let snap = ConfigSnapshot::from_toml_str(toml).unwrap();
        assert_eq!(snap.emergency_hp_key, Key::canonicalize("1"));
        assert_eq!(snap.special_keys, vec!["space".to_string()]);
    }
}
