//! Executor action variants and priority levels (§3, §4.4).

use crate::key::Key;
use std::fmt;

/// `E` (0) always drains before `H`/`N`/`L` (1,2,3), which are served in
/// that strict order when not paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    Emergency = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Emergency,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Emergency => "emergency",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        f.write_str(s)
    }
}

pub type SequenceId = String;

/// A single executor step. Priority is attached at enqueue time, not part
/// of the variant (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Press(Key),
    Hold(Key),
    Release(Key),
    Sequence(Vec<SequenceStep>),
    MouseClick(MouseButton),
    Delay(u64),
    Notify(String),
    Cleanup(SequenceId),
}

/// Sub-step of a `Sequence`. Only `Press` and `Delay` participate, per §3;
/// `Delay` here is the one *synchronous* wait in the system, executed
/// in-place within a single tick rather than installing `delay_until`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceStep {
    Press(Key),
    Delay(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// The pseudo-key the output sink writes a click through, reusing the
    /// evdev `BTN_*` codes already in [`Key`]'s name table.
    pub fn as_key(self) -> Key {
        let name = match self {
            MouseButton::Left => "lbutton",
            MouseButton::Right => "rbutton",
            MouseButton::Middle => "mbutton",
        };
        Key::canonicalize(name).expect("mouse button names are always canonicalizable")
    }
}

impl Action {
    /// Builds the canonical managed-key activation sequence for Priority
    /// mode (§4.3): `Delay(d), Press(target), Delay(d), Notify(...), Cleanup(k)`.
    pub fn managed_sequence(source: Key, target: Key, delay_ms: u64) -> Vec<Action> {
        vec![
            Action::Delay(delay_ms),
            Action::Press(target),
            Action::Delay(delay_ms),
            Action::Notify(format!("managed_key_complete:{source}")),
            Action::Cleanup(source.name().to_string()),
        ]
    }
}
