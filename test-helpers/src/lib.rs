//! Shared fixtures for integration tests and benchmarks: raw `input_event`
//! construction and a sample multi-feature configuration profile, so each
//! test doesn't hand-roll the same evdev bytes or managed-key setup.

use dispatch_core::config::{ConfigSnapshot, ManagedKeyConfig, StationaryMode, StationaryVariant};
use dispatch_core::key::Key;
use input_linux_sys::{input_event, timeval, EV_KEY, EV_SYN};
use std::mem::size_of;

/// Builds an `EV_KEY` event with a specific microsecond timestamp.
/// `value`: 0 = up, 1 = down, 2 = OS auto-repeat.
pub fn key_ev(ts_us: u64, code: u16, value: i32) -> input_event {
    input_event {
        time: timeval {
            tv_sec: (ts_us / 1_000_000) as i64,
            tv_usec: (ts_us % 1_000_000) as i64,
        },
        type_: EV_KEY as u16,
        code,
        value,
    }
}

/// Builds a non-key (`EV_SYN`/`SYN_REPORT`) event, as real evdev streams
/// interleave between key events.
pub fn syn_ev(ts_us: u64) -> input_event {
    input_event {
        time: timeval {
            tv_sec: (ts_us / 1_000_000) as i64,
            tv_usec: (ts_us % 1_000_000) as i64,
        },
        type_: EV_SYN as u16,
        code: 0,
        value: 0,
    }
}

/// Reinterprets an `input_event` as the raw bytes a real evdev fd would
/// carry, for feeding a subprocess's stdin in CLI smoke tests.
pub fn event_bytes(event: &input_event) -> Vec<u8> {
    // SAFETY: `input_event` is a `#[repr(C)]` POD type; reading its byte
    // representation for the duration of the copy below is sound.
    unsafe {
        std::slice::from_raw_parts(event as *const _ as *const u8, size_of::<input_event>())
            .to_vec()
    }
}

pub const KEY_E: u16 = 18;
pub const KEY_F8: u16 = 66;
pub const KEY_LEFTSHIFT: u16 = 42;

/// A configuration profile exercising one feature from each config surface
/// (managed key, special key, force-move key, stationary mode) so a single
/// fixture covers most end-to-end scenarios.
pub fn sample_config() -> ConfigSnapshot {
    let mut snap = ConfigSnapshot::default();
    snap.emergency_hp_key = Key::canonicalize("1");
    snap.emergency_mp_key = Key::canonicalize("2");
    snap.managed_keys.insert(
        "e".to_string(),
        ManagedKeyConfig {
            target_key: Key::canonicalize("shift").unwrap(),
            delay_ms: 50,
        },
    );
    snap.special_keys = vec!["ctrl".to_string()];
    snap.force_move_key = Key::canonicalize("w");
    snap.force_move_replacement_key = Key::canonicalize("shift");
    snap.stationary_mode = StationaryMode {
        active: true,
        variant: StationaryVariant::ShiftModifier,
    };
    snap
}
