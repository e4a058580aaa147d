#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use dispatch_core::bus::Bus;
use dispatch_core::config::{ConfigHandle, ConfigSnapshot, ManagedKeyConfig};
use dispatch_core::hotkey::{HookMode, HotkeyCore, ManagedSequenceSink};
use dispatch_core::key::Key;
use libfuzzer_sys::fuzz_target;

const KEY_NAMES: &[&str] = &["1", "2", "q", "w", "e", "shift", "space", "f8", "ctrl"];
const MAX_EDGES: usize = 128;

struct NoopSink;
impl ManagedSequenceSink for NoopSink {
    fn try_begin_managed_sequence(&self, _source: Key, _target: Key, _delay_ms: u64) -> bool {
        true
    }
}

fn pick_key(u: &mut Unstructured) -> Key {
    let idx = u.int_in_range(0..=(KEY_NAMES.len() - 1)).unwrap_or(0);
    Key::canonicalize(KEY_NAMES[idx]).unwrap()
}

fn pick_mode(u: &mut Unstructured) -> HookMode {
    match u.int_in_range(0u8..=4).unwrap_or(0) {
        0 => HookMode::Intercept,
        1 => HookMode::Priority,
        2 => HookMode::Special,
        3 => HookMode::Monitor,
        _ => HookMode::Block,
    }
}

// Fuzzes `HotkeyCore::handle_edge` across every hook mode with arbitrary
// key/down sequences. All keys carry a managed_keys entry so Priority mode
// is reachable too. Looking for panics, not a specific swallow decision.
fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let lifecycle = Key::canonicalize("f8").unwrap();
    let core = HotkeyCore::new(lifecycle);
    let bus = Bus::new();

    let mut snapshot = ConfigSnapshot::default();
    for name in KEY_NAMES {
        snapshot.managed_keys.insert(
            name.to_string(),
            ManagedKeyConfig {
                target_key: Key::canonicalize("shift").unwrap(),
                delay_ms: 10,
            },
        );
    }
    let config = ConfigHandle::new(snapshot);
    let sink = NoopSink;

    for name in KEY_NAMES {
        let key = Key::canonicalize(name).unwrap();
        core.register(key, pick_mode(&mut u));
    }

    for _ in 0..MAX_EDGES {
        if u.is_empty() {
            break;
        }
        let key = pick_key(&mut u);
        let down = u.arbitrary::<bool>().unwrap_or(false);
        let _ = core.handle_edge(key, down, &bus, &config, &sink);
    }
});
