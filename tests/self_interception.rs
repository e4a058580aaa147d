//! S4 / P-7: actions the executor emits for a managed key must never
//! re-enter the hotkey interceptor, even when (as in this harness, unlike
//! the real split-fd deployment) the output sink loops synthesized edges
//! straight back into the input source.

use dispatch_core::bus::Bus;
use dispatch_core::config::{ConfigHandle, ConfigSnapshot, ManagedKeyConfig};
use dispatch_core::hotkey::{
    EventSource, HookMode, HotkeyCore, KeyEdge, ManagedSequenceSink, OutputSink, SyntheticGuard,
};
use dispatch_core::key::Key;
use std::io;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct LoopbackSource {
    rx: Receiver<KeyEdge>,
}

impl EventSource for LoopbackSource {
    fn next_edge(&mut self) -> io::Result<Option<KeyEdge>> {
        match self.rx.recv_timeout(Duration::from_millis(500)) {
            Ok(edge) => Ok(Some(edge)),
            Err(_) => Ok(None),
        }
    }
}

struct LoopbackSink {
    tx: Sender<KeyEdge>,
    sent: Mutex<Vec<(Key, bool)>>,
}

impl OutputSink for LoopbackSink {
    fn send(&self, key: Key, down: bool) -> io::Result<()> {
        self.sent.lock().unwrap().push((key, down));
        let _ = self.tx.send(KeyEdge { key, down });
        Ok(())
    }
}

#[test]
fn synthesized_press_does_not_reenter_hotkey_core() {
    let lifecycle = Key::canonicalize("f8").unwrap();
    let e = Key::canonicalize("e").unwrap();
    let shift = Key::canonicalize("shift").unwrap();

    let hotkey_core = Arc::new(HotkeyCore::new(lifecycle));
    hotkey_core.register(e, HookMode::Priority);

    let bus = Arc::new(Bus::new());
    let mut snapshot = ConfigSnapshot::default();
    snapshot.managed_keys.insert(
        "e".to_string(),
        ManagedKeyConfig {
            target_key: shift,
            delay_ms: 0,
        },
    );
    let config = ConfigHandle::new(snapshot);

    let managed_down = Arc::new(Mutex::new(0usize));
    {
        let managed_down = Arc::clone(&managed_down);
        bus.subscribe(
            "managed_key_down",
            Box::new(move |_| {
                *managed_down.lock().unwrap() += 1;
                Ok(())
            }),
        );
    }

    let (tx, rx) = channel::<KeyEdge>();
    let sink = Arc::new(LoopbackSink {
        tx: tx.clone(),
        sent: Mutex::new(Vec::new()),
    });
    let mut source = LoopbackSource { rx };
    let guard = SyntheticGuard::new();

    struct NoopManagedSink;
    impl ManagedSequenceSink for NoopManagedSink {
        fn try_begin_managed_sequence(&self, _source: Key, _target: Key, _delay_ms: u64) -> bool {
            true
        }
    }
    let managed_sink = NoopManagedSink;

    // Real user edge: press `e`. This is not wrapped in a synthetic guard
    // token, mirroring a genuine edge read off the input fd.
    assert!(hotkey_core.handle_edge(e, true, &bus, &config, &managed_sink));
    assert_eq!(*managed_down.lock().unwrap(), 1);

    // Now simulate the executor emitting `shift` under the guard, and the
    // sink looping it straight back into the source. The token must still
    // be held while the loopback edges are drained, exactly as it would
    // be in `PriorityExecutor::apply_dispatch`'s call into the sink.
    let token = guard.enter();
    sink.send(shift, true).unwrap();
    sink.send(shift, false).unwrap();

    // Drain the loopback queue the way T-Hook's read loop would, honoring
    // the guard exactly as `HotkeyInterceptor::spawn`'s loop body does.
    let mut reentries = 0;
    for _ in 0..2 {
        if let Ok(Some(edge)) = source.next_edge() {
            if guard.is_synthesizing() {
                continue;
            }
            if hotkey_core.handle_edge(edge.key, edge.down, &bus, &config, &managed_sink) {
                reentries += 1;
            }
        }
    }
    drop(token);

    assert_eq!(
        reentries, 0,
        "synthesized shift edges must never be classified by the hotkey core"
    );
    assert_eq!(*managed_down.lock().unwrap(), 1, "no extra managed_key_down from the echo");
    assert_eq!(sink.sent.lock().unwrap().as_slice(), &[(shift, true), (shift, false)]);
}
