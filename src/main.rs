//! Process entry point: parses the CLI, loads and overlays configuration,
//! wires the bus and the macro controller, spawns T-Hook/T-Executor/T-Sched,
//! and blocks on a signal until a graceful shutdown is requested. Owns
//! every component by value and wires channels/threads/signal handling
//! around them in a single function.

use dispatch_core::bus::Bus;
use dispatch_core::config::{ConfigHandle, ConfigSnapshot};
use dispatch_core::controller::{MacroController, MacroState};
use dispatch_core::error::CoreError;
use dispatch_core::hotkey::{
    self, EvdevSink, EvdevSource, EventSource, ManagedSequenceSink, OutputSink, SyntheticGuard,
};
use dispatch_core::key::Key;
use dispatch_core::{cli, telemetry};
use signal_hook::consts::signal::*;
use signal_hook::iterator::Signals;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Attempts to raise the process's scheduling priority so input dispatch
/// is not starved under load. Best-effort: a failure is logged, not fatal.
fn set_high_priority() {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: `setpriority` with `PRIO_PROCESS` and pid 0 (self) is a
        // well-defined libc call; a nonzero result only means the kernel
        // refused the request (missing CAP_SYS_NICE), which we handle.
        let res = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -20) };
        if res != 0 {
            tracing::warn!("unable to set process niceness to -20 (requires root or CAP_SYS_NICE)");
        }
    }
}

fn open_input(args: &cli::Args) -> io::Result<Box<dyn EventSource>> {
    match &args.input_device {
        Some(path) => {
            let file = OpenOptions::new().read(true).open(path)?;
            let fd = file.as_raw_fd();
            std::mem::forget(file);
            Ok(Box::new(EvdevSource::new(fd)))
        }
        None => Ok(Box::new(EvdevSource::new(io::stdin().as_raw_fd()))),
    }
}

fn open_output(args: &cli::Args) -> io::Result<Arc<dyn OutputSink>> {
    match &args.output_device {
        Some(path) => {
            let file = OpenOptions::new().write(true).open(path)?;
            let fd = file.as_raw_fd();
            std::mem::forget(file);
            Ok(Arc::new(EvdevSink::new(fd)))
        }
        None => Ok(Arc::new(EvdevSink::new(io::stdout().as_raw_fd()))),
    }
}

fn load_config(args: &cli::Args) -> ConfigSnapshot {
    let base = match &args.config {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => match ConfigSnapshot::from_toml_str(&text) {
                Ok(snap) => snap,
                Err(e) => {
                    eprintln!("error: invalid config profile {}: {e}", path.display());
                    exit(2);
                }
            },
            Err(e) => {
                eprintln!("error: failed to read config profile {}: {e}", path.display());
                exit(1);
            }
        },
        None => ConfigSnapshot::default(),
    };
    base.overlay_cli(args)
}

fn main() -> io::Result<()> {
    let args = cli::parse_args();

    if args.list_devices {
        if let Err(e) = hotkey::list_input_devices() {
            eprintln!("error listing devices: {e}");
            eprintln!("note: listing devices typically requires root privileges.");
            exit(2);
        }
        return Ok(());
    }

    let _meter = telemetry::init_tracing(&args);
    set_high_priority();

    let Some(lifecycle_key) = Key::canonicalize(&args.lifecycle_key) else {
        eprintln!("error: unknown lifecycle key '{}'", args.lifecycle_key);
        exit(CoreError::UnknownKey(args.lifecycle_key.clone()).exit_code());
    };

    let snapshot = load_config(&args);
    let config = ConfigHandle::new(snapshot);
    let bus = Arc::new(Bus::new());
    let guard = SyntheticGuard::new();

    let controller = MacroController::new(Arc::clone(&bus), config.clone(), lifecycle_key);

    let input = open_input(&args)?;
    let output = open_output(&args)?;
    let managed_sink: Arc<dyn ManagedSequenceSink> = Arc::clone(&controller.executor.core);

    controller
        .hotkey
        .spawn(input, Arc::clone(&bus), config.clone(), managed_sink, guard.clone());
    controller.executor.spawn(output, Arc::clone(&bus), guard.clone());
    controller.scheduler.spawn(Arc::clone(&bus));

    // Start the macro running immediately; the lifecycle hotkey still
    // toggles Running/Paused/Stopped from here on (see `cycle_lifecycle`).
    if let Err(e) = controller.transition(MacroState::Ready) {
        tracing::error!(error = %e, "failed to enter Ready state at startup");
        exit(e.exit_code());
    }
    if let Err(e) = controller.transition(MacroState::Running) {
        tracing::error!(error = %e, "failed to enter Running state at startup");
        exit(e.exit_code());
    }

    let shutting_down = Arc::new(AtomicBool::new(false));
    let stats_thread = args.log_interval.map(|secs| {
        let controller = Arc::clone(&controller);
        let shutting_down = Arc::clone(&shutting_down);
        let period = std::time::Duration::from_secs(secs.max(1));
        std::thread::spawn(move || {
            while !shutting_down.load(Ordering::Acquire) {
                std::thread::sleep(period);
                if shutting_down.load(Ordering::Acquire) {
                    break;
                }
                let stats = controller.executor.core.stats();
                tracing::info!(
                    enqueued_emergency = stats.enqueued_per_priority[0],
                    enqueued_high = stats.enqueued_per_priority[1],
                    enqueued_normal = stats.enqueued_per_priority[2],
                    enqueued_low = stats.enqueued_per_priority[3],
                    processed_total = stats.processed_total,
                    action_failures = stats.action_failures,
                    "dispatch-core stats"
                );
            }
        })
    });

    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT])?;
    if let Some(sig) = signals.forever().next() {
        tracing::info!(signal = sig, "received shutdown signal");
    }

    shutting_down.store(true, Ordering::Release);
    if let Some(handle) = stats_thread {
        let _ = handle.join();
    }

    let _ = controller.transition(MacroState::Stopped);
    controller.hotkey.stop();
    controller.executor.stop();
    controller.scheduler.stop();

    let stats = controller.executor.core.stats();
    if args.stats_json {
        match serde_json::to_string(&stats) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize shutdown stats"),
        }
    } else {
        tracing::info!(
            enqueued_emergency = stats.enqueued_per_priority[0],
            enqueued_high = stats.enqueued_per_priority[1],
            enqueued_normal = stats.enqueued_per_priority[2],
            enqueued_low = stats.enqueued_per_priority[3],
            processed_total = stats.processed_total,
            action_failures = stats.action_failures,
            "dispatch-core shutting down"
        );
    }

    Ok(())
}
