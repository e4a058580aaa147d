use clap::Parser;
use std::path::PathBuf;

/// Priority-scheduled input dispatch and scheduling engine.
/// Reads raw Linux input events from an Interception Tools pipe (or stdin),
/// classifies keystrokes through the hotkey interceptor (C3), drives the
/// priority input executor (C4) and periodic skill scheduler (C5), and
/// writes synthesized events back out through the output device (or
/// stdout).
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "Priority-scheduled input dispatch and scheduling engine.\n\
Reads raw Linux input events from an Interception Tools pipe, classifies\n\
keystrokes through a per-key hook table (Intercept/Priority/Special/Monitor/\n\
Block), drives a four-queue priority executor and a periodic skill\n\
scheduler, and writes synthesized events back out.\n\
\n\
EXAMPLES:\n\
  # Run against a config profile, piped through the Interception Tools:\n\
  sudo sh -c 'intercept -g /dev/input/by-id/your-keyboard-event-device | dispatch-core --config profile.toml | uinput -d /dev/input/by-id/your-keyboard-event-device'\n\
\n\
  # Override the emergency HP/MP keys from the command line:\n\
  sudo sh -c 'intercept -g ... | dispatch-core --config profile.toml --emergency-hp-key 1 --emergency-mp-key 2 | uinput -d ...'\n\
\n\
  # List available input devices:\n\
  dispatch-core --list-devices\n\
\n\
See README for more details and advanced usage."
)]
pub struct Args {
    /// Path to a TOML configuration profile (a `ConfigSnapshot`). If
    /// omitted, the core starts from an empty default snapshot and relies
    /// entirely on the CLI overlay flags below.
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overrides `emergency_hp_key` from the loaded profile.
    #[arg(long, value_name = "KEY")]
    pub emergency_hp_key: Option<String>,

    /// Overrides `emergency_mp_key` from the loaded profile.
    #[arg(long, value_name = "KEY")]
    pub emergency_mp_key: Option<String>,

    /// Canonical key name that toggles the Stopped/Running lifecycle.
    /// Registered in Intercept mode regardless of the loaded profile and
    /// never removed by `clear_all()`.
    #[arg(long, default_value = "f8", value_name = "KEY")]
    pub lifecycle_key: String,

    /// Raw evdev device to read user keystrokes from. Defaults to stdin,
    /// matching the Interception Tools pipe convention
    /// (`intercept | dispatch-core | uinput`).
    #[arg(long, value_name = "PATH")]
    pub input_device: Option<PathBuf>,

    /// Raw evdev device (or uinput pipe) to write synthesized events to.
    /// Defaults to stdout.
    #[arg(long, value_name = "PATH")]
    pub output_device: Option<PathBuf>,

    /// List available input devices and their capabilities (requires root).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub list_devices: bool,

    /// Include the module target in log lines (in addition to the level).
    #[arg(short = 'v', long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    /// `tracing-subscriber` `EnvFilter` directive string. Overridden by
    /// the `RUST_LOG` environment variable when set.
    #[arg(long, default_value = "dispatch_core=info", value_name = "FILTER")]
    pub log_filter: String,

    /// OTLP collector endpoint for the optional metrics bridge. Metrics
    /// export is skipped entirely when unset.
    #[arg(long, value_name = "URL")]
    pub otel_endpoint: Option<String>,

    /// Emit the final dispatch statistics as a single JSON object on
    /// shutdown instead of a human-readable log line.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub stats_json: bool,

    /// Log a dispatch-statistics snapshot every N seconds while running.
    /// Omit to log only once, at shutdown.
    #[arg(long, value_name = "SECONDS")]
    pub log_interval: Option<u64>,
}

pub fn parse_args() -> Args {
    Args::parse()
}
