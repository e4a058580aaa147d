use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use clap_complete_nushell::Nushell;
use clap_mangen::Man;
use dispatch_core::cli::Args;

use std::io::Write;
use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Command,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct XtaskArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Generate man page and shell completions.
    GenerateDocs,
    /// Run cargo check.
    Check,
    /// Run cargo test.
    Test,
    /// Run cargo clippy.
    Clippy,
    /// Run cargo fmt --check.
    FmtCheck,
}

fn main() -> Result<()> {
    let args = XtaskArgs::parse();

    match args.command {
        Commands::GenerateDocs => generate_docs().context("Failed to generate docs"),
        Commands::Check => run_cargo("check", &[]).context("cargo check failed"),
        Commands::Test => run_cargo("test", &[]).context("cargo test failed"),
        Commands::Clippy => {
            run_cargo("clippy", &["--", "-D", "warnings"]).context("cargo clippy failed")
        }
        Commands::FmtCheck => run_cargo("fmt", &["--", "--check"]).context("cargo fmt failed"),
    }
}

fn run_cargo(command: &str, args: &[&str]) -> Result<()> {
    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let mut cmd = Command::new(cargo);
    cmd.arg(command);
    cmd.args(args);
    // Run in the workspace root
    cmd.current_dir(project_root());

    let status = cmd
        .status()
        .context(format!("Failed to execute cargo {command}"))?;

    if !status.success() {
        anyhow::bail!("cargo {command} command failed");
    }
    Ok(())
}

fn project_root() -> PathBuf {
    Path::new(&env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(1)
        .unwrap()
        .to_path_buf()
}

fn generate_docs() -> Result<()> {
    let root_dir = project_root();
    let docs_dir = root_dir.join("docs");
    let man_dir = docs_dir.join("man");
    let completions_dir = docs_dir.join("completions");

    fs::create_dir_all(&man_dir).context("Failed to create man directory")?;
    fs::create_dir_all(&completions_dir).context("Failed to create completions directory")?;

    let cmd = Args::command();
    let bin_name = cmd.get_name().to_string();

    // --- Generate Man Page ---
    let man_path = man_dir.join(format!("{bin_name}.1"));
    println!("Generating man page: {man_path:?}");
    generate_man_page(&cmd, &man_path)?;

    // --- Generate Shell Completions ---
    generate_completions(&cmd, &completions_dir)?;

    println!(
        "Successfully generated man page and completions in: {}",
        docs_dir.display()
    );
    Ok(())
}

// --- Man Page Content Constants ---
// Note: Using roff formatting. \fB...\fR = bold, \fI...\fR = italic, \- = hyphen, \(bu = bullet

// clap_mangen generates the DESCRIPTION section from the command's about/long_about.

const MAN_ARCHITECTURE: &str = r#"
.B Components
.PP
\fB{bin_name}\fR is built from six cooperating components, each driven by its own thread:
.IP \(bu 4
\fBHotkey Interceptor\fR (T-Hook): reads raw keystroke edges from the input device and classifies each registered key into one of five hook modes (Intercept, Priority, Special, Monitor, Block).
.IP \(bu 4
\fBPriority Input Executor\fR (T-Executor): drains a four-level priority queue (Emergency, High, Normal, Low) and writes the resulting key presses, releases, and mouse clicks to the output device, honoring any configured per-action delay.
.IP \(bu 4
\fBPeriodic Scheduler\fR (T-Sched): fires timer-mode skill callbacks at their configured interval using a lazily-deleted min-heap, pausing and resuming in step with the macro lifecycle without a catch-up burst.
.IP \(bu 4
\fBMacro Controller\fR: a four-state lifecycle (Stopped, Ready, Running, Paused) toggled by a single lifecycle hotkey, wiring the event bus subscriptions that connect the other components together.
.IP \(bu 4
\fBEvent Bus\fR: an in-process topic-based publish/subscribe channel used for cross-component notifications (managed-key activations, special-key pause windows, handler failures).
.IP \(bu 4
\fBMonotonic Clock\fR: the shared time source behind every delay and scheduling decision, abstracted so tests can drive it deterministically.
.PP
.B Self-Interception Avoidance
.PP
Actions the executor writes to the output device must never be re-read as user input and reclassified by the hotkey interceptor. In the real split-device deployment this can't happen structurally (input and output are different devices); a synthetic-write guard exists for loopback test harnesses where it can.
"#;

const MAN_SKILLS: &str = r#"
.B Trigger Modes
.PP
A skill entry in the configuration profile declares a \fItrigger_mode\fR of \fBTimer\fR, \fBCooldown\fR, or \fBHold\fR.
.IP \(bu 4
\fBTimer\fR skills carry an \fIinterval_ms\fR and are registered directly with the periodic scheduler when the macro enters the Ready state; each firing publishes a \fBskill:<id>:due\fR bus event carrying the skill's priority.
.IP \(bu 4
\fBCooldown\fR and \fBHold\fR skills are detected by an external decision layer (outside this engine's scope) that watches game state and enqueues the resulting action directly with the executor; they are not registered with the scheduler.
.PP
Re-entering the Ready state does not duplicate a timer skill's scheduled task; registration is keyed by skill id.
"#;

const MAN_EXAMPLES: &str = r#"
.PP
.B Basic Usage (piped through Interception Tools):
.IP
.nf
sudo sh \-c 'intercept \-g /dev/input/by\-id/your\-kbd\-event\-kbd | {bin_name} \-\-config profile.toml | uinput \-d /dev/input/by\-id/your\-kbd\-event\-kbd'
.fi
.PP
Reads raw keystrokes from the physical keyboard, dispatches through the configured profile, and writes the result to a new virtual keyboard device via \fBuinput\fR. Applications should use the virtual device \fBuinput\fR creates.
.PP
.B Overriding Emergency Keys from the Command Line:
.IP
.nf
sudo sh \-c 'intercept \-g ... | {bin_name} \-\-config profile.toml \-\-emergency\-hp\-key 1 \-\-emergency\-mp\-key 2 | uinput \-d ...'
.fi
.PP
.B Custom Lifecycle Hotkey:
.IP
.nf
sudo sh \-c 'intercept \-g ... | {bin_name} \-\-config profile.toml \-\-lifecycle\-key f9 | uinput \-d ...'
.fi
.PP
Changes the hotkey that cycles the macro through Stopped/Ready/Running/Paused from the default \fBf8\fR.
.PP
.B List Input Devices:
.IP
.nf
sudo {bin_name} \-\-list\-devices
.fi
.PP
List available input devices with keyboard capabilities. Useful for finding the correct device path for \fBintercept \-g\fR. Requires read access to /dev/input/event*.
"#;

const MAN_INTEGRATION: &str = r#"
\fB{bin_name}\fR is designed to work with Interception Tools. It can be used in pipelines or within a \fBudevmon\fR(1) configuration file (\fIudevmon.yaml\fR).
.PP
.B Pipeline Usage
.PP
The standard usage involves a pipeline: \fBintercept\fR -> \fB{bin_name}\fR -> \fBuinput\fR.
.IP \(bu 4
\fBintercept \-g <device>\fR: Captures raw input events from the specified hardware device.
.IP \(bu 4
\fB{bin_name} [OPTIONS]\fR: Reads events from the input device (or stdin), dispatches them, and writes the resulting events to the output device (or stdout).
.IP \(bu 4
\fBuinput \-d <device>\fR: Reads the dispatched events and creates a new virtual input device mirroring the original device's capabilities.
.PP
.B Virtual Device
.PP
\fBuinput\fR creates a \fInew\fR virtual input device. Applications and the desktop environment must be configured to use \fIthis new virtual device\fR instead of the original physical keyboard.
.PP
.B udevmon Integration
.IP
.nf
# Example /etc/interception/udevmon.yaml entry
\- JOB: intercept \-g $DEVNODE | {bin_name} \-\-config profile.toml | uinput \-d $DEVNODE
  DEVICE:
    LINK: /dev/input/by\-id/usb\-Your_Keyboard_Name\-event\-kbd
.fi
"#;

const MAN_LOGGING: &str = r#"
\fB{bin_name}\fR writes structured log lines to standard error via the \fBtracing\fR framework.
.PP
.B Flags:
.IP "\fB\-\-verbose\fR" 4
Include the module target in log lines, in addition to the level.
.IP "\fB\-\-log\-filter\fR" 4
A \fBtracing_subscriber::EnvFilter\fR directive string; defaults to \fBdispatch_core=info\fR.
.PP
.B Environment Variable: RUST_LOG
.IP
Overrides \fB\-\-log\-filter\fR when set. Examples:
.RS 4
.IP "\fBRUST_LOG=info\fR" 4
Default level.
.IP "\fBRUST_LOG=debug\fR" 4
Shows internal state transitions and thread lifecycle events.
.IP "\fBRUST_LOG=dispatch_core::executor=trace\fR" 4
Trace-level logging scoped to a single module.
.RE
.PP
.B Dispatch statistics:
.IP "\fB\-\-stats\-json\fR" 4
Emit the final per\-priority enqueue/processed/failure counters as a single JSON object on shutdown instead of a human\-readable log line.
.IP "\fB\-\-log\-interval\fR \fISECONDS\fR" 4
Additionally log the same counters at this cadence while running.
"#;

const MAN_SIGNALS: &str = r#"
\fB{bin_name}\fR handles the following signals gracefully to ensure a clean shutdown:
.IP \(bu 4
SIGINT (Interrupt, typically Ctrl+C)
.IP \(bu 4
SIGTERM (Termination signal)
.IP \(bu 4
SIGQUIT (Quit signal)
.PP
On receipt of any of these, the macro controller transitions to the Stopped state, then each component thread (T-Hook, T-Executor, T-Sched) is signaled to stop and joined before the process exits.
"#;

const MAN_EXIT_STATUS: &str = r#"
.IP 0 4
Success. Clean shutdown following a handled signal.
.IP 1 4
Invalid lifecycle transition, or the configuration profile could not be read.
.IP 2 4
Unknown key name in the configuration or command-line flags, or a device listing error under \fB\-\-list\-devices\fR.
.IP 3 4
Hook registration with the input device failed.
.IP 4 4
Duplicate scheduler task id.
.IP 5 4
Operation attempted while a shutdown was already in progress.
"#;

const MAN_ENVIRONMENT: &str = r#"
.TP
.B RUST_LOG
Controls logging verbosity and filtering, overriding \fB\-\-log\-filter\fR. See the LOGGING section.
.TP
.B RUST_BACKTRACE
Set to \fB1\fR or \fBfull\fR to enable backtraces on panic.
"#;

const MAN_SEE_ALSO: &str = r#"
\fBintercept\fR(1), \fBuinput\fR(1), \fBudevmon\fR(1), \fBinput_event\fR(5), \fBlibinput\fR(1)
.PP
Interception Tools Project: https://gitlab.com/interception/linux/tools
"#;

/// Generates the man page with custom sections.
fn generate_man_page(cmd: &clap::Command, path: &Path) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    // Format date like 'Month Day, Year' e.g., "July 18, 2024"
    let date = chrono::Local::now().format("%B %d, %Y").to_string();
    let app_name_uppercase = cmd.get_name().to_uppercase();
    let bin_name = cmd.get_name();

    let mut buffer: Vec<u8> = Vec::new();

    // Render the standard sections (NAME, SYNOPSIS, DESCRIPTION, OPTIONS, AUTHOR) using clap_mangen
    writeln!(
        buffer,
        r#".TH "{app_name_uppercase}" 1 "{date}" "{version}" "User Commands""#
    )?;
    Man::new(cmd.clone()).render(&mut buffer)?;

    // --- Append Custom Sections ---
    let custom_sections = [
        ("ARCHITECTURE", MAN_ARCHITECTURE),
        ("SKILLS", MAN_SKILLS),
        ("EXAMPLES", MAN_EXAMPLES),
        ("INTEGRATION", MAN_INTEGRATION),
        ("LOGGING", MAN_LOGGING),
        ("SIGNALS", MAN_SIGNALS),
        ("EXIT STATUS", MAN_EXIT_STATUS),
        ("ENVIRONMENT", MAN_ENVIRONMENT),
        ("SEE ALSO", MAN_SEE_ALSO),
    ];

    for (title, content_template) in custom_sections {
        writeln!(buffer, ".SH {title}")?;
        let formatted_content = content_template.replace("{bin_name}", bin_name);
        writeln!(buffer, "{formatted_content}")?;
    }

    fs::write(path, buffer).with_context(|| format!("Failed to write man page to {path:?}"))?;
    Ok(())
}

/// Generates shell completion files.
fn generate_completions(cmd: &clap::Command, completions_dir: &Path) -> Result<()> {
    let bin_name = cmd.get_name();
    let shells = [
        Shell::Bash,
        Shell::Elvish,
        Shell::Fish,
        Shell::PowerShell,
        Shell::Zsh,
    ];

    for shell in shells {
        let ext = match shell {
            Shell::Bash => "bash",
            Shell::Elvish => "elv",
            Shell::Fish => "fish",
            Shell::PowerShell => "ps1",
            Shell::Zsh => "zsh",
            _ => continue,
        };
        let completions_path = completions_dir.join(format!("{bin_name}.{ext}"));
        println!("Generating completion file: {completions_path:?}");
        let mut file = fs::File::create(&completions_path)
            .with_context(|| format!("Failed to create completion file: {completions_path:?}"))?;
        generate(shell, &mut cmd.clone(), bin_name, &mut file);
    }

    // Generate Nushell Completion
    let nu_path = completions_dir.join(format!("{bin_name}.nu"));
    println!("Generating Nushell completion file: {nu_path:?}");
    let mut nu_file = fs::File::create(&nu_path)
        .with_context(|| format!("Failed to create Nushell completion file: {nu_path:?}"))?;
    generate(Nushell, &mut cmd.clone(), bin_name, &mut nu_file);

    Ok(())
}
