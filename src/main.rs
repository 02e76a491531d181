//! sdboot-manager
//!
//! Keeps the systemd-boot configuration in line with the installed system:
//! edits loader.conf, records the root partition and default entry, and
//! reports or repairs drift from those records.

mod report;
mod system;

use anyhow::{Context, Result};
use clap::{ArgGroup, CommandFactory, Parser, ValueEnum};
use config::{loader_conf, ConfigError, ConfigLoader, EditorMode, ManagerConfig, SetOutcome};
use drift::{apply_loader_config, DriftChecker, LoaderEntries};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use system::PrivilegeError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// systemd-boot manager - keep loader configuration in line with the system
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["check", "repair", "show_settings", "timeout", "editor", "apply_loader_config", "completions"])
))]
struct Args {
    /// Report drift between recorded and detected boot state
    #[arg(short, long)]
    check: bool,

    /// Record the detected boot state, apply it and check again
    #[arg(short, long)]
    repair: bool,

    /// Show the recorded root partition and default entry
    #[arg(short, long)]
    show_settings: bool,

    /// Set the boot menu timeout in seconds
    #[arg(short, long, value_name = "SECONDS", allow_hyphen_values = true)]
    timeout: Option<String>,

    /// Enable or disable the boot menu editor
    #[arg(long, value_enum, value_name = "MODE")]
    editor: Option<EditorArg>,

    /// Rewrite the live loader.conf from the working copy
    #[arg(long)]
    apply_loader_config: bool,

    /// Print a shell completion script
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<clap_complete::Shell>,

    /// Configuration directory
    #[arg(long, env = config::env_vars::CONFIG_DIR, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EditorArg {
    Enable,
    Disable,
}

impl From<EditorArg> for EditorMode {
    fn from(arg: EditorArg) -> Self {
        match arg {
            EditorArg::Enable => EditorMode::Enable,
            EditorArg::Disable => EditorMode::Disable,
        }
    }
}

/// Filter used when `RUST_LOG` is unset
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "sdboot_manager=debug,sdboot_drift=debug,sdboot_config=debug,info"
    } else {
        "warn"
    }
}

fn init_logging(verbose: bool) {
    let filter = default_filter(verbose);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            report::print_error(&e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(args: &Args) -> Result<u8> {
    if let Some(shell) = args.completions {
        let mut cmd = Args::command();
        clap_complete::generate(shell, &mut cmd, "sdboot-manager", &mut std::io::stdout());
        return Ok(0);
    }

    let root = config::get_config_root(args.config_dir.as_deref());
    let mut config = ConfigLoader::new(&root)
        .load()
        .with_context(|| format!("Failed to load configuration from {}", root.display()))?;
    if args.no_color {
        config.color = false;
    }
    if !config.color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    tracing::debug!(?config, "Configuration loaded");

    if args.check {
        cmd_check(&config)
    } else if args.repair {
        cmd_repair(&config)
    } else if args.show_settings {
        cmd_show_settings(&config)
    } else if let Some(raw) = &args.timeout {
        cmd_timeout(&config, raw)
    } else if let Some(mode) = args.editor {
        cmd_editor(&config, mode.into())
    } else {
        cmd_apply_loader_config(&config)
    }
}

fn cmd_check(config: &ManagerConfig) -> Result<u8> {
    let report = DriftChecker::from_config(config).check()?;
    report::print_report(&report);
    Ok(if report.has_drift() { 1 } else { 0 })
}

fn cmd_repair(config: &ManagerConfig) -> Result<u8> {
    system::require_root("repair the boot configuration")?;

    let report = DriftChecker::from_config(config).repair()?;
    println!("Recorded the detected boot state.");
    report::print_report(&report);
    Ok(if report.has_drift() { 1 } else { 0 })
}

fn cmd_show_settings(config: &ManagerConfig) -> Result<u8> {
    let settings = DriftChecker::from_config(config).settings()?;
    report::print_settings(&settings);
    Ok(0)
}

fn cmd_timeout(config: &ManagerConfig, raw: &str) -> Result<u8> {
    system::require_root("change the boot menu timeout")?;

    let outcome = loader_conf::set_timeout(&config.loader_conf, raw)?;
    report_outcome(&config.loader_conf, "timeout", outcome, &format!("Timeout set to {}", raw));
    Ok(0)
}

fn cmd_editor(config: &ManagerConfig, mode: EditorMode) -> Result<u8> {
    system::require_root("change the boot menu editor")?;

    let outcome = loader_conf::set_editor(&config.loader_conf, mode)?;
    report_outcome(&config.loader_conf, "editor", outcome, &format!("Editor {}", mode));
    Ok(0)
}

fn cmd_apply_loader_config(config: &ManagerConfig) -> Result<u8> {
    system::require_root("write the live loader configuration")?;

    let entries = LoaderEntries::new(config);
    apply_loader_config(&entries).with_context(|| {
        format!(
            "Failed to write {}",
            entries.live_loader_conf().display()
        )
    })?;
    println!("Wrote {}", entries.live_loader_conf().display());
    Ok(0)
}

fn report_outcome(path: &Path, key: &str, outcome: SetOutcome, done: &str) {
    match outcome {
        SetOutcome::Updated => {
            println!("{} (apply with --apply-loader-config)", done);
        }
        SetOutcome::KeyMissing => report::print_warning(&format!(
            "{} does not declare '{}', nothing was changed",
            path.display(),
            key
        )),
    }
}

/// Map an error to the process exit code
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<PrivilegeError>().is_some() {
            return 2;
        }
        if let Some(ConfigError::Validation(_)) = cause.downcast_ref::<ConfigError>() {
            return 2;
        }
        if let Some(e) = cause.downcast_ref::<drift::Error>() {
            match e {
                drift::Error::DeviceQuery { code, .. } => return u8::try_from(*code).unwrap_or(1),
                drift::Error::CorruptedSettings(_) => return 2,
                drift::Error::Config(ConfigError::Validation(_)) => return 2,
                _ => {}
            }
        }
    }
    1
}
