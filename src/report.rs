//! Terminal output for check reports and settings

use console::style;
use drift::{Category, DriftReport, Settings, TrackState};

fn not_configured_label(category: Category) -> &'static str {
    match category {
        Category::Uuid => "not applicable",
        Category::Default => "not controlling",
    }
}

fn shown(value: &str) -> &str {
    if value.is_empty() {
        "<none>"
    } else {
        value
    }
}

/// Print one status line per category
pub fn print_report(report: &DriftReport) {
    for (category, state) in report.tracks() {
        let name = format!("{:<8}", category.to_string());
        match state {
            TrackState::Matching { value } => {
                println!("{} {}  {}", style(name).bold(), style("OK").green().bold(), value);
            }
            TrackState::Mismatched { recorded, expected } => {
                println!(
                    "{} {}  recorded {}, detected {}",
                    style(name).bold(),
                    style("MISMATCH").red().bold(),
                    shown(recorded),
                    shown(expected)
                );
            }
            TrackState::NotConfigured => {
                println!(
                    "{} {}",
                    style(name).bold(),
                    style(not_configured_label(category)).dim()
                );
            }
        }
    }

    if report.has_drift() {
        println!();
        println!(
            "{} boot configuration drifted, run {} to record the current state",
            style("!").yellow().bold(),
            style("sdboot-manager --repair").cyan()
        );
    }
}

/// Print recorded settings
pub fn print_settings(settings: &Settings) {
    let device = settings
        .root_device
        .as_deref()
        .unwrap_or("no matching device");

    println!("{}", style("Recorded settings").bold().underlined());
    println!("  Root UUID:     {} ({})", shown(&settings.root_uuid), device);
    println!("  Default entry: {}", settings.default_entry);
}

/// Print a top-level error
pub fn print_error(err: &anyhow::Error) {
    for cause in err.chain() {
        if let Some(drift::Error::DeviceQuery { stderr, .. }) = cause.downcast_ref::<drift::Error>() {
            eprint!("{}", stderr);
        }
    }

    eprintln!("{}: {:#}", style("Error").red().bold(), err);

    let corrupted = err
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<drift::Error>(), Some(drift::Error::CorruptedSettings(_))));
    if corrupted {
        eprintln!("Run {} to record the current state.", style("sdboot-manager --repair").cyan());
    }
}

/// Print a warning
pub fn print_warning(message: &str) {
    eprintln!("{}: {}", style("Warning").yellow().bold(), message);
}
