//! CLI output formatting.
//!
//! Human-readable output uses colored symbols; JSON mode prints one JSON
//! document per command for scripting.

use std::fmt::Display;
use std::sync::OnceLock;

use owo_colors::OwoColorize;
use parking_lot::RwLock;
use serde::Serialize;

/// Runtime output configuration shared by CLI handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Emit machine-readable JSON output instead of human-readable text.
    pub json: bool,
    /// Suppress non-essential output.
    pub quiet: bool,
}

static OUTPUT_CONFIG: OnceLock<RwLock<OutputConfig>> = OnceLock::new();

fn config_cell() -> &'static RwLock<OutputConfig> {
    OUTPUT_CONFIG.get_or_init(|| RwLock::new(OutputConfig::default()))
}

fn read_config() -> OutputConfig {
    *config_cell().read()
}

/// Text output is suppressed in JSON and quiet modes.
fn text_suppressed() -> bool {
    let config = read_config();
    config.json || config.quiet
}

/// Apply output settings from global CLI flags.
pub fn configure(config: OutputConfig) {
    *config_cell().write() = config;
}

#[must_use]
pub fn is_json() -> bool {
    read_config().json
}

/// Print a serializable value as one JSON document.
pub fn json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => error(&format!("Cannot encode output: {e}")),
    }
}

/// Print the application header with name and version.
pub fn header(version: &str) {
    if text_suppressed() {
        return;
    }
    println!("{} {}", "poolkeeper".bold(), version.dimmed());
    println!();
}

/// Print a section header.
pub fn section(title: &str) {
    if text_suppressed() {
        return;
    }
    println!();
    println!("{}", title.bold());
}

/// Print a labeled value.
pub fn field(label: &str, value: impl Display) {
    if text_suppressed() {
        return;
    }
    println!("  {:<14} {}", label.dimmed(), value);
}

/// Print a pass/fail line.
pub fn check(passed: bool, message: &str) {
    if passed {
        success(message);
    } else {
        failure(message);
    }
}

pub fn success(message: &str) {
    if text_suppressed() {
        return;
    }
    println!("  {} {}", "✓".green(), message);
}

pub fn failure(message: &str) {
    if is_json() {
        return;
    }
    println!("  {} {}", "✗".red(), message);
}

pub fn warning(message: &str) {
    if is_json() {
        return;
    }
    println!("  {} {}", "⚠".yellow(), message);
}

/// Print an error line to stderr. Shown in every mode.
pub fn error(message: &str) {
    if is_json() {
        eprintln!("{}", serde_json::json!({ "error": message }));
        return;
    }
    eprintln!("  {} {}", "×".red(), message);
}

/// Format a dimmed/muted value.
pub fn muted(value: impl Display) -> String {
    format!("{}", value.to_string().dimmed())
}
