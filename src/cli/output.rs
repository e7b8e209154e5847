//! Output helpers for consistent CLI formatting

use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");

/// Display a title banner
pub fn intro(title: &str) {
    println!("{}", style(title).cyan().bold());
}

/// Display a section header
pub fn section(title: &str) {
    println!();
    println!("{}", style(title).bold());
}

/// Display a success step
pub fn step_ok(message: &str) {
    println!("  {}{}", CHECK, message);
}

/// Display a success step with dimmed detail
pub fn step_ok_detail(message: &str, detail: &str) {
    println!("  {}{} ({})", CHECK, message, style(detail).dim());
}

/// Display a warning step
pub fn step_warn(message: &str) {
    println!("  {}{}", WARN, style(message).yellow());
}

/// Display a warning step with a hint
pub fn step_warn_hint(message: &str, hint: &str) {
    println!("  {}{} - {}", WARN, style(message).yellow(), hint);
}

/// Display a failed step with detail
pub fn step_error_detail(message: &str, detail: &str) {
    println!("  {}{}: {}", CROSS, style(message).red(), detail);
}

/// Display a key/value line
pub fn key_value(key: &str, value: impl std::fmt::Display) {
    println!("  {:<20} {}", style(key).dim(), value);
}
