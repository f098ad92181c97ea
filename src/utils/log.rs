// src/utils/log.rs

//! Presentation helpers for run output.
//!
//! Everything goes through the `log` facade so the binary's logger decides
//! formatting and filtering.

/// Width of header and separator rules.
const RULE_WIDTH: usize = 60;

/// Log an info message
pub fn info(message: &str) {
    log::info!("{}", message);
}

/// Log a warning message
pub fn warn(message: &str) {
    log::warn!("{}", message);
}

/// Log an error message
pub fn error(message: &str) {
    log::error!("{}", message);
}

/// Log a success message
pub fn success(message: &str) {
    log::info!("✓ {}", message);
}

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("[STEP {}/{}] {}", step_num, total, message);
}

/// Log a separator line
pub fn separator() {
    log::info!("{}", "─".repeat(RULE_WIDTH));
}

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(RULE_WIDTH);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Format a progress line, e.g. `listing: 40/120 (33.3%)`.
pub fn progress_line(label: &str, processed: usize, total: usize) -> String {
    if total == 0 {
        return format!("{label}: {processed}/?");
    }
    let percent = processed as f64 / total as f64 * 100.0;
    format!("{label}: {processed}/{total} ({percent:.1}%)")
}
