//! Progress bars for the long-running stages of a run
//!
//! Bars draw to stderr and are hidden when progress is disabled (tests,
//! `--format json`), so callers never need to branch on it.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str = "{msg:>20} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";

/// Bar over a known number of rows.
pub fn create_progress_bar(enabled: bool, total: u64, message: &str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Spinner for stages without a row count (extraction).
pub fn create_spinner(enabled: bool, message: &str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
