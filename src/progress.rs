//! Phase reporting for the merge pipeline.
//!
//! A `Phase` owns one indicatif bar (row count known) or spinner (row count
//! unknown). With log-only mode on, nothing is drawn and each phase prints
//! plain `[phase] ...` lines to stderr instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})";
const SPINNER_TEMPLATE: &str = "{msg} {spinner} [{elapsed_precise}] {pos} rows";

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

/// One reported step of a run.
pub struct Phase {
    label: String,
    pb: ProgressBar,
    total: Option<u64>,
    log_every: u64,
}

impl Phase {
    /// Phase over a known number of rows, logged every `log_every` rows in log-only mode.
    pub fn rows(label: impl Into<String>, total: u64, log_every: u64) -> Self {
        let pb = ProgressBar::new(total);
        if !is_log_only() {
            let style = ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            pb.set_style(style);
        }
        Self::start(label.into(), pb, Some(total), log_every.max(1))
    }

    /// Phase of unknown length, shown as a spinner.
    pub fn open(label: impl Into<String>) -> Self {
        let pb = ProgressBar::new_spinner();
        if !is_log_only() {
            let style = ProgressStyle::default_spinner()
                .template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(100));
        }
        Self::start(label.into(), pb, None, u64::MAX)
    }

    fn start(label: String, pb: ProgressBar, total: Option<u64>, log_every: u64) -> Self {
        if is_log_only() {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_message(label.clone());
        Self {
            label,
            pb,
            total,
            log_every,
        }
    }

    /// Count one processed row.
    pub fn tick(&self) {
        self.pb.inc(1);
        if let (true, Some(total)) = (is_log_only(), self.total) {
            let pos = self.pb.position();
            if total > 0 && (pos % self.log_every == 0 || pos == total) {
                eprintln!(
                    "[{}] {}/{} ({:.1}%)",
                    self.label,
                    pos,
                    total,
                    100.0 * pos as f64 / total as f64
                );
            }
        }
    }

    pub fn position(&self) -> u64 {
        self.pb.position()
    }

    /// Close the phase with a summary line.
    pub fn finish(self, summary: impl Into<String>) {
        let summary = summary.into();
        if is_log_only() {
            eprintln!("[{}] {}", self.label, summary);
        }
        self.pb.finish_with_message(format!("{}: {}", self.label, summary));
    }
}
