//! Upload telemetry for image archives.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const BYTES_PER_MB: u128 = 1024 * 1024;
const MICROS_PER_SEC: u128 = 1_000_000;

/// Progress bar tracking one archive upload.
#[derive(Debug)]
pub struct TransferProgress {
    bar: ProgressBar,
    started: Instant,
}

impl TransferProgress {
    /// Creates a bar drawn on stderr. It stays invisible when stderr is not a
    /// terminal.
    #[must_use]
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{prefix} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
        bar.set_style(style);
        bar.set_prefix(label.to_owned());
        Self {
            bar,
            started: Instant::now(),
        }
    }

    /// Creates a bar that never draws.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            started: Instant::now(),
        }
    }

    /// Records `sent` of `total` bytes.
    pub fn update(&self, sent: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(sent);
        self.bar.set_message(format!(
            "{}% {}",
            percentage(sent, total),
            throughput(sent, self.started.elapsed())
        ));
    }

    /// Clears the bar and returns a one-line summary for logging.
    #[must_use]
    pub fn finish(&self, sent: u64) -> String {
        self.bar.finish_and_clear();
        format!(
            "{sent} bytes in {:.1?} ({})",
            self.started.elapsed(),
            throughput(sent, self.started.elapsed())
        )
    }
}

/// Whole-number percentage of `sent` over `total`, capped at 100. An empty
/// transfer is complete.
#[must_use]
pub fn percentage(sent: u64, total: u64) -> u64 {
    sent.saturating_mul(100)
        .checked_div(total)
        .map_or(100, |percent| percent.min(100))
}

/// Renders bytes over elapsed time as `X.YY MB/s` (binary megabytes).
#[must_use]
pub fn throughput(bytes: u64, elapsed: Duration) -> String {
    let micros = elapsed.as_micros().max(1);
    let centi_mb = u128::from(bytes)
        .saturating_mul(100)
        .saturating_mul(MICROS_PER_SEC)
        .checked_div(micros.saturating_mul(BYTES_PER_MB))
        .unwrap_or(0);
    let whole = centi_mb.checked_div(100).unwrap_or(0);
    let fraction = centi_mb.checked_rem(100).unwrap_or(0);
    format!("{whole}.{fraction:02} MB/s")
}
