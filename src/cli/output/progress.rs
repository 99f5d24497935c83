//! Progress bar utilities using indicatif for terminal output

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::services::ApplyProgress;

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Create a standard progress bar drawn on stderr.
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars(PROGRESS_CHARS));
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Shows the engine's apply phase as a progress bar.
///
/// The bar is created lazily when the engine announces the number of steps,
/// so nothing is drawn for dry runs.
#[derive(Default)]
pub struct BarProgress {
    bar: std::cell::OnceCell<ProgressBar>,
}

impl BarProgress {
    /// No bar until apply starts.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApplyProgress for BarProgress {
    fn start(&self, steps: u64) {
        let _ = self.bar.set(create_progress_bar(steps));
    }

    fn step(&self, label: &str) {
        if let Some(bar) = self.bar.get() {
            bar.set_message(label.to_string());
            bar.inc(1);
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.get() {
            bar.finish_and_clear();
        }
    }
}
