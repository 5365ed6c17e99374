//! Progress bars for the CLI, fed by the engine's rate-limited reports.

use fastget_core::{ProgressObserver, ProgressReport};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Draws one download's progress as an indicatif bar.
///
/// indicatif hides the bar by itself when stderr is not a terminal.
pub(crate) struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    /// Creates a bar labelled `label`, attached to `multi` for batch runs.
    pub(crate) fn new(multi: Option<&MultiProgress>, label: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(label.to_string());
        let bar = match multi {
            Some(multi) => multi.add(bar),
            None => bar,
        };
        Self { bar }
    }

    fn update(&self, report: &ProgressReport) {
        if let Some(total) = report.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(report.done);
        self.bar.set_message(report.to_string());
    }
}

impl ProgressObserver for BarObserver {
    fn on_progress(&self, report: &ProgressReport) {
        self.update(report);
    }

    fn on_finish(&self, report: &ProgressReport) {
        self.update(report);
        self.bar.finish();
    }
}

impl Drop for BarObserver {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
