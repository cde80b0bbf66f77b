use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// One tick per retrieval unit. Hidden when `silent` (no terminal, tests).
pub struct ProgressReporter {
    progress_bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(units: u64, message: &str, silent: bool) -> Self {
        if silent || units == 0 {
            return Self { progress_bar: None };
        }

        let pb = ProgressBar::new(units);
        let style = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            progress_bar: Some(pb),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.progress_bar.is_some()
    }

    pub fn increment(&self, delta: u64) {
        if let Some(pb) = &self.progress_bar {
            pb.inc(delta);
        }
    }

    pub fn finish_with_message(&self, message: &str) {
        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(pb) = &self.progress_bar {
            if !pb.is_finished() {
                pb.abandon();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_reporter_is_inert() {
        let progress = ProgressReporter::new(4, "Running all", true);
        assert!(!progress.is_visible());
        progress.increment(1);
        progress.finish_with_message("done");

        assert!(!ProgressReporter::new(0, "Running all", false).is_visible());
    }
}
