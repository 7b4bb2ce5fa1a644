//! CLI-specific progress handling for butterfly-probe
//!
//! Provides the progress bar shown while the worker pool drains its items.

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = concat!(
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] ",
    "{pos}/{len} ({percent}%) {per_sec} ETA: {eta}"
);

/// Creates a progress bar counting completed work items
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(TEMPLATE)
            .expect("Failed to create progress style")
            .progress_chars("#>-"),
    );
    pb
}

/// Progress manager for one pipeline run
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager; `verbose` also echoes `message`
    pub fn new(total: u64, message: &str, verbose: bool) -> Self {
        let pb = create_progress_bar(total);

        if verbose {
            eprintln!("{}", message);
        }

        Self { pb }
    }

    /// Count one completed item
    pub fn tick(&self) {
        self.pb.inc(1);
    }

    pub fn finish(&self, message: &'static str) {
        self.pb.finish_with_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_progress_bar_template() {
        let pb = create_progress_bar(1000);

        assert_eq!(pb.length().unwrap(), 1000);

        // The template string must parse for this not to panic
        pb.set_position(100);
        pb.finish();
    }

    #[test]
    fn test_progress_manager_counts_items() {
        let manager = ProgressManager::new(3, "Test run", false);
        manager.tick();
        manager.tick();
        assert_eq!(manager.pb.position(), 2);
        manager.finish("done");
    }
}
