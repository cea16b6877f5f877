use std::collections::HashMap;
use std::io::Stdout;

use log::{LevelFilter, max_level};
use pbr::{ProgressBar, Units};
use sammy_core::{Progress, ProgressSink};

/// One progress bar per partition name, created lazily on first update so a
/// multi-slot flash job prints a fresh bar for each partition in turn.
pub struct ProgressBarSink {
    bars: HashMap<String, ProgressBar<Stdout>>,
    should_log: bool,
}

impl ProgressBarSink {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            should_log: max_level() >= LevelFilter::Info,
        }
    }
}

impl ProgressSink for ProgressBarSink {
    fn on_progress(&mut self, progress: &Progress) {
        if !self.should_log {
            return;
        }

        let bar = self.bars.entry(progress.current_file.clone()).or_insert_with(|| {
            let mut bar = ProgressBar::new(progress.total_bytes);
            bar.set_units(Units::Bytes);
            bar.message(&format!("{}: ", progress.current_file));
            bar
        });

        bar.set(progress.current_bytes);

        if progress.current_bytes >= progress.total_bytes {
            bar.finish();
        }
    }
}
