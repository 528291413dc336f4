use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use parking_lot::RwLock;
use std::{
    sync::{Arc, Weak},
    time::Duration,
};

/// Global spinner which shows the latest info message of a running migration
pub struct Progress {
    inner: Option<Arc<ProgressBar>>,
}

static PROGRESS_BAR: RwLock<Option<Weak<ProgressBar>>> = RwLock::new(None);

impl Progress {
    /// Create a new global spinner. Nothing is shown for log levels below
    /// info or in verbose mode, where every message should stay visible.
    pub fn new(level: LevelFilter, verbose: bool) -> Progress {
        if level < LevelFilter::Info || verbose {
            return Progress { inner: None };
        }

        let p = Arc::new(ProgressBar::new_spinner());
        if let Ok(s) = ProgressStyle::default_spinner().template(&format!(
            "{}{}{} {}",
            style("[").white().dim(),
            "{spinner:.green} {elapsed:>3}",
            style("]").white().dim(),
            "{msg}",
        )) {
            p.set_style(s);
        }
        p.enable_steady_tick(Duration::from_millis(100));

        *PROGRESS_BAR.write() = Some(Arc::downgrade(&p));

        Progress { inner: Some(p) }
    }

    /// Get the global spinner, if any
    pub fn get() -> Option<Arc<ProgressBar>> {
        PROGRESS_BAR.read().as_ref()?.upgrade()
    }

    /// Reset and consume the spinner
    pub fn reset(self) {
        if let Some(p) = self.inner {
            p.finish_and_clear()
        }
        *PROGRESS_BAR.write() = None;
    }
}
