//! Task event reporting

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::task::{TaskEvent, TaskListener};

/// Trait for task reporting with per-event hooks
pub trait TaskReporter: Send + Sync {
    fn on_start(&self, _path: &str) {}
    fn on_update(&self, _path: &str, _progress: u64, _total: Option<u64>, _source: Option<&str>) {}
    fn on_success(&self, _path: &str) {}
    fn on_failed(&self, _path: &str, _error: &str) {}
    fn on_cancelled(&self, _path: &str) {}
}

/// Extension trait to convert a TaskReporter into a TaskListener
pub trait IntoTaskListener {
    fn into_listener(self) -> TaskListener;
}

impl<T: TaskReporter + 'static> IntoTaskListener for T {
    fn into_listener(self) -> TaskListener {
        Arc::new(move |event: TaskEvent| match event {
            TaskEvent::Start { path } => self.on_start(&path),
            TaskEvent::Update { path, progress, total, source } => {
                self.on_update(&path, progress, total, source.as_deref())
            }
            TaskEvent::Success { path } => self.on_success(&path),
            TaskEvent::Failed { path, error } => self.on_failed(&path, &error),
            TaskEvent::Cancelled { path } => self.on_cancelled(&path),
        })
    }
}

/// Reporter that writes task events to `tracing`
#[derive(Debug, Default)]
pub struct TracingTaskReporter {
    /// Also log every progress update at debug level
    pub verbose: bool,
}

impl TracingTaskReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for TracingTaskReporter {
    fn on_start(&self, path: &str) {
        debug!("Task started: {}", path);
    }

    fn on_update(&self, path: &str, progress: u64, total: Option<u64>, source: Option<&str>) {
        if !self.verbose {
            return;
        }
        match total {
            Some(total) => debug!("{}: {}/{} ({})", path, progress, total, source.unwrap_or("-")),
            None => debug!("{}: {} ({})", path, progress, source.unwrap_or("-")),
        }
    }

    fn on_success(&self, path: &str) {
        info!("Task finished: {}", path);
    }

    fn on_failed(&self, path: &str, error: &str) {
        warn!("Task failed: {}: {}", path, error);
    }

    fn on_cancelled(&self, path: &str) {
        info!("Task cancelled: {}", path);
    }
}
