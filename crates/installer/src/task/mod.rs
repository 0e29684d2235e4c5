//! Task units and the context they run in
//!
//! A [`Task`] is one cancellable, progress-reporting unit of work. Tasks are
//! run through [`TaskContext::execute`], which gives each one a child context
//! and reports its lifecycle as [`TaskEvent`]s.

pub mod context;
pub mod error;
pub mod reporter;

pub use context::TaskContext;
pub use error::TaskError;
pub use reporter::{IntoTaskListener, TaskReporter, TracingTaskReporter};

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Lifecycle events emitted by task contexts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Start {
        path: String,
    },
    Update {
        path: String,
        progress: u64,
        total: Option<u64>,
        source: Option<String>,
    },
    Success {
        path: String,
    },
    Failed {
        path: String,
        error: String,
    },
    Cancelled {
        path: String,
    },
}

/// Receives every event of a context tree
pub type TaskListener = Arc<dyn Fn(TaskEvent) + Send + Sync>;

#[async_trait]
pub trait Task: Send + Sync {
    /// Segment used in the context path of this task
    fn name(&self) -> &str;

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError>;
}

/// Task backed by an async closure
pub struct FnTask<F> {
    name: String,
    run: F,
}

/// Wrap an async closure taking the task's own context
pub fn task_fn<S, F, Fut>(name: S, run: F) -> FnTask<F>
where
    S: Into<String>,
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    FnTask { name: name.into(), run }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        (self.run)(ctx.clone()).await
    }
}
