//! Progress, pause and cancellation context handed to running tasks

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::downloader::core::PauseHandle;
use crate::task::{Task, TaskError, TaskEvent, TaskListener};

/// Shared handle to one node of the task tree.
///
/// Cloning is cheap; clones observe the same progress, pause registration and
/// cancellation state. Children created by [`TaskContext::execute`] inherit
/// the listener, are cancelled together with their parent and are paused or
/// resumed with it while they run.
#[derive(Clone)]
pub struct TaskContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    path: String,
    progress: AtomicU64,
    total: Mutex<Option<u64>>,
    pause: Mutex<Option<PauseHandle>>,
    /// Contexts currently running under [`TaskContext::execute`]
    children: Mutex<Vec<TaskContext>>,
    token: CancellationToken,
    listener: Option<TaskListener>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps a child registered with its parent while it runs
struct LiveChild<'a> {
    parent: &'a TaskContext,
    child: TaskContext,
}

impl<'a> LiveChild<'a> {
    fn attach(parent: &'a TaskContext, child: TaskContext) -> Self {
        lock(&parent.inner.children).push(child.clone());
        Self { parent, child }
    }
}

impl Drop for LiveChild<'_> {
    fn drop(&mut self) {
        lock(&self.parent.inner.children).retain(|c| !Arc::ptr_eq(&c.inner, &self.child.inner));
    }
}

impl TaskContext {
    /// Root context without a listener
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self::build(name.into(), CancellationToken::new(), None)
    }

    /// Root context whose events (and its children's) go to `listener`
    pub fn with_listener<S: Into<String>>(name: S, listener: TaskListener) -> Self {
        Self::build(name.into(), CancellationToken::new(), Some(listener))
    }

    fn build(path: String, token: CancellationToken, listener: Option<TaskListener>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                path,
                progress: AtomicU64::new(0),
                total: Mutex::new(None),
                pause: Mutex::new(None),
                children: Mutex::new(Vec::new()),
                token,
                listener,
            }),
        }
    }

    fn child(&self, name: &str) -> Self {
        Self::build(
            format!("{}.{}", self.inner.path, name),
            self.inner.token.child_token(),
            self.inner.listener.clone(),
        )
    }

    /// Dotted path from the root context
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn progress(&self) -> u64 {
        self.inner.progress.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Option<u64> {
        *lock(&self.inner.total)
    }

    /// Record absolute progress; a `None` total keeps the previous one
    pub fn update(&self, progress: u64, total: Option<u64>, source: Option<&str>) {
        self.inner.progress.store(progress, Ordering::Relaxed);
        if total.is_some() {
            *lock(&self.inner.total) = total;
        }
        self.emit(TaskEvent::Update {
            path: self.inner.path.clone(),
            progress,
            total: self.total(),
            source: source.map(str::to_string),
        });
    }

    fn advance(&self, amount: u64) {
        let progress = self.inner.progress.fetch_add(amount, Ordering::Relaxed) + amount;
        self.emit(TaskEvent::Update {
            path: self.inner.path.clone(),
            progress,
            total: self.total(),
            source: None,
        });
    }

    /// Install (or clear with `None`) the pause capability of the live transfer
    pub fn register_pause(&self, handle: Option<PauseHandle>) {
        *lock(&self.inner.pause) = handle;
    }

    /// Pause the live transfer of this context and of every running child.
    /// Returns `false` when nothing is pausable.
    pub fn pause(&self) -> bool {
        self.set_paused(true)
    }

    /// Resume everything [`TaskContext::pause`] reaches.
    /// Returns `false` when nothing is pausable.
    pub fn resume(&self) -> bool {
        self.set_paused(false)
    }

    fn set_paused(&self, paused: bool) -> bool {
        let own = lock(&self.inner.pause).clone();
        let mut reached = match own {
            Some(handle) if paused => {
                handle.pause();
                true
            }
            Some(handle) => {
                handle.resume();
                true
            }
            None => false,
        };

        // Snapshot so no lock is held while descending.
        let children = lock(&self.inner.children).clone();
        for child in children {
            reached |= child.set_paused(paused);
        }
        reached
    }

    /// Cancel this context and every context executed under it
    pub fn cancel(&self) {
        debug!("Cancelling task {}", self.inner.path);
        self.inner.token.cancel();
        // A paused stream has to reach its next tick to observe the cancel.
        self.resume();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Wait until this context is cancelled
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Run `task` under a child context.
    ///
    /// On success `weight` is added to this context's progress. Cancelling
    /// this context drops the running task and yields [`TaskError::Cancelled`].
    pub async fn execute<T: Task + ?Sized>(&self, task: &T, weight: u64) -> Result<(), TaskError> {
        let live = LiveChild::attach(self, self.child(task.name()));
        let child = &live.child;
        child.emit(TaskEvent::Start { path: child.inner.path.clone() });

        let result = tokio::select! {
            biased;
            _ = child.inner.token.cancelled() => Err(TaskError::Cancelled),
            result = task.run(child) => result,
        };

        match &result {
            Ok(()) => {
                child.emit(TaskEvent::Success { path: child.inner.path.clone() });
                self.advance(weight);
            }
            Err(e) if e.is_cancelled() => {
                child.emit(TaskEvent::Cancelled { path: child.inner.path.clone() });
            }
            Err(e) => {
                child.emit(TaskEvent::Failed {
                    path: child.inner.path.clone(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(listener) = &self.inner.listener {
            listener(event);
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("path", &self.inner.path)
            .field("progress", &self.progress())
            .field("total", &self.total())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
