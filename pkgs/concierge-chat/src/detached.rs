//! Fire-and-forget background work

use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tracing::debug;

/// How a detached task is run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachedPolicy {
    /// Runs once to completion. Not retried on failure and never cancelled,
    /// even after whoever spawned it has gone away.
    NoRetryNoCancel,
}

/// Why a detached task did not produce a value
#[derive(Debug)]
pub enum TaskFailure<E> {
    Error(E),
    Panicked(String),
}

impl<E: fmt::Display> fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(e) => write!(f, "{}", e),
            TaskFailure::Panicked(message) => write!(f, "task panicked: {}", message),
        }
    }
}

/// Handle to a running detached task. It can be waited on but not aborted.
pub struct DetachedTask {
    name: String,
    handle: JoinHandle<()>,
}

impl DetachedTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait until the task and its callback have run
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Run `future` on the runtime without awaiting it. Exactly one of
/// `on_success` and `on_failure` runs once it settles; a panic counts as
/// failure.
pub fn spawn_detached<T, E, Fut, S, F>(
    name: impl Into<String>,
    policy: DetachedPolicy,
    future: Fut,
    on_success: S,
    on_failure: F,
) -> DetachedTask
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    S: FnOnce(T) + Send + 'static,
    F: FnOnce(TaskFailure<E>) + Send + 'static,
{
    let name = name.into();
    let task_name = name.clone();

    let handle = tokio::spawn(async move {
        match policy {
            DetachedPolicy::NoRetryNoCancel => {
                debug!("Detached task {} started", task_name);
                match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(Ok(value)) => on_success(value),
                    Ok(Err(e)) => on_failure(TaskFailure::Error(e)),
                    Err(panic) => on_failure(TaskFailure::Panicked(panic_message(panic))),
                }
                debug!("Detached task {} finished", task_name);
            }
        }
    });

    DetachedTask { name, handle }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
