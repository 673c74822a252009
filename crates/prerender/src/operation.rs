//! Awaitable handles for asynchronous work started during a render.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::task::AbortHandle;

/// How a pending operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// A cloneable handle to in-flight work.
///
/// Clones observe the same work, so a plugin can keep one in its state and
/// hand copies to the render loop on every pass. Waiting on a handle never
/// cancels the work behind it; only [`cancel`](Self::cancel) does.
#[derive(Clone)]
pub struct PendingOperation {
    label: Arc<str>,
    settled: Shared<BoxFuture<'static, OperationOutcome>>,
    abort: Option<AbortHandle>,
}

impl PendingOperation {
    /// Run `work` on the tokio runtime and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(label: impl Into<Arc<str>>, work: F) -> Self
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        let abort = handle.abort_handle();
        let settled = async move {
            match handle.await {
                Ok(Ok(())) => OperationOutcome::Completed,
                Ok(Err(reason)) => OperationOutcome::Failed(reason),
                Err(e) if e.is_cancelled() => OperationOutcome::Cancelled,
                Err(e) => OperationOutcome::Failed(e.to_string()),
            }
        }
        .boxed()
        .shared();

        Self {
            label: label.into(),
            settled,
            abort: Some(abort),
        }
    }

    /// Wrap a future without spawning it. It only makes progress while
    /// something waits on the handle.
    pub fn from_future<F>(label: impl Into<Arc<str>>, work: F) -> Self
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let settled = work
            .map(|result| match result {
                Ok(()) => OperationOutcome::Completed,
                Err(reason) => OperationOutcome::Failed(reason),
            })
            .boxed()
            .shared();

        Self {
            label: label.into(),
            settled,
            abort: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Outcome, if the work has been observed to finish.
    pub fn outcome(&self) -> Option<OperationOutcome> {
        self.settled.peek().cloned()
    }

    pub fn is_settled(&self) -> bool {
        self.settled.peek().is_some()
    }

    /// Future resolving once the work settles.
    pub fn wait(&self) -> Shared<BoxFuture<'static, OperationOutcome>> {
        self.settled.clone()
    }

    /// Abort spawned work. Has no effect on handles built with
    /// [`from_future`](Self::from_future) or on work that already finished.
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }
}

impl std::fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperation")
            .field("label", &self.label)
            .field("outcome", &self.outcome())
            .finish()
    }
}
