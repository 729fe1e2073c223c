//! Per-request cancellation and deadline.
//!
//! A [`RequestContext`] is cloned into every fetch and into the evaluator.
//! Async work races against it through [`RequestContext::guard`]; CPU-bound
//! work polls [`RequestContext::is_canceled`] (or the closure returned by
//! [`RequestContext::interrupt`]).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancellation {
    #[error("request canceled")]
    Canceled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// A context with no deadline that is never canceled unless asked to.
    pub fn new() -> Self {
        let (cancel, _rx) = watch::channel(false);
        Self {
            cancel: Arc::new(cancel),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// `Err(reason)` once the context is canceled or past its deadline.
    pub fn check(&self) -> Result<(), Cancellation> {
        if *self.cancel.borrow() {
            return Err(Cancellation::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Cancellation::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.check().is_err()
    }

    /// A synchronous poll for CPU-bound work running off the async runtime.
    pub fn interrupt(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let ctx = self.clone();
        move || ctx.is_canceled()
    }

    /// Run `fut` unless the context is canceled or its deadline passes first.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T, Cancellation>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        let mut canceled = self.cancel.subscribe();
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            out = fut => Ok(out),
            _ = canceled.wait_for(|c| *c) => Err(Cancellation::Canceled),
            _ = deadline => Err(Cancellation::DeadlineExceeded),
        }
    }
}
