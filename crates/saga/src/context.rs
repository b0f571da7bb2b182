//! Deadline and cancellation carried from the inbound request into every remote call.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Result, SagaError};

/// Deadline-bound, optionally cancellable context for remote calls.
///
/// Every call the saga makes to a dependency goes through [`RequestContext::run`],
/// so no call outlives the inbound request's deadline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
    cancel: Option<watch::Receiver<bool>>,
}

/// Owned by the inbound request. Cancels its context on [`cancel`](Self::cancel) or drop.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation to every clone of the paired context.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl RequestContext {
    /// Creates a cancellable context that expires after `timeout`.
    pub fn new(timeout: Duration) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            deadline: Instant::now() + timeout,
            cancel: Some(rx),
        };
        (ctx, CancelHandle { tx })
    }

    /// Creates a context that cannot be cancelled, only time out.
    ///
    /// Used for compensation, which must run even after the inbound
    /// request went away.
    pub fn detached(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: None,
        }
    }

    /// Returns the instant after which calls fail.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns the time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns true if the request was cancelled or its handle dropped.
    pub fn is_cancelled(&self) -> bool {
        match &self.cancel {
            None => false,
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
        }
    }

    /// Resolves once the context is cancelled. Never resolves for detached contexts.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.cancel else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Runs a remote call bounded by this context.
    ///
    /// Deadline expiry surfaces as `RemoteUnavailable` for `service`;
    /// cancellation surfaces as `Cancelled`.
    pub async fn run<T, F>(&self, service: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(SagaError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancelled() => Err(SagaError::Cancelled),
            res = tokio::time::timeout_at(self.deadline, call) => match res {
                Ok(result) => result,
                Err(_) => Err(SagaError::unavailable(service, "deadline exceeded")),
            },
        }
    }
}
