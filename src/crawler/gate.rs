//! Cooperative cancellation.
//!
//! The gate is polled between units of work only: before each listing page
//! and before each batch. Fetches already in flight always run to completion.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::crawler::models::CancelReason;

/// Caller-side handle to a run's token. Cloneable, cancel is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.trigger(CancelReason::Requested);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels the run when dropped, unless [`CancelOnDrop::disarm`] was called.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            handle: Some(self.clone()),
        }
    }

    /// The gate the orchestrator polls. It can observe the token but not set it.
    pub fn gate(&self) -> CancellationGate {
        CancellationGate {
            handle: self.clone(),
        }
    }

    /// Arms a wall-clock deadline on this token. Dropping the returned guard disarms it.
    pub fn arm_deadline(&self, after: Duration) -> DeadlineGuard {
        let handle = self.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    warn!(secs = after.as_secs_f64(), "Run deadline reached");
                    handle.trigger(CancelReason::Deadline);
                }
                _ = handle.token.cancelled() => {}
            }
        });
        DeadlineGuard { task }
    }

    fn trigger(&self, reason: CancelReason) {
        // First writer wins; the token is never reset.
        let _ = self.reason.set(reason);
        self.token.cancel();
    }
}

pub struct CancelOnDrop {
    handle: Option<CancelHandle>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

pub struct DeadlineGuard {
    task: JoinHandle<()>,
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone)]
pub struct CancellationGate {
    handle: CancelHandle,
}

impl CancellationGate {
    /// `Err` with the reason once the token is set.
    pub fn check(&self) -> Result<(), CancelReason> {
        if !self.handle.is_cancelled() {
            return Ok(());
        }
        Err(self
            .handle
            .reason
            .get()
            .copied()
            .unwrap_or(CancelReason::Requested))
    }
}
