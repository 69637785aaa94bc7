// ============================
// crates/backend-lib/src/context.rs
// ============================
//! Per-request cancellation and deadline propagation.
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, StoreError};

/// Cancellation signal and optional deadline carried by every operation
/// down to the store.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Bind the context to a caller-owned token
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Derive a context that also expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context that expires at `deadline`, keeping the earlier of
    /// the two deadlines when one is already set
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast before issuing a write
    pub fn check(&self) -> Result<(), AuthError> {
        if self.is_done() {
            Err(AuthError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive a store call, abandoning it when the context is cancelled or its
    /// deadline passes.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.is_done() {
            return Err(StoreError::Cancelled);
        }
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            _ = deadline => Err(StoreError::Cancelled),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        let res = ctx.run(async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(res, Ok(7));
        assert!(!ctx.is_done());
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let token = CancellationToken::new();
        let ctx = Context::with_cancel(token.clone());
        token.cancel();
        assert!(ctx.is_done());
        assert!(matches!(ctx.check(), Err(AuthError::Cancelled)));
        let res = ctx.run(async { Ok::<_, StoreError>(()) }).await;
        assert_eq!(res, Err(StoreError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_abandons_slow_call() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let res = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await;
        assert_eq!(res, Err(StoreError::Cancelled));
    }

    #[test]
    fn test_child_keeps_earliest_deadline() {
        let now = Instant::now();
        let parent = Context::background().with_deadline(now + Duration::from_secs(1));
        let child = parent.with_deadline(now + Duration::from_secs(10));
        assert_eq!(child.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_parent_cancel_reaches_child() {
        let token = CancellationToken::new();
        let parent = Context::with_cancel(token.clone());
        let child = parent.with_timeout(Duration::from_secs(60));
        token.cancel();
        assert!(child.is_done());
    }
}
