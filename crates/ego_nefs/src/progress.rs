//! Cancellation and progress reporting for long running operations.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Shared flag used to request that an operation stops.
///
/// Clones share the same flag, so a token can be handed to a signal handler while the original is
/// passed to the operation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

type ProgressCallback = dyn Fn(u64, u64) + Send + Sync;

#[derive(Default)]
struct Progress {
    processed: AtomicU64,
    total: AtomicU64,
    callback: Option<Box<ProgressCallback>>,
}

/// Cancellation token and progress counter threaded through long operations.
///
/// Progress is counted in bytes. The callback receives `(processed, total)` and may be called from
/// worker threads.
#[derive(Clone, Default)]
pub struct OperationContext {
    token: CancellationToken,
    progress: Arc<Progress>,
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("processed", &self.processed())
            .field("total", &self.total())
            .finish()
    }
}

impl OperationContext {
    /// A context that is never cancelled and reports progress nowhere
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            progress: Arc::default(),
        }
    }

    /// Replace the progress callback
    pub fn with_callback(self, callback: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        Self {
            token: self.token,
            progress: Arc::new(Progress {
                callback: Some(Box::new(callback)),
                ..Default::default()
            }),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail with [`Error::Cancelled`] once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Add to the number of bytes the operation expects to process
    pub fn add_total(&self, bytes: u64) {
        self.progress.total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record processed bytes and notify the callback
    pub fn advance(&self, bytes: u64) {
        let processed = self.progress.processed.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if let Some(callback) = &self.progress.callback {
            callback(processed, self.total());
        }
    }

    pub fn processed(&self) -> u64 {
        self.progress.processed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.progress.total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::{CancellationToken, OperationContext};
    use crate::error::Error;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let ctx = OperationContext::with_token(token.clone());
        assert!(ctx.check().is_ok());

        token.cancel();
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
        assert!(ctx.clone().token().is_cancelled());
    }

    #[test]
    fn progress_reaches_callback() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_by_callback = seen.clone();
        let ctx = OperationContext::new().with_callback(move |processed, total| {
            assert!(processed <= total);
            seen_by_callback.store(processed, Ordering::SeqCst);
        });

        ctx.add_total(100);
        ctx.advance(40);
        ctx.clone().advance(60);

        assert_eq!(ctx.processed(), 100);
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }
}
