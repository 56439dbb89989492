//! Cancellation-aware wrappers for network calls.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{DumpError, Result};

/// Run `fut` unless `cancel` fires first.
///
/// A cancelled call drops the in-flight future; the driver discards the
/// pending result the next time the connection is used or dropped.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DumpError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let value = cancellable(&token, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_before_completion() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<()> = cancellable(&token, std::future::pending()).await;
        assert!(matches!(result, Err(DumpError::Cancelled)));
    }
}
