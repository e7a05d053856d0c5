//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Wrap a provider future with a timeout, normalizing expiry into
/// `ProviderError(timeout)`.
pub async fn with_timeout<T>(
    provider: &str,
    duration: Duration,
    future: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout(provider, duration.as_millis() as u64)),
    }
}
