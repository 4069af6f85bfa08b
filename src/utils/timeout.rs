//! Timeout utilities
//!
//! Module loads have no timeout unless `load_timeout_secs` is configured; the
//! configured value is applied with [`with_custom_timeout`].

use std::time::Duration;
use tokio::time::timeout;

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(duration, operation).await
}
