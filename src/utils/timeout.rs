//! Deadline helpers and default durations.

use std::future::Future;
use std::time::Duration;

use crate::error::{NetworkError, Result};

/// Default per-call read/write deadline
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

/// Default wait between failed client dials
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default limit for a single client dial
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for connections to drain on server shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `future` under `deadline`, mapping expiry to [`NetworkError::Timeout`].
///
/// The deadline covers this one call only; callers re-arm it on every I/O.
pub async fn with_deadline<F, T>(future: F, deadline: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| NetworkError::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_expires() {
        let result = with_deadline(
            tokio::time::sleep(Duration::from_secs(5)),
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(NetworkError::Timeout)));
    }

    #[tokio::test]
    async fn test_deadline_passes_value_through() {
        let result = with_deadline(async { 7 }, Duration::from_millis(100)).await;
        assert_eq!(result.ok(), Some(7));
    }
}
