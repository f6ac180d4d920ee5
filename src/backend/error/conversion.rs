//! Error-to-wire conversion and store call bounding.

use std::future::Future;
use std::time::Duration;

use crate::shared::ServerEvent;

use super::types::{GatewayError, StoreError};

impl GatewayError {
    /// Render this error as the wire frame sent back to the originating
    /// connection. `event` names the inbound frame that failed.
    pub fn to_event(&self, event: Option<&str>) -> ServerEvent {
        ServerEvent::Error {
            code: self.code().to_string(),
            message: self.to_string(),
            event: event.map(str::to_string),
        }
    }
}

/// Run a store operation under the configured timeout.
///
/// No store call may hang a connection's event processing: on timeout the
/// operation fails with a retryable `Unavailable` instead. `op` names the
/// operation for the log line.
pub async fn with_store_timeout<T, F>(
    limit: Duration,
    op: &str,
    fut: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(GatewayError::from),
        Err(_) => {
            tracing::warn!(operation = op, timeout_ms = limit.as_millis() as u64, "store call timed out");
            Err(GatewayError::Unavailable(format!("{op} timed out")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_carries_code_and_frame_name() {
        let err = GatewayError::forbidden("not a participant");
        let event = err.to_event(Some("dm:send"));
        match event {
            ServerEvent::Error { code, event, .. } => {
                assert_eq!(code, "forbidden");
                assert_eq!(event.as_deref(), Some("dm:send"));
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timed_out_store_call_becomes_unavailable() {
        let result: Result<(), GatewayError> =
            with_store_timeout(Duration::from_millis(10), "append_message", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(GatewayError::Unavailable(message)) => {
                assert!(message.contains("append_message"));
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn completed_store_call_passes_through() {
        let result = tokio_test::block_on(with_store_timeout(
            Duration::from_secs(1),
            "find_by_pair",
            async { Ok(42u32) },
        ));
        assert_eq!(result.unwrap(), 42);
    }
}
