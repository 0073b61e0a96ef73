use crate::domain::failure::Failure;
use crate::error::ClientError;
use std::future::Future;
use std::time::Duration;

/// Runs `operation` against a deadline.
///
/// If the deadline passes first the operation future is dropped, which
/// cancels any in-flight request it owns, and a `Timeout` failure is returned.
/// Otherwise the operation's own result is passed through, with errors
/// classified. No retries happen here.
pub async fn execute<T, F>(label: &str, deadline: Duration, operation: F) -> Result<T, Failure>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Failure::classify(label, &error)),
        Err(_) => {
            tracing::warn!(
                operation = label,
                deadline_ms = deadline.as_millis() as u64,
                "Operation timed out"
            );
            Err(Failure::timeout(label, deadline))
        }
    }
}

/// Like [`execute`], but hands the raw client error back so the caller can
/// apply its own classification.
pub async fn execute_raw<T, F>(
    label: &str,
    deadline: Duration,
    operation: F,
) -> Result<Result<T, ClientError>, Failure>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::time::timeout(deadline, operation).await.map_err(|_| {
        tracing::warn!(
            operation = label,
            deadline_ms = deadline.as_millis() as u64,
            "Operation timed out"
        );
        Failure::timeout(label, deadline)
    })
}
