use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::CommonError;

/// Await a collaborator call, failing with `CommonError::Timeout` once `after` elapses.
///
/// `call` names the external boundary (e.g. "embed", "generate") so the error tells the caller
/// which collaborator was slow. The inner future is dropped on expiry.
pub async fn with_deadline<T, F>(call: &'static str, after: Duration, fut: F) -> Result<T, CommonError>
where
    F: Future<Output = Result<T, CommonError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(call, timeout_ms = after.as_millis() as u64, "collaborator call exceeded deadline");
            Err(CommonError::Timeout { call, after })
        }
    }
}
