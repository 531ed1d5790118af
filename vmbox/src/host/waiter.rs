//! Resolution of in-flight host operations.

use tracing::debug;

use super::OperationHandle;
use crate::errors::{VmboxError, VmboxResult};

/// Wait for an operation to complete and return its result text.
///
/// Consumes the handle: an operation is resolved exactly once, and its
/// token is closed as soon as the wait returns, success or failure. The
/// blocking host wait runs on the blocking thread pool, so the calling task
/// suspends without pinning a runtime worker.
///
/// There is no timeout at this layer. A caller that needs bounded latency
/// races the returned future against `tokio::time::timeout` and follows up
/// with a terminate command once the operation resolves.
pub async fn await_result(operation: OperationHandle) -> VmboxResult<String> {
    let token = operation.token();
    let outcome = tokio::task::spawn_blocking(move || {
        let result = operation.host().wait_operation(operation.token());
        drop(operation);
        result
    })
    .await
    .map_err(|e| VmboxError::Internal(format!("operation waiter task failed: {e}")))?;

    match &outcome {
        Ok(text) => debug!(operation = token, bytes = text.len(), "operation resolved"),
        Err(err) => debug!(operation = token, error = %err, "operation failed"),
    }
    outcome
}
