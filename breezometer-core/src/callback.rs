//! Completion-callback delivery for client operations.
//!
//! These wrap the async operations rather than duplicating them, so the
//! callback sees exactly the outcome the awaited call would have produced.

use std::future::Future;

use tokio::task::JoinHandle;

use crate::error::BreezometerError;

/// Await `operation` and hand its outcome to `callback` as `(error, result)`.
pub async fn with_callback<T, Fut, F>(operation: Fut, callback: F)
where
    Fut: Future<Output = Result<T, BreezometerError>>,
    F: FnOnce(Option<BreezometerError>, Option<T>),
{
    match operation.await {
        Ok(result) => callback(None, Some(result)),
        Err(err) => callback(Some(err), None),
    }
}

/// Like [`with_callback`], but runs on a spawned task and returns immediately.
pub fn spawn_with_callback<T, Fut, F>(operation: Fut, callback: F) -> JoinHandle<()>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, BreezometerError>> + Send + 'static,
    F: FnOnce(Option<BreezometerError>, Option<T>) + Send + 'static,
{
    tokio::spawn(with_callback(operation, callback))
}
