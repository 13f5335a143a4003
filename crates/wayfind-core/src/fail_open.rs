//! Fail-open helper for best-effort operations
//!
//! Cleanup after a run (terminating a process that may already be gone,
//! writing a side report) must never mask the run's real outcome. Those calls
//! go through [`fail_open`], which logs the failure and carries on.
//!
//! Do not use it for traversal decisions: a failed capture or recognition is
//! information the engine has to act on.

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Run a best-effort operation, logging and swallowing its error
///
/// ```no_run
/// use wayfind_core::fail_open::fail_open;
/// use wayfind_core::Result;
///
/// async fn write_side_report() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("side_report", || write_side_report()).await;
///     // None if the write failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
