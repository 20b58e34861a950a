pub mod actions;
pub mod config;
pub mod logs;
pub mod servers;
pub mod status;

use crate::error::AppError;

/// Run synchronous core work on the blocking pool.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> panel_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let value = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(value)
}
