//! Route handlers, one module per resource.

pub mod changes;
pub mod health;
pub mod patients;
pub mod queue;

use crate::api::error::ApiError;
use crate::engine::EngineError;

/// Run engine work that may touch the database off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}
