use crate::error::ApiError;

/// Run file or CPU heavy work on the blocking pool, folding both the
/// task's own error and a panicked task into an `ApiError`.
pub async fn run_blocking<T, E, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?.map_err(Into::into)
}
