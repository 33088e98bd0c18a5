use backend_bridge::BackendError;
use session_router::RouterError;
use session_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`crate::Client`] operations.
///
/// Call sites inside the client convert these into session notices or
/// transcript entries; none of them are process-fatal.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown chat session '{0}'")]
    UnknownSession(String),

    #[error("unknown approval request '{0}'")]
    UnknownApproval(String),

    #[error("prompt enhancement timed out")]
    EnhanceTimeout,
}
