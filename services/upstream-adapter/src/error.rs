use thiserror::Error;

/// Errors that can interrupt the adapter's state machine (§4.8), including
/// the five codes the error taxonomy table says downstream transforms can
/// raise back into it.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("multipart framing failed: {0}")]
    FramingFailed(String),

    #[error("stream closed")]
    StreamClosed,

    #[error("multipart stream failed")]
    MultipartStreamFailed,

    #[error("instance id changed")]
    InstanceIdChanged,

    #[error("restart stream requested")]
    RestartStream,

    #[error("retry requested")]
    RetryRequest,

    #[error("adapter failed: {0}")]
    AdapterFailed(String),
}

impl AdapterError {
    /// `false` only for `AdapterFailed`, the one taxonomy entry that stops
    /// the adapter instead of reconnecting.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AdapterError::AdapterFailed(_))
    }
}
