/// Stable, human-readable error taxonomy for the public API surface.
///
/// Internal plumbing (disk I/O glue, metadata (de)serialization) uses `anyhow::Result` and is
/// never surfaced directly; every path that reaches a caller converts into one of these variants.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Bytes were present but could not be decoded as an image (or were empty).
    #[error("the cached or downloaded data is not a valid image")]
    InvalidImageData,

    /// The HTTP response did not indicate success. `status` is `-1` when no response was ever
    /// received (e.g. connection refused before headers arrived).
    #[error("{}", describe_status(*status))]
    InvalidResponse { status: i32 },

    /// A transport-level failure: DNS, TLS, connection reset, timeout.
    #[error("network request failed: {0}")]
    NetworkFailure(String),

    /// Failed to parse non-image metadata (config file, sidecar JSON).
    #[error("failed to decode metadata: {0}")]
    DecodingFailure(String),

    /// The operation was cancelled, either by the caller or because it was a prefetch job whose
    /// last interested party went away.
    #[error("operation was cancelled")]
    Cancelled,

    /// Catch-all for errors that don't fit another variant; always carries the original cause.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

fn describe_status(status: i32) -> String {
    match status {
        -1 => "no response was received from the server".to_string(),
        404 => "the requested resource was not found".to_string(),
        401 | 403 => "access to the requested resource was denied".to_string(),
        408 => "the request timed out".to_string(),
        429 => "the server is rate limiting requests".to_string(),
        s if (500..600).contains(&s) => format!("the server returned an error ({s})"),
        s => format!("the server returned an unexpected status ({s})"),
    }
}

impl CacheError {
    /// Whether this error represents a condition that's worth retrying (transient transport
    /// issues, 5xx, 408, 429). Non-retryable 4xx (other than 408/429) return `false`.
    pub fn is_retriable(&self) -> bool {
        match self {
            CacheError::NetworkFailure(_) => true,
            CacheError::InvalidResponse { status } => {
                *status == 408 || *status == 429 || *status < 0 || *status >= 500
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::InvalidResponse { status: 404 })
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            CacheError::InvalidResponse {
                status: status.as_u16() as i32,
            }
        } else {
            CacheError::NetworkFailure(err.to_string())
        }
    }
}
