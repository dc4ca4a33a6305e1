use thiserror::Error;

/// Reasons a single inbound frame can be rejected. The offending frame is
/// dropped and logged; the upstream session keeps running.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Frame JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 error in compressed field: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Deflate error in compressed field: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("Unexpected frame shape: {0}")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// No live feed is currently being served. Expected between sessions;
    /// the feed client retries after the fixed backoff.
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// Transport-level failure on the negotiation call or the established
    /// upstream connection.
    #[error("Upstream connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),
}
