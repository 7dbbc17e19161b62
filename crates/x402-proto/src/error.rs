use thiserror::Error;

/// Errors returned by protocol codec and facilitator operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A payment header could not be decoded into its wire type.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The facilitator answered, but with an error status or a body this
    /// crate cannot parse.
    #[error("facilitator error: {0}")]
    Facilitator(String),

    /// The facilitator could not be reached at all.
    #[error("facilitator unreachable: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
