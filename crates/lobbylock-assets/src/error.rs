//! Error types for `lobbylock-assets`.
//!
//! Signing errors carry the HTTP status or transport cause; resolve errors add
//! the storage key whose signing failed. Bearer tokens never appear in any
//! message.

/// Errors from building a [`StorageKey`](crate::StorageKey).
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// A key component was empty.
    #[error("storage key {component} must not be empty")]
    Empty { component: &'static str },

    /// A key component contained a character the marker syntax cannot carry.
    #[error("storage key {component} contains forbidden character {found:?}")]
    ForbiddenCharacter {
        component: &'static str,
        found: char,
    },
}

/// Errors from the signing collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// Missing or invalid signer configuration.
    #[error("signer config error: {0}")]
    Config(String),

    /// The collaborator does not know the key or document (404).
    #[error("no signed URL for key '{key}' in document '{document_id}'")]
    NotFound { document_id: String, key: String },

    /// The session was rejected (401/403).
    #[error("signing request unauthorized: {0}")]
    Unauthorized(String),

    /// The collaborator answered with any other non-success status.
    #[error("signing API error {status_code}: {message}")]
    Api { status_code: u16, message: String },

    /// The request timed out in the transport.
    #[error("signing request timed out")]
    Timeout,

    /// Network or HTTP client failure.
    #[error("signing network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body was not a signed-URL payload.
    #[error("signing response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from [`resolve_for_display`](crate::resolve_for_display).
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Signing failed for one distinct key; no partial body is produced.
    #[error("failed to sign asset '{key}': {source}")]
    Signing {
        key: String,
        #[source]
        source: SigningError,
    },
}

/// Errors from [`normalize_for_storage`](crate::normalize_for_storage).
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The parsed tree did not have the expected shape.
    #[error("document body could not be parsed: {reason}")]
    Parse { reason: String },

    /// The rewritten tree could not be serialized.
    #[error("document body serialization failed: {0}")]
    Serialize(#[from] std::io::Error),

    /// The serializer produced bytes that are not UTF-8.
    #[error("serialized document body is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
