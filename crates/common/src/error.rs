use range_index::RangeIndexError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type MirrorResult<T> = std::result::Result<T, MirrorError>;

/// Failure taxonomy shared by mirror clients and replicas.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Key absent on the replica. Clients surface this as an empty result.
    #[error("Key {key} does not exist")]
    NotFound { key: String },

    /// The replica answered 200 but the body could not be used.
    #[error("Mirror protocol error: {reason}")]
    Protocol { reason: String },

    /// Any non-2xx, non-404 status from a replica or the fallback service.
    #[error("Mirror at {address} answered {status}: {message}")]
    Remote {
        address: String,
        status: u16,
        message: String,
    },

    /// Connection-level failure (refused, reset, timed out).
    #[error("Mirror at {address} is unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    /// The fallback service failed after a replica was unreachable.
    #[error("Fallback service error at {address}: {reason}")]
    RemoteUnavailable { address: String, reason: String },

    /// Setup-time problem: bad address, zero partitions, incomplete routing snapshot.
    #[error("Invalid mirror configuration: {reason}")]
    Configuration { reason: String },

    /// A caller-supplied argument was rejected.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error(transparent)]
    RangeIndex(#[from] RangeIndexError),
}

impl MirrorError {
    pub fn not_found(key: impl Into<String>) -> Self {
        MirrorError::NotFound { key: key.into() }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        MirrorError::Protocol {
            reason: reason.into(),
        }
    }

    pub fn remote(address: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        MirrorError::Remote {
            address: address.into(),
            status,
            message: message.into(),
        }
    }

    pub fn unreachable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        MirrorError::Unreachable {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn remote_unavailable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        MirrorError::RemoteUnavailable {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        MirrorError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        MirrorError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Connectivity failures are the only ones that trigger the fallback hop.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, MirrorError::Unreachable { .. })
    }

    /// HTTP status a service boundary should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            MirrorError::NotFound { .. } => 404,
            MirrorError::InvalidArgument { .. } => 400,
            MirrorError::RangeIndex(err) if err.is_bad_boundary() => 400,
            MirrorError::Remote { status, .. } => *status,
            MirrorError::Unreachable { .. } | MirrorError::RemoteUnavailable { .. } => 503,
            MirrorError::Protocol { .. } => 502,
            MirrorError::Configuration { .. } | MirrorError::RangeIndex(_) => 500,
        }
    }
}

/// JSON error body written by replicas for every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub code: u16,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_path: Option<String>,
}

impl ErrorMessage {
    pub fn new(code: u16, title: impl Into<String>, detail: impl Into<String>) -> Self {
        let kind = if (400..500).contains(&code) {
            "errors/clientError"
        } else {
            "errors/serverError"
        };
        Self {
            kind: kind.to_string(),
            title: title.into(),
            code,
            detail: detail.into(),
            uri_path: None,
        }
    }

    pub fn with_uri_path(mut self, path: impl Into<String>) -> Self {
        self.uri_path = Some(path.into());
        self
    }

    /// Best-effort message from a remote error body. Falls back to the raw text.
    pub fn detail_from_body(body: &[u8]) -> String {
        const MAX_SNIPPET: usize = 256;

        if let Ok(message) = serde_json::from_slice::<ErrorMessage>(body) {
            return message.detail;
        }
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if text.len() <= MAX_SNIPPET {
            return text.to_string();
        }
        let mut end = MAX_SNIPPET;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
