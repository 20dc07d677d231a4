//! Error taxonomy shared by every component.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    /// Transport failure or timeout. Eligible for a manual retry only.
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response that does not map to a more specific variant.
    #[error("request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    /// Input rejected locally or by the backend.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing, expired or rejected bearer token.
    #[error("authorization error: {0}")]
    Auth(String),

    #[error("scene not found: {0}")]
    NotFound(String),

    /// The session or poller was stopped by its owner.
    #[error("operation cancelled")]
    Cancelled,
}

impl SceneError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SceneError::Network(_))
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, SceneError::Auth(_))
    }

    /// Map a non-success HTTP status and its body onto the taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => SceneError::Auth(body),
            404 => SceneError::NotFound(body),
            400 | 422 => SceneError::Validation(body),
            _ => SceneError::Api { status, body },
        }
    }

    /// Like [`from_status`](Self::from_status), narrowed to what `endpoint` can report.
    pub fn from_endpoint(endpoint: Endpoint, status: u16, body: String) -> Self {
        match (endpoint, status) {
            (Endpoint::List, _) => SceneError::Api { status, body },
            (Endpoint::Get, 404) => SceneError::NotFound(body),
            (Endpoint::Get, _) => SceneError::Api { status, body },
            (Endpoint::Delete, _) => Self::from_status(status, body),
            // The slot, create and job calls address the scene by a body field.
            (_, 404) => SceneError::Api { status, body },
            _ => Self::from_status(status, body),
        }
    }
}

/// The scene API calls, as far as error mapping is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    List,
    Get,
    UploadSlot,
    Create,
    StartJob,
    Delete,
}

impl From<reqwest::Error> for SceneError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SceneError::Api {
                status: err.status().map(|s| s.as_u16()).unwrap_or(200),
                body: format!("undecodable response: {}", err),
            };
        }
        SceneError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(err: serde_json::Error) -> Self {
        SceneError::Api {
            status: 200,
            body: format!("undecodable response: {}", err),
        }
    }
}

/// Convenience alias so callers can write `Result<T>` instead of `Result<T, SceneError>`.
pub type Result<T> = std::result::Result<T, SceneError>;
