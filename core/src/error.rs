//! Error types for the forensics API gateway.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the resource does not exist" from "the server refused the request." All
//! other non-2xx responses land in `Remote` with the status code and the
//! server-supplied message. Flow submission failures are flattened into
//! `Submission` so callers see only the server's message.
//!
//! `ApiError` is `Clone` because a single cached failure is handed to every
//! waiter of the descriptor catalog.

use thiserror::Error;

/// Errors returned by `ApiEndpoints` parse methods and `ApiService`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The server returned 404 for the requested resource.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// No flow descriptor with this name exists in the catalog.
    #[error("flow descriptor not found: {0}")]
    DescriptorNotFound(String),

    /// Starting a flow failed; carries the server-provided message.
    #[error("{0}")]
    Submission(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The message a user should see, without transport wrapping.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Remote { message, .. }
            | ApiError::Submission(message)
            | ApiError::Network(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// HTTP status behind this error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound => Some(404),
            ApiError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_displays_bare_message() {
        let err = ApiError::Submission("bad args".to_string());
        assert_eq!(err.to_string(), "bad args");
        assert_eq!(err.user_message(), "bad args");
    }

    #[test]
    fn remote_keeps_status() {
        let err = ApiError::Remote {
            status: 403,
            message: "no approval".to_string(),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.user_message(), "no approval");
        assert_eq!(err.to_string(), "HTTP 403: no approval");
    }

    #[test]
    fn network_user_message_drops_prefix() {
        let err = ApiError::Network("connection reset".to_string());
        assert_eq!(err.to_string(), "network error: connection reset");
        assert_eq!(err.user_message(), "connection reset");
    }
}
