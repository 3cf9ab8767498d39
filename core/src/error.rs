//! Error types for the Flexibee client.
//!
//! # Design
//! Every failure the remote API can signal maps onto exactly one variant of
//! `FlexibeeError`. The fixed status codes (401, 403, 405, 406) get dedicated
//! unit variants so callers can match on them without inspecting numbers.
//! Failures reported inside the response body land in `RequestFailed` with the
//! composed message and the status code that accompanied it.

use thiserror::Error;

/// Errors detected while building a `Config`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("base url must not be empty")]
    EmptyUrl,

    #[error("company must not be empty")]
    EmptyCompany,

    #[error("evidence name must not be empty")]
    EmptyEvidence,
}

/// Errors returned by client operations and by the response interpreter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlexibeeError {
    /// The transport could not complete the request (DNS, TLS, timeout, ...).
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The server returned 401.
    #[error("invalid authorization")]
    InvalidAuthorization,

    /// The server returned 403.
    #[error("forbidden")]
    Forbidden,

    /// The server returned 405.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The server returned 406.
    #[error("not acceptable request")]
    NotAcceptableRequest,

    /// The response body reported a failure.
    #[error("request failed ({status}): {message}")]
    RequestFailed { message: String, status: u16 },

    /// A strict lookup found no record for the configured evidence.
    #[error("no evidence result found")]
    NoEvidenceResult,

    /// A save call reported zero affected rows or an explicit failure.
    #[error("save failed: {0}")]
    SaveFailed(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FlexibeeError {
    /// HTTP status code the error originated from, where one applies.
    pub fn status(&self) -> Option<u16> {
        match self {
            FlexibeeError::InvalidAuthorization => Some(401),
            FlexibeeError::Forbidden => Some(403),
            FlexibeeError::MethodNotAllowed => Some(405),
            FlexibeeError::NotAcceptableRequest => Some(406),
            FlexibeeError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Map one of the fixed status codes to its error, if it is one.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(FlexibeeError::InvalidAuthorization),
            403 => Some(FlexibeeError::Forbidden),
            405 => Some(FlexibeeError::MethodNotAllowed),
            406 => Some(FlexibeeError::NotAcceptableRequest),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_status_codes_round_trip_through_status() {
        for code in [401, 403, 405, 406] {
            let err = FlexibeeError::from_status(code).unwrap();
            assert_eq!(err.status(), Some(code));
        }
    }

    #[test]
    fn other_status_codes_are_not_fixed_conditions() {
        for code in [200, 400, 404, 500] {
            assert!(FlexibeeError::from_status(code).is_none());
        }
    }

    #[test]
    fn request_failed_displays_status_and_message() {
        let err = FlexibeeError::RequestFailed {
            message: "bad filter".to_string(),
            status: 400,
        };
        assert_eq!(err.to_string(), "request failed (400): bad filter");
    }

    #[test]
    fn config_error_converts_transparently() {
        let err: FlexibeeError = ConfigError::EmptyEvidence.into();
        assert_eq!(err.to_string(), "evidence name must not be empty");
        assert!(err.status().is_none());
    }
}
