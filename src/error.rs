//! Unified error type.
//!
//! Every failure a handler can hit maps to one variant here, and every variant
//! knows how to render itself as the JSON error envelope. Return
//! `Result<_, Error>` from a handler and the dispatcher does the rest.

use serde_json::Value;

use crate::response::{IntoResponse, Response};
use crate::status::Status;

/// The error type returned by callie's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No route matched the method + path pair.
    #[error("Not Found: {0}")]
    RouteNotFound(String),

    /// Missing, malformed, invalid or expired bearer token.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// The client exhausted its fixed window.
    #[error("Too Many Requests")]
    RateLimited { retry_after: u64 },

    /// Any failure reported by the database.
    #[error("Query Failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    /// Handler-level input validation.
    #[error("{message}")]
    Validation { message: String, errors: Option<Value> },

    #[error("password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a `400 Bad Request` validation failure.
    pub fn validation(message: impl Into<String>, errors: Option<Value>) -> Self {
        Self::Validation { message: message.into(), errors }
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::RouteNotFound(_) => Status::NotFound,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::RateLimited { .. } => Status::TooManyRequests,
            Self::Validation { .. } => Status::BadRequest,
            Self::QueryFailed(_) | Self::Password(_) | Self::Config(_) | Self::Io(_) => {
                Status::InternalServerError
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::RateLimited { retry_after } => {
                Response::failure("Too Many Requests", status, None)
                    .with_header("retry-after", &retry_after.to_string())
            }
            Self::Validation { message, errors } => Response::failure(&message, status, errors),
            other => Response::failure(&other.to_string(), status, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_not_found_names_the_path() {
        let res = Error::RouteNotFound("/nope".into()).into_response();
        assert_eq!(res.status_code(), 404);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["message"], "Not Found: /nope");
        assert_eq!(body["success"], false);
        assert!(body["errors"].is_null());
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let res = Error::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(res.status_code(), 429);
        assert_eq!(res.header("retry-after"), Some("42"));
    }

    #[test]
    fn validation_keeps_field_errors() {
        let errors = serde_json::json!({ "email": "required" });
        let res = Error::validation("Email is required", Some(errors.clone())).into_response();
        assert_eq!(res.status_code(), 400);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["errors"], errors);
    }
}
