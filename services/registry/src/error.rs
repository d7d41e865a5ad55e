//! Error types for the registry client

use std::time::Duration;

use api_client::HttpResponseError;
use api_client::uri::ParseUriError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Broad category of a [`RegistryError`], for callers which branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The registry URL is not usable.
    Configuration,
    /// The request never produced a response.
    Network,
    /// The registry answered with a non-success status.
    Status,
    /// The registry did not report a manifest digest.
    MissingDigest,
    /// A success response had a body which could not be decoded.
    Body,
    /// The caller supplied an unusable argument.
    InvalidInput,
    /// The caller cancelled the request.
    Cancelled,
    /// The request exceeded the configured timeout.
    TimedOut,
}

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The configured registry URL could not be parsed
    #[error("Invalid REGISTRY_URL: {url}")]
    Configuration {
        /// The configured URL
        url: String,
        /// Why it could not be used
        #[source]
        source: ParseUriError,
    },

    /// The request failed before a response arrived
    #[error("{context}: {source}")]
    Network {
        /// The operation which was being attempted
        context: String,
        /// The transport error
        #[source]
        source: hyperdriver::client::Error,
    },

    /// The registry returned a non-success status
    #[error(transparent)]
    Status(#[from] HttpResponseError),

    /// A manifest lookup succeeded without a `Docker-Content-Digest` header
    #[error("No digest found for {name}:{reference}")]
    MissingDigest {
        /// Repository name
        name: String,
        /// Tag or digest which was looked up
        reference: String,
    },

    /// A success response body could not be read or decoded
    #[error("{context}: invalid response body: {source}")]
    Body {
        /// The operation which was being attempted
        context: String,
        /// The read or decode error
        #[source]
        source: BoxError,
    },

    /// The request could not be built from the given arguments
    #[error("{context}: {source}")]
    InvalidRequest {
        /// The operation which was being attempted
        context: String,
        /// The build error
        #[source]
        source: http::Error,
    },

    /// A required argument was blank
    #[error("Invalid {field}")]
    InvalidInput {
        /// Name of the argument
        field: &'static str,
    },

    /// The request was cancelled by the caller
    #[error("{context}: request cancelled")]
    Cancelled {
        /// The operation which was being attempted
        context: String,
    },

    /// The request did not finish in time
    #[error("{context}: request timed out after {timeout:?}")]
    TimedOut {
        /// The operation which was being attempted
        context: String,
        /// The timeout which was exceeded
        timeout: Duration,
    },
}

impl RegistryError {
    /// Describe a client failure which happened while attempting `context`.
    pub fn from_client(error: api_client::Error, context: impl Into<String>) -> Self {
        let context = context.into();
        match error {
            api_client::Error::Response(error) => RegistryError::Status(error),
            api_client::Error::ResponseBody(source) => RegistryError::Body { context, source },
            api_client::Error::Decode(source) => RegistryError::Body {
                context,
                source: source.into(),
            },
            api_client::Error::Request(source) => RegistryError::Network { context, source },
            api_client::Error::Build(source) => RegistryError::InvalidRequest { context, source },
            api_client::Error::TimedOut(timeout) => RegistryError::TimedOut { context, timeout },
            api_client::Error::Cancelled => RegistryError::Cancelled { context },
        }
    }

    /// The category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Configuration { .. } => ErrorKind::Configuration,
            RegistryError::Network { .. } => ErrorKind::Network,
            RegistryError::Status(_) => ErrorKind::Status,
            RegistryError::MissingDigest { .. } => ErrorKind::MissingDigest,
            RegistryError::Body { .. } => ErrorKind::Body,
            RegistryError::InvalidRequest { .. } | RegistryError::InvalidInput { .. } => {
                ErrorKind::InvalidInput
            }
            RegistryError::Cancelled { .. } => ErrorKind::Cancelled,
            RegistryError::TimedOut { .. } => ErrorKind::TimedOut,
        }
    }

    /// The upstream status, for errors which carry one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RegistryError::Status(error) => Some(error.status),
            _ => None,
        }
    }

    /// Whether the registry reported that the resource does not exist
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    /// Get the HTTP status code to report this error with
    pub fn status_code(&self) -> StatusCode {
        if self.is_not_found() {
            return StatusCode::NOT_FOUND;
        }

        match self.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Cancelled | ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Network | ErrorKind::Status | ErrorKind::MissingDigest | ErrorKind::Body => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

/// JSON error body
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
