//! Error types for API Clients
use std::fmt;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::response::Response;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error occured while sending or recieving an HTTP request
#[derive(Debug, Error)]
pub enum Error {
    /// An HTTP response error occured
    #[error(transparent)]
    Response(#[from] HttpResponseError),

    /// An error occured while recieving the response body
    #[error("Error reading response body: {0}")]
    ResponseBody(#[source] BoxError),

    /// The response body could not be decoded
    #[error("Error decoding response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// An error occured while sending the request
    #[error(transparent)]
    Request(hyperdriver::client::Error),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    Build(#[from] http::Error),

    /// The request did not complete within the configured timeout
    #[error("Request timed out after {0:?}")]
    TimedOut(Duration),

    /// The request was cancelled by the caller before it completed
    #[error("Request cancelled")]
    Cancelled,
}

/// A server returned a non-success response.
///
/// Displays as `<context> (status <code> <reason>)`, followed by ` - <detail>`
/// when the response body had something to say.
#[derive(Debug, Clone)]
pub struct HttpResponseError {
    /// The operation which was being attempted
    pub context: String,

    /// The HTTP status code of the response
    pub status: StatusCode,

    /// A best-effort excerpt of the response body
    pub detail: Option<String>,
}

impl HttpResponseError {
    /// Create a new HTTP response error from a response, consuming the body.
    ///
    /// Fails only when the request is cancelled or times out while the body
    /// is being read.
    pub async fn from_response(
        response: Response,
        context: impl Into<String>,
    ) -> Result<Self, Error> {
        let status = response.status();
        let detail = read_error_body(response).await?;

        Ok(Self {
            context: context.into(),
            status,
            detail,
        })
    }
}

/// Read a response body for inclusion in an error message.
///
/// JSON bodies are re-serialized compactly; anything else is trimmed text.
/// Read and decode failures produce no detail rather than another error.
async fn read_error_body(response: Response) -> Result<Option<String>, Error> {
    let is_json = response
        .header(http::header::CONTENT_TYPE)
        .is_some_and(|content_type| content_type.contains("application/json"));

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(error @ (Error::Cancelled | Error::TimedOut(_))) => return Err(error),
        Err(_) => return Ok(None),
    };

    if is_json {
        let detail = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| serde_json::to_string(&value).ok());
        return Ok(detail);
    }

    let Ok(text) = std::str::from_utf8(&body) else {
        return Ok(None);
    };
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_owned()))
}

impl fmt::Display for HttpResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (status {}", self.context, self.status.as_u16())?;
        if let Some(reason) = self.status.canonical_reason() {
            write!(f, " {reason}")?;
        }
        f.write_str(")")?;
        if let Some(detail) = &self.detail {
            write!(f, " - {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpResponseError {}
