//! Response types for working with HTTP responses.

use bytes::Bytes;
use http_body_util::BodyExt as _;
use hyperdriver::Body;

use crate::abort::Abort;
use crate::error::{Error, HttpResponseError};

/// Wrapper around an HTTP response that provides additional methods for working with the response,
/// and allows for easy access to the response and request parts.
#[derive(Debug)]
pub struct Response {
    request: http::request::Parts,
    response: http::response::Parts,
    body: Body,
    abort: Abort,
}

impl Response {
    /// Create a new `Response` instance.
    pub fn new(request: http::request::Parts, response: http::Response<Body>) -> Self {
        let (response, body) = response.into_parts();

        Self {
            request,
            response,
            body,
            abort: Abort::default(),
        }
    }

    pub(crate) fn bounded_by(self, abort: Abort) -> Self {
        Self { abort, ..self }
    }

    /// Get the status code of the response.
    pub fn status(&self) -> http::StatusCode {
        self.response.status
    }

    /// Get the headers of the response.
    pub fn headers(&self) -> &http::HeaderMap {
        &self.response.headers
    }

    /// Get a header as a string, if it is present and valid ASCII.
    pub fn header<K>(&self, name: K) -> Option<&str>
    where
        K: http::header::AsHeaderName,
    {
        self.response
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// Get the URI of the request that generated the response.
    pub fn uri(&self) -> &http::Uri {
        &self.request.uri
    }

    /// Get the parts of the request that generated the response.
    pub fn request(&self) -> &http::request::Parts {
        &self.request
    }

    /// Get the parts of the response.
    pub fn response(&self) -> &http::response::Parts {
        &self.response
    }

    /// Split the `Response` into its request parts, response parts, and body.
    pub fn into_parts(self) -> (http::request::Parts, http::response::Parts, Body) {
        (self.request, self.response, self.body)
    }

    /// Convert the `Response` into an `http::Response` instance.
    pub fn into_response(self) -> http::Response<Body> {
        http::Response::from_parts(self.response, self.body)
    }

    /// Collect the response body.
    ///
    /// Fails with [`Error::Cancelled`] or [`Error::TimedOut`] if the request's
    /// token fires or its deadline passes before the body is complete.
    pub async fn bytes(self) -> Result<Bytes, Error> {
        let Self {
            request,
            body,
            abort,
            ..
        } = self;

        let collected = abort
            .guard(async {
                body.collect()
                    .await
                    .map_err(|error| Error::ResponseBody(error.into()))
            })
            .await;

        match collected {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(error @ (Error::Cancelled | Error::TimedOut(_))) => {
                let path = crate::path_and_query(&request.uri);
                tracing::error!(method = %request.method, %path, %error, "response body abandoned");
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Collect the response body as UTF-8 text.
    pub async fn text(self) -> Result<String, Error> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|error| Error::ResponseBody(error.into()))
    }

    /// Collect the response body and deserialize it as JSON.
    pub async fn json<T>(self) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Error::Decode)
    }

    /// Convert the `Response` into an `HttpResponseError` describing `context`.
    ///
    /// Only cancellation or the request deadline can fail this.
    pub async fn into_error(self, context: impl Into<String>) -> Result<HttpResponseError, Error> {
        HttpResponseError::from_response(self, context).await
    }

    /// Pass the response through unchanged if its status is a success,
    /// otherwise read the body and describe the failure with `context`.
    pub async fn error_for_status(self, context: impl Into<String>) -> Result<Self, Error> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(self.into_error(context).await?.into())
        }
    }
}
