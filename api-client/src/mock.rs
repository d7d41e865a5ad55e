//! An in-memory HTTP service for testing API clients without a network.
//!
//! Responses are registered per method and path, optionally with a query
//! string. Every request which reaches the service is recorded, so tests can
//! assert on what was (or was not) sent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use parking_lot::Mutex;

/// A canned response returned by a [`MockService`].
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    delay: Option<Duration>,
    stalled: bool,
}

impl MockResponse {
    /// An empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            delay: None,
            stalled: false,
        }
    }

    /// Add a response header.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        let value = HeaderValue::from_str(value).expect("mock header values are valid");
        self.headers.append(name, value);
        self
    }

    /// Set the response body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON response body and content type.
    pub fn with_json(self, body: &serde_json::Value) -> Self {
        let body = serde_json::to_vec(body).expect("JSON values serialize");
        self.with_header(http::header::CONTENT_TYPE, "application/json")
            .with_body(body)
    }

    /// Wait before responding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Send the status and headers at once, then a body which never finishes.
    pub fn with_stalled_body(mut self) -> Self {
        self.stalled = true;
        self
    }

    fn to_response(&self) -> http::Response<hyperdriver::Body> {
        let body = if self.stalled {
            let pending = futures::stream::pending::<Result<Bytes, std::io::Error>>();
            hyperdriver::Body::from(axum::body::Body::from_stream(pending))
        } else {
            hyperdriver::Body::from(self.body.clone())
        };

        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

/// A request which was received by a [`MockService`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The request method.
    pub method: Method,
    /// The full request URI, including the query.
    pub uri: Uri,
    /// The request headers, after authentication was applied.
    pub headers: HeaderMap,
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<(Method, String), MockResponse>,
    requests: Vec<RecordedRequest>,
}

/// A [`tower::Service`] which answers requests from registered [`MockResponse`]s.
///
/// Clones share their responses and request log. Requests with no registered
/// response receive an empty `404 Not Found`.
#[derive(Debug, Default, Clone)]
pub struct MockService {
    state: Arc<Mutex<MockState>>,
}

impl MockService {
    /// Create a mock with no registered responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the response for a method and path.
    ///
    /// A path with a query string only matches requests with exactly that
    /// query. A path without one matches any query, unless a more specific
    /// response was registered.
    pub fn add(&self, method: Method, path: &str, response: MockResponse) {
        self.state
            .lock()
            .responses
            .insert((method, path.to_owned()), response);
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// The most recent request received.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.lock().requests.last().cloned()
    }

    /// Count the requests received with this method and path.
    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.method == method && request.uri.path() == path)
            .count()
    }
}

impl tower::Service<http::Request<hyperdriver::Body>> for MockService {
    type Response = http::Response<hyperdriver::Body>;
    type Error = hyperdriver::client::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<hyperdriver::Body>) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| path.clone());

        let registered = {
            let mut state = self.state.lock();
            state.requests.push(RecordedRequest {
                method: method.clone(),
                uri: req.uri().clone(),
                headers: req.headers().clone(),
            });
            state
                .responses
                .get(&(method.clone(), path_and_query))
                .or_else(|| state.responses.get(&(method.clone(), path.clone())))
                .cloned()
        };

        let response = registered.unwrap_or_else(|| {
            tracing::debug!(%method, %path, "no mock response registered");
            MockResponse::new(StatusCode::NOT_FOUND)
        });

        Box::pin(async move {
            if let Some(delay) = response.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(response.to_response())
        })
    }
}
