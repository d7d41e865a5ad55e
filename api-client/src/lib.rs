//! A small client for HTTP APIs, built on `hyperdriver` and `tower`.
//!
//! [`ApiClient`] joins request paths onto a base URL (keeping any mount path),
//! authenticates each request, and logs every exchange with its latency.
//! Requests are sent exactly once; there is no retry layer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use hyperdriver::service::SharedService;
pub use secret::Secret;
use tower::ServiceExt;
use url::Url;

mod abort;
mod authentication;
pub mod error;
pub mod mock;
mod paginate;
pub mod request;
pub mod response;
pub mod uri;

pub use self::authentication::{
    basic_auth, Authentication, AuthenticationLayer, AuthenticationService, BasicAuth,
};
pub use self::error::{Error, HttpResponseError};
pub use self::paginate::{next_link, Link, Links};
pub use self::request::RequestBuilder;
pub use self::request::RequestExt;
pub use self::response::Response;

/// A client for accessing APIs over HTTP / HTTPS
///
/// Useful inner object to wrap for individual API clients.
#[derive(Debug, Clone)]
pub struct ApiClient<A> {
    base: Url,
    inner: hyperdriver::client::SharedClientService<hyperdriver::Body, hyperdriver::Body>,
    authentication: Arc<A>,
    timeout: Option<Duration>,
}

impl<A> ApiClient<A>
where
    A: Authentication + Send + Sync + 'static,
{
    /// Create a new API Client from a base URL and an authentication method
    pub fn new(base: Url, authentication: A) -> Self {
        let authentication = Arc::new(authentication);
        let inner = hyperdriver::Client::build_tcp_http()
            .with_default_tls()
            .layer(AuthenticationLayer::new(authentication.clone()))
            .build_service();

        ApiClient {
            base,
            inner,
            authentication,
            timeout: None,
        }
    }

    /// Create a new API Client which sends requests through `inner` instead of the network.
    pub fn new_with_inner_service<S>(base: Url, authentication: A, inner: S) -> Self
    where
        S: tower::Service<
                http::Request<hyperdriver::Body>,
                Response = http::Response<hyperdriver::Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let authentication = Arc::new(authentication);

        let service = tower::ServiceBuilder::new()
            .layer(SharedService::layer())
            .layer(AuthenticationLayer::new(authentication.clone()))
            .service(inner);

        ApiClient {
            base,
            inner: service,
            authentication,
            timeout: None,
        }
    }
}

impl<A> ApiClient<A> {
    /// Apply a timeout to every request sent by this client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The timeout applied to each request, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The base URL which request paths are joined onto.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The authentication applied to each request.
    pub fn auth(&self) -> &A {
        &self.authentication
    }

    /// The underlying HTTP service.
    pub fn inner(&self) -> &hyperdriver::client::SharedClientService<hyperdriver::Body, hyperdriver::Body> {
        &self.inner
    }

    /// Build the absolute URL for a path (and optional query) relative to the base.
    pub fn url(&self, endpoint: &str) -> Url {
        uri::build_url(&self.base, endpoint)
    }
}

impl<A> ApiClient<A>
where
    A: Authentication,
{
    /// Start a request with an arbitrary method.
    pub fn request(&self, method: Method, endpoint: &str) -> RequestBuilder<A> {
        let url = self.url(endpoint);
        RequestBuilder::new(self.clone(), url.as_str(), method)
    }

    /// Start a GET request.
    pub fn get(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::GET, endpoint)
    }

    /// Start a HEAD request.
    pub fn head(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::HEAD, endpoint)
    }

    /// Start a DELETE request.
    pub fn delete(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::DELETE, endpoint)
    }

    /// Send a request, logging its outcome and latency.
    ///
    /// Successful responses are logged at `info`, non-success statuses at
    /// `warn`, and transport failures at `error`.
    pub async fn execute(&self, req: http::Request<hyperdriver::Body>) -> Result<Response, Error> {
        let parts = req.parts();
        let method = parts.method.clone();
        let path = path_and_query(&parts.uri).to_owned();
        let start = Instant::now();

        let result = self.inner.clone().oneshot(req).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    tracing::info!(%method, %path, status, duration_ms, "request");
                } else {
                    tracing::warn!(%method, %path, status, duration_ms, "request failed");
                }
                Ok(Response::new(parts, response))
            }
            Err(error) => {
                tracing::error!(%method, %path, %error, duration_ms, "request error");
                Err(Error::Request(error))
            }
        }
    }
}

/// The path and query of a request, for logging which page of a listing was asked for.
pub(crate) fn path_and_query(uri: &http::Uri) -> &str {
    uri.path_and_query().map_or("/", |pq| pq.as_str())
}
