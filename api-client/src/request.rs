use std::time::Duration;

use http::{header::HeaderValue, HeaderName};
use tokio_util::sync::CancellationToken;

use crate::abort::Abort;
use crate::basic_auth;
use crate::error::Error;
use crate::{path_and_query, response::Response, ApiClient, Authentication};

/// Extensions for building HTTP requests.
pub trait RequestExt {
    /// Attach a basic authentication header to the request.
    fn basic_auth<U, P>(self, username: U, password: Option<P>) -> Self
    where
        U: std::fmt::Display,
        P: std::fmt::Display;

    /// Copy the method, URI and headers of the request.
    fn parts(&self) -> http::request::Parts;
}

impl<B> RequestExt for http::Request<B> {
    fn basic_auth<U, P>(mut self, username: U, password: Option<P>) -> Self
    where
        U: std::fmt::Display,
        P: std::fmt::Display,
    {
        let hdrs = self.headers_mut();
        hdrs.append(http::header::AUTHORIZATION, basic_auth(username, password));

        self
    }

    fn parts(&self) -> http::request::Parts {
        let mut builder = http::request::Request::builder()
            .uri(self.uri().clone())
            .method(self.method().clone())
            .version(self.version());

        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers().clone();
        }

        let (parts, _) = builder
            .body(())
            .expect("parts of a valid request form a valid request")
            .into_parts();
        parts
    }
}

/// A request under construction against an [`ApiClient`].
#[derive(Debug)]
pub struct RequestBuilder<A> {
    req: http::request::Builder,
    client: ApiClient<A>,
    body: Option<hyperdriver::Body>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl<A> RequestBuilder<A> {
    /// Start a request. Invalid URIs are reported when the request is sent.
    pub fn new<U>(client: ApiClient<A>, uri: U, method: http::Method) -> Self
    where
        http::Uri: TryFrom<U>,
        <http::Uri as TryFrom<U>>::Error: Into<http::Error>,
    {
        let timeout = client.timeout();
        Self {
            req: http::Request::builder().method(method).uri(uri),
            client,
            body: None,
            timeout,
            cancel: None,
        }
    }

    /// Add a header to the request.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.req = self.req.header(key, value);
        self
    }

    /// Mutable access to the headers set so far.
    pub fn headers_mut(&mut self) -> Option<&mut http::header::HeaderMap> {
        self.req.headers_mut()
    }

    /// Fail the request with [`Error::TimedOut`] if it takes longer than `timeout`.
    ///
    /// The deadline also covers reading the response body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the request with [`Error::Cancelled`] when `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set the request body.
    pub fn body<B: Into<hyperdriver::Body>>(self, body: B) -> Self {
        Self {
            body: Some(body.into()),
            ..self
        }
    }

    /// Build the request without sending it.
    pub fn build(self) -> Result<http::Request<hyperdriver::Body>, Error> {
        Ok(self
            .req
            .body(self.body.unwrap_or_else(hyperdriver::Body::empty))?)
    }

    /// Send the request exactly once.
    ///
    /// The timeout and cancellation token keep applying to the returned
    /// [`Response`] until its body has been read.
    pub async fn send(self) -> Result<Response, Error>
    where
        A: Authentication,
    {
        let req = self
            .req
            .body(self.body.unwrap_or_else(hyperdriver::Body::empty))?;
        let method = req.method().clone();
        let path = path_and_query(req.uri()).to_owned();

        let abort = Abort::new(self.timeout, self.cancel);
        let result = abort.guard(self.client.execute(req)).await;

        match result {
            Ok(response) => Ok(response.bounded_by(abort)),
            Err(error @ (Error::Cancelled | Error::TimedOut(_))) => {
                tracing::error!(%method, %path, %error, "request abandoned");
                Err(error)
            }
            Err(error) => Err(error),
        }
    }
}
