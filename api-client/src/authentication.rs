//! Authentication for API clients.
//!
//! The `Authentication` trait is used to authenticate with an API queried via the `ApiClient`.
//!
//! Implementations are provided for:
//! - `BasicAuth` for Basic authentication
//! - `Option<A>` for optional authentication, where `None` sends requests as-is
//! - `()` for no authentication

use std::sync::Arc;

use http::HeaderValue;
use secret::Secret;
use tower::layer::Layer;

/// Create a basic authentication header value, with the password being optional.
///
/// Basic authentication Base64 encodes the username and password, separated by a colon.
///
/// # Example
/// ```rust
/// use api_client::basic_auth;
/// let username = "username";
/// let password = "password";
///
/// let header = basic_auth(username, Some(password));
/// assert_eq!(header.to_str().unwrap(), "Basic dXNlcm5hbWU6cGFzc3dvcmQ=");
/// ```
pub fn basic_auth<U, P>(username: U, password: Option<P>) -> HeaderValue
where
    U: std::fmt::Display,
    P: std::fmt::Display,
{
    use base64::prelude::BASE64_STANDARD;
    use base64::write::EncoderWriter;
    use std::io::Write;

    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        let _ = write!(encoder, "{}:", username);
        if let Some(password) = password {
            let _ = write!(encoder, "{}", password);
        }
    }
    let mut header = HeaderValue::from_bytes(&buf).expect("base64 is always valid HeaderValue");
    header.set_sensitive(true);
    header
}

/// Trait to represent authenticating requests sent by an `ApiClient`.
pub trait Authentication: Clone {
    /// Called by the `ApiClient` to implement authorization.
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B>;
}

/// Basic authentication with a static username and password.
///
/// The password is stored as a [Secret] to prevent it from being logged.
///
/// # Example
/// ```rust
/// use api_client::{Authentication, BasicAuth};
///
/// let auth = BasicAuth::new("username", "password");
/// let req = auth.authenticate(http::Request::new(()));
///
/// assert_eq!(
///     req.headers()[http::header::AUTHORIZATION].to_str().unwrap(),
///     "Basic dXNlcm5hbWU6cGFzc3dvcmQ="
/// );
/// ```
#[derive(Debug, Clone)]
pub struct BasicAuth {
    username: String,
    password: Secret,
}

impl BasicAuth {
    /// Create a new Basic authentication with a given username and password.
    pub fn new<U, P>(username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<Secret>,
    {
        BasicAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The username sent with each request.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the header value for these credentials.
    pub fn header_value(&self) -> HeaderValue {
        basic_auth(&self.username, Some(self.password.revealed()))
    }
}

impl Authentication for BasicAuth {
    fn authenticate<B>(&self, mut req: http::Request<B>) -> http::Request<B> {
        if req.headers().contains_key(http::header::AUTHORIZATION) {
            tracing::debug!(
                "{} header already set, skipping basic auth",
                http::header::AUTHORIZATION
            );
        } else {
            req.headers_mut()
                .insert(http::header::AUTHORIZATION, self.header_value());
        }
        req
    }
}

impl<A> Authentication for Option<A>
where
    A: Authentication,
{
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        match self {
            Some(auth) => auth.authenticate(req),
            None => req,
        }
    }
}

impl Authentication for () {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        req
    }
}

/// A layer which authenticates every request passing through it.
#[derive(Debug)]
pub struct AuthenticationLayer<A> {
    auth: Arc<A>,
}

impl<A> Clone for AuthenticationLayer<A> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
        }
    }
}

impl<A> AuthenticationLayer<A> {
    pub(crate) fn new(auth: Arc<A>) -> Self {
        Self { auth }
    }
}

impl<A, S> Layer<S> for AuthenticationLayer<A> {
    type Service = AuthenticationService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticationService::new(inner, self.auth.clone())
    }
}

/// A service which authenticates requests before handing them to the inner service.
#[derive(Debug)]
pub struct AuthenticationService<A, S> {
    inner: S,
    auth: Arc<A>,
}

impl<A, S: Clone> Clone for AuthenticationService<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<A, S> AuthenticationService<A, S> {
    pub(crate) fn new(inner: S, auth: Arc<A>) -> Self {
        Self { inner, auth }
    }

    /// The authentication applied by this service.
    pub fn auth(&self) -> &A {
        &self.auth
    }
}

impl<A, S, BIn, BOut> tower::Service<http::Request<BIn>> for AuthenticationService<A, S>
where
    A: Authentication,
    S: tower::Service<http::Request<BIn>, Response = http::Response<BOut>>,
    S::Future: Send + 'static,
{
    type Response = http::Response<BOut>;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<BIn>) -> Self::Future {
        let req = self.auth.authenticate(req);
        self.inner.call(req)
    }
}
