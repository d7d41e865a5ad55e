//! URI utilities.
//!
//! API clients are configured with a base URL which may carry a mount path
//! (e.g. `https://example.com/registry`). Request paths are always joined onto
//! that mount path, never resolved against it, so that `/v2/_catalog` becomes
//! `https://example.com/registry/v2/_catalog`.

use http::Uri;
use thiserror::Error;
use url::Url;

/// The provided URL cannot be a base URL,
/// and so is not valid as the base part of an API URL.
#[derive(Debug, Error)]
#[error("cannot be a base URL: {0}")]
pub struct CannotBeABase(url::Url);

/// Errors that can occur when parsing a base URL.
#[derive(Debug, Error)]
pub enum ParseUriError {
    /// An error occurred while parsing the URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// The provided URL cannot be a base URL,
    #[error(transparent)]
    CannotBeABase(#[from] CannotBeABase),

    /// The URI is invalid, but URL parsing succeded.
    #[error("invalid URI: {0}")]
    Invalid(#[from] http::uri::InvalidUri),
}

/// Parse a string as a base URL for API requests.
///
/// # Example
/// ```rust
/// use api_client::uri::parse_base;
///
/// let base = parse_base("https://example.com/registry/").unwrap();
/// assert_eq!(base.path(), "/registry/");
///
/// assert!(parse_base("not a url").is_err());
/// assert!(parse_base("mailto:someone@example.com").is_err());
/// ```
pub fn parse_base(raw: &str) -> Result<Url, ParseUriError> {
    let url: Url = raw.parse()?;
    if url.cannot_be_a_base() {
        return Err(CannotBeABase(url).into());
    }
    Ok(url)
}

/// Join a request path (optionally carrying a query string) onto a base URL.
///
/// Trailing slashes are stripped from the base path, a leading slash is added
/// to the request path when missing, and the query string of the request path
/// replaces any query on the base.
pub fn build_url(base: &Url, path: &str) -> Url {
    let (raw_path, raw_query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };

    let mut joined = String::from(base.path().trim_end_matches('/'));
    if !raw_path.starts_with('/') {
        joined.push('/');
    }
    joined.push_str(raw_path);

    let mut url = base.clone();
    url.set_path(&joined);
    url.set_query(raw_query.filter(|query| !query.is_empty()));
    url.set_fragment(None);
    url
}

/// Extension trait for URIs.
pub trait UriExtension {
    /// Join a request path onto this URI, preserving any mount path.
    fn join<P: AsRef<str>>(&self, path: P) -> Result<Uri, ParseUriError>;
}

impl UriExtension for Uri {
    fn join<P: AsRef<str>>(&self, path: P) -> Result<Uri, ParseUriError> {
        let base = parse_base(&self.to_string())?;
        Ok(build_url(&base, path.as_ref()).as_str().parse()?)
    }
}

impl UriExtension for Url {
    fn join<P: AsRef<str>>(&self, path: P) -> Result<Uri, ParseUriError> {
        Ok(build_url(self, path.as_ref()).as_str().parse()?)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn joined(base: &str, path: &str) -> String {
        build_url(&parse_base(base).unwrap(), path).to_string()
    }

    #[test]
    fn join_without_mount_path() {
        for base in ["http://example.com", "http://example.com/", "http://example.com//"] {
            assert_eq!(
                joined(base, "/v2/_catalog"),
                "http://example.com/v2/_catalog",
                "base: {base}"
            );
        }
    }

    #[test]
    fn join_with_mount_path() {
        for base in [
            "https://example.com/registry",
            "https://example.com/registry/",
            "https://example.com/registry///",
        ] {
            assert_eq!(
                joined(base, "/v2/_catalog"),
                "https://example.com/registry/v2/_catalog",
                "base: {base}"
            );
        }
    }

    #[test]
    fn join_adds_leading_slash() {
        assert_eq!(
            joined("http://example.com/bar", "v2/_catalog"),
            "http://example.com/bar/v2/_catalog"
        );
    }

    #[test]
    fn join_reattaches_query() {
        assert_eq!(
            joined("http://localhost:5000/", "/v2/_catalog?last=abc&n=50"),
            "http://localhost:5000/v2/_catalog?last=abc&n=50"
        );

        assert_eq!(
            joined("http://localhost:5000/?stale=1", "/v2/_catalog"),
            "http://localhost:5000/v2/_catalog"
        );

        assert_eq!(
            joined("http://localhost:5000", "/v2/_catalog?"),
            "http://localhost:5000/v2/_catalog"
        );
    }

    #[test]
    fn join_keeps_digest_references() {
        assert_eq!(
            joined("http://localhost:5000", "/v2/library/nginx/manifests/sha256:abc"),
            "http://localhost:5000/v2/library/nginx/manifests/sha256:abc"
        );
    }

    #[test]
    fn uri_join() {
        let uri = "http://example.com/bar/".parse::<Uri>().unwrap();
        let joined = uri.join("/foo?x=1").unwrap();
        assert_eq!(joined.to_string(), "http://example.com/bar/foo?x=1");
        assert_eq!(joined.path(), "/bar/foo");
        assert_eq!(joined.query(), Some("x=1"));
    }

    #[test]
    fn invalid_bases() {
        assert!(matches!(parse_base(""), Err(ParseUriError::Url(_))));
        assert!(matches!(
            parse_base("localhost:5000"),
            Err(ParseUriError::CannotBeABase(_))
        ));
    }
}
