//! Continuation tokens for paginated registry listings.
//!
//! The registry returns one page at a time, and points at the next page with
//! `Link: </v2/_catalog?last=<token>&n=<count>>; rel="next"`. The `last` value
//! is handed to callers as an opaque token, and sent back to fetch the next page.

use std::borrow::Cow;

use api_client::Links;
use serde::Serialize;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// The entries on this page.
    pub items: Vec<T>,

    /// Token for the following page, absent on the last page.
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// Whether another page follows this one.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

/// Build the query string for a listing request.
///
/// `last` is only sent when non-empty and `n` only when positive, so the
/// result may be empty.
pub fn encode_query(last: Option<&str>, n: Option<i64>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());

    if let Some(last) = last.filter(|last| !last.is_empty()) {
        query.append_pair("last", last);
    }

    if let Some(n) = n.filter(|n| *n > 0) {
        query.append_pair("n", &n.to_string());
    }

    query.finish()
}

/// Append an encoded query to `path`, leaving the path bare when there is none.
pub(crate) fn with_query(path: &str, last: Option<&str>, n: Option<i64>) -> String {
    let query = encode_query(last, n);
    if query.is_empty() {
        path.to_owned()
    } else {
        format!("{path}?{query}")
    }
}

/// Extract the continuation token from a `Link` header value.
pub fn decode_next_token(link: Option<&str>) -> Option<String> {
    Links::new(link?)
        .find(|link| link.has_rel("next"))?
        .query_param("last")
        .map(Cow::into_owned)
}

/// Extract the continuation token from response headers.
pub fn next_token(headers: &http::HeaderMap) -> Option<String> {
    api_client::next_link(headers)?
        .query_param("last")
        .map(Cow::into_owned)
}
