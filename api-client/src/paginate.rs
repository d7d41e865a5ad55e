//! Pagination through `Link` response headers (RFC 8288).
//!
//! APIs which paginate this way return a header such as
//! `Link: </items?last=abc&n=50>; rel="next"` alongside each page.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// A single link-value from a `Link` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link<'a> {
    target: &'a str,
    params: &'a str,
}

impl<'a> Link<'a> {
    /// The URI reference between the angle brackets.
    pub fn target(&self) -> &'a str {
        self.target
    }

    /// Get a link parameter by name (case-insensitive), with any quotes removed.
    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.params.split(';').find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().trim_matches('"'))
        })
    }

    /// Check whether this link has the given relation type (case-insensitive).
    pub fn has_rel(&self, rel: &str) -> bool {
        self.param("rel").is_some_and(|rels| {
            rels.split_ascii_whitespace()
                .any(|candidate| candidate.eq_ignore_ascii_case(rel))
        })
    }

    /// Get a query parameter from the link target, percent-decoded.
    ///
    /// Parameters may appear in any order. Empty values are treated as missing.
    pub fn query_param(&self, name: &str) -> Option<Cow<'a, str>> {
        let (_, query) = self.target.split_once('?')?;
        let query = query.split('#').next().unwrap_or_default();

        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key != name || value.is_empty() {
                return None;
            }
            percent_decode_str(value).decode_utf8().ok()
        })
    }
}

/// Iterator over the link-values in a `Link` header.
#[derive(Debug, Clone)]
pub struct Links<'a> {
    rest: &'a str,
}

impl<'a> Links<'a> {
    /// Parse the link-values of a `Link` header value.
    pub fn new(header: &'a str) -> Self {
        Self { rest: header }
    }
}

impl<'a> Iterator for Links<'a> {
    type Item = Link<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.rest.find('<')?;
        let after = &self.rest[start + 1..];
        let Some(end) = after.find('>') else {
            self.rest = "";
            return None;
        };

        let target = &after[..end];
        let tail = &after[end + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());
        self.rest = &tail[params_end..];

        let params = tail[..params_end].trim().trim_end_matches(',');
        Some(Link { target, params })
    }
}

/// Find the link with `rel="next"` in a set of response headers.
pub fn next_link(headers: &http::HeaderMap) -> Option<Link<'_>> {
    headers
        .get_all(http::header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Links::new)
        .find(|link| link.has_rel("next"))
}
