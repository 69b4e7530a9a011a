//! Splits a raw request URL into host, path and query.
//!
//! The split is purely positional: skip past the first `//`, take up to the
//! next `/` as the host, up to the first `?` as the path, and the rest as
//! the query. Nothing is decoded or validated; a malformed host simply
//! fails later at name resolution.

/// The three pieces of a URL the engine needs to build a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub host: String,
    pub path: String,
    pub query: String,
}

impl UrlParts {
    pub fn parse(url: &str) -> Self {
        let rest = match url.find("//") {
            Some(idx) => &url[idx + 2..],
            None => url,
        };

        let (host, rest) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        let (path, query) = match rest.find('?') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };

        Self {
            host: host.to_string(),
            path: path.to_string(),
            query: query.to_string(),
        }
    }
}
