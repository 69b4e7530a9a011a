//! Request emitter.
//!
//! # Design
//! An `HttpRequest` is plain data assembled from the context's URL parts,
//! persistent headers and body. `to_bytes` lays it out as a complete
//! HTTP/1.0 request so the engine can hand it to a single `send` call.

use std::fmt;

/// HTTP method for a request. Only the two the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP/1.0 request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub host: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Assemble a request. A non-empty body makes it a POST.
    pub fn new(
        host: &str,
        path: &str,
        query: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Self {
        let body = (!body.is_empty()).then(|| body.to_string());
        Self {
            method: if body.is_some() {
                HttpMethod::Post
            } else {
                HttpMethod::Get
            },
            host: host.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            headers: headers.to_vec(),
            body,
        }
    }

    /// Serialize the request line, headers, blank line and body.
    ///
    /// The request target is always `path?query`; an empty path becomes
    /// `/` so the target stays a valid absolute path.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = self.body.as_ref().map_or(0, |b| b.len());
        let mut req = Vec::with_capacity(128 + body_len);

        req.extend_from_slice(self.method.as_str().as_bytes());
        req.push(b' ');
        if self.path.is_empty() {
            req.push(b'/');
        } else {
            req.extend_from_slice(self.path.as_bytes());
        }
        req.push(b'?');
        req.extend_from_slice(self.query.as_bytes());
        req.extend_from_slice(b" HTTP/1.0\r\n");

        req.extend_from_slice(b"Host: ");
        req.extend_from_slice(self.host.as_bytes());
        req.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            req.extend_from_slice(name.as_bytes());
            req.extend_from_slice(b": ");
            req.extend_from_slice(value.as_bytes());
            req.extend_from_slice(b"\r\n");
        }

        if let Some(body) = &self.body {
            req.extend_from_slice(b"Content-Length: ");
            req.extend_from_slice(body.len().to_string().as_bytes());
            req.extend_from_slice(b"\r\n");
        }

        req.extend_from_slice(b"\r\n");

        if let Some(body) = &self.body {
            req.extend_from_slice(body.as_bytes());
        }
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(req: &HttpRequest) -> String {
        String::from_utf8(req.to_bytes()).unwrap()
    }

    #[test]
    fn get_without_body() {
        let req = HttpRequest::new("example.com", "/list", "page=2", &[], "");
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.body.is_none());
        assert_eq!(
            text(&req),
            "GET /list?page=2 HTTP/1.0\r\nHost: example.com\r\n\r\n"
        );
    }

    #[test]
    fn post_carries_content_length_and_body() {
        let body = r#"{"documents":[{"a":1}]}"#;
        let req = HttpRequest::new("example.com", "/docs", "", &[], body);
        assert_eq!(req.method, HttpMethod::Post);

        let out = text(&req);
        assert!(out.starts_with("POST /docs? HTTP/1.0\r\n"));
        assert!(out.contains(&format!("\r\nContent-Length: {}\r\n", body.len())));
        let (_, after) = out.split_once("\r\n\r\n").unwrap();
        assert_eq!(after, body);
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        let body = "héllo wörld";
        let req = HttpRequest::new("h", "/", "", &[], body);
        let out = text(&req);
        assert!(out.contains("Content-Length: 13\r\n"));
        assert!(out.ends_with("\r\n\r\nhéllo wörld"));
    }

    #[test]
    fn custom_headers_keep_insertion_order() {
        let headers = vec![
            ("B-Second".to_string(), "2".to_string()),
            ("A-First".to_string(), "1".to_string()),
        ];
        let out = text(&HttpRequest::new("h", "/p", "", &headers, ""));
        let host = out.find("Host: h\r\n").unwrap();
        let second = out.find("B-Second: 2\r\n").unwrap();
        let first = out.find("A-First: 1\r\n").unwrap();
        assert!(host < second && second < first);
    }

    #[test]
    fn content_length_follows_custom_headers() {
        let headers = vec![("X-Key".to_string(), "k".to_string())];
        let out = text(&HttpRequest::new("h", "/p", "", &headers, "body"));
        let custom = out.find("X-Key: k\r\n").unwrap();
        let length = out.find("Content-Length: 4\r\n").unwrap();
        assert!(custom < length);
    }

    #[test]
    fn empty_path_becomes_root() {
        let out = text(&HttpRequest::new("h", "", "", &[], ""));
        assert!(out.starts_with("GET /? HTTP/1.0\r\n"));
    }

    #[test]
    fn method_display() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Post.to_string(), "POST");
    }
}
