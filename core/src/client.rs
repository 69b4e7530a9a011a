//! The polling HTTP/1.0 engine.
//!
//! # Design
//! `HttpClient` is the context for one exchange at a time and is reused
//! across exchanges. It never blocks and owns no threads: `request` starts
//! the connection race, and every later step happens inside `poll`, which
//! the caller invokes as often as it likes.
//!
//! The exchange state is never stored. It is derived from which sockets
//! exist: pending race candidates mean `Connecting`, an established socket
//! means `Receiving`, neither means `Complete`. Promotion from candidate to
//! established drops every other candidate, so the two can never coexist.
//!
//! Failures never surface as `Err`. Name resolution or every candidate
//! failing sets the status to `-1`; a response without a recognizable
//! status line leaves it at `0`.

use std::time::Duration;

use crate::config::HttpConfig;
use crate::http::HttpRequest;
use crate::race::{ConnectionRacer, Connector};
use crate::resolve::{Resolver, SystemResolver};
use crate::response::ResponseParser;
use crate::socket::{self, Interest, Socket};
use crate::url::UrlParts;

/// Status reported when the engine itself gave up on the exchange.
pub const STATUS_FAILED: i32 = -1;

/// Where the current exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpState {
    Connecting,
    Receiving,
    Complete,
}

#[derive(Debug)]
pub struct HttpClient {
    config: HttpConfig,
    resolver: Box<dyn Resolver>,
    url: UrlParts,
    body: String,
    custom_headers: Vec<(String, String)>,
    racer: ConnectionRacer,
    established: Option<Socket>,
    response: ResponseParser,
    status: i32,
    recv_buf: Vec<u8>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_config(HttpConfig::default())
    }

    pub fn with_config(config: HttpConfig) -> Self {
        Self::with_resolver(config, SystemResolver)
    }

    pub fn with_resolver(config: HttpConfig, resolver: impl Resolver + 'static) -> Self {
        socket::init_subsystem();
        let recv_buf = vec![0; config.clamped_recv_buffer_size()];
        Self {
            config,
            resolver: Box::new(resolver),
            url: UrlParts::default(),
            body: String::new(),
            custom_headers: Vec::new(),
            racer: ConnectionRacer::new(),
            established: None,
            response: ResponseParser::new(),
            status: 0,
            recv_buf,
        }
    }

    /// Replace how race candidates start their connect.
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.racer = ConnectionRacer::with_connector(connector);
        self
    }

    /// Add a header sent with every later request on this context.
    ///
    /// Headers keep their insertion order. Adding a pair that is already
    /// present is a no-op; the same name with a different value is kept as
    /// a separate header line.
    pub fn add_custom_header(&mut self, name: &str, value: &str) {
        let exists = self
            .custom_headers
            .iter()
            .any(|(n, v)| n == name && v == value);
        if !exists {
            self.custom_headers
                .push((name.to_string(), value.to_string()));
        }
    }

    pub fn custom_headers(&self) -> &[(String, String)] {
        &self.custom_headers
    }

    /// Start a new exchange: GET, or POST when `body` is non-empty.
    ///
    /// Ignored while another exchange is still connecting or receiving.
    /// All response state from the previous exchange is discarded.
    pub fn request(&mut self, url: &str, body: Option<&str>) {
        if self.state() != HttpState::Complete {
            log::debug!("request to {url} ignored: exchange still in progress");
            return;
        }

        self.body.clear();
        if let Some(body) = body {
            self.body.push_str(body);
        }
        self.url = UrlParts::parse(url);
        self.response.clear();
        self.status = 0;
        self.racer.clear();
        self.established = None;

        let addrs = match self.resolver.resolve(&self.url.host, self.config.port) {
            Ok(addrs) => addrs,
            Err(e) => {
                log::warn!("resolving {:?} failed: {e}", self.url.host);
                self.status = STATUS_FAILED;
                return;
            }
        };
        log::debug!(
            "{} {}{} -> {} address(es)",
            if self.body.is_empty() { "GET" } else { "POST" },
            self.url.host,
            self.url.path,
            addrs.len()
        );

        if let Some(socket) = self.racer.start(&addrs) {
            self.establish(socket);
        } else if self.racer.is_empty() {
            log::warn!("no connection attempt to {} could be started", self.url.host);
            self.status = STATUS_FAILED;
        }
    }

    /// Advance the exchange by at most one step without blocking.
    pub fn poll(&mut self) {
        match self.state() {
            HttpState::Connecting => self.poll_connect(),
            HttpState::Receiving => self.poll_receive(),
            HttpState::Complete => {}
        }
    }

    /// Poll once, then report whether the exchange is complete.
    pub fn request_complete(&mut self) -> bool {
        self.poll();
        self.is_complete()
    }

    pub fn state(&self) -> HttpState {
        if !self.racer.is_empty() {
            HttpState::Connecting
        } else if self.established.is_some() {
            HttpState::Receiving
        } else {
            HttpState::Complete
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state() == HttpState::Complete
    }

    /// `0` until a status line is parsed, `-1` if the engine gave up.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Response body; filled in once the peer closes the connection.
    pub fn content(&self) -> &str {
        self.response.content()
    }

    /// The raw response header block, empty until the boundary is found.
    pub fn response_headers(&self) -> &str {
        self.response.headers()
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    /// Every byte received for the current exchange.
    pub fn raw_response(&self) -> &[u8] {
        self.response.raw()
    }

    pub fn host(&self) -> &str {
        &self.url.host
    }

    pub fn path(&self) -> &str {
        &self.url.path
    }

    pub fn query(&self) -> &str {
        &self.url.query
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Number of connection candidates still racing.
    pub fn pending_sockets(&self) -> usize {
        self.racer.len()
    }

    pub fn has_established_socket(&self) -> bool {
        self.established.is_some()
    }

    /// Close every socket this context holds, abandoning any exchange in
    /// flight. The context is `Complete` afterwards and may be reused.
    pub fn close(&mut self) {
        if !self.is_complete() {
            log::debug!("abandoning exchange with {}", self.url.host);
        }
        self.racer.clear();
        self.established = None;
    }

    fn poll_connect(&mut self) {
        if let Some(socket) = self.racer.poll() {
            self.establish(socket);
        } else if self.racer.is_empty() {
            log::warn!("every connection attempt to {} failed", self.url.host);
            self.status = STATUS_FAILED;
        }
    }

    /// Promote `socket` to the established connection and send the request.
    fn establish(&mut self, socket: Socket) {
        self.racer.clear();

        let request = HttpRequest::new(
            &self.url.host,
            &self.url.path,
            &self.url.query,
            &self.custom_headers,
            &self.body,
        );
        let bytes = request.to_bytes();

        // One send; a short write is reported but not retried.
        match socket.send(&bytes) {
            Ok(n) if n == bytes.len() => {
                log::debug!("sent {n} byte {} request on fd {}", request.method, socket.raw_fd());
            }
            Ok(n) => {
                log::warn!("short write: sent {n} of {} request bytes", bytes.len());
            }
            Err(e) => {
                log::warn!("sending request to {} failed: {e}", self.url.host);
            }
        }

        self.established = Some(socket);
    }

    fn poll_receive(&mut self) {
        let read = {
            let Some(socket) = self.established.as_ref() else {
                return;
            };
            match socket.poll_ready(Interest::Readable) {
                Ok(false) => return,
                Ok(true) => socket.recv(&mut self.recv_buf),
                Err(e) => Err(e),
            }
        };

        match read {
            Ok(0) => {
                log::trace!("peer closed the connection");
                self.finish();
            }
            Ok(n) => {
                log::trace!("received {n} bytes");
                self.response.extend(&self.recv_buf[..n]);
                let parsed = self.response.process(false);
                self.record_status(parsed);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                log::warn!("receive from {} failed: {e}", self.url.host);
                self.finish();
            }
        }
    }

    /// Close the established socket and flush whatever content arrived.
    fn finish(&mut self) {
        self.established = None;
        let parsed = self.response.process(true);
        self.record_status(parsed);
        log::debug!(
            "exchange with {} complete: status {}, {} content bytes",
            self.url.host,
            self.status,
            self.response.content().len()
        );
    }

    fn record_status(&mut self, parsed: Option<i32>) {
        if let Some(code) = parsed {
            if self.status == 0 {
                log::debug!("status {code} from {}", self.url.host);
                self.status = code;
            }
        }
    }
}

impl Drop for HttpClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Block the calling thread until `client` completes, polling every
/// `interval`.
///
/// This is a convenience for callers that want synchronous behavior; the
/// engine itself never waits. There is no deadline: a peer that keeps the
/// connection open without sending keeps this loop running.
pub fn block_until_complete(client: &mut HttpClient, interval: Duration) {
    while !client.request_complete() {
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::StaticResolver;

    fn unreachable_client() -> HttpClient {
        HttpClient::with_resolver(HttpConfig::default(), StaticResolver::default())
    }

    #[test]
    fn new_context_is_complete_and_idle() {
        let client = HttpClient::new();
        assert_eq!(client.state(), HttpState::Complete);
        assert_eq!(client.status(), 0);
        assert_eq!(client.content(), "");
        assert_eq!(client.pending_sockets(), 0);
        assert!(!client.has_established_socket());
    }

    #[test]
    fn resolution_failure_is_terminal() {
        let mut client = unreachable_client();
        client.request("http://nowhere.invalid/path?x=1", None);
        assert_eq!(client.status(), STATUS_FAILED);
        assert!(client.is_complete());
        assert_eq!(client.host(), "nowhere.invalid");
        assert_eq!(client.path(), "/path");
        assert_eq!(client.query(), "x=1");
    }

    #[test]
    fn polling_a_complete_context_changes_nothing() {
        let mut client = unreachable_client();
        client.request("http://nowhere.invalid/", Some("payload"));
        for _ in 0..10 {
            client.poll();
            assert!(client.request_complete());
        }
        assert_eq!(client.status(), STATUS_FAILED);
        assert_eq!(client.content(), "");
        assert_eq!(client.body(), "payload");
    }

    #[test]
    fn new_request_resets_previous_exchange() {
        let mut client = unreachable_client();
        client.request("http://first/a", Some("one"));
        assert_eq!(client.status(), STATUS_FAILED);

        client.request("http://second/b", None);
        assert_eq!(client.host(), "second");
        assert_eq!(client.path(), "/b");
        assert_eq!(client.body(), "");
        assert_eq!(client.status(), STATUS_FAILED);
    }

    #[test]
    fn custom_headers_persist_in_order_without_duplicates() {
        let mut client = unreachable_client();
        client.add_custom_header("AuthAccessKey", "k");
        client.add_custom_header("AuthAccessSecret", "s");
        client.add_custom_header("AuthAccessKey", "k");
        client.add_custom_header("Accept", "a");
        client.add_custom_header("Accept", "b");
        client.request("http://h/", None);

        let names: Vec<_> = client
            .custom_headers()
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect();
        assert_eq!(
            names,
            vec!["AuthAccessKey=k", "AuthAccessSecret=s", "Accept=a", "Accept=b"]
        );
    }

    #[test]
    fn oversized_receive_buffer_is_capped() {
        let config: crate::types::AnalyticsConfig = serde_json::from_str(
            r#"{"base_url":"http://127.0.0.1","http":{"recv_buffer_size":70368744177664}}"#,
        )
        .unwrap();
        let client = HttpClient::with_resolver(config.http, StaticResolver::default());
        assert_eq!(client.recv_buf.len(), crate::config::MAX_RECV_BUFFER_SIZE);
    }

    #[test]
    fn close_on_idle_context_is_harmless() {
        let mut client = HttpClient::new();
        client.close();
        client.close();
        assert!(client.is_complete());
    }
}
