//! Header/content demultiplexer.
//!
//! # Design
//! Received bytes are appended to `raw` and never removed. The header
//! block ends at the first CRLFCRLF; it is located once and the status is
//! read from it at that moment. The body is only copied out after the
//! connection closes, since an HTTP/1.0 body is delimited by the peer
//! closing the connection.
//!
//! The boundary search resumes from a cursor instead of rescanning `raw`
//! from the start on every call. The cursor backs up three bytes so a
//! boundary split across two reads is still found.

const BOUNDARY: &[u8] = b"\r\n\r\n";

#[derive(Debug, Default)]
pub struct ResponseParser {
    raw: Vec<u8>,
    scan_from: usize,
    boundary: Option<usize>,
    headers: String,
    content: String,
    content_done: bool,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.raw.extend_from_slice(bytes);
    }

    /// Advance the demultiplexer over everything received so far.
    ///
    /// Returns the parsed status code the first time the header boundary
    /// is located (0 when the header block has no recognizable status
    /// line), and `None` on every other call. When `closed` is set and the
    /// boundary is known, everything after it becomes the content.
    pub fn process(&mut self, closed: bool) -> Option<i32> {
        let mut status = None;

        if self.boundary.is_none() {
            if let Some(pos) = find_boundary(&self.raw, self.scan_from) {
                self.boundary = Some(pos);
                self.headers = String::from_utf8_lossy(&self.raw[..pos]).into_owned();
                status = Some(parse_status(&self.headers));
            } else {
                self.scan_from = self.raw.len().saturating_sub(BOUNDARY.len() - 1);
            }
        }

        if let (Some(pos), true, false) = (self.boundary, closed, self.content_done) {
            let body = &self.raw[pos + BOUNDARY.len()..];
            self.content.push_str(&String::from_utf8_lossy(body));
            self.content_done = true;
        }

        status
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Offset of the CRLFCRLF sequence, once found.
    pub fn boundary(&self) -> Option<usize> {
        self.boundary
    }

    /// The header block without the terminating blank line; empty until
    /// the boundary is found.
    pub fn headers(&self) -> &str {
        &self.headers
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Case-insensitive lookup of a response header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.scan_from = 0;
        self.boundary = None;
        self.headers.clear();
        self.content.clear();
        self.content_done = false;
    }
}

fn find_boundary(raw: &[u8], from: usize) -> Option<usize> {
    raw.get(from..)?
        .windows(BOUNDARY.len())
        .position(|w| w == BOUNDARY)
        .map(|pos| from + pos)
}

/// Scan every header line; a line whose first space-separated token is
/// `HTTP/1.0` or `HTTP/1.1` supplies the status from its second token.
fn parse_status(headers: &str) -> i32 {
    headers
        .split('\n')
        .filter_map(|line| {
            let mut tokens = line.split(' ');
            let version = tokens.next()?;
            let code = tokens.next()?;
            matches!(version, "HTTP/1.0" | "HTTP/1.1").then(|| leading_int(code))
        })
        .last()
        .unwrap_or(0)
}

/// Parse an optionally signed leading run of digits, 0 if there is none.
fn leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1i64, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = (value * 10 + i64::from(b - b'0')).min(i64::from(i32::MAX) + 1);
    }
    (sign * value).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
