//! HTTP request parsing and representation.

use crate::parser::error::Error;
use crate::parser::method::Method;

/// Delimiter between the header block and the body.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Represents an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path, exactly as sent by the client
    pub path: String,
    /// The protocol token of the request line, if the client sent one
    pub version: Option<String>,
    /// The HTTP headers in the order they were received
    pub headers: Vec<(String, String)>,
    /// The declared `Content-Length`, 0 when absent or unparsable
    pub content_length: usize,
    /// The request body, always `content_length` bytes long
    pub body: Vec<u8>,
    /// Whether the client asked for a persistent connection
    pub keep_alive: bool,
}

impl HttpRequest {
    /// Get a header value.
    ///
    /// Header names are compared case-insensitively; the first match wins.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                Some(v.as_str())
            } else {
                None
            }
        })
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    /// The request body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of a parse attempt over the bytes received so far.
#[derive(Debug, Clone)]
pub enum ParseStatus {
    /// More bytes are needed before a request can be produced.
    Incomplete,
    /// A full request is buffered.
    Complete {
        /// The parsed request
        request: HttpRequest,
        /// Number of leading buffer bytes the request occupied
        consumed: usize,
    },
}

/// Try to parse one HTTP request from the front of `buffer`.
///
/// Returns [`ParseStatus::Incomplete`] until the header terminator and the
/// whole declared body are buffered. A request is never returned partially.
/// A malformed request line is only reported once the whole message,
/// including its declared body, has arrived.
///
/// # Examples
///
/// ```
/// use filehttp_rs::{try_parse, ParseStatus};
///
/// let status = try_parse(b"GET /index.html HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
/// match status {
///     ParseStatus::Complete { request, consumed } => {
///         assert_eq!(request.path, "/index.html");
///         assert_eq!(consumed, 37);
///     }
///     ParseStatus::Incomplete => unreachable!(),
/// }
/// ```
pub fn try_parse(buffer: &[u8]) -> Result<ParseStatus, Error> {
    match find_header_end(buffer, 0) {
        Some(header_len) => parse_message(buffer, header_len),
        None => Ok(ParseStatus::Incomplete),
    }
}

/// Repeated [`try_parse`] over one growing buffer.
///
/// Remembers how much of the buffer is known to hold no header terminator,
/// so each new read only scans the bytes that arrived since the last call.
/// After a `Complete` result the caller drains `consumed` bytes from the
/// front of the buffer, and the next call starts over.
#[derive(Debug, Default)]
pub struct RequestReader {
    scanned: usize,
}

impl RequestReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the front of `buffer`, skipping bytes already searched.
    pub fn poll(&mut self, buffer: &[u8]) -> Result<ParseStatus, Error> {
        let Some(header_len) = find_header_end(buffer, self.scanned) else {
            // A terminator may straddle the end of what we have
            self.scanned = buffer.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
            return Ok(ParseStatus::Incomplete);
        };

        let status = parse_message(buffer, header_len);
        self.scanned = match status {
            Ok(ParseStatus::Incomplete) => header_len,
            _ => 0,
        };
        status
    }

    /// Number of leading bytes that will not be searched again.
    pub fn scanned(&self) -> usize {
        self.scanned
    }
}

/// Parse a message whose header block ends at `header_len`.
fn parse_message(buffer: &[u8], header_len: usize) -> Result<ParseStatus, Error> {
    let header_block = String::from_utf8_lossy(&buffer[..header_len]);
    let mut lines = header_block
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let request_line = lines.next().unwrap_or_default();

    let mut headers = Vec::new();
    for line in lines {
        // Lines without a colon carry nothing we can use
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let content_length = header_value(&headers, "Content-Length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);

    let keep_alive = header_value(&headers, "Connection")
        .map(|value| value.to_ascii_lowercase().contains("keep-alive"))
        .unwrap_or(false);

    let body_start = header_len + HEADER_TERMINATOR.len();
    let Some(consumed) = body_start.checked_add(content_length) else {
        return Ok(ParseStatus::Incomplete);
    };
    if buffer.len() < consumed {
        return Ok(ParseStatus::Incomplete);
    }

    let mut tokens = request_line.split_whitespace();
    let (method, path) = match (tokens.next(), tokens.next()) {
        (Some(method), Some(path)) => (Method::from(method), path.to_string()),
        _ => return Err(Error::MalformedRequestLine(request_line.to_string())),
    };
    let version = tokens.next().map(str::to_string);

    let request = HttpRequest {
        method,
        path,
        version,
        headers,
        content_length,
        body: buffer[body_start..consumed].to_vec(),
        keep_alive,
    };

    Ok(ParseStatus::Complete { request, consumed })
}

fn find_header_end(buffer: &[u8], from: usize) -> Option<usize> {
    let from = from.min(buffer.len());
    buffer[from..]
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|position| from + position)
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
