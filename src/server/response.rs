//! HTTP response types and utilities.

use chrono::{DateTime, Utc};

/// Value of the `Server` header.
pub const SERVER_NAME: &str = "filehttp-rs";

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    PayloadTooLarge = 413,
    InternalServerError = 500,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// The numeric code.
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// Represents an HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code
    pub status: StatusCode,
    /// Extra headers, written after the standard ones
    pub headers: Vec<(String, String)>,
    /// The response body; `None` for HEAD responses
    pub body: Option<Vec<u8>>,
    /// Length to declare when there is no body
    pub content_length: Option<u64>,
    /// The `Content-Type` header, skipped when empty
    pub content_type: Option<String>,
    /// Modification time of the served file
    pub last_modified: Option<DateTime<Utc>>,
    /// Time the response was generated
    pub date: Option<DateTime<Utc>>,
    /// Whether the connection stays open after this response
    pub keep_alive: bool,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
            content_length: None,
            content_type: None,
            last_modified: None,
            date: Some(Utc::now()),
            keep_alive: false,
        }
    }

    /// Set the response body with a string.
    pub fn with_body_string(self, body: impl Into<String>) -> Self {
        self.with_body_bytes(body.into().into_bytes())
    }

    /// Set the response body with bytes.
    pub fn with_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Drop the body but keep announcing its length, as HEAD requires.
    pub fn without_body(mut self) -> Self {
        if let Some(body) = self.body.take() {
            self.content_length = Some(body.len() as u64);
        }
        self
    }

    /// Declare a content length for a response without a body.
    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the modification time reported in `Last-Modified`.
    pub fn with_last_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(modified);
        self
    }

    /// Set whether the connection is kept open.
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// An HTML page explaining an error status.
    pub fn error_page(status: StatusCode, message: &str) -> Self {
        let body = format!(
            "<html><head><meta charset=\"UTF-8\"></head><body><h1>{code} {reason}</h1><p>{message}</p></body></html>",
            code = status.as_u16(),
            reason = status.reason_phrase(),
            message = escape_html(message),
        );
        Self::new(status)
            .with_content_type("text/html")
            .with_body_string(body)
    }

    /// The fixed response sent to connections turned away at capacity.
    pub fn service_unavailable() -> Self {
        Self::error_page(
            StatusCode::ServiceUnavailable,
            "The server is busy, please try again later",
        )
        .with_keep_alive(false)
    }

    /// The length announced in `Content-Length`, if any.
    pub fn declared_length(&self) -> Option<u64> {
        match &self.body {
            Some(body) => Some(body.len() as u64),
            None => self.content_length.filter(|length| *length > 0),
        }
    }

    /// Convert the response to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        // Add the status line
        let status_line = format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), self.status.reason_phrase());
        bytes.extend_from_slice(status_line.as_bytes());

        // Add the headers
        let mut headers = vec![("Server".to_string(), SERVER_NAME.to_string())];
        if let Some(length) = self.declared_length() {
            headers.push(("Content-Length".to_string(), length.to_string()));
        }
        if let Some(content_type) = self.content_type.as_deref().filter(|ct| !ct.is_empty()) {
            headers.push(("Content-Type".to_string(), content_type.to_string()));
        }
        if let Some(date) = &self.date {
            headers.push(("Date".to_string(), http_date(date)));
        }
        if let Some(modified) = &self.last_modified {
            headers.push(("Last-Modified".to_string(), http_date(modified)));
        }
        headers.extend(self.headers.iter().cloned());
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        headers.push(("Connection".to_string(), connection.to_string()));

        for (name, value) in &headers {
            let header_line = format!("{name}: {value}\r\n");
            bytes.extend_from_slice(header_line.as_bytes());
        }

        // Add the empty line that separates headers from body
        bytes.extend_from_slice(b"\r\n");

        // Add the body
        if let Some(body) = &self.body {
            bytes.extend_from_slice(body);
        }

        bytes
    }
}

/// Format a timestamp as an RFC 7231 HTTP date.
pub fn http_date(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Escape text for inclusion in an HTML page.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
