//! Request head parsing and the completed-request view handed to handlers.

use bytes::Bytes;

use crate::{
    HttpError, Result,
    multipart::{FormValue, ValueData},
};

/// Request methods the recovery server understands.
///
/// Anything else fails parsing with [`HttpError::UnsupportedMethod`];
/// per-endpoint method policy (GET-only, POST-only) is enforced by the
/// handlers themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
}

/// Parsed request line and headers.
///
/// Header names are stored lowercased; lookups are case-insensitive by
/// construction. The target is split into path and raw query string.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Request method.
    pub method: Method,
    /// Decoded path component of the target (no query string).
    pub path: String,
    /// Raw query string after `?`, if any.
    pub query: Option<String>,
    /// `(lowercased-name, value)` pairs in arrival order.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parse a complete header block (everything up to and including the
    /// blank line, which the caller has already located).
    ///
    /// # Errors
    ///
    /// [`HttpError::BadRequestLine`] for a malformed request line,
    /// [`HttpError::UnsupportedMethod`] for methods other than GET/POST,
    /// [`HttpError::BadHeader`] for header lines without a separator.
    pub fn parse(block: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(block).map_err(|_| HttpError::BadRequestLine)?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().ok_or(HttpError::BadRequestLine)?;
        let mut parts = request_line.split(' ');
        let method_tok = parts.next().ok_or(HttpError::BadRequestLine)?;
        let target = parts.next().ok_or(HttpError::BadRequestLine)?;
        let version = parts.next().ok_or(HttpError::BadRequestLine)?;
        if parts.next().is_some() || !version.starts_with("HTTP/1.") {
            return Err(HttpError::BadRequestLine);
        }

        let method = match method_tok {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => return Err(HttpError::UnsupportedMethod(other.to_string())),
        };

        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target.to_string(), None),
        };
        if path.is_empty() || !path.starts_with('/') {
            return Err(HttpError::BadRequestLine);
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or(HttpError::BadHeader)?;
            if name.is_empty() || !name.is_ascii() {
                return Err(HttpError::BadHeader);
            }
            headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
        }

        Ok(Self { method, path, query, headers })
    }

    /// Look up a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        self.headers.iter().find(|(n, _)| *n == lower).map(|(_, v)| v.as_str())
    }

    /// `Content-Length`, if present and parseable.
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }
}

/// A complete request: head, owned body buffer, and the form values parsed
/// from the body and/or query string.
///
/// Multipart values borrow ranges of `body`; they are valid exactly as long
/// as this request, which lives from NEW to CLOSED of one handler chain.
#[derive(Debug)]
pub struct Request {
    /// Parsed request line and headers.
    pub head: RequestHead,
    /// The request body, buffered once.
    pub body: Bytes,
    values: Vec<FormValue>,
}

impl Request {
    /// Assemble a request from its parsed pieces.
    #[must_use]
    pub fn new(head: RequestHead, body: Bytes, values: Vec<FormValue>) -> Self {
        Self { head, body, values }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.head.method
    }

    /// Decoded request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.head.path
    }

    /// All form values, body values first, then query-string values.
    #[must_use]
    pub fn values(&self) -> &[FormValue] {
        &self.values
    }

    /// First form value with the given name.
    #[must_use]
    pub fn find_value(&self, name: &str) -> Option<&FormValue> {
        self.values.iter().find(|v| v.name == name)
    }

    /// Payload bytes of the first form value with the given name.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&[u8]> {
        self.find_value(name).map(|v| self.value_data(v))
    }

    /// Payload of the first form value with the given name, as UTF-8.
    ///
    /// Returns `None` when the value is absent or not valid UTF-8.
    #[must_use]
    pub fn value_str(&self, name: &str) -> Option<&str> {
        std::str::from_utf8(self.value(name)?).ok()
    }

    /// Resolve a form value's payload against the body buffer.
    #[must_use]
    pub fn value_data<'a>(&'a self, value: &'a FormValue) -> &'a [u8] {
        match &value.data {
            ValueData::Slice(range) => &self.body[range.clone()],
            ValueData::Owned(data) => data,
        }
    }
}
