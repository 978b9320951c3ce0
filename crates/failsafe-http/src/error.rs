//! Wire-level error types.
//!
//! Every variant is terminal for the connection that produced it; the
//! server closes after emitting the mapped status code. There are no
//! retriable parse errors.

use thiserror::Error;

/// Errors produced while parsing a request or driving the multipart parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Request line was not `METHOD TARGET HTTP/1.x`.
    #[error("malformed request line")]
    BadRequestLine,

    /// Method token other than GET or POST.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// A header line had no `:` separator or a non-ASCII name.
    #[error("malformed header line")]
    BadHeader,

    /// Header block exceeded the configured limit before terminating.
    #[error("header block larger than {limit} bytes")]
    HeadTooLarge {
        /// Configured head limit.
        limit: usize,
    },

    /// POST without a parseable `Content-Length`.
    #[error("missing or invalid Content-Length")]
    BadContentLength,

    /// Declared body exceeds the configured maximum.
    #[error("body of {size} bytes exceeds limit of {limit}")]
    BodyTooLarge {
        /// Declared body size.
        size: usize,
        /// Configured body limit.
        limit: usize,
    },

    /// Multipart content type without a usable boundary parameter.
    #[error("multipart request without boundary")]
    MissingBoundary,

    /// Part headers were malformed or exceeded the per-part header cap.
    #[error("malformed multipart part: {0}")]
    BadPart(&'static str),

    /// Body ended before the closing boundary was seen.
    #[error("multipart body truncated")]
    TruncatedMultipart,

    /// The peer closed before the request was complete.
    #[error("connection closed mid-request")]
    UnexpectedEof,
}

impl HttpError {
    /// Status code the engine should emit for this failure.
    ///
    /// `UnexpectedEof` never produces a response (the peer is gone); it
    /// maps to 400 only so callers do not need a special case.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedMethod(_) => 405,
            Self::HeadTooLarge { .. } | Self::BodyTooLarge { .. } => 413,
            _ => 400,
        }
    }
}
