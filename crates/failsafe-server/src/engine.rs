//! The response engine: handler lifecycle and chunk production.
//!
//! A handler is driven through `NEW → RESPONDING* → CLOSED`. On NEW it
//! fills in a [`Response`]; while the payload stays [`ResponsePayload::
//! Custom`] the engine asks for more chunks with RESPONDING until the
//! handler reports [`ResponsePayload::None`]. CLOSED is delivered exactly
//! once per connection, whatever happened before: error in NEW, peer
//! disconnect mid-stream, or normal completion.
//!
//! The engine is sans-IO: [`ResponseDriver`] produces wire-ready byte
//! chunks and the caller owns the socket.

use std::any::Any;

use bytes::Bytes;
use failsafe_http::{Request, ResponseInfo, format_response_header, status_text};

/// What a handler has produced for the current tick.
#[derive(Debug, Clone, Default)]
pub enum ResponsePayload {
    /// Short fully-formed body; the engine frames headers around it.
    Std(Bytes),
    /// Raw wire bytes from a streaming handler. The first CUSTOM chunk
    /// must contain the complete pre-formatted header block.
    Custom(Bytes),
    /// Nothing more this tick; for a streaming response this is EOF.
    #[default]
    None,
}

/// The response being assembled across handler invocations.
#[derive(Default)]
pub struct Response {
    /// Current tick's output.
    pub payload: ResponsePayload,
    /// Status/content metadata, used to frame STD payloads.
    pub info: ResponseInfo,
    /// Opaque per-request handler state, released on CLOSED.
    pub session: Option<Box<dyn Any + Send>>,
}

impl Response {
    /// Fill in a complete STD response.
    pub fn set_std(&mut self, info: ResponseInfo, body: impl Into<Bytes>) {
        self.info = info;
        self.payload = ResponsePayload::Std(body.into());
    }

    /// Plain-text STD response.
    pub fn text(&mut self, code: u16, body: &'static str) {
        self.set_std(ResponseInfo::text(code), Bytes::from_static(body.as_bytes()));
    }

    /// JSON STD response from an owned body.
    pub fn json(&mut self, code: u16, body: String) {
        self.set_std(ResponseInfo::json(code), body);
    }

    /// Borrow the session state as `T`.
    pub fn session_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.session.as_mut()?.downcast_mut::<T>()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("payload", &self.payload)
            .field("code", &self.info.code)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

/// Per-endpoint handler, invoked by the engine across the response
/// lifecycle.
///
/// Implementations must tolerate `on_closed` without a preceding
/// `on_new` having produced anything useful.
pub trait UriHandler: Send + Sync {
    /// The request is complete; produce the initial response.
    fn on_new(&self, request: &Request, response: &mut Response);

    /// The previous CUSTOM chunk was consumed; produce the next one or
    /// set [`ResponsePayload::None`] to end the stream.
    fn on_responding(&self, response: &mut Response) {
        response.payload = ResponsePayload::None;
    }

    /// Final callback; release `session` and any device handles.
    fn on_closed(&self, response: &mut Response) {
        response.session = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrivePhase {
    New,
    Streaming,
    Finished,
}

/// Drives one handler through its lifecycle, yielding wire-ready chunks.
pub struct ResponseDriver<'a> {
    handler: &'a dyn UriHandler,
    response: Response,
    phase: DrivePhase,
    closed: bool,
}

impl<'a> ResponseDriver<'a> {
    /// Driver for one request/handler pair.
    #[must_use]
    pub fn new(handler: &'a dyn UriHandler) -> Self {
        Self { handler, response: Response::default(), phase: DrivePhase::New, closed: false }
    }

    /// Deliver NEW and produce the first wire chunk.
    ///
    /// For STD payloads this is the full framed response. For CUSTOM it
    /// is whatever the handler emitted (its own header block). A handler
    /// that produced nothing yields a bare header block carrying
    /// `info.code`.
    pub fn begin(&mut self, request: &Request) -> Bytes {
        debug_assert_eq!(self.phase, DrivePhase::New);

        self.handler.on_new(request, &mut self.response);

        match std::mem::take(&mut self.response.payload) {
            ResponsePayload::Std(body) => {
                self.phase = DrivePhase::Finished;
                self.response.info.content_length = Some(body.len() as u64);
                let header = format_response_header(&self.response.info);
                let mut wire = bytes::BytesMut::with_capacity(header.len() + body.len());
                wire.extend_from_slice(header.as_bytes());
                wire.extend_from_slice(&body);
                wire.freeze()
            },
            ResponsePayload::Custom(first) => {
                self.phase = DrivePhase::Streaming;
                first
            },
            ResponsePayload::None => {
                // Error path without a body: frame the status alone.
                self.phase = DrivePhase::Finished;
                self.response.info.content_length = Some(0);
                Bytes::from(format_response_header(&self.response.info))
            },
        }
    }

    /// Produce the next CUSTOM chunk, or `None` at end of stream.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        if self.phase != DrivePhase::Streaming {
            return None;
        }

        self.handler.on_responding(&mut self.response);
        match std::mem::take(&mut self.response.payload) {
            ResponsePayload::Custom(chunk) => Some(chunk),
            ResponsePayload::Std(chunk) => {
                // A streaming handler switching to STD mid-flight is a
                // bug; emit the bytes raw rather than lose them.
                tracing::warn!("handler produced STD payload while streaming");
                Some(chunk)
            },
            ResponsePayload::None => {
                self.phase = DrivePhase::Finished;
                None
            },
        }
    }

    /// Deliver CLOSED. Idempotent; later calls are no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.handler.on_closed(&mut self.response);
    }

    /// Status code of the response (for access logging).
    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.info.code
    }
}

impl Drop for ResponseDriver<'_> {
    fn drop(&mut self) {
        // CLOSED must run even when the serving task aborts between
        // chunks.
        self.close();
    }
}

/// Frame a terminal error response for a request that never reached a
/// handler (parse failure, unsupported method).
#[must_use]
pub fn error_response(code: u16) -> Bytes {
    let body = status_text(code);
    let info = ResponseInfo {
        code,
        content_type: "text/plain",
        content_length: Some(body.len() as u64),
        extra_headers: Vec::new(),
    };
    let mut wire = bytes::BytesMut::new();
    wire.extend_from_slice(format_response_header(&info).as_bytes());
    wire.extend_from_slice(body.as_bytes());
    wire.freeze()
}
