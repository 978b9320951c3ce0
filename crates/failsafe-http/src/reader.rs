//! Connection read state machine: socket bytes in, complete requests out.
//!
//! One `RequestReader` serves one connection. Feeding it advances
//! `Head → Body → Complete`; the server then calls
//! [`RequestReader::into_request`] and dispatches. Since every response
//! carries `Connection: close`, a reader never sees a second request.

use bytes::BytesMut;

use crate::{
    HttpError, Result,
    form::parse_urlencoded,
    multipart::{FormValue, MultipartParser, boundary_from_content_type},
    request::{Method, Request, RequestHead},
};

/// Buffer limits enforced while reading a request.
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    /// Maximum size of the request line + header block.
    pub max_head: usize,
    /// Maximum declared body size. Uploads larger than this are rejected
    /// with 413 before any body byte is buffered.
    pub max_body: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self { max_head: 16 * 1024, max_body: 256 * 1024 * 1024 }
    }
}

/// Outcome of feeding bytes to a [`RequestReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The request is incomplete; read more from the socket.
    NeedMore,
    /// A full request is buffered; call [`RequestReader::into_request`].
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Head,
    Body,
    Complete,
}

/// Push parser assembling one HTTP request from socket reads.
#[derive(Debug)]
pub struct RequestReader {
    limits: ReadLimits,
    buf: BytesMut,
    state: State,
    head: Option<RequestHead>,
    body_start: usize,
    body_len: usize,
    multipart: Option<MultipartParser>,
}

impl RequestReader {
    /// Create a reader with the given limits.
    #[must_use]
    pub fn new(limits: ReadLimits) -> Self {
        Self {
            limits,
            buf: BytesMut::with_capacity(4096),
            state: State::Head,
            head: None,
            body_start: 0,
            body_len: 0,
            multipart: None,
        }
    }

    /// Append socket bytes and advance the state machine.
    ///
    /// # Errors
    ///
    /// Any [`HttpError`]; all are terminal for the connection.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Progress> {
        self.buf.extend_from_slice(chunk);
        self.advance()
    }

    fn advance(&mut self) -> Result<Progress> {
        loop {
            match self.state {
                State::Head => {
                    let Some(end) = find_double_crlf(&self.buf) else {
                        if self.buf.len() > self.limits.max_head {
                            return Err(HttpError::HeadTooLarge { limit: self.limits.max_head });
                        }
                        return Ok(Progress::NeedMore);
                    };
                    if end + 4 > self.limits.max_head {
                        return Err(HttpError::HeadTooLarge { limit: self.limits.max_head });
                    }

                    let head = RequestHead::parse(&self.buf[..end + 2])?;
                    self.body_start = end + 4;
                    self.body_len = match head.method {
                        Method::Get => 0,
                        Method::Post => {
                            head.content_length().ok_or(HttpError::BadContentLength)?
                        },
                    };
                    if self.body_len > self.limits.max_body {
                        return Err(HttpError::BodyTooLarge {
                            size: self.body_len,
                            limit: self.limits.max_body,
                        });
                    }

                    if self.body_len > 0
                        && let Some(ct) = head.header("content-type")
                        && ct.trim_start().to_ascii_lowercase().starts_with("multipart/")
                    {
                        let boundary = boundary_from_content_type(ct)
                            .ok_or(HttpError::MissingBoundary)?;
                        self.multipart = Some(MultipartParser::new(&boundary));
                    }

                    self.head = Some(head);
                    self.state = State::Body;
                },

                State::Body => {
                    let have = (self.buf.len() - self.body_start).min(self.body_len);
                    if let Some(parser) = &mut self.multipart {
                        parser.drive(&self.buf[self.body_start..self.body_start + have])?;
                    }
                    if have >= self.body_len {
                        self.state = State::Complete;
                    } else {
                        return Ok(Progress::NeedMore);
                    }
                },

                State::Complete => return Ok(Progress::Complete),
            }
        }
    }

    /// Turn the completed read into a [`Request`].
    ///
    /// Body-derived values come first, query-string values after, so
    /// `find_value` prefers the form field when both exist.
    ///
    /// # Errors
    ///
    /// [`HttpError::UnexpectedEof`] when the request never completed;
    /// multipart finalization errors otherwise.
    pub fn into_request(self) -> Result<Request> {
        if self.state != State::Complete {
            return Err(HttpError::UnexpectedEof);
        }
        let Some(head) = self.head else {
            return Err(HttpError::UnexpectedEof);
        };

        let body =
            self.buf.freeze().slice(self.body_start..self.body_start + self.body_len);

        let mut values: Vec<FormValue> = match self.multipart {
            Some(parser) => parser.finish()?,
            None => {
                let is_form = head
                    .header("content-type")
                    .is_some_and(|ct| {
                        ct.trim_start()
                            .to_ascii_lowercase()
                            .starts_with("application/x-www-form-urlencoded")
                    });
                if is_form {
                    std::str::from_utf8(&body)
                        .map(parse_urlencoded)
                        .unwrap_or_default()
                } else {
                    Vec::new()
                }
            },
        };

        if let Some(query) = &head.query {
            values.extend(parse_urlencoded(query));
        }

        Ok(Request::new(head, body, values))
    }
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
