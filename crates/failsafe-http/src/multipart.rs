//! Streaming `multipart/form-data` parser (RFC 7578 subset).
//!
//! The parser is fed the request body as it accumulates and records each
//! part's payload as a range into that buffer. Payload bytes are never
//! copied, so a firmware image only ever exists once in memory; the only
//! allocations are the per-part name/filename strings.
//!
//! # Invariants
//!
//! - A part's payload range never overlaps another part's range, and ranges
//!   appear in buffer order.
//! - A `CRLF` inside a payload is only treated as a terminator when the
//!   full `--boundary` token follows it.
//! - All failures are terminal; the parser never asks for a retry.

use std::ops::Range;

use crate::{HttpError, Result};

/// Cap on one part's header block. A part whose headers exceed this is
/// malformed; payload size is unconstrained here (the connection's body
/// limit applies).
const MAX_PART_HEADER: usize = 2048;

/// Payload location of a form value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueData {
    /// Range into the request body buffer (multipart parts).
    Slice(Range<usize>),
    /// Decoded bytes owned by the value (urlencoded and query values).
    Owned(Vec<u8>),
}

/// One named value from a form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormValue {
    /// Field name from `Content-Disposition`.
    pub name: String,
    /// Original client-side filename, for file fields.
    pub filename: Option<String>,
    /// Part `Content-Type`, if the client sent one.
    pub content_type: Option<String>,
    /// Where the payload lives.
    pub data: ValueData,
}

impl FormValue {
    /// Payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        match &self.data {
            ValueData::Slice(range) => range.len(),
            ValueData::Owned(data) => data.len(),
        }
    }
}

/// Extract the boundary parameter from a `Content-Type` header value.
///
/// Returns `None` unless the type is `multipart/form-data` with a
/// non-empty boundary. Quoted boundaries are unquoted.
#[must_use]
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    let mut parts = value.split(';');
    let mime = parts.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    for param in parts {
        let (key, val) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let val = val.trim().trim_matches('"');
            if !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

#[derive(Debug)]
enum Phase {
    /// Discarding bytes before the first boundary.
    Preamble,
    /// Boundary token consumed; deciding between `CRLF` (next part) and
    /// `--` (close). `at` is the offset just past the token.
    Boundary { at: usize },
    /// Collecting one part's header block starting at `at`.
    Headers { at: usize },
    /// Accumulating payload; `value_start` is the first payload byte.
    Body { value_start: usize },
    /// Closing boundary seen; the rest of the body is ignored.
    Epilogue,
}

/// Incremental multipart parser over an append-only body buffer.
///
/// Call [`MultipartParser::drive`] with the full body-so-far after every
/// read, then [`MultipartParser::finish`] once the declared body length has
/// arrived.
#[derive(Debug)]
pub struct MultipartParser {
    /// `\r\n--<boundary>`: the part delimiter as it appears mid-body.
    delim: Vec<u8>,
    phase: Phase,
    /// Resume offset for payload scanning, so each byte is examined once.
    scan: usize,
    pending: Option<(String, Option<String>, Option<String>)>,
    values: Vec<FormValue>,
}

impl MultipartParser {
    /// Create a parser for the given boundary string.
    #[must_use]
    pub fn new(boundary: &str) -> Self {
        let mut delim = Vec::with_capacity(boundary.len() + 4);
        delim.extend_from_slice(b"\r\n--");
        delim.extend_from_slice(boundary.as_bytes());

        Self { delim, phase: Phase::Preamble, scan: 0, pending: None, values: Vec::new() }
    }

    /// Advance over `body`, the complete request body buffered so far.
    ///
    /// The buffer must only ever grow between calls.
    ///
    /// # Errors
    ///
    /// [`HttpError::BadPart`] for malformed part headers or a boundary
    /// followed by neither `CRLF` nor `--`.
    pub fn drive(&mut self, body: &[u8]) -> Result<()> {
        loop {
            match self.phase {
                Phase::Preamble => {
                    // The first delimiter has no leading CRLF when there is
                    // no preamble, which is the case for every browser.
                    let token = &self.delim[2..];
                    if body.len() < token.len() {
                        return Ok(());
                    }
                    if body.starts_with(token) {
                        self.phase = Phase::Boundary { at: token.len() };
                        continue;
                    }
                    match find(body, &self.delim, self.scan) {
                        Some(pos) => {
                            self.phase = Phase::Boundary { at: pos + self.delim.len() };
                        },
                        None => {
                            self.scan = body.len().saturating_sub(self.delim.len() - 1);
                            return Ok(());
                        },
                    }
                },

                Phase::Boundary { at } => {
                    let Some(tail) = body.get(at..at + 2) else {
                        return Ok(());
                    };
                    if tail == b"--" {
                        self.phase = Phase::Epilogue;
                    } else if tail == b"\r\n" {
                        self.phase = Phase::Headers { at: at + 2 };
                    } else {
                        return Err(HttpError::BadPart("boundary not followed by CRLF"));
                    }
                },

                Phase::Headers { at } => {
                    let window_end = body.len().min(at + MAX_PART_HEADER);
                    match find(&body[..window_end], b"\r\n\r\n", at) {
                        Some(end) => {
                            self.pending = Some(parse_part_headers(&body[at..end])?);
                            let value_start = end + 4;
                            self.scan = value_start;
                            self.phase = Phase::Body { value_start };
                        },
                        None if body.len() - at >= MAX_PART_HEADER => {
                            return Err(HttpError::BadPart("part headers too large"));
                        },
                        None => return Ok(()),
                    }
                },

                Phase::Body { value_start } => {
                    match find(body, &self.delim, self.scan) {
                        Some(pos) => {
                            // `pending` is always set when entering Body.
                            let Some((name, filename, content_type)) = self.pending.take() else {
                                return Err(HttpError::BadPart("part without headers"));
                            };
                            self.values.push(FormValue {
                                name,
                                filename,
                                content_type,
                                data: ValueData::Slice(value_start..pos),
                            });
                            self.phase = Phase::Boundary { at: pos + self.delim.len() };
                        },
                        None => {
                            // Keep enough unscanned tail to match a
                            // delimiter split across reads.
                            self.scan = body
                                .len()
                                .saturating_sub(self.delim.len() - 1)
                                .max(value_start);
                            return Ok(());
                        },
                    }
                },

                Phase::Epilogue => return Ok(()),
            }
        }
    }

    /// Finalize parsing once the body is complete.
    ///
    /// # Errors
    ///
    /// [`HttpError::TruncatedMultipart`] when the closing boundary was
    /// never seen.
    pub fn finish(self) -> Result<Vec<FormValue>> {
        match self.phase {
            Phase::Epilogue => Ok(self.values),
            _ => Err(HttpError::TruncatedMultipart),
        }
    }
}

/// First occurrence of `needle` in `haystack[from..]`, as an absolute
/// offset.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < needle.len() || from > haystack.len() - needle.len() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

/// Parse one part's header block into `(name, filename, content_type)`.
fn parse_part_headers(block: &[u8]) -> Result<(String, Option<String>, Option<String>)> {
    let text =
        std::str::from_utf8(block).map_err(|_| HttpError::BadPart("non-UTF-8 part headers"))?;

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (header, value) =
            line.split_once(':').ok_or(HttpError::BadPart("header without separator"))?;

        if header.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        } else if header.eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').skip(1) {
                let Some((key, val)) = param.split_once('=') else {
                    continue;
                };
                let val = val.trim().trim_matches('"').to_string();
                match key.trim() {
                    "name" => name = Some(val),
                    "filename" => filename = Some(val),
                    _ => {},
                }
            }
        }
    }

    let name = name.ok_or(HttpError::BadPart("part without a field name"))?;
    Ok((name, filename, content_type))
}
