//! Sans-IO HTTP/1.1 subset for the failsafe recovery server.
//!
//! This crate owns everything about the wire format and nothing about
//! sockets: the request head parser, the connection read state machine, the
//! streaming `multipart/form-data` parser, urlencoded form decoding, the
//! response header formatter, and the small textual helpers (hex dumps,
//! JSON string escaping, size parsing) the endpoint handlers share.
//!
//! # Design
//!
//! - Zero-copy bodies: the request body is buffered exactly once; multipart
//!   form values are recorded as ranges into that buffer, never copied.
//! - Push parsing: [`RequestReader`] is fed raw socket bytes and reports
//!   when a complete request is available. Multipart parts are finalized
//!   incrementally as body bytes arrive, so a firmware image is parsed
//!   while it is still uploading.
//! - No retriable errors: every parse failure is terminal for the
//!   connection. [`HttpError::status_code`] maps each failure to the status
//!   the engine should emit before closing.

mod error;
mod form;
mod multipart;
mod reader;
mod request;
mod response;
pub mod text;

pub use error::HttpError;
pub use form::parse_urlencoded;
pub use multipart::{FormValue, MultipartParser, ValueData, boundary_from_content_type};
pub use reader::{Progress, ReadLimits, RequestReader};
pub use request::{Method, Request, RequestHead};
pub use response::{ResponseInfo, format_response_header, status_text};

/// Result alias for wire-level operations.
pub type Result<T> = std::result::Result<T, HttpError>;
