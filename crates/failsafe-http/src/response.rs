//! Response header formatting.
//!
//! Every response the server emits carries `Connection: close`; the
//! engine frames STD bodies itself and CUSTOM handlers pre-format their
//! own header block with [`format_response_header`].

/// Response metadata the engine frames into a header block.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// HTTP status code.
    pub code: u16,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// `Content-Length`, when the body size is known upfront.
    pub content_length: Option<u64>,
    /// Extra headers, e.g. `Content-Disposition` on downloads.
    pub extra_headers: Vec<(&'static str, String)>,
}

impl Default for ResponseInfo {
    fn default() -> Self {
        Self { code: 200, content_type: "text/plain", content_length: None, extra_headers: Vec::new() }
    }
}

impl ResponseInfo {
    /// Info for a JSON body with the given status.
    #[must_use]
    pub fn json(code: u16) -> Self {
        Self { code, content_type: "application/json", ..Self::default() }
    }

    /// Info for a plain-text body with the given status.
    #[must_use]
    pub fn text(code: u16) -> Self {
        Self { code, content_type: "text/plain", ..Self::default() }
    }
}

/// Format a complete response header block, blank line included.
#[must_use]
pub fn format_response_header(info: &ResponseInfo) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(160);
    // Infallible: fmt::Write on String never errors.
    let _ = write!(out, "HTTP/1.1 {} {}\r\n", info.code, status_text(info.code));
    let _ = write!(out, "Content-Type: {}\r\n", info.content_type);
    if let Some(len) = info.content_length {
        let _ = write!(out, "Content-Length: {len}\r\n");
    }
    for (name, value) in &info.extra_headers {
        let _ = write!(out, "{name}: {value}\r\n");
    }
    out.push_str("Connection: close\r\n\r\n");
    out
}

/// Reason phrase for the status codes the server emits.
#[must_use]
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_std_header() {
        let info = ResponseInfo {
            code: 200,
            content_type: "text/plain",
            content_length: Some(5),
            extra_headers: Vec::new(),
        };
        assert_eq!(
            format_response_header(&info),
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn formats_download_header() {
        let info = ResponseInfo {
            code: 200,
            content_type: "application/octet-stream",
            content_length: Some(1024),
            extra_headers: vec![
                ("Content-Disposition", "attachment; filename=\"b.bin\"".to_string()),
                ("Cache-Control", "no-store".to_string()),
            ],
        };
        let header = format_response_header(&info);
        assert!(header.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(header.contains("Content-Disposition: attachment; filename=\"b.bin\"\r\n"));
        assert!(header.contains("Cache-Control: no-store\r\n"));
        assert!(header.ends_with("Connection: close\r\n\r\n"));
    }

    #[test]
    fn error_statuses_have_reason_phrases() {
        for code in [400, 403, 404, 405, 413, 500, 503] {
            assert_ne!(status_text(code), "Unknown");
        }
    }
}
