//! Partition inventory and the streaming backup download.
//!
//! The download is the canonical CUSTOM response: NEW opens the target,
//! validates the range and emits a pre-formatted header block with the
//! exact `Content-Length`; every RESPONDING tick reads the next chunk
//! (at most 64 KiB) from storage; CLOSED drops the device handle.

use std::sync::Arc;

use bytes::Bytes;
use failsafe_core::{
    backup::backup_filename,
    storage::{StorageSelect, Target},
};
use failsafe_http::{Request, ResponseInfo, format_response_header, text};

use crate::{
    engine::{Response, ResponsePayload, UriHandler},
    state::ServerState,
};

/// Per-tick read size for the download stream.
const STREAM_CHUNK: usize = 64 * 1024;

/// `GET /backup/info`: JSON inventory of both backends.
pub struct BackupInfo {
    state: Arc<ServerState>,
}

impl BackupInfo {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for BackupInfo {
    fn on_new(&self, _request: &Request, response: &mut Response) {
        let pool = &self.state.pool;
        let mut body = String::with_capacity(512);

        body.push_str("{\"mmc\":{");
        match pool.block() {
            Some((dev, parts)) => {
                body.push_str(&format!(
                    "\"present\":true,\"vendor\":\"{}\",\"product\":\"{}\",\"blksz\":{},\"size\":{},",
                    text::json_escape(dev.vendor().as_bytes()),
                    text::json_escape(dev.product().as_bytes()),
                    dev.block_size(),
                    dev.size(),
                ));
                body.push_str("\"parts\":[");
                for (i, part) in parts.iter().enumerate() {
                    if i != 0 {
                        body.push(',');
                    }
                    body.push_str(&format!(
                        "{{\"name\":\"{}\",\"size\":{}}}",
                        text::json_escape(part.name.as_bytes()),
                        part.size
                    ));
                }
                body.push(']');
            },
            None => body.push_str("\"present\":false,\"parts\":[]"),
        }
        body.push_str("},\"mtd\":{");
        match pool.flash() {
            Some((dev, parts)) => {
                body.push_str(&format!(
                    "\"present\":true,\"model\":\"{}\",\"type\":{},",
                    text::json_escape(dev.model().as_bytes()),
                    dev.type_code(),
                ));
                body.push_str("\"parts\":[");
                for (i, part) in parts.iter().enumerate() {
                    if i != 0 {
                        body.push(',');
                    }
                    body.push_str(&format!(
                        "{{\"name\":\"{}\",\"size\":{},\"master\":false}}",
                        text::json_escape(part.name.as_bytes()),
                        part.size
                    ));
                }
                body.push(']');
            },
            None => body.push_str("\"present\":false,\"parts\":[]"),
        }
        body.push_str("}}");

        response.json(200, body);
    }
}

struct BackupSession {
    target: Target,
    start: u64,
    total: u64,
    cur: u64,
}

/// `/backup/main`: stream `[start, end)` of a named target as a download.
pub struct BackupStream {
    state: Arc<ServerState>,
}

impl BackupStream {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

enum BackupRequest {
    Ok { select: StorageSelect, target: String, range: RangeSpec },
    BadRequest,
}

enum RangeSpec {
    Whole,
    Explicit { start: u64, end: u64 },
}

fn parse_backup_request(request: &Request) -> BackupRequest {
    let Some(mode) = request.value_str("mode") else {
        return BackupRequest::BadRequest;
    };
    let Some(target) = request.value_str("target") else {
        return BackupRequest::BadRequest;
    };
    let select = request.value_str("storage").map(StorageSelect::parse).unwrap_or_default();

    let range = match mode {
        "part" => RangeSpec::Whole,
        "range" => {
            let Some(start) = request.value_str("start").and_then(text::parse_size) else {
                return BackupRequest::BadRequest;
            };
            let Some(end) = request.value_str("end").and_then(text::parse_size) else {
                return BackupRequest::BadRequest;
            };
            RangeSpec::Explicit { start, end }
        },
        _ => return BackupRequest::BadRequest,
    };

    BackupRequest::Ok { select, target: target.to_string(), range }
}

impl UriHandler for BackupStream {
    fn on_new(&self, request: &Request, response: &mut Response) {
        let BackupRequest::Ok { select, target, range } = parse_backup_request(request) else {
            response.text(400, "bad request");
            return;
        };

        let target = match self.state.pool.open(select, &target) {
            Ok(target) => target,
            Err(err) => {
                tracing::debug!(%err, "backup target open failed");
                response.text(404, "target not found");
                return;
            },
        };

        let (start, end) = match range {
            RangeSpec::Whole => (0, target.size),
            RangeSpec::Explicit { start, end } => (start, end),
        };
        if start >= end || end > target.size {
            response.text(400, "invalid range");
            return;
        }

        let total = end - start;
        let filename = backup_filename(
            target.kind_str(),
            &target.device_model(),
            &target.name,
            start,
            end,
        );

        let info = ResponseInfo {
            code: 200,
            content_type: "application/octet-stream",
            content_length: Some(total),
            extra_headers: vec![
                ("Content-Disposition", format!("attachment; filename=\"{filename}\"")),
                ("Cache-Control", "no-store".to_string()),
            ],
        };
        let header = format_response_header(&info);

        tracing::info!(target = %target.name, start, end, %filename, "backup stream started");
        response.info = info;
        response.session = Some(Box::new(BackupSession { target, start, total, cur: 0 }));
        response.payload = ResponsePayload::Custom(Bytes::from(header));
    }

    fn on_responding(&self, response: &mut Response) {
        let Some(session) = response.session_mut::<BackupSession>() else {
            response.payload = ResponsePayload::None;
            return;
        };

        let remain = session.total - session.cur;
        if remain == 0 {
            response.payload = ResponsePayload::None;
            return;
        }

        let want = (remain as usize).min(STREAM_CHUNK);
        let mut buf = vec![0u8; want];
        match session.target.read(session.start + session.cur, &mut buf) {
            Ok(got) if got > 0 => {
                session.cur += got as u64;
                buf.truncate(got);
                response.payload = ResponsePayload::Custom(Bytes::from(buf));
            },
            Ok(_) | Err(_) => {
                // Truncate the stream; Connection: close tells the client
                // the download failed.
                tracing::warn!(target = %session.target.name, at = session.cur, "backup read failed");
                response.payload = ResponsePayload::None;
            },
        }
    }

    fn on_closed(&self, response: &mut Response) {
        // Dropping the session releases the device handle.
        response.session = None;
    }
}
