//! The flash editor: bounded reads, read-modify-write updates, and
//! whole-region restore, all answering small JSON envelopes.

use std::sync::Arc;

use failsafe_core::{
    backup::parse_backup_filename,
    storage::{StorageSelect, Target},
};
use failsafe_http::{
    Method, Request,
    text::{self, HexError},
};

use crate::{
    engine::{Response, UriHandler},
    handlers::value_bytes,
    state::ServerState,
};

/// Read cap: 4 KiB per request.
const MAX_READ: usize = 4096;

/// Write cap: 64 KiB of decoded hex per request.
const MAX_WRITE: usize = 64 * 1024;

/// `/flash/read`, `/flash/write`, `/flash/restore` (one handler; the
/// operation comes from the path, overridable by an `op` form field).
pub struct FlashEdit {
    state: Arc<ServerState>,
}

impl FlashEdit {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }

    fn open_target(&self, request: &Request, response: &mut Response) -> Option<Target> {
        let Some(target) = request.value_str("target").filter(|t| !t.is_empty()) else {
            reply(response, 400, "bad_request");
            return None;
        };
        let select = request.value_str("storage").map(StorageSelect::parse).unwrap_or_default();

        match self.state.pool.open(select, target) {
            Ok(target) => Some(target),
            Err(err) => {
                tracing::debug!(%err, "flash target open failed");
                reply(response, 404, "target_not_found");
                None
            },
        }
    }

    fn op_read(&self, request: &Request, response: &mut Response) {
        let (Some(start), Some(end)) = (
            request.value_str("start").and_then(text::parse_size),
            request.value_str("end").and_then(text::parse_size),
        ) else {
            reply(response, 400, "bad_range");
            return;
        };
        if end <= start {
            reply(response, 400, "bad_range");
            return;
        }
        let len = (end - start) as usize;
        if len > MAX_READ {
            reply(response, 413, "too_large");
            return;
        }

        let Some(target) = self.open_target(request, response) else {
            return;
        };
        if end > target.size {
            reply(response, 400, "bad_range");
            return;
        }

        let mut buf = vec![0u8; len];
        match target.read(start, &mut buf) {
            Ok(got) if got == len => {},
            _ => {
                reply(response, 500, "io");
                return;
            },
        }

        let body = format!(
            "{{\"ok\":true,\"start\":\"{start:#x}\",\"end\":\"{end:#x}\",\"size\":{len},\"data\":\"{}\"}}\n",
            text::hex_dump(&buf)
        );
        response.json(200, body);
    }

    fn op_write(&self, request: &Request, response: &mut Response) {
        let Some(start) = request.value_str("start").and_then(text::parse_size) else {
            reply(response, 400, "bad_range");
            return;
        };
        let Some(data) = request.value_str("data") else {
            reply(response, 400, "bad_request");
            return;
        };

        let bytes = match text::hex_decode(data, MAX_WRITE) {
            Ok(bytes) => bytes,
            Err(HexError::TooLarge) => {
                reply(response, 413, "too_large");
                return;
            },
            Err(HexError::Invalid) => {
                reply(response, 400, "bad_hex");
                return;
            },
        };

        let Some(target) = self.open_target(request, response) else {
            return;
        };
        if start.checked_add(bytes.len() as u64).is_none_or(|end| end > target.size) {
            reply(response, 400, "bad_range");
            return;
        }

        if let Err(err) = target.update(start, &bytes) {
            tracing::error!(%err, "flash update failed");
            reply(response, 500, "io");
            return;
        }

        response.json(200, format!("{{\"ok\":true,\"written\":{}}}\n", bytes.len()));
    }

    fn op_restore(&self, request: &Request, response: &mut Response) {
        let Some(payload) =
            value_bytes(request, "backup").or_else(|| value_bytes(request, "file"))
        else {
            reply(response, 400, "bad_request");
            return;
        };
        if payload.is_empty() {
            reply(response, 400, "bad_request");
            return;
        }

        let filename = request
            .find_value("backup")
            .or_else(|| request.find_value("file"))
            .and_then(|v| v.filename.as_deref());

        // A parseable backup filename wins; otherwise explicit fields are
        // required.
        let (select, target_name, start, end) =
            match filename.and_then(parse_backup_filename) {
                Some(parsed) => (
                    StorageSelect::parse(parsed.storage),
                    parsed.target,
                    parsed.start,
                    parsed.end,
                ),
                None => {
                    let Some(target) = request.value_str("target").filter(|t| !t.is_empty())
                    else {
                        reply(response, 400, "bad_request");
                        return;
                    };
                    let (Some(start), Some(end)) = (
                        request.value_str("start").and_then(text::parse_size),
                        request.value_str("end").and_then(text::parse_size),
                    ) else {
                        reply(response, 400, "bad_range");
                        return;
                    };
                    let select = request
                        .value_str("storage")
                        .map(StorageSelect::parse)
                        .unwrap_or_default();
                    (select, target.to_string(), start, end)
                },
            };

        if end <= start || payload.len() as u64 != end - start {
            reply(response, 400, "bad_range");
            return;
        }

        let target = match self.state.pool.open(select, &target_name) {
            Ok(target) => target,
            Err(err) => {
                tracing::debug!(%err, "restore target open failed");
                reply(response, 404, "target_not_found");
                return;
            },
        };
        if end > target.size {
            reply(response, 400, "bad_range");
            return;
        }

        if let Err(err) = target.restore(start, &payload) {
            tracing::error!(%err, "flash restore failed");
            reply(response, 500, "io");
            return;
        }

        response.json(200, format!("{{\"ok\":true,\"restored\":{}}}\n", payload.len()));
    }
}

impl UriHandler for FlashEdit {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if request.method() != Method::Post {
            reply(response, 405, "method");
            return;
        }

        let op = request
            .value_str("op")
            .map(str::to_string)
            .or_else(|| {
                request
                    .path()
                    .strip_prefix("/flash/")
                    .map(str::to_string)
            });
        match op.as_deref() {
            Some("read") => self.op_read(request, response),
            Some("write") => self.op_write(request, response),
            Some("restore") => self.op_restore(request, response),
            Some(_) => reply(response, 400, "unknown_op"),
            None => reply(response, 400, "no_op"),
        }
    }
}

fn reply(response: &mut Response, code: u16, error: &str) {
    response.json(code, format!("{{\"ok\":false,\"error\":\"{error}\"}}\n"));
}
