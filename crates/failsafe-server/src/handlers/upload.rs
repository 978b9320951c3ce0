//! Firmware upload staging and commit.
//!
//! `/upload` validates the image and parks it in the process-wide slot,
//! answering `"<size> <md5>[ <layout>]"`. Validation failures answer HTTP
//! 200 with body `fail`, a legacy contract the stock web UI depends on.
//! `/result` commits the most recent upload and streams `success` or
//! `failed`; on success the session terminates and the device reboots (or
//! boots the uploaded ramdisk).

use std::sync::Arc;

use bytes::Bytes;
use failsafe_core::{
    image::{fdt_header_valid, write_image},
    upload::FirmwareKind,
};
use failsafe_http::{ResponseInfo, Request, format_response_header};

use crate::{
    engine::{Response, ResponsePayload, UriHandler},
    handlers::value_bytes,
    state::{ServerState, SessionOutcome},
};

/// `POST /upload` (multipart).
pub struct Upload {
    state: Arc<ServerState>,
}

impl Upload {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }

    /// First firmware field present on the request, probe order fixed.
    fn probe(&self, request: &Request) -> Option<(FirmwareKind, Bytes)> {
        let has_block = self.state.pool.block().is_some();
        for kind in FirmwareKind::ALL {
            if kind == FirmwareKind::Gpt && !has_block {
                continue;
            }
            if let Some(data) = value_bytes(request, kind.field()) {
                return Some((kind, data));
            }
        }
        None
    }
}

impl UriHandler for Upload {
    fn on_new(&self, request: &Request, response: &mut Response) {
        let Some((kind, data)) = self.probe(request) else {
            response.text(200, "fail");
            return;
        };

        let accepted = if kind == FirmwareKind::Initramfs {
            fdt_header_valid(&data)
        } else {
            match self.state.validator.validate(kind, &data) {
                Ok(()) => true,
                Err(reason) => {
                    tracing::warn!(?kind, %reason, "image rejected");
                    false
                },
            }
        };
        if !accepted {
            response.text(200, "fail");
            return;
        }

        let mtd_layout = if kind == FirmwareKind::Firmware {
            request.value_str("mtd_layout").map(str::to_string)
        } else {
            None
        };

        let digest = md5::compute(&data);
        let size = data.len();
        let id = self.state.upload().stage(data, kind, mtd_layout.clone());
        tracing::info!(id, ?kind, size, "upload accepted");

        let body = match mtd_layout {
            Some(layout) => format!("{size} {digest:x} {layout}"),
            None => format!("{size} {digest:x}"),
        };
        response.set_std(ResponseInfo::text(200), body);
    }
}

struct CommitSession {
    body_sent: bool,
    ok: bool,
    boot: Option<Bytes>,
}

/// `GET /result`: commit the pending upload, streaming the verdict.
pub struct Commit {
    state: Arc<ServerState>,
}

impl Commit {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }

    /// Persist the layout label picked at upload time, when it differs
    /// from the active one.
    fn persist_layout_label(&self, label: &str) {
        let Some(layouts) = &self.state.layouts else {
            return;
        };
        let differs = layouts.lock().is_ok_and(|t| t.current_label() != label);
        if !differs {
            return;
        }

        tracing::info!(%label, "saving mtd layout label");
        let mut env = self.state.env();
        if env.set("mtd_layout_label", label.as_bytes()).and_then(|()| env.save()).is_err() {
            tracing::warn!("failed to persist mtd_layout_label");
        }
    }

    fn commit(&self, session: &mut CommitSession) {
        let Some(pending) = self.state.upload().take() else {
            tracing::warn!("commit without a staged upload");
            return;
        };

        if let Some(label) = &pending.mtd_layout {
            self.persist_layout_label(label);
        }

        match pending.kind {
            FirmwareKind::Initramfs => {
                session.boot = Some(pending.data);
                session.ok = true;
            },
            kind => match write_image(&self.state.pool, kind, &pending.data) {
                Ok(()) => session.ok = true,
                Err(err) => tracing::error!(%err, "image write failed"),
            },
        }
    }
}

impl UriHandler for Commit {
    fn on_new(&self, _request: &Request, response: &mut Response) {
        response.info = ResponseInfo { content_type: "text/html", ..ResponseInfo::text(200) };
        response.session =
            Some(Box::new(CommitSession { body_sent: false, ok: false, boot: None }));
        // The header goes out first; the (slow) write happens on the next
        // tick so the client sees the connection succeed immediately.
        response.payload =
            ResponsePayload::Custom(Bytes::from(format_response_header(&response.info)));
    }

    fn on_responding(&self, response: &mut Response) {
        let Some(session) = response.session_mut::<CommitSession>() else {
            response.payload = ResponsePayload::None;
            return;
        };
        if session.body_sent {
            response.payload = ResponsePayload::None;
            return;
        }
        session.body_sent = true;

        self.commit(session);
        response.payload = ResponsePayload::Custom(Bytes::from_static(if session.ok {
            b"success"
        } else {
            b"failed"
        }));
    }

    fn on_closed(&self, response: &mut Response) {
        if let Some(session) = response.session_mut::<CommitSession>()
            && session.ok
        {
            let outcome = match session.boot.take() {
                Some(image) => SessionOutcome::BootInitramfs(image),
                None => SessionOutcome::Reboot,
            };
            self.state.control.request(outcome);
        }
        response.session = None;
    }
}
