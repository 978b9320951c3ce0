//! Version, system info, layout listing, and reboot endpoints.

use std::sync::Arc;

use failsafe_http::{Request, text::json_escape};

use crate::{
    engine::{Response, UriHandler},
    state::{ServerState, SessionOutcome},
};

/// `GET /version`: the firmware version string.
pub struct Version {
    state: Arc<ServerState>,
}

impl Version {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Version {
    fn on_new(&self, _request: &Request, response: &mut Response) {
        response.set_std(failsafe_http::ResponseInfo::text(200), self.state.version.clone());
    }
}

/// `GET /sysinfo`: board model/compatible, CPU compatible and clock, RAM
/// size as JSON.
pub struct Sysinfo {
    state: Arc<ServerState>,
}

impl Sysinfo {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Sysinfo {
    fn on_new(&self, _request: &Request, response: &mut Response) {
        let board = &self.state.board;
        let model = board.model_or_env(&self.state.env());

        let body = format!(
            "{{\"board\":{{\"model\":\"{}\",\"compatible\":\"{}\"}},\
             \"cpu\":{{\"compatible\":\"{}\",\"clock_hz\":{}}},\
             \"ram\":{{\"size\":{}}}}}",
            json_escape(model.as_bytes()),
            json_escape(board.compatible.as_deref().unwrap_or("").as_bytes()),
            json_escape(board.cpu_compatible.as_deref().unwrap_or("").as_bytes()),
            board.cpu_clock_hz,
            board.ram_size,
        );
        response.json(200, body);
    }
}

/// `GET /getmtdlayout`: current layout label then every available label,
/// `;`-separated. The literal body `error` when no alternates exist.
pub struct MtdLayout {
    state: Arc<ServerState>,
}

impl MtdLayout {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for MtdLayout {
    fn on_new(&self, _request: &Request, response: &mut Response) {
        let body = match &self.state.layouts {
            Some(layouts) => match layouts.lock() {
                Ok(table) => table.summary(),
                Err(_) => "error".to_string(),
            },
            None => "error".to_string(),
        };
        response.set_std(failsafe_http::ResponseInfo::text(200), body);
    }
}

/// `POST /reboot`: acknowledge, then terminate the session once the
/// response has been flushed.
pub struct Reboot {
    state: Arc<ServerState>,
}

impl Reboot {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Reboot {
    fn on_new(&self, _request: &Request, response: &mut Response) {
        response.text(200, "rebooting");
    }

    fn on_closed(&self, response: &mut Response) {
        response.session = None;
        tracing::info!("reboot requested via web interface");
        self.state.control.request(SessionOutcome::Reboot);
    }
}
