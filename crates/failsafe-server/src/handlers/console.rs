//! Web console endpoints: poll, exec, clear.
//!
//! All three are POST-only and honor the optional shared-secret token in
//! env `failsafe_console_token`: when the variable is set and non-empty,
//! the request must carry a `token` field with an exact byte match.

use std::sync::Arc;

use failsafe_http::{Method, Request, text::json_escape};

use crate::{
    engine::{Response, UriHandler},
    state::ServerState,
};

/// Longest command accepted by exec.
const CMD_MAX: usize = 256;

/// Most bytes returned by one poll.
const POLL_MAX: usize = 8192;

/// Shared POST + token gate. Returns `false` with the response already
/// filled in when the request is not allowed through.
fn check_access(state: &ServerState, request: &Request, response: &mut Response) -> bool {
    if request.method() != Method::Post {
        response.json(405, "{\"error\":\"method\"}\n".to_string());
        return false;
    }

    let allowed = {
        let env = state.env();
        match env.get("failsafe_console_token").filter(|t| !t.is_empty()) {
            None => true,
            Some(expected) => request.value("token") == Some(expected),
        }
    };
    if !allowed {
        response.text(403, "forbidden");
    }
    allowed
}

/// `POST /console/poll`: drain up to 8 KiB of captured output.
pub struct Poll {
    state: Arc<ServerState>,
}

impl Poll {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Poll {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if !check_access(&self.state, request, response) {
            return;
        }

        let mut console = self.state.console();
        console.ensure_recording();
        let (data, avail) = console.poll(POLL_MAX);
        drop(console);

        response.json(
            200,
            format!("{{\"data\":\"{}\",\"avail\":{avail}}}\n", json_escape(&data)),
        );
    }
}

/// `POST /console/exec`: echo the prompt and command into the
/// transcript, run the command, reprint the prompt.
pub struct Exec {
    state: Arc<ServerState>,
}

impl Exec {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Exec {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if !check_access(&self.state, request, response) {
            return;
        }

        let Some(raw) = request.value("cmd").filter(|c| !c.is_empty()) else {
            response.json(400, "{\"error\":\"no_cmd\"}\n".to_string());
            return;
        };
        let cmd = String::from_utf8_lossy(&raw[..raw.len().min(CMD_MAX)]).into_owned();

        let prompt = self.state.prompt();
        let ret = {
            let mut interp =
                match self.state.interpreter.lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        response.json(503, "{\"error\":\"no_console\"}\n".to_string());
                        return;
                    },
                };
            let mut console = self.state.console();
            console.exec(&prompt, &cmd, interp.as_mut())
        };

        response.json(
            200,
            format!("{{\"ok\":true,\"ret\":{ret},\"cmd\":\"{}\"}}\n", json_escape(cmd.as_bytes())),
        );
    }
}

/// `POST /console/clear`: reset the capture ring.
pub struct Clear {
    state: Arc<ServerState>,
}

impl Clear {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Clear {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if !check_access(&self.state, request, response) {
            return;
        }

        let mut console = self.state.console();
        console.ensure_recording();
        console.clear();
        drop(console);

        response.json(200, "{\"ok\":true}\n".to_string());
    }
}
