//! Environment CRUD endpoints.
//!
//! Every mutation persists immediately through the store's save seam;
//! a persistence failure is surfaced verbatim as 500.

use std::sync::Arc;

use failsafe_core::env::{ENV_BLOB_SIZE, ENV_NAME_MAX, EnvError};
use failsafe_http::{Method, Request};

use crate::{
    engine::{Response, UriHandler},
    handlers::value_bytes,
    state::ServerState,
};

/// `GET /env/list`: the whole environment as `KEY=VALUE` lines.
pub struct List {
    state: Arc<ServerState>,
}

impl List {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for List {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if request.method() != Method::Get {
            response.text(405, "method");
            return;
        }
        let body = self.state.env().export_text();
        response.set_std(failsafe_http::ResponseInfo::text(200), body);
    }
}

/// Extract and validate the `name` form field shared by set/unset.
fn name_field<'r>(request: &'r Request) -> Option<&'r str> {
    request
        .value_str("name")
        .filter(|name| !name.is_empty() && name.len() <= ENV_NAME_MAX)
}

/// `POST /env/set`: set one variable and persist.
pub struct Set {
    state: Arc<ServerState>,
}

impl Set {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Set {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if request.method() != Method::Post {
            response.text(405, "method");
            return;
        }
        let Some(name) = name_field(request) else {
            response.text(400, "bad name");
            return;
        };
        // An absent value field sets the empty string, like the original.
        let value = request.value("value").unwrap_or(b"");

        let mut env = self.state.env();
        match env.set(name, value) {
            Ok(()) => {},
            Err(EnvError::BadName) => {
                response.text(400, "bad name");
                return;
            },
            Err(_) => {
                response.text(400, "bad value");
                return;
            },
        }
        if let Err(err) = env.save() {
            tracing::error!(%err, "env save failed");
            response.text(500, "save failed");
            return;
        }
        response.text(200, "ok");
    }
}

/// `POST /env/unset`: delete one variable and persist.
pub struct Unset {
    state: Arc<ServerState>,
}

impl Unset {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Unset {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if request.method() != Method::Post {
            response.text(405, "method");
            return;
        }
        let Some(name) = name_field(request) else {
            response.text(400, "bad name");
            return;
        };

        let mut env = self.state.env();
        if env.unset(name).is_err() {
            response.text(400, "bad name");
            return;
        }
        if let Err(err) = env.save() {
            tracing::error!(%err, "env save failed");
            response.text(500, "save failed");
            return;
        }
        response.text(200, "ok");
    }
}

/// `POST /env/reset`: restore the default environment and persist.
pub struct Reset {
    state: Arc<ServerState>,
}

impl Reset {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Reset {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if request.method() != Method::Post {
            response.text(405, "method");
            return;
        }

        let mut env = self.state.env();
        env.reset_to_defaults();
        if let Err(err) = env.save() {
            tracing::error!(%err, "env save failed");
            response.text(500, "save failed");
            return;
        }
        response.text(200, "ok");
    }
}

/// `POST /env/restore`: import an uploaded blob (length and CRC
/// validated) and persist.
pub struct Restore {
    state: Arc<ServerState>,
}

impl Restore {
    pub(crate) fn new(state: &Arc<ServerState>) -> Self {
        Self { state: Arc::clone(state) }
    }
}

impl UriHandler for Restore {
    fn on_new(&self, request: &Request, response: &mut Response) {
        if request.method() != Method::Post {
            response.text(405, "method");
            return;
        }
        let Some(blob) = value_bytes(request, "envfile") else {
            response.text(400, "bad file");
            return;
        };
        if blob.len() < ENV_BLOB_SIZE {
            response.text(400, "bad file");
            return;
        }

        let mut env = self.state.env();
        if let Err(err) = env.import_blob(&blob) {
            tracing::warn!(%err, "env import rejected");
            response.text(500, "restore failed");
            return;
        }
        if let Err(err) = env.save() {
            tracing::error!(%err, "env save failed");
            response.text(500, "restore failed");
            return;
        }
        response.text(200, "ok");
    }
}
