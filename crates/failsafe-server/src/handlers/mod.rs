//! Endpoint handlers and router assembly.

pub mod backup;
pub mod console;
pub mod env;
pub mod flash;
pub mod pages;
pub mod system;
pub mod upload;

use std::sync::Arc;

use bytes::Bytes;
use failsafe_http::{Request, ValueData};

use crate::{assets, router::Router, state::ServerState};

/// Payload bytes of a form value, shared with the request buffer when the
/// value is a multipart slice.
pub(crate) fn value_bytes(request: &Request, name: &str) -> Option<Bytes> {
    let value = request.find_value(name)?;
    Some(match &value.data {
        ValueData::Slice(range) => request.body.slice(range.clone()),
        ValueData::Owned(data) => Bytes::copy_from_slice(data),
    })
}

/// Build the full endpoint registry for one server instance.
pub fn build_router(state: &Arc<ServerState>) -> Router {
    let mut router = Router::new();

    for path in ["/", "/cgi-bin/luci", "/cgi-bin/luci/"] {
        router.register(path, Box::new(pages::StaticPage::new("index.html")));
    }

    let has_block = state.pool.block().is_some();
    for asset in assets::ASSETS {
        if !asset.name.ends_with(".html") || matches!(asset.name, "index.html" | "404.html") {
            continue;
        }
        if asset.name == "gpt.html" && !has_block {
            continue;
        }
        router.register(&format!("/{}", asset.name), Box::new(pages::StaticPage::new(asset.name)));
    }
    for name in ["style.css", "main.js", "i18n.js"] {
        router.register(&format!("/{name}"), Box::new(pages::StaticPage::new(name)));
    }
    router.register("", Box::new(pages::NotFound));

    router.register("/version", Box::new(system::Version::new(state)));
    router.register("/sysinfo", Box::new(system::Sysinfo::new(state)));
    router.register("/getmtdlayout", Box::new(system::MtdLayout::new(state)));
    router.register("/reboot", Box::new(system::Reboot::new(state)));

    router.register("/upload", Box::new(upload::Upload::new(state)));
    router.register("/result", Box::new(upload::Commit::new(state)));

    router.register("/backup/info", Box::new(backup::BackupInfo::new(state)));
    router.register("/backup/main", Box::new(backup::BackupStream::new(state)));

    for path in ["/flash/read", "/flash/write", "/flash/restore"] {
        router.register(path, Box::new(flash::FlashEdit::new(state)));
    }

    router.register("/env/list", Box::new(env::List::new(state)));
    router.register("/env/set", Box::new(env::Set::new(state)));
    router.register("/env/unset", Box::new(env::Unset::new(state)));
    router.register("/env/reset", Box::new(env::Reset::new(state)));
    router.register("/env/restore", Box::new(env::Restore::new(state)));

    router.register("/console/poll", Box::new(console::Poll::new(state)));
    router.register("/console/exec", Box::new(console::Exec::new(state)));
    router.register("/console/clear", Box::new(console::Clear::new(state)));

    router
}
