//! Read-only table of static UI assets, embedded at build time.
//!
//! Contents are served verbatim; the recovery logic never depends on
//! them.

/// One embedded file.
#[derive(Debug, Clone, Copy)]
pub struct Asset {
    /// Bare filename, e.g. `index.html`.
    pub name: &'static str,
    /// `Content-Type` to serve it with.
    pub mime: &'static str,
    /// File contents.
    pub body: &'static [u8],
}

macro_rules! asset {
    ($name:literal, $mime:literal) => {
        Asset { name: $name, mime: $mime, body: include_bytes!(concat!("../assets/", $name)) }
    };
}

/// Every embedded asset.
pub static ASSETS: &[Asset] = &[
    asset!("index.html", "text/html"),
    asset!("404.html", "text/html"),
    asset!("backup.html", "text/html"),
    asset!("bl2.html", "text/html"),
    asset!("booting.html", "text/html"),
    asset!("console.html", "text/html"),
    asset!("env.html", "text/html"),
    asset!("factory.html", "text/html"),
    asset!("fail.html", "text/html"),
    asset!("flash.html", "text/html"),
    asset!("flashing.html", "text/html"),
    asset!("gpt.html", "text/html"),
    asset!("initramfs.html", "text/html"),
    asset!("reboot.html", "text/html"),
    asset!("uboot.html", "text/html"),
    asset!("style.css", "text/css"),
    asset!("main.js", "text/javascript"),
    asset!("i18n.js", "text/javascript"),
];

/// Look up an asset by bare filename.
#[must_use]
pub fn find(name: &str) -> Option<&'static Asset> {
    ASSETS.iter().find(|a| a.name == name)
}
