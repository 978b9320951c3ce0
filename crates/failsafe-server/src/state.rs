#![allow(
    clippy::expect_used,
    reason = "single-threaded loop; a poisoned lock means a handler panicked and the process is already lost"
)]

//! Process-wide server state shared by the endpoint handlers.
//!
//! Everything lives for the whole recovery session: the storage pool, the
//! environment, the console, the upload slot, and the control cell the
//! loop polls to learn when the session should end (reboot or initramfs
//! boot). The cooperative loop serializes all access; the mutexes exist
//! for `Sync`, not for contention.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use failsafe_core::{
    board::BoardInfo,
    console::{CommandInterpreter, WebConsole},
    env::EnvStore,
    image::ImageValidator,
    layout::LayoutTable,
    storage::StoragePool,
    upload::UploadSlot,
};

/// Why the net loop should terminate.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Reboot the device (successful flash or `/reboot`).
    Reboot,
    /// Boot the uploaded ramdisk from memory.
    BootInitramfs(Bytes),
}

/// One-shot cell carrying the loop-exit request.
#[derive(Debug, Default)]
pub struct SystemControl {
    outcome: Mutex<Option<SessionOutcome>>,
}

impl SystemControl {
    /// Request loop termination. The first request wins.
    pub fn request(&self, outcome: SessionOutcome) {
        let mut cell = self.outcome.lock().expect("control lock poisoned");
        if cell.is_none() {
            *cell = Some(outcome);
        }
    }

    /// Take a pending request, if any.
    pub fn take(&self) -> Option<SessionOutcome> {
        self.outcome.lock().expect("control lock poisoned").take()
    }

    /// Whether termination has been requested.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.outcome.lock().expect("control lock poisoned").is_some()
    }
}

/// Shared state behind every handler.
pub struct ServerState {
    /// Storage backends and partition tables. Layout switches only take
    /// effect on the next boot, so the pool itself is immutable.
    pub pool: StoragePool,
    /// Persisted environment. `Arc` so the command interpreter can reach
    /// it too.
    pub env: Arc<Mutex<EnvStore>>,
    /// Console capture.
    pub console: Mutex<WebConsole>,
    /// The one-shot upload slot.
    pub upload: Mutex<UploadSlot>,
    /// Selectable flash layouts, when the board defines alternates.
    pub layouts: Option<Mutex<LayoutTable>>,
    /// Board identity for `/sysinfo`.
    pub board: BoardInfo,
    /// Version string served by `/version`.
    pub version: String,
    /// Console prompt when env `prompt` is unset.
    pub default_prompt: String,
    /// Board image acceptance policy.
    pub validator: Box<dyn ImageValidator>,
    /// The `/console/exec` command service.
    pub interpreter: Mutex<Box<dyn CommandInterpreter>>,
    /// Loop-exit cell.
    pub control: SystemControl,
}

impl ServerState {
    /// Lock the environment.
    pub fn env(&self) -> MutexGuard<'_, EnvStore> {
        self.env.lock().expect("env lock poisoned")
    }

    /// Lock the console.
    pub fn console(&self) -> MutexGuard<'_, WebConsole> {
        self.console.lock().expect("console lock poisoned")
    }

    /// Lock the upload slot.
    pub fn upload(&self) -> MutexGuard<'_, UploadSlot> {
        self.upload.lock().expect("upload lock poisoned")
    }

    /// The active console prompt: env `prompt` when set and non-empty,
    /// the configured default otherwise.
    #[must_use]
    pub fn prompt(&self) -> String {
        let env = self.env();
        match env.get_str("prompt") {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => self.default_prompt.clone(),
        }
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("version", &self.version)
            .field("has_layouts", &self.layouts.is_some())
            .finish()
    }
}
