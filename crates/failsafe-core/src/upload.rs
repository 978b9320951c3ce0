//! The process-wide upload slot.
//!
//! `/upload` stages exactly one image; `/result` commits it exactly once.
//! The slot is guarded by a monotonically increasing id: staging a new
//! image or committing invalidates anything staged before, so a replayed
//! commit is a safe no-op.

use bytes::Bytes;

/// The firmware kinds `/upload` accepts, in field probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareKind {
    /// GPT partition table image (block backend only).
    Gpt,
    /// Firmware-in-package blob.
    Fip,
    /// Stage-2 bootloader image.
    Bl2,
    /// Main firmware image.
    Firmware,
    /// Factory data partition contents.
    Factory,
    /// Bootable ramdisk; never written to storage.
    Initramfs,
}

impl FirmwareKind {
    /// All kinds, in the order `/upload` probes its form fields.
    pub const ALL: [Self; 6] =
        [Self::Gpt, Self::Fip, Self::Bl2, Self::Firmware, Self::Factory, Self::Initramfs];

    /// The multipart field name carrying this kind.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Gpt => "gpt",
            Self::Fip => "fip",
            Self::Bl2 => "bl2",
            Self::Firmware => "firmware",
            Self::Factory => "factory",
            Self::Initramfs => "initramfs",
        }
    }
}

/// A staged image awaiting commit.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    /// Slot sequence number at staging time.
    pub id: u64,
    /// The image bytes (shared with the request buffer that carried
    /// them).
    pub data: Bytes,
    /// What the image is.
    pub kind: FirmwareKind,
    /// Flash layout label selected alongside the upload, if any.
    pub mtd_layout: Option<String>,
}

/// One-shot staging slot. Writer-once per id; `take` consumes.
#[derive(Debug, Default)]
pub struct UploadSlot {
    current: Option<PendingUpload>,
    next_id: u64,
}

impl UploadSlot {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an image, replacing anything staged before. Returns the new
    /// upload id.
    pub fn stage(
        &mut self,
        data: Bytes,
        kind: FirmwareKind,
        mtd_layout: Option<String>,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        tracing::debug!(id, ?kind, size = data.len(), "upload staged");
        self.current = Some(PendingUpload { id, data, kind, mtd_layout });
        id
    }

    /// Consume the staged image. A second call without an intervening
    /// [`UploadSlot::stage`] returns `None`; that is the replayed-commit
    /// no-op.
    pub fn take(&mut self) -> Option<PendingUpload> {
        self.current.take()
    }

    /// Whether an image is staged.
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_take_take_is_single_shot() {
        let mut slot = UploadSlot::new();
        slot.stage(Bytes::from_static(b"img"), FirmwareKind::Firmware, None);

        let taken = slot.take().unwrap();
        assert_eq!(taken.data.as_ref(), b"img");
        assert_eq!(taken.kind, FirmwareKind::Firmware);

        assert!(slot.take().is_none(), "replayed commit must be a no-op");
    }

    #[test]
    fn new_upload_invalidates_previous() {
        let mut slot = UploadSlot::new();
        let first = slot.stage(Bytes::from_static(b"one"), FirmwareKind::Bl2, None);
        let second =
            slot.stage(Bytes::from_static(b"two"), FirmwareKind::Fip, Some("large".to_string()));
        assert!(second > first);

        let taken = slot.take().unwrap();
        assert_eq!(taken.id, second);
        assert_eq!(taken.data.as_ref(), b"two");
        assert_eq!(taken.mtd_layout.as_deref(), Some("large"));
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let mut slot = UploadSlot::new();
        let mut last = 0;
        for _ in 0..5 {
            let id = slot.stage(Bytes::new(), FirmwareKind::Factory, None);
            assert!(id > last);
            last = id;
            slot.take();
        }
    }
}
