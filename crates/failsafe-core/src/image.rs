//! Image validation and commit.
//!
//! Validation is a seam: boards hook their signature / anti-rollback
//! checks in via [`ImageValidator`], and the default accepts everything
//! except an initramfs without a device-tree header, which is always
//! rejected. Commit maps a firmware kind onto its storage target and
//! replaces the region through the facade.

use thiserror::Error;

use crate::{
    storage::{StoragePool, StorageSelect},
    upload::FirmwareKind,
};

/// Flattened-device-tree magic, big endian on the wire.
const FDT_MAGIC: u32 = 0xd00d_feed;

/// Size of the fixed FDT header.
const FDT_HEADER_SIZE: usize = 40;

/// Commit errors, surfaced as `failed` by `/result`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// No storage target for this firmware kind.
    #[error("no target for {0:?} image")]
    NoTarget(FirmwareKind),

    /// Image larger than its target region.
    #[error("image of {size} bytes exceeds target of {target} bytes")]
    TooLarge {
        /// Image size.
        size: usize,
        /// Target region size.
        target: u64,
    },

    /// Facade failure while writing.
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}

/// Board-specific image acceptance policy.
///
/// The returned error string is logged; the client only ever sees the
/// legacy `fail` body.
pub trait ImageValidator: Send + Sync {
    /// Check `data` as an image of `kind`.
    ///
    /// # Errors
    ///
    /// A human-readable rejection reason.
    fn validate(&self, kind: FirmwareKind, data: &[u8]) -> Result<(), String>;
}

/// Validator that accepts any image with a plausible shape.
///
/// Initramfs images must still carry a valid device-tree header; that
/// check is structural, not policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ImageValidator for AcceptAll {
    fn validate(&self, kind: FirmwareKind, data: &[u8]) -> Result<(), String> {
        if data.is_empty() {
            return Err("empty image".to_string());
        }
        if kind == FirmwareKind::Initramfs && !fdt_header_valid(data) {
            return Err("initramfs without device-tree header".to_string());
        }
        Ok(())
    }
}

/// Whether `data` begins with a sane flattened-device-tree header:
/// correct magic and a `totalsize` covering at least the header but not
/// more than the buffer.
#[must_use]
pub fn fdt_header_valid(data: &[u8]) -> bool {
    if data.len() < FDT_HEADER_SIZE {
        return false;
    }
    let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if magic != FDT_MAGIC {
        return false;
    }
    let totalsize = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
    totalsize >= FDT_HEADER_SIZE && totalsize <= data.len()
}

/// Storage target name for a committable firmware kind.
///
/// `Initramfs` has no target: it is booted from memory, never written.
#[must_use]
pub fn target_for(kind: FirmwareKind) -> Option<(StorageSelect, &'static str)> {
    match kind {
        FirmwareKind::Gpt => Some((StorageSelect::Block, "raw")),
        FirmwareKind::Fip => Some((StorageSelect::Auto, "fip")),
        FirmwareKind::Bl2 => Some((StorageSelect::Auto, "bl2")),
        FirmwareKind::Firmware => Some((StorageSelect::Auto, "firmware")),
        FirmwareKind::Factory => Some((StorageSelect::Auto, "factory")),
        FirmwareKind::Initramfs => None,
    }
}

/// Write a committed image over its target region.
///
/// # Errors
///
/// [`CommitError::NoTarget`] for kinds without a storage mapping,
/// [`CommitError::TooLarge`], or the underlying storage failure.
pub fn write_image(
    pool: &StoragePool,
    kind: FirmwareKind,
    data: &[u8],
) -> Result<(), CommitError> {
    let (select, name) = target_for(kind).ok_or(CommitError::NoTarget(kind))?;
    let target = pool.open(select, name)?;

    if data.len() as u64 > target.size {
        return Err(CommitError::TooLarge { size: data.len(), target: target.size });
    }

    tracing::info!(kind = ?kind, target = %target.name, size = data.len(), "writing image");
    target.restore(0, data)?;
    Ok(())
}
