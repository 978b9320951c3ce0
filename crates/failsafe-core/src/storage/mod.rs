//! Uniform addressing over the two storage backends.
//!
//! Recovery operations never talk to a driver directly. They open a
//! [`Target`] by backend + partition name through the [`StoragePool`] and
//! use its byte-addressed `read`/`update`/`restore` operations. The flash
//! path skips bad erase blocks transparently so logical offsets stay
//! contiguous for the caller; the block path is plain absolute addressing
//! relative to the partition base.
//!
//! # Invariants
//!
//! - For every operation, `offset + len <= target.size`.
//! - Flash writes are read-modify-erase-write at erase-block granularity;
//!   a failure mid-window leaves earlier blocks updated (not rolled back).
//!   The recovery server is itself the tool for repairing that state.

mod error;
mod file;
mod memory;

use std::sync::Arc;

pub use error::StorageError;
pub use file::{FileBlock, FileFlash};
pub use memory::{MemBlock, MemFlash};

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Linear flash device with erase-block semantics and per-block bad-block
/// status. Offsets are raw device offsets.
pub trait FlashDevice: Send + Sync {
    /// Chip model string, used in backup filenames and device info.
    fn model(&self) -> String;

    /// Total device size in bytes.
    fn size(&self) -> u64;

    /// Erase block size in bytes. Always a power of two.
    fn erase_size(&self) -> u64;

    /// MTD type constant for device info (NOR = 3, NAND = 4); 0 when
    /// unknown.
    fn type_code(&self) -> i32 {
        0
    }

    /// Whether the erase block containing `offset` is marked bad.
    fn block_is_bad(&self, offset: u64) -> Result<bool>;

    /// Read raw bytes. The caller guarantees the range is inside the
    /// device and does not cross a bad block.
    fn read_raw(&self, offset: u64, out: &mut [u8]) -> Result<()>;

    /// Erase `[offset, offset + len)`. Both must be erase-block aligned.
    fn erase_raw(&self, offset: u64, len: u64) -> Result<()>;

    /// Program raw bytes into previously erased blocks.
    fn write_raw(&self, offset: u64, data: &[u8]) -> Result<()>;
}

/// Byte-addressed block device (MMC-style backend).
pub trait BlockDevice: Send + Sync {
    /// Device vendor string.
    fn vendor(&self) -> String;

    /// Device product string, used in backup filenames.
    fn product(&self) -> String;

    /// Native block size in bytes (reported in device info only; the
    /// facade addresses bytes).
    fn block_size(&self) -> u64;

    /// Total device size in bytes.
    fn size(&self) -> u64;

    /// Read at an absolute byte offset.
    fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<()>;

    /// Write at an absolute byte offset.
    ///
    /// `reliable` requests best-effort durability; backends without a
    /// stronger notion may treat it as advisory.
    fn write_at(&self, offset: u64, data: &[u8], reliable: bool) -> Result<()>;
}

/// A named region of a backing device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Logical name used to open the partition.
    pub name: String,
    /// Byte offset of the partition on its device.
    pub offset: u64,
    /// Partition size in bytes.
    pub size: u64,
}

/// Backend selection from the `storage` form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageSelect {
    /// Prefer a flash partition of the given name, fall back to block.
    #[default]
    Auto,
    /// Flash backend only.
    Flash,
    /// Block backend only.
    Block,
}

impl StorageSelect {
    /// Parse the `storage` form field (`auto`/`mtd`/`mmc`, case
    /// insensitive). Unknown values behave like `auto`, matching the
    /// original UI which only ever sends those three.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("mtd") {
            Self::Flash
        } else if value.eq_ignore_ascii_case("mmc") {
            Self::Block
        } else {
            Self::Auto
        }
    }
}

/// Split a `mtd:<name>` / `mmc:<name>` target into its backend override
/// and bare name. Plain names pass through with the given default.
#[must_use]
pub fn resolve_target(default: StorageSelect, target: &str) -> (StorageSelect, &str) {
    if let Some(name) = target.strip_prefix("mtd:") {
        (StorageSelect::Flash, name)
    } else if let Some(name) = target.strip_prefix("mmc:") {
        (StorageSelect::Block, name)
    } else {
        (default, target)
    }
}

/// The process-wide registry of storage backends and their partitions.
#[derive(Clone, Default)]
pub struct StoragePool {
    flash: Option<(Arc<dyn FlashDevice>, Vec<Partition>)>,
    block: Option<(Arc<dyn BlockDevice>, Vec<Partition>)>,
}

impl StoragePool {
    /// Empty pool with no backends.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the flash backend and its partition table.
    #[must_use]
    pub fn with_flash(mut self, dev: Arc<dyn FlashDevice>, parts: Vec<Partition>) -> Self {
        self.flash = Some((dev, parts));
        self
    }

    /// Attach the block backend and its partition table.
    #[must_use]
    pub fn with_block(mut self, dev: Arc<dyn BlockDevice>, parts: Vec<Partition>) -> Self {
        self.block = Some((dev, parts));
        self
    }

    /// The flash backend, if configured.
    #[must_use]
    pub fn flash(&self) -> Option<(&Arc<dyn FlashDevice>, &[Partition])> {
        self.flash.as_ref().map(|(dev, parts)| (dev, parts.as_slice()))
    }

    /// The block backend, if configured.
    #[must_use]
    pub fn block(&self) -> Option<(&Arc<dyn BlockDevice>, &[Partition])> {
        self.block.as_ref().map(|(dev, parts)| (dev, parts.as_slice()))
    }

    /// Whether a flash partition with this name exists.
    #[must_use]
    pub fn flash_part_exists(&self, name: &str) -> bool {
        self.flash
            .as_ref()
            .is_some_and(|(_, parts)| parts.iter().any(|p| p.name == name))
    }

    /// Open a target by backend selection and partition name.
    ///
    /// `raw` on the block backend addresses the whole device. With
    /// [`StorageSelect::Auto`], a flash partition of the given name wins,
    /// otherwise the block backend is tried.
    ///
    /// # Errors
    ///
    /// [`StorageError::NoBackend`] when the selected backend is absent,
    /// [`StorageError::TargetNotFound`] for an unknown partition name.
    pub fn open(&self, select: StorageSelect, target: &str) -> Result<Target> {
        let (select, name) = resolve_target(select, target);

        let use_flash = match select {
            StorageSelect::Flash => true,
            StorageSelect::Block => false,
            StorageSelect::Auto => self.flash_part_exists(name),
        };

        if use_flash {
            let (dev, parts) =
                self.flash.as_ref().ok_or(StorageError::NoBackend("flash"))?;
            let part = parts
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| StorageError::TargetNotFound(name.to_string()))?;
            return Ok(Target {
                name: part.name.clone(),
                base: part.offset,
                size: part.size,
                backend: TargetBackend::Flash(Arc::clone(dev)),
            });
        }

        let (dev, parts) = self.block.as_ref().ok_or(StorageError::NoBackend("block"))?;
        if name == "raw" {
            return Ok(Target {
                name: name.to_string(),
                base: 0,
                size: dev.size(),
                backend: TargetBackend::Block(Arc::clone(dev)),
            });
        }
        let part = parts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| StorageError::TargetNotFound(name.to_string()))?;
        Ok(Target {
            name: part.name.clone(),
            base: part.offset,
            size: part.size,
            backend: TargetBackend::Block(Arc::clone(dev)),
        })
    }
}

impl std::fmt::Debug for StoragePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoragePool")
            .field("flash", &self.flash.as_ref().map(|(_, p)| p.len()))
            .field("block", &self.block.as_ref().map(|(_, p)| p.len()))
            .finish()
    }
}

enum TargetBackend {
    Flash(Arc<dyn FlashDevice>),
    Block(Arc<dyn BlockDevice>),
}

/// An opened storage target: one partition (or the raw block device) with
/// byte-addressed operations.
///
/// A handler opens a target in NEW and drops it in CLOSED; the facade
/// holds no state beyond the device handle.
pub struct Target {
    /// Partition name the target was opened as.
    pub name: String,
    /// Byte offset of the window on the device.
    pub base: u64,
    /// Window size in bytes.
    pub size: u64,
    backend: TargetBackend,
}

impl Target {
    /// `"mtd"` or `"mmc"`, as used in backup filenames and JSON.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self.backend {
            TargetBackend::Flash(_) => "mtd",
            TargetBackend::Block(_) => "mmc",
        }
    }

    /// Device model/product string for filename synthesis.
    #[must_use]
    pub fn device_model(&self) -> String {
        match &self.backend {
            TargetBackend::Flash(dev) => dev.model(),
            TargetBackend::Block(dev) => dev.product(),
        }
    }

    /// Erase block size for flash targets, `None` for block targets.
    #[must_use]
    pub fn erase_size(&self) -> Option<u64> {
        match &self.backend {
            TargetBackend::Flash(dev) => Some(dev.erase_size()),
            TargetBackend::Block(_) => None,
        }
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(StorageError::OutOfRange { offset, len, size: self.size });
        }
        Ok(())
    }

    /// Read into `out` starting at logical `offset`.
    ///
    /// Flash reads skip bad blocks; the returned count may be short only
    /// when the physical window runs out of good blocks (a short read of 0
    /// is reported as [`StorageError::BadBlockExhausted`] by callers that
    /// need progress). Block reads always fill `out`.
    ///
    /// # Errors
    ///
    /// Range violations, backend I/O failures.
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<usize> {
        self.check_range(offset, out.len() as u64)?;
        match &self.backend {
            TargetBackend::Flash(dev) => {
                flash_read_skip_bad(dev.as_ref(), self.base, self.size, offset, out)
            },
            TargetBackend::Block(dev) => {
                dev.read_at(self.base + offset, out)?;
                Ok(out.len())
            },
        }
    }

    /// Update `[offset, offset + data.len())` preserving surrounding
    /// bytes.
    ///
    /// Flash targets do read-modify-erase-write over the touched erase
    /// blocks; block targets issue one contiguous write. Partial progress
    /// on failure is not rolled back.
    ///
    /// # Errors
    ///
    /// Range violations, backend I/O failures.
    pub fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_range(offset, data.len() as u64)?;
        match &self.backend {
            TargetBackend::Flash(dev) => {
                flash_update_range(dev.as_ref(), self.base + offset, data)
            },
            TargetBackend::Block(dev) => dev.write_at(self.base + offset, data, true),
        }
    }

    /// Whole-region replace: erase `[offset, offset + data.len())` and
    /// write exactly `data`.
    ///
    /// # Errors
    ///
    /// Range violations, backend I/O failures, bad-block exhaustion.
    pub fn restore(&self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_range(offset, data.len() as u64)?;
        match &self.backend {
            TargetBackend::Flash(dev) => {
                flash_erase_skip_bad(dev.as_ref(), self.base, self.size, offset, data.len() as u64)?;
                let written =
                    flash_write_skip_bad(dev.as_ref(), self.base, self.size, offset, data)?;
                if written != data.len() {
                    return Err(StorageError::Io(format!(
                        "short write: {written} of {} bytes",
                        data.len()
                    )));
                }
                Ok(())
            },
            TargetBackend::Block(dev) => dev.write_at(self.base + offset, data, true),
        }
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("kind", &self.kind_str())
            .field("base", &self.base)
            .field("size", &self.size)
            .finish()
    }
}

/// Read skipping bad blocks, bounded by the partition window.
///
/// Returns the number of bytes read, which is short only when the window
/// runs out of physical blocks.
fn flash_read_skip_bad(
    dev: &dyn FlashDevice,
    base: u64,
    window: u64,
    offset: u64,
    out: &mut [u8],
) -> Result<usize> {
    let esize = dev.erase_size();
    let limit = base + window;
    let mut phys = base + offset;
    let mut done = 0usize;

    while done < out.len() && phys < limit {
        let block = phys & !(esize - 1);
        if dev.block_is_bad(block)? {
            phys = block + esize;
            continue;
        }
        let in_block = ((block + esize - phys) as usize).min(out.len() - done);
        let in_block = in_block.min((limit - phys) as usize);
        dev.read_raw(phys, &mut out[done..done + in_block])?;
        done += in_block;
        phys += in_block as u64;
    }

    Ok(done)
}

/// Erase enough good blocks to cover `len` logical bytes at `offset`.
fn flash_erase_skip_bad(
    dev: &dyn FlashDevice,
    base: u64,
    window: u64,
    offset: u64,
    len: u64,
) -> Result<()> {
    let esize = dev.erase_size();
    let limit = base + window;
    let start = (base + offset) & !(esize - 1);
    let mut remaining = (base + offset + len).next_multiple_of(esize) - start;
    let mut phys = start;

    while remaining > 0 {
        if phys >= limit {
            return Err(StorageError::BadBlockExhausted { offset: phys });
        }
        if dev.block_is_bad(phys)? {
            phys += esize;
            continue;
        }
        dev.erase_raw(phys, esize)?;
        phys += esize;
        remaining -= esize;
    }
    Ok(())
}

/// Program `data` into good blocks starting at `offset`, skipping bad
/// ones. Returns the number of bytes written.
fn flash_write_skip_bad(
    dev: &dyn FlashDevice,
    base: u64,
    window: u64,
    offset: u64,
    data: &[u8],
) -> Result<usize> {
    let esize = dev.erase_size();
    let limit = base + window;
    let mut phys = base + offset;
    let mut done = 0usize;

    while done < data.len() {
        if phys >= limit {
            return Err(StorageError::BadBlockExhausted { offset: phys });
        }
        let block = phys & !(esize - 1);
        if dev.block_is_bad(block)? {
            phys = block + esize;
            continue;
        }
        let in_block = ((block + esize - phys) as usize).min(data.len() - done);
        let in_block = in_block.min((limit - phys) as usize);
        dev.write_raw(phys, &data[done..done + in_block])?;
        done += in_block;
        phys += in_block as u64;
    }

    Ok(done)
}

/// Read-modify-erase-write over the erase blocks touched by
/// `[abs_start, abs_start + data.len())` (absolute device offsets).
fn flash_update_range(dev: &dyn FlashDevice, abs_start: u64, data: &[u8]) -> Result<()> {
    let esize = dev.erase_size();
    let abs_end = abs_start + data.len() as u64;
    let first = abs_start & !(esize - 1);
    let last = abs_end.next_multiple_of(esize);

    let mut block_buf = vec![0u8; esize as usize];

    let mut block = first;
    while block < last {
        let got = flash_read_skip_bad(dev, block, esize, 0, &mut block_buf)?;
        if got != esize as usize {
            return Err(StorageError::BadBlockExhausted { offset: block });
        }

        let splice_start = abs_start.max(block);
        let splice_end = abs_end.min(block + esize);
        let dst = (splice_start - block) as usize..(splice_end - block) as usize;
        let src = (splice_start - abs_start) as usize..(splice_end - abs_start) as usize;
        block_buf[dst].copy_from_slice(&data[src]);

        dev.erase_raw(block, esize)?;
        dev.write_raw(block, &block_buf)?;
        block += esize;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with_flash(size: u64, erase: u64) -> (StoragePool, Arc<MemFlash>) {
        let dev = Arc::new(MemFlash::new(size, erase));
        let parts = vec![
            Partition { name: "bl2".to_string(), offset: 0, size: size / 2 },
            Partition { name: "firmware".to_string(), offset: size / 2, size: size / 2 },
        ];
        (StoragePool::new().with_flash(dev.clone(), parts), dev)
    }

    #[test]
    fn open_by_name_and_raw() {
        let (pool, _) = pool_with_flash(0x40000, 0x10000);
        let dev = Arc::new(MemBlock::new(0x80000, 512));
        let pool = pool.with_block(
            dev,
            vec![Partition { name: "boot".to_string(), offset: 0x1000, size: 0x2000 }],
        );

        let t = pool.open(StorageSelect::Auto, "firmware").unwrap();
        assert_eq!(t.kind_str(), "mtd");
        assert_eq!(t.base, 0x20000);

        let t = pool.open(StorageSelect::Auto, "boot").unwrap();
        assert_eq!(t.kind_str(), "mmc");

        let t = pool.open(StorageSelect::Block, "raw").unwrap();
        assert_eq!(t.size, 0x80000);
        assert_eq!(t.base, 0);

        assert!(matches!(
            pool.open(StorageSelect::Auto, "nope"),
            Err(StorageError::TargetNotFound(_))
        ));
    }

    #[test]
    fn prefix_overrides_backend() {
        assert_eq!(
            resolve_target(StorageSelect::Auto, "mtd:bl2"),
            (StorageSelect::Flash, "bl2")
        );
        assert_eq!(
            resolve_target(StorageSelect::Flash, "mmc:boot"),
            (StorageSelect::Block, "boot")
        );
        assert_eq!(
            resolve_target(StorageSelect::Block, "plain"),
            (StorageSelect::Block, "plain")
        );
    }

    #[test]
    fn range_checks() {
        let (pool, _) = pool_with_flash(0x40000, 0x10000);
        let t = pool.open(StorageSelect::Flash, "bl2").unwrap();

        let mut buf = [0u8; 16];
        assert!(t.read(t.size - 8, &mut buf).is_err());
        assert!(t.update(t.size, &[1]).is_err());
        assert!(t.read(t.size, &mut []).is_ok());
    }

    #[test]
    fn update_within_one_block_preserves_rest() {
        let (pool, _) = pool_with_flash(0x40000, 0x10000);
        let t = pool.open(StorageSelect::Flash, "bl2").unwrap();

        let seed: Vec<u8> = (0..0x100u32).map(|i| i as u8).collect();
        t.restore(0, &seed).unwrap();

        t.update(0x10, &[0xde, 0xad, 0xbe, 0xef]).unwrap();

        let mut got = vec![0u8; 0x100];
        assert_eq!(t.read(0, &mut got).unwrap(), 0x100);
        assert_eq!(&got[..0x10], &seed[..0x10]);
        assert_eq!(&got[0x10..0x14], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&got[0x14..], &seed[0x14..]);
    }

    #[test]
    fn update_across_block_boundary() {
        let (pool, _) = pool_with_flash(0x40000, 0x10000);
        let t = pool.open(StorageSelect::Flash, "bl2").unwrap();

        let data = vec![0x5au8; 64];
        t.update(0x10000 - 32, &data).unwrap();

        let mut got = vec![0u8; 64];
        t.read(0x10000 - 32, &mut got).unwrap();
        assert_eq!(got, data);
    }

    #[test]
    fn restore_is_total_replacement() {
        let (pool, _) = pool_with_flash(0x40000, 0x10000);
        let t = pool.open(StorageSelect::Flash, "firmware").unwrap();

        t.restore(0, &vec![0x11u8; 0x20000]).unwrap();
        let payload = vec![0x77u8; 0x18000];
        t.restore(0, &payload).unwrap();

        let mut got = vec![0u8; 0x18000];
        t.read(0, &mut got).unwrap();
        assert_eq!(got, payload);
    }

    #[test]
    fn reads_skip_bad_blocks() {
        let dev = Arc::new(MemFlash::new(0x40000, 0x10000));
        // Fill each block with its index, then mark block 1 bad.
        for i in 0..4u8 {
            dev.fill_raw(u64::from(i) * 0x10000, i, 0x10000);
        }
        dev.mark_bad(0x10000);

        let pool = StoragePool::new().with_flash(
            dev,
            vec![Partition { name: "all".to_string(), offset: 0, size: 0x40000 }],
        );
        let t = pool.open(StorageSelect::Flash, "all").unwrap();

        // Logical bytes after block 0 come from block 2: block 1 is
        // skipped without a gap.
        let mut buf = vec![0u8; 0x20000];
        let got = t.read(0, &mut buf).unwrap();
        assert_eq!(got, 0x20000);
        assert!(buf[..0x10000].iter().all(|&b| b == 0));
        assert!(buf[0x10000..].iter().all(|&b| b == 2));
    }

    #[test]
    fn read_is_short_when_good_blocks_run_out() {
        let dev = Arc::new(MemFlash::new(0x20000, 0x10000));
        dev.mark_bad(0x10000);
        let pool = StoragePool::new().with_flash(
            dev,
            vec![Partition { name: "all".to_string(), offset: 0, size: 0x20000 }],
        );
        let t = pool.open(StorageSelect::Flash, "all").unwrap();

        let mut buf = vec![0u8; 0x20000];
        assert_eq!(t.read(0, &mut buf).unwrap(), 0x10000);
    }

    #[test]
    fn block_update_is_contiguous_write() {
        let dev = Arc::new(MemBlock::new(0x10000, 512));
        let pool = StoragePool::new().with_block(
            dev,
            vec![Partition { name: "boot".to_string(), offset: 0x1000, size: 0x1000 }],
        );
        let t = pool.open(StorageSelect::Block, "boot").unwrap();

        t.update(0x10, b"hello").unwrap();
        let mut got = [0u8; 5];
        t.read(0x10, &mut got).unwrap();
        assert_eq!(&got, b"hello");

        // The partition base offsets into the device.
        let raw = pool.open(StorageSelect::Block, "raw").unwrap();
        let mut got = [0u8; 5];
        raw.read(0x1010, &mut got).unwrap();
        assert_eq!(&got, b"hello");
    }
}
