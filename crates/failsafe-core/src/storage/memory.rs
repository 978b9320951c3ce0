#![allow(clippy::expect_used, reason = "in-memory backends panic on poisoned locks")]

//! In-memory storage backends for tests and image-less host runs.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use super::{BlockDevice, FlashDevice, Result, StorageError};

/// Simulated NAND/NOR flash: a byte array with erase-block semantics and a
/// bad-block set.
///
/// Erase fills blocks with `0xFF`; writes overwrite bytes directly (the
/// program-after-erase discipline is the facade's job, not enforced here).
/// All state sits behind `Arc<Mutex<_>>` so clones share one device.
#[derive(Clone)]
pub struct MemFlash {
    inner: Arc<Mutex<MemFlashInner>>,
    erase_size: u64,
    size: u64,
    model: String,
}

struct MemFlashInner {
    data: Vec<u8>,
    bad: HashSet<u64>,
}

impl MemFlash {
    /// New device of `size` bytes with `erase_size` blocks, fully erased.
    ///
    /// # Panics
    ///
    /// Panics if `erase_size` is zero, not a power of two, or does not
    /// divide `size`. These are construction bugs, not runtime errors.
    #[must_use]
    pub fn new(size: u64, erase_size: u64) -> Self {
        assert!(erase_size.is_power_of_two(), "erase size must be a power of two");
        assert!(size % erase_size == 0, "size must be a multiple of the erase size");

        Self {
            inner: Arc::new(Mutex::new(MemFlashInner {
                data: vec![0xFF; size as usize],
                bad: HashSet::new(),
            })),
            erase_size,
            size,
            model: "simflash".to_string(),
        }
    }

    /// Set the reported chip model.
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Mark the block containing `offset` bad.
    pub fn mark_bad(&self, offset: u64) {
        let block = offset & !(self.erase_size - 1);
        self.inner.lock().expect("mutex poisoned").bad.insert(block);
    }

    /// Fill `[offset, offset + len)` with `byte`, bypassing erase
    /// semantics. Test seeding helper.
    pub fn fill_raw(&self, offset: u64, byte: u8, len: u64) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let start = offset as usize;
        inner.data[start..start + len as usize].fill(byte);
    }

    /// Snapshot of raw device contents. Test helper.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().expect("mutex poisoned").data.clone()
    }

    fn check(&self, offset: u64, len: u64) -> Result<()> {
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(StorageError::Io(format!(
                "device access {offset:#x}+{len:#x} beyond {:#x}",
                self.size
            )));
        }
        Ok(())
    }
}

impl FlashDevice for MemFlash {
    fn model(&self) -> String {
        self.model.clone()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn erase_size(&self) -> u64 {
        self.erase_size
    }

    fn block_is_bad(&self, offset: u64) -> Result<bool> {
        self.check(offset, 0)?;
        let block = offset & !(self.erase_size - 1);
        Ok(self.inner.lock().expect("mutex poisoned").bad.contains(&block))
    }

    fn read_raw(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.check(offset, out.len() as u64)?;
        let inner = self.inner.lock().expect("mutex poisoned");
        let start = offset as usize;
        out.copy_from_slice(&inner.data[start..start + out.len()]);
        Ok(())
    }

    fn erase_raw(&self, offset: u64, len: u64) -> Result<()> {
        if offset % self.erase_size != 0 || len % self.erase_size != 0 {
            return Err(StorageError::Io(format!(
                "unaligned erase {offset:#x}+{len:#x}"
            )));
        }
        self.check(offset, len)?;
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let start = offset as usize;
        inner.data[start..start + len as usize].fill(0xFF);
        Ok(())
    }

    fn write_raw(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check(offset, data.len() as u64)?;
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let start = offset as usize;
        inner.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Simulated byte-addressed block device.
#[derive(Clone)]
pub struct MemBlock {
    inner: Arc<Mutex<Vec<u8>>>,
    block_size: u64,
    size: u64,
    vendor: String,
    product: String,
}

impl MemBlock {
    /// New zero-filled device of `size` bytes.
    #[must_use]
    pub fn new(size: u64, block_size: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vec![0u8; size as usize])),
            block_size,
            size,
            vendor: "sim".to_string(),
            product: "simblk".to_string(),
        }
    }

    /// Set the reported product string.
    #[must_use]
    pub fn with_product(mut self, product: &str) -> Self {
        self.product = product.to_string();
        self
    }

    fn check(&self, offset: u64, len: u64) -> Result<()> {
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(StorageError::Io(format!(
                "device access {offset:#x}+{len:#x} beyond {:#x}",
                self.size
            )));
        }
        Ok(())
    }
}

impl BlockDevice for MemBlock {
    fn vendor(&self) -> String {
        self.vendor.clone()
    }

    fn product(&self) -> String {
        self.product.clone()
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.check(offset, out.len() as u64)?;
        let inner = self.inner.lock().expect("mutex poisoned");
        let start = offset as usize;
        out.copy_from_slice(&inner[start..start + out.len()]);
        Ok(())
    }

    fn write_at(&self, offset: u64, data: &[u8], _reliable: bool) -> Result<()> {
        self.check(offset, data.len() as u64)?;
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let start = offset as usize;
        inner[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}
