//! File-backed storage backends.
//!
//! A host-side run of the recovery server operates on raw image files
//! instead of real drivers: one file per backend, byte-for-byte the
//! device contents. Bad-block bookkeeping does not exist in an image
//! file, so the flash backend reports every block good.

use std::{fs::File, os::unix::fs::FileExt, path::Path};

use super::{BlockDevice, FlashDevice, Result, StorageError};

/// Flash device backed by a raw image file.
pub struct FileFlash {
    file: File,
    size: u64,
    erase_size: u64,
    model: String,
}

impl FileFlash {
    /// Open an existing image. The file length must be a multiple of the
    /// erase size.
    ///
    /// # Errors
    ///
    /// I/O failures, a zero or non-power-of-two erase size, or a file
    /// length not divisible by it.
    pub fn open(path: &Path, erase_size: u64) -> Result<Self> {
        if erase_size == 0 || !erase_size.is_power_of_two() {
            return Err(StorageError::Io(format!("invalid erase size {erase_size:#x}")));
        }
        let file = File::options().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size == 0 || size % erase_size != 0 {
            return Err(StorageError::Io(format!(
                "image size {size:#x} not a multiple of erase size {erase_size:#x}"
            )));
        }

        let model = path
            .file_stem()
            .map_or_else(|| "flash-image".to_string(), |s| s.to_string_lossy().into_owned());

        Ok(Self { file, size, erase_size, model })
    }
}

impl FlashDevice for FileFlash {
    fn model(&self) -> String {
        self.model.clone()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn erase_size(&self) -> u64 {
        self.erase_size
    }

    fn block_is_bad(&self, _offset: u64) -> Result<bool> {
        Ok(false)
    }

    fn read_raw(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.file.read_exact_at(out, offset)?;
        Ok(())
    }

    fn erase_raw(&self, offset: u64, len: u64) -> Result<()> {
        if offset % self.erase_size != 0 || len % self.erase_size != 0 {
            return Err(StorageError::Io(format!("unaligned erase {offset:#x}+{len:#x}")));
        }
        let blank = vec![0xFFu8; self.erase_size as usize];
        let mut at = offset;
        while at < offset + len {
            self.file.write_all_at(&blank, at)?;
            at += self.erase_size;
        }
        Ok(())
    }

    fn write_raw(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.write_all_at(data, offset)?;
        Ok(())
    }
}

/// Block device backed by a raw image file.
pub struct FileBlock {
    file: File,
    size: u64,
    product: String,
}

impl FileBlock {
    /// Open an existing image.
    ///
    /// # Errors
    ///
    /// I/O failures or an empty file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Err(StorageError::Io("empty block image".to_string()));
        }

        let product = path
            .file_stem()
            .map_or_else(|| "block-image".to_string(), |s| s.to_string_lossy().into_owned());

        Ok(Self { file, size, product })
    }
}

impl BlockDevice for FileBlock {
    fn vendor(&self) -> String {
        "file".to_string()
    }

    fn product(&self) -> String {
        self.product.clone()
    }

    fn block_size(&self) -> u64 {
        512
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.file.read_exact_at(out, offset)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, data: &[u8], reliable: bool) -> Result<()> {
        self.file.write_all_at(data, offset)?;
        if reliable {
            self.file.sync_all()?;
        }
        Ok(())
    }
}
