//! Persisted key/value environment.
//!
//! The environment is a flat map of non-empty names to byte-string values,
//! persisted as a fixed-size CRC-framed blob: a 4-byte little-endian CRC32
//! over the data section, then `NAME=VALUE` records separated by NUL,
//! terminated by a double NUL, zero-padded to [`ENV_BLOB_SIZE`]. Import
//! and export speak exactly this format; the text export for `/env/list`
//! turns record separators into newlines and stops at the terminator.

use std::collections::BTreeMap;

use thiserror::Error;

/// Fixed size of the persisted blob, CRC header included.
pub const ENV_BLOB_SIZE: usize = 0x4000;

/// Longest accepted variable name.
pub const ENV_NAME_MAX: usize = 128;

const DATA_SIZE: usize = ENV_BLOB_SIZE - 4;

/// Environment errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// Name empty, too long, or containing `=`/NUL.
    #[error("invalid variable name")]
    BadName,

    /// Serialized records would not fit the blob.
    #[error("environment exceeds {ENV_BLOB_SIZE} byte blob")]
    TooLarge,

    /// Imported blob is too small, CRC-corrupt, or malformed.
    #[error("bad environment blob: {0}")]
    BadBlob(&'static str),

    /// The persistence backend failed.
    #[error("save failed: {0}")]
    Persist(String),
}

/// Persistence seam for the serialized blob.
///
/// The server wires this to the storage facade (an `env` partition) or to
/// a plain file; the store itself never knows where blobs go.
pub trait EnvPersist: Send {
    /// Durably store the blob.
    ///
    /// # Errors
    ///
    /// Backend-specific failure, surfaced verbatim as HTTP 500.
    fn save(&mut self, blob: &[u8]) -> Result<(), EnvError>;
}

/// In-memory environment with optional persistence and a default set for
/// reset.
pub struct EnvStore {
    vars: BTreeMap<String, Vec<u8>>,
    defaults: BTreeMap<String, Vec<u8>>,
    persist: Option<Box<dyn EnvPersist>>,
}

impl EnvStore {
    /// Store seeded with `defaults` as both the live set and the
    /// reset-to-default set.
    #[must_use]
    pub fn new(defaults: BTreeMap<String, Vec<u8>>) -> Self {
        Self { vars: defaults.clone(), defaults, persist: None }
    }

    /// Attach a persistence backend.
    #[must_use]
    pub fn with_persist(mut self, persist: Box<dyn EnvPersist>) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Value of `name`, if set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.vars.get(name).map(Vec::as_slice)
    }

    /// Value of `name` as UTF-8, if set and valid.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Set `name` to `value`. The value may be empty.
    ///
    /// # Errors
    ///
    /// [`EnvError::BadName`] for invalid names, [`EnvError::TooLarge`]
    /// when the result would not serialize into the blob.
    pub fn set(&mut self, name: &str, value: &[u8]) -> Result<(), EnvError> {
        validate_name(name)?;
        let previous = self.vars.insert(name.to_string(), value.to_vec());
        if self.serialized_len() > DATA_SIZE {
            // Roll back so a rejected set does not corrupt state.
            match previous {
                Some(old) => {
                    self.vars.insert(name.to_string(), old);
                },
                None => {
                    self.vars.remove(name);
                },
            }
            return Err(EnvError::TooLarge);
        }
        Ok(())
    }

    /// Delete `name`. Deleting an absent name is a no-op.
    ///
    /// # Errors
    ///
    /// [`EnvError::BadName`] for invalid names.
    pub fn unset(&mut self, name: &str) -> Result<(), EnvError> {
        validate_name(name)?;
        self.vars.remove(name);
        Ok(())
    }

    /// Replace the live set with the defaults.
    pub fn reset_to_defaults(&mut self) {
        self.vars = self.defaults.clone();
    }

    /// Serialize and hand the blob to the persistence backend.
    ///
    /// Without a backend this is a no-op, matching a board whose env
    /// storage is absent.
    ///
    /// # Errors
    ///
    /// [`EnvError::Persist`] from the backend.
    pub fn save(&mut self) -> Result<(), EnvError> {
        let blob = self.export_blob();
        if let Some(persist) = &mut self.persist {
            persist.save(&blob)?;
        }
        Ok(())
    }

    /// Serialize the CRC-framed blob.
    #[must_use]
    pub fn export_blob(&self) -> Vec<u8> {
        let mut data = vec![0u8; DATA_SIZE];
        let mut at = 0;
        for (name, value) in &self.vars {
            let record_len = name.len() + 1 + value.len() + 1;
            // set() guarantees fit; guard anyway so a logic bug truncates
            // instead of panicking.
            if at + record_len + 1 > DATA_SIZE {
                tracing::warn!("environment truncated while exporting");
                break;
            }
            data[at..at + name.len()].copy_from_slice(name.as_bytes());
            at += name.len();
            data[at] = b'=';
            at += 1;
            data[at..at + value.len()].copy_from_slice(value);
            at += value.len() + 1;
        }

        let crc = crc32fast::hash(&data);
        let mut blob = Vec::with_capacity(ENV_BLOB_SIZE);
        blob.extend_from_slice(&crc.to_le_bytes());
        blob.extend_from_slice(&data);
        blob
    }

    /// Validate and import a blob, replacing the live set on success.
    ///
    /// # Errors
    ///
    /// [`EnvError::BadBlob`] for short blobs, CRC mismatches, or records
    /// without a separator.
    pub fn import_blob(&mut self, blob: &[u8]) -> Result<(), EnvError> {
        if blob.len() < ENV_BLOB_SIZE {
            return Err(EnvError::BadBlob("blob smaller than the native record"));
        }
        let stored = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]);
        let data = &blob[4..ENV_BLOB_SIZE];
        if crc32fast::hash(data) != stored {
            return Err(EnvError::BadBlob("crc mismatch"));
        }

        let mut vars = BTreeMap::new();
        let mut at = 0;
        while at < data.len() && data[at] != 0 {
            let end = at
                + data[at..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(EnvError::BadBlob("unterminated record"))?;
            let record = &data[at..end];
            let sep = record
                .iter()
                .position(|&b| b == b'=')
                .ok_or(EnvError::BadBlob("record without separator"))?;
            let name = std::str::from_utf8(&record[..sep])
                .map_err(|_| EnvError::BadBlob("non-UTF-8 name"))?;
            if validate_name(name).is_err() {
                return Err(EnvError::BadBlob("invalid name"));
            }
            vars.insert(name.to_string(), record[sep + 1..].to_vec());
            at = end + 1;
        }

        self.vars = vars;
        Ok(())
    }

    /// Newline-separated `KEY=VALUE` text, derived from the blob encoding
    /// (record separators become newlines, export stops at the first
    /// double NUL).
    #[must_use]
    pub fn export_text(&self) -> String {
        let blob = self.export_blob();
        let data = &blob[4..];

        let mut out = Vec::new();
        let mut i = 0;
        while i + 1 < data.len() {
            if data[i] == 0 && data[i + 1] == 0 {
                break;
            }
            out.push(if data[i] == 0 { b'\n' } else { data[i] });
            i += 1;
        }
        if !out.is_empty() && out.last() != Some(&b'\n') {
            out.push(b'\n');
        }

        String::from_utf8_lossy(&out).into_owned()
    }

    /// Number of live variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn serialized_len(&self) -> usize {
        self.vars
            .iter()
            .map(|(name, value)| name.len() + 1 + value.len() + 1)
            .sum::<usize>()
            + 1
    }
}

impl std::fmt::Debug for EnvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvStore").field("vars", &self.vars.len()).finish()
    }
}

fn validate_name(name: &str) -> Result<(), EnvError> {
    if name.is_empty()
        || name.len() > ENV_NAME_MAX
        || name.bytes().any(|b| b == b'=' || b == 0)
    {
        return Err(EnvError::BadName);
    }
    Ok(())
}
