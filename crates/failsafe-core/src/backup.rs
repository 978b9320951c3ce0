//! Backup download filenames.
//!
//! Backups are named
//! `backup_<mtd|mmc>_<model>_<target>_0x<start>-0x<end>.bin` with model
//! and target sanitized to `[A-Za-z0-9._-]`. Restore parses the same
//! shape back, tolerating renames as long as the structure survives: the
//! range is the last `_0x…-0x…` pair, the storage tag the first
//! `backup_mtd_`/`backup_mmc_` marker, and the target the final
//! `_`-separated segment between tag and range. A target whose own name
//! contains `_` cannot be told apart from the model and loses its prefix;
//! restore then falls back to the explicit form fields.

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
#[must_use]
pub fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Synthesize the download filename for a backup of `[start, end)`.
#[must_use]
pub fn backup_filename(kind: &str, model: &str, target: &str, start: u64, end: u64) -> String {
    let model = sanitize_component(model);
    let model = if model.is_empty() { "device".to_string() } else { model };
    format!(
        "backup_{kind}_{model}_{}_{start:#x}-{end:#x}.bin",
        sanitize_component(target)
    )
}

/// The fields recovered from a backup filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBackupName {
    /// `mtd` or `mmc`.
    pub storage: &'static str,
    /// Target partition name.
    pub target: String,
    /// Region start offset.
    pub start: u64,
    /// Region end offset (exclusive).
    pub end: u64,
}

/// Parse a filename produced by [`backup_filename`].
///
/// Returns `None` when the structure is not recognizable or the range is
/// empty or inverted.
#[must_use]
pub fn parse_backup_filename(filename: &str) -> Option<ParsedBackupName> {
    let stem = filename.strip_suffix(".bin").unwrap_or(filename);

    // Work backwards: the range suffix is `_0x<start>-0x<end>`.
    let dash = stem.rfind("-0x")?;
    let end = parse_hex(&stem[dash + 3..])?;
    let head = &stem[..dash];
    let range_tag = head.rfind("_0x")?;
    let start = parse_hex(&head[range_tag + 3..])?;
    if end <= start {
        return None;
    }

    let before_range = &stem[..range_tag];
    let mtd = before_range.find("backup_mtd_");
    let mmc = before_range.find("backup_mmc_");
    let (storage, tag_end): (&'static str, usize) = match (mtd, mmc) {
        (Some(a), Some(b)) if a < b => ("mtd", a + 11),
        (Some(_), Some(b)) => ("mmc", b + 11),
        (Some(a), None) => ("mtd", a + 11),
        (None, Some(b)) => ("mmc", b + 11),
        (None, None) => return None,
    };

    // `<model>_<target>` sits between the tag and the range; the target
    // is the final segment.
    let middle = &before_range[tag_end..];
    let target = middle.rsplit('_').next().filter(|t| !t.is_empty())?;

    Some(ParsedBackupName { storage, target: target.to_string(), start, end })
}

fn parse_hex(input: &str) -> Option<u64> {
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(input, 16).ok()
}
