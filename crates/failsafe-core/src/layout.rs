//! Flash partition layout tables.
//!
//! A board can ship more than one flash layout (for example a stock and an
//! enlarged-firmware split). Layouts are described as
//! `label:name@offset+size;name@offset+size;…` strings; the active label
//! is persisted to the environment as `mtd_layout_label` when an upload
//! commits with a different selection.

use thiserror::Error;

use crate::storage::Partition;

/// Errors from layout string parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// A layout or partition definition did not match the grammar.
    #[error("bad layout syntax: {0}")]
    BadSyntax(String),

    /// Two layouts share a label.
    #[error("duplicate layout label: {0}")]
    DuplicateLabel(String),

    /// The table would be empty.
    #[error("no layouts defined")]
    Empty,
}

/// One named partition layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Layout label, e.g. `default`.
    pub label: String,
    /// Partitions in definition order.
    pub parts: Vec<Partition>,
}

impl Layout {
    /// Parse `label:name@offset+size;…`. Offsets and sizes are decimal or
    /// `0x` hex.
    ///
    /// # Errors
    ///
    /// [`LayoutError::BadSyntax`] with the offending fragment.
    pub fn parse(spec: &str) -> Result<Self, LayoutError> {
        let (label, rest) = spec
            .split_once(':')
            .ok_or_else(|| LayoutError::BadSyntax(spec.to_string()))?;
        let label = label.trim();
        if label.is_empty() {
            return Err(LayoutError::BadSyntax(spec.to_string()));
        }

        let mut parts = Vec::new();
        for def in rest.split(';').filter(|d| !d.trim().is_empty()) {
            let def = def.trim();
            let (name, geometry) =
                def.split_once('@').ok_or_else(|| LayoutError::BadSyntax(def.to_string()))?;
            let (offset, size) = geometry
                .split_once('+')
                .ok_or_else(|| LayoutError::BadSyntax(def.to_string()))?;

            let name = name.trim();
            if name.is_empty() {
                return Err(LayoutError::BadSyntax(def.to_string()));
            }

            parts.push(Partition {
                name: name.to_string(),
                offset: parse_number(offset)
                    .ok_or_else(|| LayoutError::BadSyntax(def.to_string()))?,
                size: parse_number(size)
                    .ok_or_else(|| LayoutError::BadSyntax(def.to_string()))?,
            });
        }

        if parts.is_empty() {
            return Err(LayoutError::BadSyntax(spec.to_string()));
        }

        Ok(Self { label: label.to_string(), parts })
    }
}

fn parse_number(input: &str) -> Option<u64> {
    let s = input.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// The set of selectable layouts, with one active.
#[derive(Debug, Clone)]
pub struct LayoutTable {
    layouts: Vec<Layout>,
    current: usize,
}

impl LayoutTable {
    /// Build a table from parsed layouts. The first layout is active
    /// unless `selected` names another.
    ///
    /// # Errors
    ///
    /// [`LayoutError::Empty`] or [`LayoutError::DuplicateLabel`].
    pub fn new(layouts: Vec<Layout>, selected: Option<&str>) -> Result<Self, LayoutError> {
        if layouts.is_empty() {
            return Err(LayoutError::Empty);
        }
        for (i, layout) in layouts.iter().enumerate() {
            if layouts[..i].iter().any(|other| other.label == layout.label) {
                return Err(LayoutError::DuplicateLabel(layout.label.clone()));
            }
        }

        let current = selected
            .and_then(|label| layouts.iter().position(|l| l.label == label))
            .unwrap_or(0);

        Ok(Self { layouts, current })
    }

    /// The active layout.
    #[must_use]
    pub fn current(&self) -> &Layout {
        &self.layouts[self.current]
    }

    /// Label of the active layout.
    #[must_use]
    pub fn current_label(&self) -> &str {
        &self.layouts[self.current].label
    }

    /// Make `label` active. Returns `false` for an unknown label.
    pub fn select(&mut self, label: &str) -> bool {
        match self.layouts.iter().position(|l| l.label == label) {
            Some(index) => {
                self.current = index;
                true
            },
            None => false,
        }
    }

    /// Whether more than one layout is selectable.
    #[must_use]
    pub fn has_alternates(&self) -> bool {
        self.layouts.len() > 1
    }

    /// The `getmtdlayout` body: current label first, then every label,
    /// each `;`-terminated.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(self.current_label());
        out.push(';');
        for layout in &self.layouts {
            out.push_str(&layout.label);
            out.push(';');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_layout_string() {
        let layout =
            Layout::parse("default:bl2@0x0+0x100000;fip@0x100000+0x80000;firmware@0x180000+0x680000")
                .unwrap();

        assert_eq!(layout.label, "default");
        assert_eq!(layout.parts.len(), 3);
        assert_eq!(layout.parts[1].name, "fip");
        assert_eq!(layout.parts[1].offset, 0x10_0000);
        assert_eq!(layout.parts[1].size, 0x8_0000);
    }

    #[test]
    fn accepts_decimal_and_trailing_semicolon() {
        let layout = Layout::parse("x:env@1024+2048;").unwrap();
        assert_eq!(layout.parts[0].offset, 1024);
        assert_eq!(layout.parts[0].size, 2048);
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(Layout::parse("nolabel").is_err());
        assert!(Layout::parse(":a@0+1").is_err());
        assert!(Layout::parse("l:a@0").is_err());
        assert!(Layout::parse("l:@0+1").is_err());
        assert!(Layout::parse("l:a@zz+1").is_err());
        assert!(Layout::parse("l:").is_err());
    }

    #[test]
    fn table_selection_and_summary() {
        let layouts = vec![
            Layout::parse("default:a@0+4096").unwrap(),
            Layout::parse("large:a@0+8192").unwrap(),
        ];
        let mut table = LayoutTable::new(layouts, None).unwrap();

        assert_eq!(table.current_label(), "default");
        assert_eq!(table.summary(), "default;default;large;");

        assert!(table.select("large"));
        assert_eq!(table.current_label(), "large");
        assert_eq!(table.current().parts[0].size, 8192);

        assert!(!table.select("missing"));
        assert!(table.has_alternates());
    }

    #[test]
    fn table_honors_persisted_selection() {
        let layouts = vec![
            Layout::parse("default:a@0+4096").unwrap(),
            Layout::parse("large:a@0+8192").unwrap(),
        ];
        let table = LayoutTable::new(layouts, Some("large")).unwrap();
        assert_eq!(table.current_label(), "large");
    }

    #[test]
    fn table_rejects_duplicates_and_empty() {
        assert!(matches!(LayoutTable::new(vec![], None), Err(LayoutError::Empty)));

        let layouts = vec![
            Layout::parse("x:a@0+1024").unwrap(),
            Layout::parse("x:b@0+1024").unwrap(),
        ];
        assert!(matches!(
            LayoutTable::new(layouts, None),
            Err(LayoutError::DuplicateLabel(_))
        ));
    }
}
