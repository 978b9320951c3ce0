//! Textual helpers shared by the JSON-emitting endpoints.
//!
//! The recovery UI consumes hand-formatted JSON envelopes, so the escaping
//! rules here are the contract: output never contains an unescaped `"` or
//! `\`, and control bytes can never break out of a JSON string.

/// Errors from [`hex_decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
    /// No hex digits, or an odd number of them.
    Invalid,
    /// Decoded size would exceed the caller's cap.
    TooLarge,
}

/// Escape a byte string for embedding in a JSON string literal.
///
/// `"` and `\` are backslash-escaped, `\n`/`\r`/`\t` become their two-byte
/// escapes, any other byte below 0x20 is replaced with a single space, and
/// invalid UTF-8 sequences are replaced with U+FFFD. The output is always
/// safe to splice between double quotes.
#[must_use]
pub fn json_escape(src: &[u8]) -> String {
    let mut out = Vec::with_capacity(src.len() + 8);

    for &c in src {
        match c {
            b'"' | b'\\' => {
                out.push(b'\\');
                out.push(c);
            },
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x00..0x20 => out.push(b' '),
            _ => out.push(c),
        }
    }

    String::from_utf8(out)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Render bytes as the flash editor's `"hh hh hh"` dump format.
#[must_use]
pub fn hex_dump(data: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let mut out = String::with_capacity(data.len() * 3);
    for (i, &b) in data.iter().enumerate() {
        if i != 0 {
            out.push(' ');
        }
        out.push(HEX[usize::from(b >> 4)] as char);
        out.push(HEX[usize::from(b & 0xf)] as char);
    }
    out
}

/// Decode a loosely formatted hex string into bytes.
///
/// `0x`/`0X` prefixes are skipped wherever they occur and any byte that is
/// not a hex digit acts as a separator, so `"de ad be ef"`, `"0xdeadbeef"`
/// and `"de:ad:be:ef"` all decode the same. The total digit count must be
/// even and non-zero, and the decoded size must not exceed `max`.
///
/// # Errors
///
/// [`HexError::Invalid`] for zero or odd digit counts,
/// [`HexError::TooLarge`] when the decoded size exceeds `max`.
pub fn hex_decode(input: &str, max: usize) -> Result<Vec<u8>, HexError> {
    let bytes = input.as_bytes();
    let mut digits = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'0' && matches!(bytes.get(i + 1), Some(b'x' | b'X')) {
            i += 2;
            continue;
        }
        if bytes[i].is_ascii_hexdigit() {
            digits += 1;
        }
        i += 1;
    }

    if digits == 0 || digits % 2 != 0 {
        return Err(HexError::Invalid);
    }
    if digits / 2 > max {
        return Err(HexError::TooLarge);
    }

    let mut out = Vec::with_capacity(digits / 2);
    let mut high: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'0' && matches!(bytes.get(i + 1), Some(b'x' | b'X')) {
            // A prefix restarts the current byte, matching the original
            // parser's behavior for inputs like "0xde 0xad".
            i += 2;
            high = None;
            continue;
        }

        let Some(v) = (bytes[i] as char).to_digit(16) else {
            i += 1;
            continue;
        };
        let v = v as u8;

        match high.take() {
            None => high = Some(v),
            Some(h) => out.push((h << 4) | v),
        }
        i += 1;
    }

    Ok(out)
}

/// Parse a size form field: decimal or `0x` hex, with an optional
/// `k`/`kb`/`kib` suffix (x1024) after optional blanks.
///
/// Returns `None` for empty input, trailing garbage, or overflow.
#[must_use]
pub fn parse_size(input: &str) -> Option<u64> {
    let s = input.trim_start();
    let (digits_end, value) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let end = hex.len() - hex.trim_start_matches(|c: char| c.is_ascii_hexdigit()).len();
        if end == 0 {
            return None;
        }
        (2 + end, u64::from_str_radix(&hex[..end], 16).ok()?)
    } else {
        let end = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if end == 0 {
            return None;
        }
        (end, s[..end].parse::<u64>().ok()?)
    };

    let rest = s[digits_end..].trim_start_matches([' ', '\t']);
    if rest.is_empty() {
        return Some(value);
    }

    if rest.eq_ignore_ascii_case("k")
        || rest.eq_ignore_ascii_case("kb")
        || rest.eq_ignore_ascii_case("kib")
    {
        return value.checked_mul(1024);
    }

    None
}
