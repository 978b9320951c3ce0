//! `application/x-www-form-urlencoded` and query-string decoding.
//!
//! Decoded values are small (target names, offsets, commands), so unlike
//! multipart payloads they are owned copies.

use crate::multipart::{FormValue, ValueData};

/// Decode a urlencoded form body or query string into form values.
///
/// `+` becomes a space, `%XX` is percent-decoded, and a malformed escape
/// is passed through verbatim rather than rejected, matching what lenient
/// servers do with hand-typed query strings. Pairs without `=` become
/// values with empty payloads.
#[must_use]
pub fn parse_urlencoded(input: &str) -> Vec<FormValue> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            FormValue {
                name: String::from_utf8_lossy(&decode_component(name)).into_owned(),
                filename: None,
                content_type: None,
                data: ValueData::Owned(decode_component(value)),
            }
        })
        .collect()
}

fn decode_component(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            },
            b'%' => match hex_pair(bytes.get(i + 1..i + 3)) {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                },
                None => {
                    out.push(b'%');
                    i += 1;
                },
            },
            b => {
                out.push(b);
                i += 1;
            },
        }
    }
    out
}

fn hex_pair(pair: Option<&[u8]>) -> Option<u8> {
    let pair = pair?;
    let hi = (pair[0] as char).to_digit(16)?;
    let lo = (pair[1] as char).to_digit(16)?;
    Some(((hi << 4) | lo) as u8)
}
