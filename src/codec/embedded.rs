// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Invisible continuation-token codec
//
// A conversation id is base64-encoded, each base64 character is split into
// two 3-bit groups, and every group is written as one of eight zero-width
// code points. The resulting run is appended to the reply text, invisible to
// the reader but carried back by the client in the next request's history.
//
// Padding characters contribute only their (zero) high group. A token whose
// base64 form ends in "=" therefore has a symbol count of 7 mod 8, and one
// ending in "==" a count of 6 mod 8; no unpadded token can land on either.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::Engine as _;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Symbol for each 3-bit value, indexed by value.
pub const SYMBOLS: [char; 8] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{2061}', '\u{2062}', '\u{2063}', '\u{2064}',
];

static SYMBOL_VALUES: LazyLock<HashMap<char, u8>> = LazyLock::new(|| {
    SYMBOLS
        .iter()
        .enumerate()
        .map(|(value, symbol)| (*symbol, value as u8))
        .collect()
});

const BASE64_CHARS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

static BASE64_VALUES: LazyLock<HashMap<u8, u8>> = LazyLock::new(|| {
    BASE64_CHARS
        .iter()
        .enumerate()
        .map(|(value, c)| (*c, value as u8))
        .collect()
});

/// Tolerates non-zero trailing bits left behind by a zero-padded final group.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Whether `c` belongs to the codec alphabet.
pub fn is_symbol(c: char) -> bool {
    SYMBOL_VALUES.contains_key(&c)
}

/// Encode a conversation id as a run of invisible symbols.
pub fn encode(id: &str) -> String {
    let b64 = STANDARD.encode(id.as_bytes());
    let mut out = String::with_capacity(b64.len() * 2 * 3);
    for c in b64.bytes() {
        if c == b'=' {
            out.push(SYMBOLS[0]);
            continue;
        }
        let value = BASE64_VALUES.get(&c).copied().unwrap_or(0);
        out.push(SYMBOLS[(value >> 3) as usize]);
        out.push(SYMBOLS[(value & 0b111) as usize]);
    }
    out
}

/// Decode the token at the very end of `text`.
///
/// Only the maximal run of symbols terminating the text is considered.
/// Returns `None` when there is no run or it does not decode to UTF-8.
pub fn decode(text: &str) -> Option<String> {
    let mut values: Vec<u8> = text
        .chars()
        .rev()
        .map_while(|c| SYMBOL_VALUES.get(&c).copied())
        .collect();
    if values.is_empty() {
        return None;
    }
    values.reverse();

    let padding = match values.len() % 8 {
        7 => 1,
        6 => 2,
        _ => 0,
    };
    if padding > 0 && values[values.len() - padding..].iter().all(|v| *v == 0) {
        values.truncate(values.len() - padding);
    }

    let mut b64 = String::with_capacity(values.len() / 2 + 4);
    for pair in values.chunks(2) {
        let high = pair[0];
        let low = pair.get(1).copied().unwrap_or(0);
        b64.push(BASE64_CHARS[((high << 3) | low) as usize] as char);
    }
    while b64.len() % 4 != 0 {
        b64.push('=');
    }

    let bytes = match LENIENT.decode(b64.as_bytes()) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "continuation token is not valid base64");
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(error = %e, "continuation token is not valid UTF-8");
            None
        }
    }
}

/// Append the encoded `id` unless `text` already ends in a token.
pub fn append_if_absent(text: &str, id: &str) -> String {
    if decode(text).is_some() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + id.len() * 8);
    out.push_str(text);
    out.push_str(&encode(id));
    out
}
