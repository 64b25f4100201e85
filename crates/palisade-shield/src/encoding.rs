//! # Encoding Detector
//!
//! Detects and unwraps the encodings attackers wrap payloads in to slip
//! past literal pattern matching: base64, hex, URL percent-encoding, HTML
//! entities, rot13 and leetspeak.
//!
//! Detection is heuristic and deliberately conservative: a decoded
//! candidate is only accepted when it comes out as printable text, so
//! ordinary prose does not get mangled. Recursive peeling is capped to
//! bound work on adversarial onions.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Encodings the detector can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingKind {
    Base64,
    Hex,
    Url,
    Html,
    Rot13,
    Leetspeak,
}

/// Detection result: the set of encodings seen, a confidence in [0, 1],
/// the number of nested layers that peel off, and an obfuscation verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingReport {
    pub kinds: Vec<EncodingKind>,
    pub confidence: f64,
    pub layers: u32,
    pub suspicious: bool,
}

impl EncodingReport {
    pub fn detected(&self) -> bool {
        !self.kinds.is_empty()
    }
}

/// Minimum run length considered for base64 detection.
const BASE64_MIN_RUN: usize = 8;

/// Minimum run length considered for hex detection.
const HEX_MIN_RUN: usize = 16;

/// Maximum peeling depth for [`detect`]'s layer count.
const DETECT_MAX_LAYERS: u32 = 5;

/// Detect encodings present in `text`.
pub fn detect(text: &str) -> EncodingReport {
    let mut kinds = Vec::new();

    if decode_embedded_base64(text).is_some() {
        kinds.push(EncodingKind::Base64);
    }
    if find_hex_run(text).is_some() {
        kinds.push(EncodingKind::Hex);
    }
    if looks_url_encoded(text) {
        kinds.push(EncodingKind::Url);
    }
    if looks_html_encoded(text) {
        kinds.push(EncodingKind::Html);
    }
    if looks_rot13(text) {
        kinds.push(EncodingKind::Rot13);
    }
    if looks_leetspeak(text) {
        kinds.push(EncodingKind::Leetspeak);
    }

    let layers = count_layers(text, DETECT_MAX_LAYERS);
    let confidence = match kinds.len() {
        0 => 0.0,
        1 => 0.6,
        2 => 0.8,
        _ => 0.95,
    };
    let suspicious = layers >= 2
        || kinds.len() >= 2
        || kinds.contains(&EncodingKind::Base64)
        || kinds.contains(&EncodingKind::Hex);

    EncodingReport {
        kinds,
        confidence,
        layers,
        suspicious,
    }
}

/// Peel decodable layers until a fixed point, returning the final text and
/// the number of layers removed.
pub fn decode_recursive(text: &str, max_layers: u32) -> (String, u32) {
    let mut current = text.to_string();
    let mut layers = 0;
    for _ in 0..max_layers {
        let next = decode_once(&current);
        match next {
            Some(decoded) if decoded != current => {
                current = decoded;
                layers += 1;
            }
            _ => break,
        }
    }
    (current, layers)
}

fn count_layers(text: &str, max_layers: u32) -> u32 {
    decode_recursive(text, max_layers).1
}

/// Apply one round of decoding; `None` when nothing decodable was found.
fn decode_once(text: &str) -> Option<String> {
    if let Some(decoded) = decode_embedded_base64(text) {
        return Some(decoded);
    }
    if let Some(decoded) = decode_embedded_hex(text) {
        return Some(decoded);
    }
    if looks_url_encoded(text) {
        let decoded = url_decode(text);
        if decoded != text {
            return Some(decoded);
        }
    }
    if looks_html_encoded(text) {
        let decoded = html_unescape(text);
        if decoded != text {
            return Some(decoded);
        }
    }
    None
}

/// `true` when `text` contains at least one `%XX` escape.
pub fn looks_url_encoded(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.windows(3).any(|w| {
        w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit()
    })
}

fn looks_html_encoded(text: &str) -> bool {
    for prefix in ["&lt;", "&gt;", "&amp;", "&quot;", "&#"] {
        if text.contains(prefix) {
            return true;
        }
    }
    false
}

/// Percent-decode `%XX` escapes; everything else passes through.
pub fn url_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| text.to_string())
}

/// Decode the common named HTML entities and numeric character references.
pub fn html_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        // Entities are short and ASCII; scan bytes so multi-byte text
        // nearby cannot split a char.
        let limit = rest.len().min(12);
        let Some(end) = rest.as_bytes()[..limit].iter().position(|&b| b == b';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };
        let entity = &rest[1..end];
        let replacement = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match replacement {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Find and decode base64 runs embedded in `text`.
///
/// A run qualifies when it is at least [`BASE64_MIN_RUN`] characters of the
/// base64 alphabet, a multiple of four long, mixes character classes (pure
/// lowercase words never qualify), and decodes to printable text. Returns
/// the text with runs replaced, or `None` when no run qualified.
pub fn decode_embedded_base64(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut i = 0;
    let mut segment_start = 0;
    let mut decoded_any = false;

    // Runs are pure ASCII, so the slice boundaries below are always valid
    // UTF-8 boundaries.
    while i < bytes.len() {
        if is_base64_char(bytes[i]) {
            let start = i;
            while i < bytes.len() && is_base64_char(bytes[i]) {
                i += 1;
            }
            if let Some(decoded) = try_decode_base64_run(&text[start..i]) {
                out.push_str(&text[segment_start..start]);
                out.push_str(&decoded);
                segment_start = i;
                decoded_any = true;
            }
        } else {
            i += 1;
        }
    }

    if decoded_any {
        out.push_str(&text[segment_start..]);
        Some(out)
    } else {
        None
    }
}

fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

fn try_decode_base64_run(run: &str) -> Option<String> {
    if run.len() < BASE64_MIN_RUN || run.len() % 4 != 0 {
        return None;
    }
    // Pure lowercase or pure uppercase runs are almost always prose.
    let has_upper = run.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = run.bytes().any(|b| b.is_ascii_lowercase());
    let has_digit = run.bytes().any(|b| b.is_ascii_digit() || b == b'+' || b == b'/');
    if !(has_upper && has_lower || has_digit && (has_upper || has_lower)) {
        return None;
    }
    let decoded = BASE64.decode(run).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    is_mostly_printable(&decoded).then_some(decoded)
}

fn decode_embedded_hex(text: &str) -> Option<String> {
    let (start, len) = find_hex_run(text)?;
    let run = &text[start..start + len];
    let mut decoded = Vec::with_capacity(len / 2);
    for pair in run.as_bytes().chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        decoded.push((hi * 16 + lo) as u8);
    }
    let decoded = String::from_utf8(decoded).ok()?;
    if !is_mostly_printable(&decoded) {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push_str(&decoded);
    out.push_str(&text[start + len..]);
    Some(out)
}

fn find_hex_run(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_hexdigit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                i += 1;
            }
            let len = i - start;
            // Odd-length runs and short runs are prose or identifiers; a
            // qualifying run must also mix digits and letters.
            let run = &bytes[start..i];
            let has_digit = run.iter().any(|b| b.is_ascii_digit());
            let has_alpha = run.iter().any(|b| b.is_ascii_alphabetic());
            if len >= HEX_MIN_RUN && len % 2 == 0 && has_digit && has_alpha {
                return Some((start, len));
            }
        } else {
            i += 1;
        }
    }
    None
}

fn is_mostly_printable(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable * 10 >= text.chars().count() * 9 && text.chars().any(|c| c.is_alphabetic())
}

/// Apply rot13 (self-inverse).
pub fn rot13(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a' + 13) % 26) + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A' + 13) % 26) + b'A') as char,
            c => c,
        })
        .collect()
}

const ROT13_MARKERS: &[&str] = &["ignore", "instructions", "system", "prompt", "disregard"];

fn looks_rot13(text: &str) -> bool {
    let decoded = rot13(text).to_lowercase();
    let original = text.to_lowercase();
    ROT13_MARKERS
        .iter()
        .any(|m| decoded.contains(m) && !original.contains(m))
}

/// Map the common leetspeak substitutions back to letters.
pub fn deleet(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'i',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            '@' => 'a',
            '$' => 's',
            c => c,
        })
        .collect()
}

fn looks_leetspeak(text: &str) -> bool {
    // Count substitution characters that sit adjacent to letters; two or
    // more inside words is a strong leet signal ("1gn0re").
    let bytes = text.as_bytes();
    let mut hits = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let is_sub = matches!(b, b'0' | b'1' | b'3' | b'4' | b'5' | b'7' | b'@' | b'$');
        if !is_sub {
            continue;
        }
        let prev_alpha = i > 0 && bytes[i - 1].is_ascii_alphabetic();
        let next_alpha = i + 1 < bytes.len() && bytes[i + 1].is_ascii_alphabetic();
        if prev_alpha && next_alpha {
            hits += 1;
        }
    }
    hits >= 2
}
