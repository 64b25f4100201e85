//! # Input Sanitiser
//!
//! Normalises payloads before pattern evaluation: trims, strips control
//! characters, unescapes HTML entities, URL-decodes and base64-decodes,
//! peeling nested encodings up to a configurable depth.
//!
//! The sanitiser never fails a request: anything it cannot decode is left
//! as-is, and the pipeline evaluates both the original and the sanitised
//! form so patterns bound to either representation still hit.
//!
//! ## What Gets Removed
//!
//! - C0/C1 control characters (except newline, carriage return, tab)
//! - Zero-width characters and directional overrides (text spoofing)
//! - Byte order mark

use serde::{Deserialize, Serialize};

use crate::encoding;

/// Maximum payload size the sanitiser will touch (10 MB).
///
/// Larger payloads are returned unmodified; the rule engine can still
/// reject them via `size-gt` conditions.
const MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024;

/// Sanitiser configuration.
///
/// Each flag enables one normalisation pass. Defaults are conservative:
/// structural cleanup is on, decoding passes are on (they are what defeats
/// encoding evasion), lowercase folding is off because the matchers fold
/// case themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Trim leading/trailing whitespace.
    pub trim: bool,
    /// Collapse runs of whitespace into single spaces.
    pub normalize_whitespace: bool,
    /// Strip control characters and invisible Unicode.
    pub strip_control: bool,
    /// Decode HTML entities (`&lt;`, `&#105;`, ...).
    pub html_unescape: bool,
    /// Decode percent-encoding.
    pub url_decode: bool,
    /// Decode base64 runs embedded in the payload.
    pub decode_base64: bool,
    /// Fold to lowercase.
    pub lowercase: bool,
    /// Strip HTML/XML tags.
    pub strip_tags: bool,
    /// Maximum number of nested decoding layers to peel.
    pub max_depth: u32,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            trim: true,
            normalize_whitespace: false,
            strip_control: true,
            html_unescape: true,
            url_decode: true,
            decode_base64: true,
            lowercase: false,
            strip_tags: false,
            max_depth: 3,
        }
    }
}

/// Outcome of a sanitisation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// The normalised text.
    pub text: String,
    /// Number of encoding layers peeled (0 = nothing was encoded).
    pub layers_decoded: u32,
}

/// Run the configured normalisation passes over `input`.
///
/// Decoding passes repeat until a fixed point or `max_depth` layers,
/// whichever comes first, so `base64(url(payload))` still surfaces the
/// plaintext.
pub fn sanitize(config: &SanitizerConfig, input: &str) -> Sanitized {
    if input.len() > MAX_CONTENT_SIZE {
        return Sanitized {
            text: input.to_string(),
            layers_decoded: 0,
        };
    }

    let mut text = input.to_string();

    if config.strip_control {
        text = strip_control_chars(&text);
    }
    if config.strip_tags {
        text = strip_html_tags(&text);
    }

    let mut layers = 0u32;
    for _ in 0..config.max_depth {
        let mut changed = false;

        if config.html_unescape {
            let decoded = encoding::html_unescape(&text);
            if decoded != text {
                text = decoded;
                changed = true;
            }
        }
        if config.url_decode && encoding::looks_url_encoded(&text) {
            let decoded = encoding::url_decode(&text);
            if decoded != text {
                text = decoded;
                changed = true;
            }
        }
        if config.decode_base64 {
            if let Some(decoded) = encoding::decode_embedded_base64(&text) {
                text = decoded;
                changed = true;
            }
        }

        if changed {
            layers += 1;
        } else {
            break;
        }
    }

    if config.normalize_whitespace {
        text = normalize_whitespace(&text);
    }
    if config.trim {
        text = text.trim().to_string();
    }
    if config.lowercase {
        text = text.to_lowercase();
    }

    Sanitized {
        text,
        layers_decoded: layers,
    }
}

/// Strip control characters and invisible Unicode while preserving
/// printable content and standard whitespace.
pub fn strip_control_chars(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\n' | '\r' | '\t' => output.push(c),
            // Zero-width characters and joiners.
            '\u{200B}'..='\u{200F}' => {}
            // Directional overrides (LRE, RLE, PDF, LRO, RLO).
            '\u{202A}'..='\u{202E}' => {}
            // Word joiners and invisible operators.
            '\u{2060}'..='\u{2064}' => {}
            // Byte order mark.
            '\u{FEFF}' => {}
            c if c.is_control() => {}
            c => output.push(c),
        }
    }
    output
}

/// Collapse whitespace runs into single spaces.
pub fn normalize_whitespace(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut in_ws = false;
    for c in input.chars() {
        if c.is_whitespace() {
            if !in_ws {
                output.push(' ');
            }
            in_ws = true;
        } else {
            output.push(c);
            in_ws = false;
        }
    }
    output
}

/// Remove HTML/XML tags, keeping the text between them.
pub fn strip_html_tags(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => output.push(c),
            _ => {}
        }
    }
    output
}
