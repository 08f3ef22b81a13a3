//! Byte-level decoding: RFC 2047 encoded words, quoted-printable, and
//! charset conversion.

use base64;
use encoding_rs::Encoding;
use regex::Regex;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"^=\?([!->@-~]+)\?([!->@-~]+)\?([!->@-~]*)\?=$").unwrap();
}

/// Decode `word` if it is, in its entirety, an RFC 2047 encoded word.
///
/// Returns `None` when it is not one or cannot be decoded; the caller
/// must keep the original token in that case.
pub fn decode_encoded_word(word: &str) -> Option<String> {
    let caps = ENCODED_WORD.captures(word)?;
    let charset = caps.get(1).unwrap().as_str();
    let encoding = caps.get(2).unwrap().as_str();
    let mut content = caps.get(3).unwrap().as_str().as_bytes().to_vec();

    let bytes = match encoding {
        "q" | "Q" => {
            // In Q encoding, underscore stands for space regardless of
            // charset.
            for byte in &mut content {
                if *byte == b'_' {
                    *byte = b' ';
                }
            }
            qp_decode(&content)
        }
        "b" | "B" => base64::decode(&content).ok()?,
        _ => return None,
    };
    Some(decode_charset(charset, &bytes)
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned()))
}

/// Decode a whole header value: each encoded word is replaced by its
/// decoded text, and the whitespace between two adjacent encoded words is
/// deleted. Runs of whitespace elsewhere collapse to a single space.
pub fn decode_header_value(value: &str) -> String {
    let mut out = String::new();
    let mut previous_encoded = false;
    for token in value.split_whitespace() {
        match decode_encoded_word(token) {
            Some(decoded) => {
                if !out.is_empty() && !previous_encoded {
                    out.push(' ');
                }
                out.push_str(&decoded);
                previous_encoded = true;
            }
            None => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(token);
                previous_encoded = false;
            }
        }
    }
    out
}

/// Decode quoted-printable content. Never fails: invalid escapes pass
/// through untransformed and soft line breaks are discarded.
pub fn qp_decode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != b'=' {
            out.push(input[i]);
            i += 1;
            continue;
        }
        // Soft line break, DOS or UNIX ending.
        if input.get(i + 1) == Some(&b'\r') && input.get(i + 2) == Some(&b'\n') {
            i += 3;
            continue;
        }
        if input.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }
        let decoded = match (input.get(i + 1), input.get(i + 2)) {
            (Some(&hi), Some(&lo)) => ::std::str::from_utf8(&[hi, lo])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok()),
            _ => None,
        };
        match decoded {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    out
}

/// Decode `bytes` per the named charset, substituting U+FFFD for
/// undecodable sequences. `None` when the charset label is unknown.
pub fn decode_charset(label: &str, bytes: &[u8]) -> Option<String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())?;
    Some(encoding.decode(bytes).0.into_owned())
}
