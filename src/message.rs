//! Pure parsing of raw internet messages into a structured form.
//!
//! Parsing is total and deterministic: malformed input still yields
//! whatever headers and parts can be extracted, and the same bytes always
//! produce the same result. A possibly multipart MIME tree is flattened
//! into a linear sequence of leaf parts in document order; containers are
//! omitted.

use base64;
use regex::Regex;

use decode::{decode_charset, decode_header_value, qp_decode};

/// Envelope and part header names retained by the parser.
pub const MAIL_HEADER_NAMES: [&'static str; 13] = [
    "From",
    "To",
    "Subject",
    "Date",
    "Message-Id",
    "In-Reply-To",
    "References",
    "Reply-To",
    "Received",
    "Mime-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-Disposition",
];

lazy_static! {
    static ref PARAM: Regex =
        Regex::new(r#"(?i)\b([a-z0-9_-]+)\s*=\s*(?:"([^"]*)"|([^\s;]+))"#).unwrap();
}

/// Decoded payload of one body part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartData {
    /// The part declared a charset; the payload decoded as text, with
    /// undecodable sequences replaced.
    Text(String),
    /// No usable charset; the transfer-decoded bytes, as-is.
    Binary(Vec<u8>),
}

/// One leaf content unit of a (possibly multipart) message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyPart {
    /// Recognized headers present on the part, raw undecoded values.
    pub headers: Vec<(String, String)>,
    pub data: PartData,
}

impl BodyPart {
    /// Raw value of a recognized header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Structured form of one retrieved message: the recognized envelope
/// headers that were present (RFC 2047 decoded), plus the body parts.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ParsedMessage {
    pub headers: Vec<(String, String)>,
    pub body: Vec<BodyPart>,
}

impl ParsedMessage {
    /// Decoded value of a recognized envelope header.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Parse raw message bytes. Never fails; structurally invalid input
/// yields whatever can be extracted.
pub fn parse_message(raw: &[u8]) -> ParsedMessage {
    let (raw_headers, body) = split_header_block(raw);

    let mut headers = Vec::new();
    for &name in MAIL_HEADER_NAMES.iter() {
        if let Some(value) = header_value(&raw_headers, name) {
            headers.push((name.to_string(), decode_header_value(value)));
        }
    }

    let mut parts = Vec::new();
    collect_parts(&raw_headers, body, &mut parts);

    ParsedMessage {
        headers: headers,
        body: parts,
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.0.eq_ignore_ascii_case(name))
        .map(|header| header.1.as_str())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Split a message (or part) into its unfolded header fields and its body.
fn split_header_block(raw: &[u8]) -> (Vec<(String, String)>, &[u8]) {
    let crlf = find(raw, b"\r\n\r\n");
    let lf = find(raw, b"\n\n");
    let (end, body_start) = match (crlf, lf) {
        (Some(c), Some(l)) => {
            if c <= l {
                (c, c + 4)
            } else {
                (l, l + 2)
            }
        }
        (Some(c), None) => (c, c + 4),
        (None, Some(l)) => (l, l + 2),
        // No blank line at all: everything is headers.
        (None, None) => (raw.len(), raw.len()),
    };
    (parse_headers(&raw[..end]), &raw[body_start..])
}

fn parse_headers(block: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(block);
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Folded continuation of the previous field.
            if let Some(last) = headers.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim_start());
            }
            continue;
        }
        if let Some(colon) = line.find(':') {
            let name = line[..colon].trim().to_string();
            let value = line[colon + 1..].trim().to_string();
            if !name.is_empty() {
                headers.push((name, value));
            }
        }
    }
    headers
}

/// Media type, boundary, and charset from a part's Content-Type field.
/// An absent field means `text/plain` with no charset.
fn content_type(headers: &[(String, String)]) -> (String, Option<String>, Option<String>) {
    let value = match header_value(headers, "Content-Type") {
        Some(value) => value,
        None => return ("text/plain".to_string(), None, None),
    };
    let media = value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let mut boundary = None;
    let mut charset = None;
    for cap in PARAM.captures_iter(value) {
        let key = cap[1].to_ascii_lowercase();
        let val = cap
            .get(2)
            .or_else(|| cap.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        match key.as_str() {
            "boundary" => boundary = Some(val),
            "charset" => charset = Some(val.to_ascii_lowercase()),
            _ => {}
        }
    }
    (media, boundary, charset)
}

/// Depth-first walk emitting every leaf part with a non-empty payload.
fn collect_parts(headers: &[(String, String)], body: &[u8], out: &mut Vec<BodyPart>) {
    let (media, boundary, charset) = content_type(headers);

    if media.starts_with("multipart/") {
        if let Some(ref boundary) = boundary {
            for chunk in split_multipart(body, boundary) {
                let (sub_headers, sub_body) = split_header_block(chunk);
                collect_parts(&sub_headers, sub_body, out);
            }
            return;
        }
        // A multipart without a boundary falls through as an opaque leaf.
    } else if media == "message/rfc822" {
        let (sub_headers, sub_body) = split_header_block(body);
        collect_parts(&sub_headers, sub_body, out);
        return;
    }

    let payload = decode_transfer_encoding(headers, body);
    if payload.is_empty() {
        return;
    }

    let mut part_headers = Vec::new();
    for &name in MAIL_HEADER_NAMES.iter() {
        if let Some(value) = header_value(headers, name) {
            part_headers.push((name.to_string(), value.to_string()));
        }
    }

    let data = match charset {
        Some(ref label) => match decode_charset(label, &payload) {
            Some(text) => PartData::Text(text),
            None => PartData::Binary(payload),
        },
        None => PartData::Binary(payload),
    };

    out.push(BodyPart {
        headers: part_headers,
        data: data,
    });
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = if line.ends_with(b"\n") {
        &line[..line.len() - 1]
    } else {
        line
    };
    if line.ends_with(b"\r") {
        &line[..line.len() - 1]
    } else {
        line
    }
}

/// The chunks between the boundary delimiter lines, preamble and epilogue
/// excluded. The line terminator preceding a delimiter belongs to the
/// delimiter, not to the chunk.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let open_delimiter = format!("--{}", boundary).into_bytes();
    let close_delimiter = format!("--{}--", boundary).into_bytes();

    let mut chunks: Vec<&[u8]> = Vec::new();
    let mut chunk_start: Option<usize> = None;
    let mut pos = 0;
    while pos < body.len() {
        let rest = &body[pos..];
        let line_len = find(rest, b"\n").map(|i| i + 1).unwrap_or(rest.len());
        let line = trim_line_ending(&rest[..line_len]);
        let is_close = line == &close_delimiter[..];
        let is_open = line == &open_delimiter[..];
        if is_open || is_close {
            if let Some(start) = chunk_start.take() {
                chunks.push(trim_line_ending(&body[start..pos]));
            }
            if is_close {
                return chunks;
            }
            chunk_start = Some(pos + line_len);
        }
        pos += line_len;
    }
    // Tolerate a missing closing delimiter.
    if let Some(start) = chunk_start {
        chunks.push(trim_line_ending(&body[start..]));
    }
    chunks
}

fn decode_transfer_encoding(headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let encoding = header_value(headers, "Content-Transfer-Encoding")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match encoding.as_str() {
        "base64" => {
            let compact: Vec<u8> = body
                .iter()
                .cloned()
                .filter(|byte| !byte.is_ascii_whitespace())
                .collect();
            base64::decode(&compact).unwrap_or_else(|_| body.to_vec())
        }
        "quoted-printable" => qp_decode(body),
        // 7bit, 8bit, binary, and anything unrecognized: identity.
        _ => body.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(lines: &[&str]) -> Vec<u8> {
        lines.join("\r\n").into_bytes()
    }

    #[test]
    fn simple_message_yields_headers_and_one_text_part() {
        let msg = raw(&[
            "From: alice@example.org",
            "To: bob@example.org",
            "Subject: greetings",
            "Content-Type: text/plain; charset=utf-8",
            "X-Unrecognized: dropped",
            "",
            "hello there",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(Some("alice@example.org"), parsed.header("From"));
        assert_eq!(Some("greetings"), parsed.header("Subject"));
        assert_eq!(None, parsed.header("X-Unrecognized"));
        assert_eq!(1, parsed.body.len());
        assert_eq!(
            PartData::Text("hello there".to_string()),
            parsed.body[0].data
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let msg = raw(&[
            "Subject: =?utf-8?B?aMOpbGxv?=",
            "Content-Type: text/plain; charset=utf-8",
            "",
            "body",
        ]);
        assert_eq!(parse_message(&msg), parse_message(&msg));
    }

    #[test]
    fn envelope_headers_are_rfc2047_decoded() {
        let msg = raw(&[
            "From: =?ISO-8859-1?Q?Andr=E9?= <andre@example.org>",
            "Subject: =?utf-8?B?aMOpbGxv?=",
            "",
            "body",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(Some("André <andre@example.org>"), parsed.header("From"));
        assert_eq!(Some("héllo"), parsed.header("Subject"));
    }

    #[test]
    fn multipart_flattens_to_leaf_parts_in_document_order() {
        let msg = raw(&[
            "From: alice@example.org",
            "Mime-Version: 1.0",
            "Content-Type: multipart/mixed; boundary=\"sep\"",
            "",
            "preamble is ignored",
            "--sep",
            "Content-Type: text/plain; charset=utf-8",
            "",
            "first part",
            "--sep",
            "Content-Type: application/octet-stream",
            "Content-Transfer-Encoding: base64",
            "Content-Disposition: attachment; filename=blob.bin",
            "",
            "AAEC/w==",
            "--sep--",
            "epilogue is ignored",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(2, parsed.body.len());

        let text = &parsed.body[0];
        assert_eq!(PartData::Text("first part".to_string()), text.data);
        assert_eq!(
            Some("text/plain; charset=utf-8"),
            text.header("Content-Type")
        );

        let attachment = &parsed.body[1];
        assert_eq!(PartData::Binary(vec![0x00, 0x01, 0x02, 0xff]), attachment.data);
        assert_eq!(
            Some("attachment; filename=blob.bin"),
            attachment.header("Content-Disposition")
        );
        // The multipart container itself is not a part.
        for part in &parsed.body {
            assert_ne!(
                Some("multipart/mixed; boundary=\"sep\""),
                part.header("Content-Type")
            );
        }
    }

    #[test]
    fn part_headers_stay_undecoded() {
        let msg = raw(&[
            "Content-Type: multipart/mixed; boundary=b",
            "",
            "--b",
            "Content-Type: text/plain; charset=utf-8",
            "Content-Disposition: attachment; filename=\"=?utf-8?B?aMOpbGxv?=\"",
            "",
            "x",
            "--b--",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(
            Some("attachment; filename=\"=?utf-8?B?aMOpbGxv?=\""),
            parsed.body[0].header("Content-Disposition")
        );
    }

    #[test]
    fn quoted_printable_part_is_transfer_decoded() {
        let msg = raw(&[
            "Content-Type: text/plain; charset=iso-8859-1",
            "Content-Transfer-Encoding: quoted-printable",
            "",
            "caf=E9 au lait",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(
            PartData::Text("café au lait".to_string()),
            parsed.body[0].data
        );
    }

    #[test]
    fn empty_payloads_are_omitted() {
        let msg = raw(&[
            "Content-Type: multipart/alternative; boundary=b",
            "",
            "--b",
            "Content-Type: text/plain; charset=utf-8",
            "",
            "",
            "--b",
            "Content-Type: text/html; charset=utf-8",
            "",
            "<p>hi</p>",
            "--b--",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(1, parsed.body.len());
        assert_eq!(PartData::Text("<p>hi</p>".to_string()), parsed.body[0].data);
    }

    #[test]
    fn unknown_charset_keeps_raw_bytes() {
        let msg = raw(&[
            "Content-Type: text/plain; charset=x-martian",
            "",
            "raw bytes",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(PartData::Binary(b"raw bytes".to_vec()), parsed.body[0].data);
    }

    #[test]
    fn invalid_charset_bytes_get_a_placeholder() {
        let mut msg = raw(&["Content-Type: text/plain; charset=utf-8", "", ""]);
        msg.extend_from_slice(b"ok \xff bad");
        let parsed = parse_message(&msg);
        assert_eq!(
            PartData::Text("ok \u{fffd} bad".to_string()),
            parsed.body[0].data
        );
    }

    #[test]
    fn folded_headers_are_unfolded() {
        let msg = raw(&[
            "References: <one@example.org>",
            "\t<two@example.org>",
            "",
            "body",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(
            Some("<one@example.org> <two@example.org>"),
            parsed.header("References")
        );
    }

    #[test]
    fn nested_message_parts_are_walked() {
        let msg = raw(&[
            "Content-Type: message/rfc822",
            "",
            "Subject: inner",
            "Content-Type: text/plain; charset=utf-8",
            "",
            "inner body",
        ]);
        let parsed = parse_message(&msg);
        assert_eq!(1, parsed.body.len());
        assert_eq!(PartData::Text("inner body".to_string()), parsed.body[0].data);
        assert_eq!(Some("inner"), parsed.body[0].header("Subject"));
    }

    #[test]
    fn headers_without_a_blank_line_still_parse() {
        let parsed = parse_message(b"Subject: only headers");
        assert_eq!(Some("only headers"), parsed.header("Subject"));
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn garbage_input_yields_an_opaque_part() {
        let parsed = parse_message(b"\xff\xfe not a message\r\n\r\npayload");
        assert!(parsed.headers.is_empty());
        assert_eq!(PartData::Binary(b"payload".to_vec()), parsed.body[0].data);
    }
}
