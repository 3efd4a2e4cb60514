//! Header block parsing for the mbox index: unfolding, RFC 2047
//! encoded-words and lenient date parsing.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::index::query::strip_angle_brackets;
use crate::render::charset;

/// Base64 for encoded-words: padding is frequently missing in the wild.
const ENCODED_WORD_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One message in the persisted header index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Byte offset of the `From ` line.
    pub offset: u64,
    /// Length in bytes including the `From ` line.
    pub length: u64,
    /// Position in the file (0-based).
    pub sequence: u64,
    /// Message-ID without angle brackets, synthesized when absent.
    pub message_id: String,
    /// Assigned by threading after the scan.
    pub thread_id: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    /// `Date:` exactly as sent.
    pub date_raw: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    /// `X-Gmail-Labels`, split on commas.
    pub labels: Vec<String>,
}

impl IndexEntry {
    /// Decoded value of an indexed header.
    pub fn header(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "subject" => self.subject.clone(),
            "from" => self.from.clone(),
            "to" => self.to.clone(),
            "cc" => self.cc.clone(),
            "date" => self.date_raw.clone(),
            "message-id" => Some(self.message_id.clone()),
            "in-reply-to" => self.in_reply_to.clone(),
            _ => None,
        }
    }
}

/// Build an [`IndexEntry`] from a raw header block.
pub fn parse_entry(raw_headers: &[u8], offset: u64, length: u64, sequence: u64) -> IndexEntry {
    let text = decode_header_bytes(raw_headers);
    let headers = unfold_headers(&text);
    let decoded = |name: &str| {
        get_header(&headers, name)
            .map(|value| decode_encoded_words(&value))
            .filter(|value| !value.is_empty())
    };

    let message_id = get_header(&headers, "message-id")
        .map(|value| strip_angle_brackets(&extract_angle_bracket(&value)).to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| synthesize_id(raw_headers, offset));

    let date_raw = get_header(&headers, "date");
    let date = date_raw.as_deref().and_then(parse_date);

    let labels = decoded("x-gmail-labels")
        .map(|value| {
            value
                .split(',')
                .map(|label| label.trim().to_string())
                .filter(|label| !label.is_empty())
                .collect()
        })
        .unwrap_or_default();

    IndexEntry {
        offset,
        length,
        sequence,
        message_id,
        thread_id: String::new(),
        in_reply_to: get_header(&headers, "in-reply-to")
            .map(|value| strip_angle_brackets(&extract_angle_bracket(&value)).to_string())
            .filter(|id| !id.is_empty()),
        references: get_header(&headers, "references")
            .map(|value| extract_all_angle_brackets(&value))
            .unwrap_or_default(),
        date,
        date_raw,
        subject: decoded("subject"),
        from: decoded("from"),
        to: decoded("to"),
        cc: decoded("cc"),
        labels,
    }
}

/// Stable id for messages without a `Message-ID`.
fn synthesize_id(raw_headers: &[u8], offset: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(offset.to_le_bytes());
    hasher.update(raw_headers);
    let digest = hasher.finalize();
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{hex}@tagview.invalid")
}

/// UTF-8 first, then Windows-1252, which accepts every byte.
fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Join continuation lines. Returns `(lowercase_name, raw_value)` pairs.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            result.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    result
}

fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Decode RFC 2047 encoded-words; undecodable words are kept verbatim.
///
/// `=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=` → `Hola mundo`
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2).
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match decode_one_word(after_start) {
            Some((text, consumed)) => {
                result.push_str(&text);
                remaining = &after_start[consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=`, returning the text and bytes consumed.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let (label, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let encoded = &rest[..end];
    let consumed = label.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding {
        "B" | "b" => ENCODED_WORD_B64.decode(encoded.trim()).ok()?,
        "Q" | "q" => decode_q_encoding(encoded),
        _ => return None,
    };

    // RFC 2231 language suffix: `utf-8*en`.
    let label = label.split('*').next().unwrap_or(label);
    Some((charset::decode(&bytes, Some(label)), consumed))
}

/// Q-encoding: `_` is a space, `=XX` is a byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// First `<...>` token, or the trimmed input when there is none.
fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(len) = trimmed[start..].find('>') {
            return trimmed[start..=start + len].to_string();
        }
    }
    trimmed.to_string()
}

/// Every `<...>` token, brackets removed (for `References`).
fn extract_all_angle_brackets(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut remaining = s;
    while let Some(start) = remaining.find('<') {
        let Some(len) = remaining[start..].find('>') else {
            break;
        };
        let id = remaining[start + 1..start + len].trim();
        if !id.is_empty() {
            result.push(id.to_string());
        }
        remaining = &remaining[start + len + 1..];
    }
    result
}

/// Parse a `Date:` value. RFC 2822 and RFC 3339 first, then common broken
/// variants, then `mail-parser` as a last resort.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    const FORMATS: [&str; 6] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];

    let candidate = replace_named_tz(strip_day_of_week(trimmed));
    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    debug!(date = trimmed, "Could not parse date");
    None
}

fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    let wrapped = format!("Date: {input}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(wrapped.as_bytes())?;
    let rfc3339 = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&rfc3339)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `"Thu, 1 Feb ..."` → `"1 Feb ..."`.
fn strip_day_of_week(s: &str) -> &str {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    DAYS.iter()
        .find_map(|day| s.strip_prefix(day))
        .map(|rest| rest.trim_start_matches(',').trim_start())
        .unwrap_or(s)
}

/// Replace a trailing timezone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    // Longer names first so "CEST" is not read as "EST".
    const ZONES: [(&str, &str); 13] = [
        ("CEST", "+0200"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use chrono::Datelike;

    use super::*;

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
        // Missing padding.
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYQ?="), "Hola");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
        assert_eq!(decode_encoded_words("=?utf-8?q?a_b?="), "a b");
    }

    #[test]
    fn test_adjacent_encoded_words_join() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
        assert_eq!(
            decode_encoded_words("Re: =?UTF-8?Q?caf=C3=A9?= time"),
            "Re: café time"
        );
    }

    #[test]
    fn test_broken_encoded_word_is_kept() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
        assert_eq!(decode_encoded_words("50% =? off"), "50% =? off");
    }

    #[test]
    fn test_unfold_headers() {
        let headers = unfold_headers("Subject: a long\n  subject\nFrom: x@y\n");
        assert_eq!(
            headers,
            vec![
                ("subject".to_string(), "a long subject".to_string()),
                ("from".to_string(), "x@y".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_entry() {
        let raw = b"Message-ID: <b@example.com>\n\
In-Reply-To: <a@example.com>\n\
References: <root@example.com>\n <a@example.com>\n\
Subject: =?UTF-8?Q?Re:_caf=C3=A9?=\n\
From: Bob <bob@example.com>\n\
Date: Tue, 2 Jan 2024 10:00:00 +0000\n\
X-Gmail-Labels: Inbox,Important, Work\n";
        let entry = parse_entry(raw, 10, 200, 3);
        assert_eq!(entry.message_id, "b@example.com");
        assert_eq!(entry.in_reply_to.as_deref(), Some("a@example.com"));
        assert_eq!(entry.references, ["root@example.com", "a@example.com"]);
        assert_eq!(entry.subject.as_deref(), Some("Re: café"));
        assert_eq!(entry.header("FROM").as_deref(), Some("Bob <bob@example.com>"));
        assert_eq!(entry.labels, ["Inbox", "Important", "Work"]);
        assert_eq!(entry.date.map(|d| d.day()), Some(2));
        assert!(entry.thread_id.is_empty());
    }

    #[test]
    fn test_missing_message_id_is_synthesized() {
        let a = parse_entry(b"Subject: x\n", 0, 10, 0);
        let b = parse_entry(b"Subject: x\n", 10, 10, 1);
        assert!(a.message_id.ends_with("@tagview.invalid"));
        assert_ne!(a.message_id, b.message_id);
        assert_eq!(a.message_id, parse_entry(b"Subject: x\n", 0, 10, 0).message_id);
    }

    #[test]
    fn test_latin1_header_bytes() {
        let entry = parse_entry(b"Subject: Gr\xfc\xdfe\n", 0, 1, 0);
        assert_eq!(entry.subject.as_deref(), Some("Grüße"));
    }

    #[test]
    fn test_parse_date_variants() {
        assert!(parse_date("Thu, 01 Feb 2024 10:00:00 +0000").is_some());
        assert!(parse_date("2024-02-01T10:00:00Z").is_some());
        assert!(parse_date("Thu 01 Feb 2024 10:00:00 PST").is_some());
        assert!(parse_date("2024-02-01 10:00:00").is_some());
        assert!(parse_date("").is_none());
        assert!(parse_date("   ").is_none());
    }

    #[test]
    fn test_named_timezones() {
        assert_eq!(replace_named_tz("10:00:00 CEST"), "10:00:00 +0200");
        assert_eq!(replace_named_tz("10:00:00 EST"), "10:00:00 -0500");
        assert_eq!(replace_named_tz("10:00:00 +0100"), "10:00:00 +0100");
    }
}
