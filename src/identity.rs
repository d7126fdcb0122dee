//! Attachment identity tokens.
//!
//! An attachment is identified by `(receipt timestamp, sender, original filename)`.
//! The identity is encoded into a single token that doubles as the stem of the
//! cache file name:
//!
//! ```text
//! 2024-03-01_18-22-05__YWxpY2VAZXhhbXBsZS5jb20__cGhvdG8uanBn
//! └──── timestamp ────┘  └──── sender ────────┘  └ filename ┘
//! ```
//!
//! Sender and filename are encoded with an unpadded base64 variant whose alphabet is
//! `A-Z a-z 0-9 + -`. It contains no `_`, so the `__` separator never occurs inside a
//! field and the token splits back unambiguously. It contains no `.` or `/` either,
//! so the token is a single path segment and the first `.` of a cache file name
//! always starts the extension.
//!
//! Encoding grows sender and filename by about a third. With the usual 255-byte
//! file name limit, a filename much beyond 150 bytes yields a cache file name the
//! filesystem rejects; such an attachment fails to store on every run.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use mail_attachment_cache::identity;
//!
//! let received = Utc.with_ymd_and_hms(2024, 3, 1, 18, 22, 5).unwrap();
//! let token = identity::encode(&received, "alice@example.com", "photo.jpg");
//! assert!(token.starts_with("2024-03-01_18-22-05__"));
//!
//! let decoded = identity::decode(&token).unwrap();
//! assert_eq!(decoded.filename, "photo.jpg");
//! ```

use crate::error::{Error, Result};
use base64::alphabet::Alphabet;
use base64::engine::{general_purpose, GeneralPurpose};
use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Fixed-width, lexicographically sortable timestamp pattern.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Joins the three encoded fields of a token.
pub const FIELD_SEPARATOR: &str = "__";

const FIELD_ALPHABET: Alphabet =
    match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+-") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("field alphabet must be 64 distinct printable characters"),
    };

const FIELD_ENGINE: GeneralPurpose = GeneralPurpose::new(&FIELD_ALPHABET, general_purpose::NO_PAD);

/// The deduplication key of one logical attachment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentIdentity {
    /// Receipt timestamp, second precision.
    pub received: DateTime<Utc>,
    /// Bare sender address.
    pub sender: String,
    /// Original attachment filename.
    pub filename: String,
}

impl AttachmentIdentity {
    /// Creates an identity, truncating `received` to whole seconds.
    #[must_use]
    pub fn new(received: DateTime<Utc>, sender: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            received: truncate_to_seconds(received),
            sender: sender.into(),
            filename: filename.into(),
        }
    }

    /// Returns the encoded token of this identity.
    #[must_use]
    pub fn token(&self) -> String {
        encode(&self.received, &self.sender, &self.filename)
    }
}

/// Encodes `(received, sender, filename)` into a filesystem-safe token.
///
/// Deterministic, and injective over whole-second timestamps.
#[must_use]
pub fn encode(received: &DateTime<Utc>, sender: &str, filename: &str) -> String {
    [
        format_timestamp(received),
        FIELD_ENGINE.encode(sender.as_bytes()),
        FIELD_ENGINE.encode(filename.as_bytes()),
    ]
    .join(FIELD_SEPARATOR)
}

/// Decodes a token produced by [`encode`].
///
/// # Errors
///
/// Returns [`Error::MalformedToken`] if the token does not have three fields, the
/// timestamp does not match [`TIMESTAMP_FORMAT`], or a field is not valid UTF-8 in
/// the field alphabet.
pub fn decode(token: &str) -> Result<AttachmentIdentity> {
    let malformed = || Error::MalformedToken {
        token: token.to_string(),
    };

    let mut fields = token.splitn(3, FIELD_SEPARATOR);
    let (Some(stamp), Some(sender), Some(filename)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed());
    };

    let received = parse_timestamp(stamp).ok_or_else(malformed)?;
    let sender = decode_field(sender).ok_or_else(malformed)?;
    let filename = decode_field(filename).ok_or_else(malformed)?;

    Ok(AttachmentIdentity {
        received,
        sender,
        filename,
    })
}

/// Formats a timestamp with [`TIMESTAMP_FORMAT`].
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp written by [`format_timestamp`].
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn decode_field(field: &str) -> Option<String> {
    let bytes = FIELD_ENGINE.decode(field).ok()?;
    String::from_utf8(bytes).ok()
}

fn truncate_to_seconds(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.timestamp(), 0).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_encode_is_deterministic() {
        let first = encode(&at(18, 22, 5), "alice@example.com", "photo.jpg");
        let second = encode(&at(18, 22, 5), "alice@example.com", "photo.jpg");
        assert_eq!(first, second);
    }

    #[test]
    fn test_token_layout() {
        let token = encode(&at(18, 22, 5), "a", "b");
        assert!(token.starts_with("2024-03-01_18-22-05__"));
        assert_eq!(token.matches(FIELD_SEPARATOR).count(), 2);
    }

    #[test]
    fn test_token_is_single_path_segment() {
        let token = encode(
            &at(0, 0, 0),
            "weird/\\name <x@y.z>",
            "../../etc/passwd?.jpg\0:*",
        );
        assert!(!token.contains('/'));
        assert!(!token.contains('\\'));
        assert!(!token.contains('.'));
        assert!(!token.contains('\0'));
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || "+-_".contains(c)));
    }

    #[test]
    fn test_distinct_triples_never_collide() {
        // Triples chosen so that naive concatenation would collide
        let triples = [
            (at(1, 0, 0), "a__b", "c"),
            (at(1, 0, 0), "a", "b__c"),
            (at(1, 0, 0), "ab", "c"),
            (at(1, 0, 0), "a", "bc"),
            (at(1, 0, 0), "", "abc"),
            (at(1, 0, 0), "abc", ""),
            (at(1, 0, 1), "a", "bc"),
            (at(1, 0, 0), "A", "bc"),
            (at(1, 0, 0), "a", "bc.JPG"),
            (at(1, 0, 0), "a", "bc.jpg"),
        ];

        let tokens: HashSet<String> = triples
            .iter()
            .map(|(t, s, f)| encode(t, s, f))
            .collect();
        assert_eq!(tokens.len(), triples.len());
    }

    #[test]
    fn test_decode_inverts_encode() {
        for (sender, filename) in [
            ("alice@example.com", "photo.jpg"),
            ("", ""),
            ("x__y", "__"),
            ("bob@example.org", "Grüße aus Köln.png"),
        ] {
            let token = encode(&at(9, 8, 7), sender, filename);
            let identity = decode(&token).unwrap();
            assert_eq!(identity.received, at(9, 8, 7));
            assert_eq!(identity.sender, sender);
            assert_eq!(identity.filename, filename);
        }
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(decode("not-a-token").is_err());
        assert!(decode("2024-03-01_18-22-05__YQ").is_err());
        assert!(decode("yesterday__YQ__Yg").is_err());
        assert!(decode("2024-03-01_18-22-05__!!__Yg").is_err());
    }

    #[test]
    fn test_identity_truncates_subseconds() {
        let precise = at(5, 5, 5) + chrono::Duration::milliseconds(750);
        let identity = AttachmentIdentity::new(precise, "a@b.c", "x.png");
        assert_eq!(identity.received, at(5, 5, 5));
        assert_eq!(identity.token(), encode(&at(5, 5, 5), "a@b.c", "x.png"));
    }

    #[test]
    fn test_tokens_sort_chronologically() {
        let earlier = encode(&at(9, 59, 59), "zzz", "zzz");
        let later = encode(&at(10, 0, 0), "aaa", "aaa");
        assert!(earlier < later);
    }
}
