//! Key/value format kinds and the persisted per-object metadata string.
//!
//! Format strings are the host's WiredTiger-style format language; this
//! adapter only needs to distinguish record-number keys from byte-string
//! keys, and bitfield values from everything else — key packing itself is
//! delegated to the host per `spec.md` §1.

use crate::error::{Error, Result};
use std::fmt;

/// The major/minor version this adapter writes and expects to read back.
pub const METADATA_MAJOR: u32 = 1;
pub const METADATA_MINOR: u32 = 0;

/// Key format kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// Arbitrary byte-string keys (the common case, format `u`/`S`/etc.).
    ByteString,
    /// Record-number keys (format `r`), packed by the host.
    RecordNumber,
}

impl KeyFormat {
    /// Parse a WiredTiger-style format string into a [`KeyFormat`] kind.
    pub fn from_format_str(s: &str) -> Self {
        if s == "r" {
            KeyFormat::RecordNumber
        } else {
            KeyFormat::ByteString
        }
    }

    fn as_format_str(&self) -> &'static str {
        match self {
            KeyFormat::RecordNumber => "r",
            KeyFormat::ByteString => "u",
        }
    }
}

/// Value format: the raw format string plus whether it describes a
/// single-bit-field value (format `<n>t`), which changes `remove` semantics
/// per `spec.md` §4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFormat {
    raw: String,
    bitfield: bool,
}

impl ValueFormat {
    /// Parse a value format string, detecting the bitfield convention.
    pub fn parse(raw: &str) -> Self {
        let bitfield = raw
            .strip_suffix('t')
            .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false);
        ValueFormat {
            raw: raw.to_string(),
            bitfield,
        }
    }

    /// The raw format string, as persisted.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if `remove` must be rewritten as `update` with a zero byte.
    pub fn is_bitfield(&self) -> bool {
        self.bitfield
    }
}

/// The metadata string persisted into the host's metadata catalog for each
/// object: `version=(major=1,minor=0),key_format=<fmt>,value_format=<fmt>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    major: u32,
    minor: u32,
    key_format: String,
    value_format: String,
}

impl ObjectMetadata {
    /// Build metadata for a freshly created object, stamped with the
    /// adapter's current format version.
    pub fn new(key_format: impl Into<String>, value_format: impl Into<String>) -> Self {
        ObjectMetadata {
            major: METADATA_MAJOR,
            minor: METADATA_MINOR,
            key_format: key_format.into(),
            value_format: value_format.into(),
        }
    }

    /// Parsed key format kind.
    pub fn key_format(&self) -> KeyFormat {
        KeyFormat::from_format_str(&self.key_format)
    }

    /// Parsed value format.
    pub fn value_format(&self) -> ValueFormat {
        ValueFormat::parse(&self.value_format)
    }

    /// Parse a persisted metadata string, rejecting a major/minor mismatch
    /// with what this adapter writes — "refuse mismatch" per `spec.md` §6.
    pub fn parse(s: &str) -> Result<Self> {
        let mut major = None;
        let mut minor = None;
        let mut key_format = None;
        let mut value_format = None;

        let inner = s
            .trim()
            .strip_prefix("version=(")
            .and_then(|rest| rest.split_once(')'))
            .ok_or_else(|| Error::invalid_argument("malformed metadata: missing version tuple"))?;
        for part in inner.0.split(',') {
            let (k, v) = part
                .split_once('=')
                .ok_or_else(|| Error::invalid_argument("malformed metadata version tuple"))?;
            match k {
                "major" => major = v.parse::<u32>().ok(),
                "minor" => minor = v.parse::<u32>().ok(),
                _ => return Err(Error::invalid_argument(format!("unknown version field {k}"))),
            }
        }
        let tail = inner.1.trim_start_matches(',');
        for part in tail.split(',') {
            if part.is_empty() {
                continue;
            }
            let (k, v) = part
                .split_once('=')
                .ok_or_else(|| Error::invalid_argument("malformed metadata field"))?;
            match k {
                "key_format" => key_format = Some(v.to_string()),
                "value_format" => value_format = Some(v.to_string()),
                other => return Err(Error::invalid_argument(format!("unknown metadata field {other}"))),
            }
        }

        let major = major.ok_or_else(|| Error::invalid_argument("metadata missing major version"))?;
        let minor = minor.ok_or_else(|| Error::invalid_argument("metadata missing minor version"))?;
        if major != METADATA_MAJOR || minor != METADATA_MINOR {
            return Err(Error::invalid_argument(format!(
                "incompatible metadata version {major}.{minor}, expected {METADATA_MAJOR}.{METADATA_MINOR}"
            )));
        }

        Ok(ObjectMetadata {
            major,
            minor,
            key_format: key_format.ok_or_else(|| Error::invalid_argument("metadata missing key_format"))?,
            value_format: value_format
                .ok_or_else(|| Error::invalid_argument("metadata missing value_format"))?,
        })
    }
}

impl fmt::Display for ObjectMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version=(major={},minor={}),key_format={},value_format={}",
            self.major, self.minor, self.key_format, self.value_format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let meta = ObjectMetadata::new("u", "u");
        let s = meta.to_string();
        let parsed = ObjectMetadata::parse(&s).unwrap();
        assert_eq!(meta, parsed);
    }

    #[test]
    fn rejects_version_mismatch() {
        let bad = "version=(major=2,minor=0),key_format=u,value_format=u";
        assert!(ObjectMetadata::parse(bad).is_err());
    }

    #[test]
    fn rejects_unknown_field() {
        let bad = "version=(major=1,minor=0),key_format=u,bogus=1";
        assert!(ObjectMetadata::parse(bad).is_err());
    }

    #[test]
    fn record_number_key_format() {
        let meta = ObjectMetadata::new("r", "u");
        assert_eq!(meta.key_format(), KeyFormat::RecordNumber);
        assert_eq!(KeyFormat::RecordNumber.as_format_str(), "r");
    }

    #[test]
    fn bitfield_value_format_detection() {
        assert!(ValueFormat::parse("3t").is_bitfield());
        assert!(!ValueFormat::parse("u").is_bitfield());
        assert!(!ValueFormat::parse("t").is_bitfield());
    }
}
