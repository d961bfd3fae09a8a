//! URI grammar and internal namespace naming, per `spec.md` §6.

use crate::error::{Error, Result};
use std::fmt;

/// Prefix reserved for the adapter's own namespaces within a device.
pub const RESERVED_PREFIX: &str = "WiredTiger.";

/// Name of the process-wide transaction namespace.
pub const TXN_NAMESPACE: &str = "WiredTiger.txn";

/// A parsed `scheme:device/object` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: String,
    device: String,
    object: String,
}

impl Uri {
    /// Parse and validate a URI string.
    ///
    /// Rejects: missing `:`, missing `/`, an empty device or object name, a
    /// leading slash in the device/object portion, and an object name that
    /// collides with the adapter's reserved `WiredTiger.` prefix.
    pub fn parse(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::invalid_argument(format!("malformed URI: {s}")))?;

        if rest.starts_with('/') {
            return Err(Error::invalid_argument(format!(
                "URI must not have a leading slash: {s}"
            )));
        }

        let (device, object) = rest
            .split_once('/')
            .ok_or_else(|| Error::invalid_argument(format!("malformed URI: {s}")))?;

        if scheme.is_empty() || device.is_empty() || object.is_empty() {
            return Err(Error::invalid_argument(format!("malformed URI: {s}")));
        }

        if object.starts_with(RESERVED_PREFIX) {
            return Err(Error::invalid_argument(format!(
                "object name '{object}' collides with the reserved '{RESERVED_PREFIX}' prefix"
            )));
        }

        Ok(Uri {
            scheme: scheme.to_string(),
            device: device.to_string(),
            object: object.to_string(),
        })
    }

    /// The `scheme` component.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The `device` component — must match a configured Device name.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// The `object` component.
    pub fn object(&self) -> &str {
        &self.object
    }

    /// The primary namespace backing this object: `WiredTiger.<object>`.
    pub fn primary_namespace(&self) -> String {
        format!("{RESERVED_PREFIX}{}", self.object)
    }

    /// The cache namespace backing this object: `WiredTiger.<object>.cache`.
    pub fn cache_namespace(&self) -> String {
        format!("{RESERVED_PREFIX}{}.cache", self.object)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.scheme, self.device, self.object)
    }
}
