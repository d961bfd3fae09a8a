//! Parsing for the two string-typed configuration surfaces in `spec.md` §6:
//! device-open configuration and cursor-open configuration.
//!
//! This is *not* a general-purpose configuration engine — the host's own
//! configuration parsing stays out of scope per `spec.md` §1. It is just
//! enough of a `key=value[,key=value]*` reader, with WiredTiger-style
//! parenthesized lists for values that themselves contain commas, to cover
//! the specific keys this adapter recognizes.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Split a `key=value,key=(a,b,c),...` string into a map, respecting one
/// level of parenthesized grouping in values.
fn tokenize(s: &str) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    let mut rest = s.trim();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| Error::invalid_argument(format!("malformed config: {s}")))?;
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];

        let (value, remainder) = if rest.starts_with('(') {
            let close = rest
                .find(')')
                .ok_or_else(|| Error::invalid_argument(format!("unclosed '(' in config: {s}")))?;
            (rest[1..close].to_string(), rest[close + 1..].trim_start_matches(','))
        } else {
            match rest.find(',') {
                Some(comma) => (rest[..comma].to_string(), &rest[comma + 1..]),
                None => (rest.to_string(), ""),
            }
        };

        if key.is_empty() {
            return Err(Error::invalid_argument(format!("malformed config: {s}")));
        }
        out.insert(key, value);
        rest = remainder.trim();
    }
    Ok(out)
}

fn parse_bool(v: &str) -> Result<bool> {
    match v {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::invalid_argument(format!("not a boolean: {other}"))),
    }
}

fn parse_u64(v: &str) -> Result<u64> {
    v.parse()
        .map_err(|_| Error::invalid_argument(format!("not a number: {v}")))
}

/// Device-open configuration, per `spec.md` §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub devices: Vec<String>,
    pub parallelism: Option<u64>,
    pub granularity: Option<u64>,
    pub avg_key_len: Option<u64>,
    pub avg_val_len: Option<u64>,
    pub write_bufs: Option<u64>,
    pub read_bufs: Option<u64>,
    pub commit_timeout: Option<Duration>,
    pub reclaim_threshold: Option<u64>,
    pub reclaim_period: Option<Duration>,
    pub open_debug: bool,
    pub open_truncate: bool,
}

impl DeviceConfig {
    /// Parse a device-open configuration string, rejecting unknown keys.
    pub fn parse(s: &str) -> Result<Self> {
        let map = tokenize(s)?;
        let mut cfg = DeviceConfig {
            devices: Vec::new(),
            parallelism: None,
            granularity: None,
            avg_key_len: None,
            avg_val_len: None,
            write_bufs: None,
            read_bufs: None,
            commit_timeout: None,
            reclaim_threshold: None,
            reclaim_period: None,
            open_debug: false,
            open_truncate: false,
        };

        for (key, value) in map {
            match key.as_str() {
                "kvs_devices" => {
                    cfg.devices = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
                "kvs_parallelism" => cfg.parallelism = Some(parse_u64(&value)?),
                "kvs_granularity" => cfg.granularity = Some(parse_u64(&value)?),
                "kvs_avg_key_len" => cfg.avg_key_len = Some(parse_u64(&value)?),
                "kvs_avg_val_len" => cfg.avg_val_len = Some(parse_u64(&value)?),
                "kvs_write_bufs" => cfg.write_bufs = Some(parse_u64(&value)?),
                "kvs_read_bufs" => cfg.read_bufs = Some(parse_u64(&value)?),
                "kvs_commit_timeout" => cfg.commit_timeout = Some(Duration::from_millis(parse_u64(&value)?)),
                "kvs_reclaim_threshold" => cfg.reclaim_threshold = Some(parse_u64(&value)?),
                "kvs_reclaim_period" => cfg.reclaim_period = Some(Duration::from_secs(parse_u64(&value)?)),
                "kvs_open_o_debug" => cfg.open_debug = parse_bool(&value)?,
                "kvs_open_o_truncate" => cfg.open_truncate = parse_bool(&value)?,
                other => {
                    return Err(Error::invalid_argument(format!(
                        "unknown device configuration key: {other}"
                    )))
                }
            }
        }

        Ok(cfg)
    }
}

/// Cursor-open configuration, per `spec.md` §6.
///
/// `collator` is accepted and stored but not consulted by the Cursor
/// Engine's merged traversal (`spec.md` §4.3 step 4): key order there comes
/// straight from `KvDevice::next`/`prev`, and the device trait has no hook
/// for a named collation, so plugging in a non-default collator would
/// require the device driver itself to honor it. See `DESIGN.md`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CursorConfig {
    pub append: bool,
    pub overwrite: bool,
    pub collator: Option<String>,
}

impl CursorConfig {
    /// Parse a cursor-open configuration string, rejecting unknown keys.
    pub fn parse(s: &str) -> Result<Self> {
        let map = tokenize(s)?;
        let mut cfg = CursorConfig::default();
        for (key, value) in map {
            match key.as_str() {
                "append" => cfg.append = parse_bool(&value)?,
                "overwrite" => cfg.overwrite = parse_bool(&value)?,
                "collator" => cfg.collator = Some(value),
                other => {
                    return Err(Error::invalid_argument(format!(
                        "unknown cursor configuration key: {other}"
                    )))
                }
            }
        }
        Ok(cfg)
    }
}
