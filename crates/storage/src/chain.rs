//! Update-Chain Codec (`spec.md` §3, §4.1).
//!
//! The chain is the value stored under a key in the cache namespace: a
//! little-endian `u32` entry count followed by that many entries, each
//! `{ txn_id: native-8B } { marker: 1B } [ { len: u32_LE } { bytes } ]`.
//! Transaction IDs are written in native byte order — this on-disk format
//! is tied to the machine that wrote it (`spec.md` §4.1's endian note; see
//! also `DESIGN.md` for why this repo keeps that limitation rather than
//! silently fixing it).

use byteorder::{ByteOrder, LittleEndian, NativeEndian};
use kvs_core::TxnId;
use std::mem::size_of;

/// Tombstone marker: the entry removed the key.
pub const MARKER_TOMBSTONE: u8 = b'R';
/// Value marker: the entry wrote a value.
pub const MARKER_VALUE: u8 = b' ';

const COUNT_LEN: usize = size_of::<u32>();
const TXN_ID_LEN: usize = size_of::<u64>();
const MARKER_LEN: usize = 1;
const LEN_LEN: usize = size_of::<u32>();

/// A single parsed chain entry. `value` aliases into the buffer that was
/// parsed — callers must not mutate that buffer while entries from it are
/// still live, per `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainEntry<'a> {
    pub txn_id: TxnId,
    pub removed: bool,
    pub value: Option<&'a [u8]>,
}

/// Append one `(txn_id, marker, optional value)` entry to a chain buffer,
/// creating the buffer (with a zero count prefix) if it is empty. Growth is
/// monotonic: existing bytes are never rewritten except the count prefix.
pub fn append_entry(chain: &mut Vec<u8>, txn_id: TxnId, removed: bool, value: Option<&[u8]>) {
    if chain.is_empty() {
        chain.extend_from_slice(&[0u8; COUNT_LEN]);
    }

    let count = LittleEndian::read_u32(&chain[..COUNT_LEN]);
    LittleEndian::write_u32(&mut chain[..COUNT_LEN], count + 1);

    let mut txn_buf = [0u8; TXN_ID_LEN];
    NativeEndian::write_u64(&mut txn_buf, txn_id);
    chain.extend_from_slice(&txn_buf);

    chain.push(if removed { MARKER_TOMBSTONE } else { MARKER_VALUE });

    if !removed {
        let value = value.unwrap_or(&[]);
        let mut len_buf = [0u8; LEN_LEN];
        LittleEndian::write_u32(&mut len_buf, value.len() as u32);
        chain.extend_from_slice(&len_buf);
        chain.extend_from_slice(value);
    }
}

/// Parse a chain buffer into its entries, in append order. An empty buffer
/// parses as an empty chain.
pub fn parse_chain(chain: &[u8]) -> Result<Vec<ChainEntry<'_>>, ChainCodecError> {
    if chain.is_empty() {
        return Ok(Vec::new());
    }
    if chain.len() < COUNT_LEN {
        return Err(ChainCodecError::Truncated);
    }

    let count = LittleEndian::read_u32(&chain[..COUNT_LEN]) as usize;
    let mut entries = Vec::with_capacity(count);
    let mut offset = COUNT_LEN;

    for _ in 0..count {
        if chain.len() < offset + TXN_ID_LEN + MARKER_LEN {
            return Err(ChainCodecError::Truncated);
        }
        let txn_id = NativeEndian::read_u64(&chain[offset..offset + TXN_ID_LEN]);
        offset += TXN_ID_LEN;

        let marker = chain[offset];
        offset += MARKER_LEN;

        let removed = marker == MARKER_TOMBSTONE;
        let value = if removed {
            None
        } else {
            if chain.len() < offset + LEN_LEN {
                return Err(ChainCodecError::Truncated);
            }
            let len = LittleEndian::read_u32(&chain[offset..offset + LEN_LEN]) as usize;
            offset += LEN_LEN;
            if chain.len() < offset + len {
                return Err(ChainCodecError::Truncated);
            }
            let slice = &chain[offset..offset + len];
            offset += len;
            Some(slice)
        };

        entries.push(ChainEntry {
            txn_id,
            removed,
            value,
        });
    }

    Ok(entries)
}

/// Malformed cache value — always indicates device corruption, since the
/// adapter itself only ever produces well-formed chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChainCodecError {
    #[error("truncated update chain")]
    Truncated,
}
