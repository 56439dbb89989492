//! Storage region start keys.
//!
//! Region keys reach us in three shapes depending on server generation:
//!
//! - raw hex of a memcomparable-encoded record key (`t{id}_r{handle}`)
//! - the text of `tidb_decode_key`, e.g. `tableID=51, _tidb_rowid=960001`
//! - the `SHOW ... REGIONS` rendering, e.g. `t_121_r_10001`

use crate::error::{DumpError, Result};

const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xFF;
const ENC_PAD: u8 = 0x00;

const TABLE_PREFIX: u8 = b't';
const RECORD_PREFIX_SEP: &[u8] = b"_r";
const SIGN_MASK: u64 = 1 << 63;

const DECODED_TABLE_ID: &str = "tableID=";
const DECODED_ROW_ID: &str = "_tidb_rowid=";

/// Table and handle carried by a region start key.
///
/// `handle` is `None` for table sentinels and index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionKey {
    pub table_id: i64,
    pub handle: Option<i64>,
}

/// Undo memcomparable byte encoding.
///
/// The input is a sequence of 9-byte groups: 8 data bytes followed by a marker.
/// `0xFF` marks a full group; otherwise `0xFF - marker` trailing bytes of the
/// group are zero padding and the group ends the value.
pub fn decode_memcomparable(mut data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / (ENC_GROUP_SIZE + 1) * ENC_GROUP_SIZE);
    loop {
        if data.len() < ENC_GROUP_SIZE + 1 {
            return Err(DumpError::UnexpectedResult(
                "insufficient bytes to decode memcomparable value".to_string(),
            ));
        }
        let (group, rest) = data.split_at(ENC_GROUP_SIZE + 1);
        let marker = group[ENC_GROUP_SIZE];
        let pad = (ENC_MARKER - marker) as usize;
        if pad > ENC_GROUP_SIZE {
            return Err(DumpError::UnexpectedResult(format!(
                "invalid memcomparable marker {:#04x}",
                marker
            )));
        }
        let real = ENC_GROUP_SIZE - pad;
        out.extend_from_slice(&group[..real]);
        data = rest;

        if pad != 0 {
            if group[real..ENC_GROUP_SIZE].iter().any(|&b| b != ENC_PAD) {
                return Err(DumpError::UnexpectedResult(
                    "invalid memcomparable padding".to_string(),
                ));
            }
            return Ok(out);
        }
    }
}

fn decode_comparable_i64(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    Some((u64::from_be_bytes(raw) ^ SIGN_MASK) as i64)
}

/// Decode a hex region start key into its table ID and row handle.
///
/// Returns `Ok(None)` for keys outside the table key space (empty keys, meta
/// keys) and for truncated keys.
pub fn decode_region_start_key(hex_key: &str) -> Result<Option<RegionKey>> {
    if hex_key.is_empty() {
        return Ok(None);
    }
    let raw = hex::decode(hex_key)
        .map_err(|e| DumpError::UnexpectedResult(format!("invalid region key '{}': {}", hex_key, e)))?;
    let key = decode_memcomparable(&raw)?;

    if key.first() != Some(&TABLE_PREFIX) {
        return Ok(None);
    }
    let Some(table_id) = decode_comparable_i64(&key[1..]) else {
        return Ok(None);
    };
    let rest = &key[1 + 8..];
    let handle = match rest.strip_prefix(RECORD_PREFIX_SEP) {
        Some(handle) => decode_comparable_i64(handle),
        None => None,
    };
    Ok(Some(RegionKey { table_id, handle }))
}

/// Row handle from a `tidb_decode_key` rendering.
///
/// Returns the handle text and the table ID when present. Keys without a row
/// identity (index keys, undecodable keys echoed back as hex) give `None`.
pub fn parse_decoded_key(decoded: &str) -> Option<(Option<i64>, String)> {
    let pos = decoded.find(DECODED_ROW_ID)?;
    let handle = decoded[pos + DECODED_ROW_ID.len()..]
        .split(',')
        .next()
        .unwrap_or_default()
        .trim();
    if handle.is_empty() {
        return None;
    }
    let table_id = decoded.find(DECODED_TABLE_ID).and_then(|p| {
        decoded[p + DECODED_TABLE_ID.len()..]
            .split(',')
            .next()
            .and_then(|id| id.trim().parse().ok())
    });
    Some((table_id, handle.to_string()))
}

/// Table ID and handle from a `SHOW ... REGIONS` start key.
///
/// Record keys (`t_<id>_r_<handle>`) carry a handle. Table sentinels
/// (`t_<id>_`) and index keys (`t_<id>_i_...`) only carry the table ID.
pub fn parse_show_regions_key(key: &str) -> Option<RegionKey> {
    let rest = key.strip_prefix("t_")?;
    let (id, rest) = rest.split_once('_')?;
    let table_id = id.parse().ok()?;
    let handle = match rest.strip_prefix("r_") {
        Some(handle) => Some(handle.parse().ok()?),
        None => None,
    };
    Some(RegionKey { table_id, handle })
}
