//! Binary record format for stored cache entries.
//!
//! Layout:
//! - Byte 0: format version
//! - Byte 1: flags (bit 0 tombstoned, bit 1 has provenance)
//! - Bytes 2-9: provenance, microseconds since the epoch (i64, little-endian)
//! - Bytes 10-17: blob checksum (truncated blake3)
//! - Remaining bytes: blob
//!
//! Decoding is strict: a wrong version, short header, bad timestamp or
//! checksum mismatch is reported as [`StoreError::Corrupt`].

use chrono::DateTime;
use sharecache_core::{CacheEntry, StoreError};

/// Current record format version.
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 18;

const FLAG_TOMBSTONED: u8 = 0b01;
const FLAG_PROVENANCE: u8 = 0b10;
const FLAGS_MASK: u8 = FLAG_TOMBSTONED | FLAG_PROVENANCE;

/// Encode an entry for storage.
pub fn encode_entry(entry: &CacheEntry) -> Vec<u8> {
    let mut flags = 0u8;
    if entry.is_tombstoned() {
        flags |= FLAG_TOMBSTONED;
    }
    let micros = match entry.provenance() {
        Some(ts) => {
            flags |= FLAG_PROVENANCE;
            ts.timestamp_micros()
        }
        None => 0,
    };

    let mut out = Vec::with_capacity(HEADER_LEN + entry.blob().len());
    out.push(RECORD_FORMAT_VERSION);
    out.push(flags);
    out.extend_from_slice(&micros.to_le_bytes());
    out.extend_from_slice(&checksum(entry.blob()));
    out.extend_from_slice(entry.blob());
    out
}

/// Decode a stored record.
pub fn decode_entry(raw: &[u8]) -> Result<CacheEntry, StoreError> {
    let flags = check_header(raw)?;

    let micros_bytes: [u8; 8] = raw[2..10]
        .try_into()
        .map_err(|_| corrupt("truncated provenance"))?;
    let provenance = if flags & FLAG_PROVENANCE != 0 {
        let micros = i64::from_le_bytes(micros_bytes);
        Some(
            DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| corrupt("provenance out of range"))?,
        )
    } else {
        None
    };

    let blob = &raw[HEADER_LEN..];
    if raw[10..HEADER_LEN] != checksum(blob) {
        return Err(corrupt("checksum mismatch"));
    }

    Ok(CacheEntry::from_parts(
        blob.to_vec(),
        provenance,
        flags & FLAG_TOMBSTONED != 0,
    ))
}

/// Set the tombstone flag of an encoded record in place.
///
/// Only the header is validated; the blob is left untouched.
pub fn set_tombstone(raw: &mut [u8]) -> Result<(), StoreError> {
    check_header(raw)?;
    raw[1] |= FLAG_TOMBSTONED;
    Ok(())
}

/// Read the tombstone flag and blob length of an encoded record.
pub fn peek(raw: &[u8]) -> Result<(bool, usize), StoreError> {
    let flags = check_header(raw)?;
    Ok((flags & FLAG_TOMBSTONED != 0, raw.len() - HEADER_LEN))
}

fn check_header(raw: &[u8]) -> Result<u8, StoreError> {
    if raw.len() < HEADER_LEN {
        return Err(corrupt("record shorter than header"));
    }
    if raw[0] != RECORD_FORMAT_VERSION {
        return Err(corrupt(&format!(
            "format version {} (expected {})",
            raw[0], RECORD_FORMAT_VERSION
        )));
    }
    let flags = raw[1];
    if flags & !FLAGS_MASK != 0 {
        return Err(corrupt("unknown flag bits"));
    }
    Ok(flags)
}

fn checksum(blob: &[u8]) -> [u8; 8] {
    let hash = blake3::hash(blob);
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.as_bytes()[..8]);
    out
}

fn corrupt(reason: &str) -> StoreError {
    StoreError::Corrupt {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_tracked_entry_survives_encoding() {
        let ts = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        let entry = CacheEntry::new(b"bytecode".to_vec(), Some(ts));
        let decoded = decode_entry(&encode_entry(&entry)).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.provenance(), Some(ts));
    }

    #[test]
    fn test_untracked_empty_blob() {
        let entry = CacheEntry::new(Vec::new(), None);
        let raw = encode_entry(&entry);
        assert_eq!(raw.len(), HEADER_LEN);
        let decoded = decode_entry(&raw).unwrap();
        assert!(decoded.provenance().is_none());
        assert!(decoded.blob().is_empty());
    }

    #[test]
    fn test_set_tombstone_in_place() {
        let mut raw = encode_entry(&CacheEntry::new(b"abc".to_vec(), None));
        assert_eq!(peek(&raw).unwrap(), (false, 3));
        set_tombstone(&mut raw).unwrap();
        assert_eq!(peek(&raw).unwrap(), (true, 3));
        let decoded = decode_entry(&raw).unwrap();
        assert!(decoded.is_tombstoned());
        assert_eq!(decoded.blob(), b"abc");
    }

    #[test]
    fn test_checksum_mismatch_is_corrupt() {
        let mut raw = encode_entry(&CacheEntry::new(b"abc".to_vec(), None));
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        assert!(matches!(decode_entry(&raw), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_bad_header_is_corrupt() {
        assert!(decode_entry(b"short").is_err());

        let mut raw = encode_entry(&CacheEntry::new(b"abc".to_vec(), None));
        raw[0] = RECORD_FORMAT_VERSION + 1;
        let err = decode_entry(&raw).unwrap_err();
        assert!(err.to_string().contains("format version"));

        let mut raw = encode_entry(&CacheEntry::new(b"abc".to_vec(), None));
        raw[1] = 0x80;
        assert!(set_tombstone(&mut raw).is_err());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Arbitrary bytes never panic the decoder.
        #[test]
        fn prop_decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_entry(&raw);
            let _ = peek(&raw);
        }

        /// Any single flipped blob byte is detected.
        #[test]
        fn prop_blob_corruption_detected(
            blob in proptest::collection::vec(any::<u8>(), 1..64),
            idx in any::<prop::sample::Index>(),
        ) {
            let mut raw = encode_entry(&CacheEntry::new(blob.clone(), None));
            let pos = HEADER_LEN + idx.index(blob.len());
            raw[pos] ^= 0x01;
            prop_assert!(decode_entry(&raw).is_err());
        }
    }
}
