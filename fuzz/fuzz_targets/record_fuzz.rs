//! Fuzz test for the stored record decoder
//!
//! Feeds arbitrary bytes to the decoder as if they had been read back from a
//! damaged store. Looks for:
//! - Panics on short or malformed headers
//! - Disagreement between `peek` and `decode_entry`
//! - Tombstoning that corrupts an otherwise valid record
//!
//! Run with: cargo +nightly fuzz run record_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use sharecache_storage::record;

fuzz_target!(|data: &[u8]| {
    let decoded = record::decode_entry(data);
    let peeked = record::peek(data);

    // A record that decodes always has a readable header.
    if let Ok(entry) = &decoded {
        let (tombstoned, len) = peeked.clone().expect("peek must accept a decodable record");
        assert_eq!(tombstoned, entry.is_tombstoned());
        assert_eq!(len, entry.blob().len());
    }

    let mut raw = data.to_vec();
    if record::set_tombstone(&mut raw).is_ok() {
        assert!(peeked.is_ok(), "set_tombstone accepted a header peek rejected");
        if let Ok(entry) = decoded {
            let marked = record::decode_entry(&raw).expect("tombstoning keeps a record valid");
            assert!(marked.is_tombstoned());
            assert_eq!(marked.blob(), entry.blob());
            assert_eq!(marked.provenance(), entry.provenance());
        }
    }
});
