//! Fuzz test for partition-scoped key encoding
//!
//! Splits arbitrary input into a partition, a root identity and a name, then
//! checks that the partition and root prefixes are byte prefixes of the
//! encoded key and that a different partition never shares that prefix.
//!
//! Run with: cargo +nightly fuzz run key_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use sharecache_core::{PartitionToken, RootRef};
use sharecache_storage::{CacheKey, KeyPrefix};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let mut parts = input.splitn(3, '\n');
    let partition = PartitionToken::new(parts.next().unwrap_or_default());
    let root = RootRef::archive(parts.next().unwrap_or("/root.jar"));
    let name = parts.next().unwrap_or_default();

    let key = CacheKey::positional(partition.clone(), &root, name).encode();
    let partition_prefix = KeyPrefix::Partition(partition.clone()).encode();
    let root_prefix = KeyPrefix::root(partition.clone(), &root).encode();

    assert!(key.starts_with(&partition_prefix));
    assert!(key.starts_with(&root_prefix));
    assert!(key.ends_with(name.as_bytes()));

    let other = PartitionToken::new(format!("{}#", partition.as_str()));
    assert!(!key.starts_with(&KeyPrefix::Partition(other).encode()));
});
