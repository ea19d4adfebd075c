#![no_main]

use libfuzzer_sys::fuzz_target;
use mirror_client::{DefaultPartitionFinder, PartitionFinder};

fuzz_target!(|data: &[u8]| {
    let Some((&count, key)) = data.split_first() else {
        return;
    };
    let count = u32::from(count).max(1);
    let partition = DefaultPartitionFinder
        .partition_for(key, count)
        .expect("non-zero partition count");
    assert!(partition < count);
});
