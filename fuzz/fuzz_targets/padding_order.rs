#![no_main]

use libfuzzer_sys::fuzz_target;
use range_index::{EndRange, FieldKind, RangeNumber};

fuzz_target!(|data: &[u8]| {
    if data.len() >= 16 {
        let a = i64::from_le_bytes(data[..8].try_into().unwrap()).saturating_abs();
        let b = i64::from_le_bytes(data[8..16].try_into().unwrap()).saturating_abs();
        let pa = RangeNumber::Long(a).pad_zero();
        let pb = RangeNumber::Long(b).pad_zero();
        assert_eq!(pa.len(), 19);
        assert_eq!(a.cmp(&b), pa.cmp(&pb));
    }

    // Arbitrary boundary text must be rejected or padded, never panic.
    if let Ok(text) = std::str::from_utf8(data) {
        for kind in [FieldKind::Int, FieldKind::Long] {
            for end in [EndRange::Inclusive, EndRange::Exclusive] {
                if let Ok(padded) = kind.pad_boundary(text, end) {
                    assert_eq!(padded.len(), kind.width());
                }
            }
        }
    }
});
