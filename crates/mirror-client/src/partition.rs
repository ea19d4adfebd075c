use common::{MirrorError, MirrorResult};

/// Maps serialized key bytes to the partition the writer assigned them to.
pub trait PartitionFinder: Send + Sync {
    fn partition_for(&self, key_bytes: &[u8], partitions: u32) -> MirrorResult<u32>;
}

/// Kafka's default partitioner: `toPositive(murmur2(key)) % partitions`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPartitionFinder;

impl PartitionFinder for DefaultPartitionFinder {
    fn partition_for(&self, key_bytes: &[u8], partitions: u32) -> MirrorResult<u32> {
        if partitions == 0 {
            return Err(MirrorError::configuration(
                "number of partitions must be greater than zero",
            ));
        }
        Ok(to_positive(murmur2(key_bytes)) as u32 % partitions)
    }
}

/// Clears the sign bit. Not `abs`: `i32::MIN` must map to 0, not overflow.
pub fn to_positive(n: i32) -> i32 {
    n & 0x7fff_ffff
}

/// 32-bit murmur2 with Kafka's seed, byte order and tail handling.
pub fn murmur2(data: &[u8]) -> i32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let length = data.len();
    let mut h = SEED ^ (length as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h as i32
}
