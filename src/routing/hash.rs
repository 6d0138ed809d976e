/// Number of partitions the key space is divided into, fixed cluster-wide.
pub const PARTITION_COUNT: i32 = 128;

/// Map a key to its partition index in `[0, partition_count)`.
///
/// Two 32-bit accumulators seeded to 5381 are fed alternating code points
/// and combined with wrapping arithmetic. The wraparound semantics are part
/// of the routing contract with the cluster, so the arithmetic is done on
/// `i32` with explicit `wrapping_*` operations, and the key is walked by
/// Unicode code point rather than by byte.
pub fn partition_hash(key: &str, partition_count: i32) -> i32 {
    let mut hash1: i32 = 5381;
    let mut hash2: i32 = 5381;

    for (index, ch) in key.chars().enumerate() {
        let c = ch as i32;
        if index % 2 == 0 {
            hash1 = hash1.wrapping_shl(5).wrapping_add(hash1) ^ c;
        } else {
            hash2 = hash2.wrapping_shl(5).wrapping_add(hash2) ^ c;
        }
    }

    let mut hash = hash1.wrapping_add(hash2.wrapping_mul(1_566_083_941));
    if hash < 0 {
        hash = hash.wrapping_neg();
    }
    hash % partition_count
}
