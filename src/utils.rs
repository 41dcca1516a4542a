use std::collections::HashSet;

/// Compute the lexicographic successor of a database key: the smallest
/// byte string strictly greater than the input. Finds the rightmost byte
/// that is not `0xFF` and increments it; a key of only `0xFF` bytes gets
/// a `0x00` appended instead.
///
/// This is what turns "everything with this prefix" into a half-open
/// scan range, and what iterators use to continue after the last key of
/// a chunk.
pub fn increment_key(key: &[u8]) -> Vec<u8> {
    let mut result = key.to_vec();
    for idx in (0..result.len()).rev() {
        if result[idx] == 0xFF {
            continue;
        }
        result[idx] += 1;
        return result;
    }
    // Key consists of 0xFF bytes only: extend length
    result.push(0x00);
    result
}

/// Return the collection with duplicates removed, keeping the first
/// occurrence of each element and the overall ordering.
pub fn make_unique(coll: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(coll.len());
    coll.into_iter().filter(|item| seen.insert(item.clone())).collect()
}
