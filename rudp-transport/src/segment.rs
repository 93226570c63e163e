use std::collections::BTreeMap;

/// Splits an application payload into fixed-size chunks indexed from 0.
///
/// A payload smaller than the segment size yields a single chunk at
/// index 0, including the empty payload.
pub fn segment(data: &[u8], segment_size: usize) -> BTreeMap<u32, Vec<u8>> {
    assert!(segment_size > 0);

    let mut segments = BTreeMap::new();

    if data.len() < segment_size {
        segments.insert(0, data.to_vec());
    } else {
        for (i, chunk) in data.chunks(segment_size).enumerate() {
            segments.insert(i as u32, chunk.to_vec());
        }
    }

    segments
}

/// Concatenates received chunks in ascending index order.
///
/// The reassembler has no notion of completeness; callers must only trust
/// the result once the termination protocol has signalled it.
pub fn reassemble(segments: &BTreeMap<u32, Vec<u8>>) -> Vec<u8> {
    segments
        .values()
        .flat_map(|chunk| chunk.iter().copied())
        .collect()
}

/// The cumulative-ack count: the length of the contiguous prefix of
/// indices {0, 1, 2, ..} present in the map. Recomputed fresh on every
/// call, there is no persisted next-expected counter.
pub fn contiguous_prefix_len(segments: &BTreeMap<u32, Vec<u8>>) -> u32 {
    let mut expected = 0u32;

    while segments.contains_key(&expected) {
        expected += 1;
    }

    expected
}
