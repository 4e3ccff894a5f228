//! Chunk math shared by the download senders.
//!
//! A payload is split into a 600-byte first chunk followed by 1000-byte
//! chunks; payloads of 600 bytes or less fit entirely in the first packet.

use gridway_protocol::constants::{FIRST_CHUNK_BYTES, NEXT_CHUNK_BYTES};

/// Number of packets needed beyond the first. Zero when everything fits in
/// the initial chunk.
pub fn extra_packets(len: usize) -> usize {
    if len <= FIRST_CHUNK_BYTES {
        0
    } else {
        (len - FIRST_CHUNK_BYTES).div_ceil(NEXT_CHUNK_BYTES)
    }
}

/// Total packet count for a payload.
pub fn total_packets(len: usize) -> usize {
    1 + extra_packets(len)
}

/// The byte range of packet `n` (0-based) within a payload of length `len`,
/// or `None` past the end.
pub fn chunk_range(len: usize, n: usize) -> Option<std::ops::Range<usize>> {
    if n == 0 {
        return Some(0..len.min(FIRST_CHUNK_BYTES));
    }
    let start = FIRST_CHUNK_BYTES + (n - 1) * NEXT_CHUNK_BYTES;
    if start >= len {
        return None;
    }
    Some(start..len.min(start + NEXT_CHUNK_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_count_formula() {
        assert_eq!(total_packets(0), 1);
        assert_eq!(total_packets(600), 1);
        assert_eq!(total_packets(601), 2);
        assert_eq!(total_packets(1400), 2);
        assert_eq!(total_packets(1601), 3);
        assert_eq!(total_packets(2600), 3);
    }

    #[test]
    fn chunks_cover_payload_exactly() {
        for len in [0usize, 1, 599, 600, 601, 1400, 1600, 1601, 10_000] {
            let total = total_packets(len);
            let mut covered = 0;
            for n in 0..total {
                let range = chunk_range(len, n).unwrap();
                assert_eq!(range.start, covered);
                covered = range.end;
            }
            assert_eq!(covered, len);
            assert!(chunk_range(len, total).is_none());
        }
    }

    #[test]
    fn scenario_1400_bytes_is_600_then_800() {
        assert_eq!(total_packets(1400), 2);
        assert_eq!(chunk_range(1400, 0).unwrap().len(), 600);
        assert_eq!(chunk_range(1400, 1).unwrap().len(), 800);
    }
}
