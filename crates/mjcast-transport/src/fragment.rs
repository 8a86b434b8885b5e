//! Frame fragmentation.
//!
//! A frame is cut into `ceil(len / payload_per_fragment)` slices, each
//! prefixed with the fragment header. Frame IDs are assigned per
//! `Fragmenter` instance and wrap at 2^32.

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::protocol::*;

/// One frame, cut into ready-to-send datagrams.
#[derive(Debug, Clone)]
pub struct FragmentedFrame {
    pub frame_id: u32,
    pub datagrams: Vec<Bytes>,
}

/// Assigns frame IDs and splits frames into datagrams.
#[derive(Debug, Default)]
pub struct Fragmenter {
    last_frame_id: u32,
}

impl Fragmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering after `last_frame_id` (the next frame gets `last_frame_id + 1`).
    pub fn starting_after(last_frame_id: u32) -> Self {
        Self { last_frame_id }
    }

    /// ID of the most recently fragmented frame (0 before the first one).
    pub fn last_frame_id(&self) -> u32 {
        self.last_frame_id
    }

    /// Split `frame` into datagrams no larger than the clamped `mtu`.
    ///
    /// An empty frame yields no datagrams and does not consume a frame ID.
    pub fn fragment(&mut self, frame: &[u8], mtu: usize) -> Result<FragmentedFrame> {
        let payload_per = payload_per_fragment(mtu);
        let total = frame.len().div_ceil(payload_per);
        if total > MAX_FRAGMENTS {
            return Err(TransportError::FrameTooLarge { len: frame.len(), fragments: total });
        }
        if total == 0 {
            return Ok(FragmentedFrame { frame_id: self.last_frame_id, datagrams: Vec::new() });
        }

        self.last_frame_id = self.last_frame_id.wrapping_add(1);
        let frame_id = self.last_frame_id;

        let datagrams = frame
            .chunks(payload_per)
            .enumerate()
            .map(|(index, payload)| {
                let header = FragmentHeader {
                    frame_id,
                    total: total as u16,
                    index: index as u16,
                };
                encode_fragment(header, payload)
            })
            .collect();

        Ok(FragmentedFrame { frame_id, datagrams })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_fragment_counts_and_payloads() {
        let frame = pattern(5000);
        let mut fragmenter = Fragmenter::new();
        let out = fragmenter.fragment(&frame, 1200).unwrap();

        assert_eq!(out.frame_id, 1);
        assert_eq!(out.datagrams.len(), 5);

        let mut joined = Vec::new();
        for (i, datagram) in out.datagrams.iter().enumerate() {
            assert!(datagram.len() <= 1200);
            let header = decode_fragment_header(datagram).unwrap();
            assert_eq!(header.index as usize, i);
            assert_eq!(header.total, 5);
            joined.extend_from_slice(&datagram[FRAGMENT_HEADER..]);
        }
        assert_eq!(joined, frame);
        // 4 full fragments of 1191 bytes, last one carries the rest
        assert_eq!(out.datagrams[4].len() - FRAGMENT_HEADER, 5000 - 4 * 1191);
    }

    #[test]
    fn test_fragment_count_across_mtus() {
        let mut fragmenter = Fragmenter::new();
        for &(len, mtu) in &[(1, 1200), (1191, 1200), (1192, 1200), (70_000, 9000), (10_000, 10), (200_000, 100_000)] {
            let out = fragmenter.fragment(&pattern(len), mtu).unwrap();
            assert_eq!(out.datagrams.len(), fragments_for(len, mtu), "len={} mtu={}", len, mtu);
            assert!(out.datagrams.iter().all(|d| d.len() <= clamp_mtu(mtu)));
        }
    }

    #[test]
    fn test_frame_ids_increment_and_wrap() {
        let mut fragmenter = Fragmenter::starting_after(u32::MAX - 1);
        assert_eq!(fragmenter.fragment(b"a", 1200).unwrap().frame_id, u32::MAX);
        assert_eq!(fragmenter.fragment(b"b", 1200).unwrap().frame_id, 0);
        assert_eq!(fragmenter.fragment(b"c", 1200).unwrap().frame_id, 1);
    }

    #[test]
    fn test_empty_frame_consumes_no_id() {
        let mut fragmenter = Fragmenter::new();
        let out = fragmenter.fragment(&[], 1200).unwrap();
        assert!(out.datagrams.is_empty());
        assert_eq!(fragmenter.fragment(b"x", 1200).unwrap().frame_id, 1);
    }

    #[test]
    fn test_too_many_fragments_rejected() {
        let mut fragmenter = Fragmenter::new();
        // MIN_MTU leaves 16 payload bytes per fragment
        let frame = vec![0u8; 16 * MAX_FRAGMENTS + 1];
        let err = fragmenter.fragment(&frame, 0).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { fragments, .. } if fragments == MAX_FRAGMENTS + 1));
        assert_eq!(fragmenter.last_frame_id(), 0);
    }
}
