use sha2::{Digest, Sha256};

pub type FrameDigest = [u8; 32];

/// Suppresses frames whose bytes match the last transmitted one.
#[derive(Default)]
pub struct ChangeDetector {
    last_sent: Option<FrameDigest>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of `frame` if it differs from the last committed frame.
    pub fn check(&self, frame: &[u8]) -> Option<FrameDigest> {
        let digest: FrameDigest = Sha256::digest(frame).into();
        (self.last_sent != Some(digest)).then_some(digest)
    }

    /// Remember `digest` as transmitted. Only called after a successful
    /// send, so a frame whose send failed is offered again next tick.
    pub fn commit(&mut self, digest: FrameDigest) {
        self.last_sent = Some(digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_frames_suppressed() {
        let mut detector = ChangeDetector::new();
        let digest = detector.check(b"frame-a").unwrap();
        detector.commit(digest);

        assert!(detector.check(b"frame-a").is_none());
        assert!(detector.check(b"frame-b").is_some());
    }

    #[test]
    fn test_uncommitted_frame_is_offered_again() {
        let detector = ChangeDetector::new();
        assert!(detector.check(b"frame-a").is_some());
        assert!(detector.check(b"frame-a").is_some());
    }
}
