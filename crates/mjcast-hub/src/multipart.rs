//! `multipart/x-mixed-replace` framing for MJPEG over HTTP.
//!
//! Each part on the wire:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JPEG>\r\n
//! ```

use bytes::Bytes;

pub const BOUNDARY: &str = "frame";

/// Response `Content-Type` for a stream of parts.
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Bytes written after each part body.
pub const PART_TRAILER: Bytes = Bytes::from_static(b"\r\n");

/// Boundary line plus part headers for a body of `len` bytes.
pub fn part_header(len: usize) -> Bytes {
    Bytes::from(format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY, len
    ))
}
