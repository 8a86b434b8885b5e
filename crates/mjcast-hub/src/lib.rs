//! Fan-out of reassembled frames to many independent consumers.
//!
//! One producer calls [`Hub::broadcast`]; every HTTP viewer holds a
//! [`Subscription`] with its own small queue. A full queue drops the new
//! frame for that viewer only, so a slow viewer never stalls the feed.

pub mod hub;
pub mod multipart;

pub use hub::{BroadcastOutcome, Hub, HubStats, Subscription, DEFAULT_CLIENT_QUEUE};
pub use multipart::{part_header, BOUNDARY, PART_TRAILER, STREAM_CONTENT_TYPE};
