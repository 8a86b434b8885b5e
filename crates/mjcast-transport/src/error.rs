use std::io;

use thiserror::Error;

/// Errors surfaced by the multicast sender and receiver.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid multicast address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("network interface {0:?} not found or has no IPv4 address")]
    UnknownInterface(String),

    #[error("socket setup failed: {0}")]
    Socket(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("frame of {len} bytes needs {fragments} fragments (max 65535)")]
    FrameTooLarge { len: usize, fragments: usize },

    #[error("receiver closed")]
    Closed,
}

impl TransportError {
    /// Startup errors: the process should refuse to run with this configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. } | Self::UnknownInterface(_) | Self::Socket(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
