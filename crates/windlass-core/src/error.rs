//! Error types for the windlass protocol core.

use thiserror::Error;

/// Core protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// Frame parsing error
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Underlying stream I/O error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame-level errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Header too short to parse
    #[error("frame header too short: expected {expected}, got {actual}")]
    TooShort {
        /// Expected header size
        expected: usize,
        /// Actual size available
        actual: usize,
    },

    /// Unknown bits set in the flags byte
    #[error("invalid flag bits: 0b{0:08b}")]
    InvalidFlags(u8),

    /// Payload length field exceeds the negotiated packet size
    #[error("payload length {len} exceeds packet size {packet_size}")]
    PayloadOverflow {
        /// Declared payload length
        len: u32,
        /// Negotiated packet size
        packet_size: u32,
    },
}

/// Connection-level errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Handshake could not be completed within the retry limit
    #[error("handshake with {peer} failed")]
    HandshakeFailed {
        /// Peer the handshake was attempted with
        peer: std::net::SocketAddrV4,
    },

    /// Stream write did not accept the full frame
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes the stream accepted
        written: usize,
        /// Bytes in the frame
        expected: usize,
    },

    /// Peer closed the stream before the transfer completed
    #[error("peer closed the stream mid-transfer")]
    PeerClosedEarly,

    /// Unrecoverable stream failure
    #[error("stream i/o failure: {0}")]
    Stream(#[from] std::io::Error),

    /// Operation attempted in an incompatible connection state
    #[error("invalid state for operation: {0:?}")]
    InvalidState(crate::connection::Status),
}
