//! # windlass-core
//!
//! Sliding-window reliable file transfer over an unreliable byte stream.
//!
//! The transport underneath is deliberately mistrusted: a configurable
//! fault injector corrupts and drops outbound frames, and the protocol
//! recovers with CRC-32 verification, cumulative-by-coalescing
//! acknowledgments, and timer-driven retransmission. Both Selective
//! Repeat and Go-Back-N policies run on the same window machinery;
//! Go-Back-N is simply a window of one.
//!
//! ## Architecture
//!
//! - [`frame`] — wire format: 28-byte big-endian header, flags, CRC-32
//! - [`wire`] — blocking frame I/O over any [`wire::Endpoint`]
//! - [`seq`] — modular sequence-number arithmetic
//! - [`window`] — sender and receiver sliding windows
//! - [`retransmit`] — per-frame timeout queue and ping calibration
//! - [`fault`] — synthetic corruption and loss injection
//! - [`chunk`] — file boundary: chunked sources and sinks
//! - [`connection`] — the per-peer session state machine
//! - [`config`] — validated transfer settings

pub mod chunk;
pub mod config;
pub mod connection;
pub mod error;
pub mod fault;
pub mod frame;
pub mod retransmit;
pub mod seq;
pub mod window;
pub mod wire;

pub use config::{Protocol, Role, Settings};
pub use connection::{Connection, Status, TransferStats};
pub use error::{ConnectionError, Error, FrameError};
pub use fault::FaultInjector;
pub use frame::{Frame, FrameBuilder, FrameFlags, FrameHeader};

/// Wire size of the fixed frame header, in bytes.
pub const FRAME_HEADER_SIZE: usize = 28;
