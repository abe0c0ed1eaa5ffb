//! Frame encoding and decoding for the windlass wire protocol.
//!
//! A frame is a fixed 28-byte header followed by a variable-length payload.
//! All multi-byte fields are big-endian (network byte order). The checksum
//! is CRC-32 (reflected polynomial 0xEDB88320) over the header with the
//! checksum field zeroed, concatenated with the payload; `ping` frames and
//! `syn+ack` negotiation frames exclude the payload from both the wire and
//! the checksum, whatever their length field says.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::FRAME_HEADER_SIZE;
use crate::error::FrameError;

const CHECKSUM_OFFSET: usize = 24;

/// Frame flags bitmap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Acknowledgment frame
    pub const ACK: u8 = 0b0000_0001;
    /// Sequence synchronization / handshake
    pub const SYN: u8 = 0b0000_0010;
    /// Final frame from the sender
    pub const FIN: u8 = 0b0000_0100;
    /// Timeout-calibration frame, no viable payload
    pub const PING: u8 = 0b0000_1000;

    const KNOWN: u8 = Self::ACK | Self::SYN | Self::FIN | Self::PING;

    /// Create new empty flags
    pub fn new() -> Self {
        Self(0)
    }

    /// Reconstruct flags from a wire byte
    pub fn from_bits(bits: u8) -> Result<Self, FrameError> {
        if bits & !Self::KNOWN != 0 {
            return Err(FrameError::InvalidFlags(bits));
        }
        Ok(Self(bits))
    }

    /// Add ACK flag
    pub fn with_ack(mut self) -> Self {
        self.0 |= Self::ACK;
        self
    }

    /// Add SYN flag
    pub fn with_syn(mut self) -> Self {
        self.0 |= Self::SYN;
        self
    }

    /// Add FIN flag
    pub fn with_fin(mut self) -> Self {
        self.0 |= Self::FIN;
        self
    }

    /// Add PING flag
    pub fn with_ping(mut self) -> Self {
        self.0 |= Self::PING;
        self
    }

    /// Check if ACK is set
    pub fn is_ack(&self) -> bool {
        self.0 & Self::ACK != 0
    }

    /// Check if SYN is set
    pub fn is_syn(&self) -> bool {
        self.0 & Self::SYN != 0
    }

    /// Check if FIN is set
    pub fn is_fin(&self) -> bool {
        self.0 & Self::FIN != 0
    }

    /// Check if PING is set
    pub fn is_ping(&self) -> bool {
        self.0 & Self::PING != 0
    }

    /// SYN+ACK carries negotiation parameters in the header only.
    pub fn is_negotiation(&self) -> bool {
        self.is_syn() && self.is_ack()
    }

    /// Whether a frame with these flags carries its payload on the wire
    /// (and under the checksum).
    pub fn carries_payload(&self) -> bool {
        !self.is_ping() && !self.is_negotiation()
    }

    /// Get raw byte value
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// Fixed-size frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Packet source (address, port)
    pub source: SocketAddrV4,
    /// Packet destination (address, port)
    pub dest: SocketAddrV4,
    /// Sequence number; the ack number when ACK is set
    pub sequence: u32,
    /// Sequence-number width in bits; synchronized during handshake
    pub sequence_bits: u8,
    /// Window size; synchronized during handshake
    pub window_size: u16,
    /// Payload length in bytes; carries the negotiated packet size on SYN+ACK
    pub payload_len: u32,
    /// Frame flags
    pub flags: FrameFlags,
    /// CRC-32 over the zero-checksum header plus covered payload
    pub checksum: u32,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            source: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            dest: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            sequence: 0,
            sequence_bits: 0,
            window_size: 0,
            payload_len: 0,
            flags: FrameFlags::new(),
            checksum: 0,
        }
    }
}

impl FrameHeader {
    /// Serialize the header into its fixed wire layout.
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.source.ip().octets());
        buf[4..6].copy_from_slice(&self.source.port().to_be_bytes());
        buf[6..10].copy_from_slice(&self.dest.ip().octets());
        buf[10..12].copy_from_slice(&self.dest.port().to_be_bytes());
        buf[12..16].copy_from_slice(&self.sequence.to_be_bytes());
        buf[16] = self.sequence_bits;
        buf[17..19].copy_from_slice(&self.window_size.to_be_bytes());
        buf[19..23].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[23] = self.flags.as_u8();
        buf[24..28].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    /// Parse a header from exactly [`FRAME_HEADER_SIZE`] bytes.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: FRAME_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let source = SocketAddrV4::new(
            Ipv4Addr::new(data[0], data[1], data[2], data[3]),
            u16::from_be_bytes([data[4], data[5]]),
        );
        let dest = SocketAddrV4::new(
            Ipv4Addr::new(data[6], data[7], data[8], data[9]),
            u16::from_be_bytes([data[10], data[11]]),
        );

        Ok(Self {
            source,
            dest,
            sequence: u32::from_be_bytes([data[12], data[13], data[14], data[15]]),
            sequence_bits: data[16],
            window_size: u16::from_be_bytes([data[17], data[18]]),
            payload_len: u32::from_be_bytes([data[19], data[20], data[21], data[22]]),
            flags: FrameFlags::from_bits(data[23])?,
            checksum: u32::from_be_bytes([data[24], data[25], data[26], data[27]]),
        })
    }
}

/// A protocol frame: header plus owned payload.
///
/// Frames are immutable once built; the receiver inspects them and
/// re-sequences them into the window buffer but never mutates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Payload bytes; empty when the flags exclude a wire payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// Sequence number shorthand.
    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    /// Flags shorthand.
    pub fn flags(&self) -> FrameFlags {
        self.header.flags
    }

    /// The payload bytes that travel on the wire, if any.
    pub fn wire_payload(&self) -> Option<&[u8]> {
        if self.header.flags.carries_payload() && self.header.payload_len > 0 {
            Some(&self.payload)
        } else {
            None
        }
    }

    /// Compute the CRC-32 this frame should carry.
    pub fn compute_checksum(&self) -> u32 {
        let mut zeroed = self.header.encode();
        zeroed[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].fill(0);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&zeroed);
        if let Some(payload) = self.wire_payload() {
            hasher.update(payload);
        }
        hasher.finalize()
    }

    /// Verify the stored checksum. A mismatch means "discard this frame",
    /// never a fatal error.
    pub fn verify_checksum(&self) -> bool {
        self.header.checksum == self.compute_checksum()
    }
}

/// Stateful frame accumulator.
///
/// One builder serves many frames: the receive-and-acknowledge loop calls
/// `reset_flags` and `build` once per incoming frame without re-creating
/// the builder. `build` computes the checksum last, so it always covers
/// the final field values.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    source: Option<SocketAddrV4>,
    dest: Option<SocketAddrV4>,
    sequence: u32,
    sequence_bits: u8,
    window_size: u16,
    packet_size: u32,
    flags: FrameFlags,
    payload: Vec<u8>,
}

impl FrameBuilder {
    /// Create a new frame builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set source and destination endpoints.
    pub fn set_endpoints(&mut self, source: SocketAddrV4, dest: SocketAddrV4) {
        self.source = Some(source);
        self.dest = Some(dest);
    }

    /// Set the sequence number.
    pub fn set_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }

    /// Set the sequence-number width.
    pub fn set_sequence_bits(&mut self, bits: u8) {
        self.sequence_bits = bits;
    }

    /// Set the window size.
    pub fn set_window_size(&mut self, window_size: u16) {
        self.window_size = window_size;
    }

    /// Set the packet (payload) size the next frames are built with.
    pub fn set_packet_size(&mut self, packet_size: u32) {
        self.packet_size = packet_size;
    }

    /// Set the payload, zero-padded or truncated to the packet size.
    pub fn set_payload(&mut self, bytes: &[u8]) {
        let len = self.packet_size as usize;
        let mut payload = vec![0u8; len];
        let take = bytes.len().min(len);
        payload[..take].copy_from_slice(&bytes[..take]);
        self.payload = payload;
    }

    /// Set the ACK flag.
    pub fn enable_ack(&mut self) {
        self.flags = self.flags.with_ack();
    }

    /// Set the SYN flag.
    pub fn enable_syn(&mut self) {
        self.flags = self.flags.with_syn();
    }

    /// Set the FIN flag.
    pub fn enable_fin(&mut self) {
        self.flags = self.flags.with_fin();
    }

    /// Set the PING flag.
    pub fn enable_ping(&mut self) {
        self.flags = self.flags.with_ping();
    }

    /// Clear all flags and any staged payload for the next frame.
    pub fn reset_flags(&mut self) {
        self.flags = FrameFlags::new();
        self.payload.clear();
    }

    /// Assemble an immutable frame, computing its checksum last.
    pub fn build(&self) -> Frame {
        let unspecified = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        let header = FrameHeader {
            source: self.source.unwrap_or(unspecified),
            dest: self.dest.unwrap_or(unspecified),
            sequence: self.sequence,
            sequence_bits: self.sequence_bits,
            window_size: self.window_size,
            payload_len: self.packet_size,
            flags: self.flags,
            checksum: 0,
        };

        let mut frame = Frame {
            header,
            payload: self.payload.clone(),
        };
        frame.header.checksum = frame.compute_checksum();
        frame
    }
}
