//! Transport I/O over a blocking byte stream.
//!
//! The core never creates or binds sockets; it consumes an already
//! connected [`Endpoint`] with a settable receive timeout. Reads loop
//! until the exact header and payload byte counts have accumulated.
//! Partial reads are a normal occurrence on a byte-stream transport and
//! never produce a frame.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::trace;

use crate::FRAME_HEADER_SIZE;
use crate::error::{ConnectionError, Error, FrameError};
use crate::frame::{Frame, FrameHeader};

/// Largest payload the receive path will accept, matching the 64 KB
/// packet-size ceiling.
pub const MAX_PACKET_SIZE: u32 = 64 * 1024;

/// A connected, bidirectional byte stream with a settable receive timeout.
///
/// Implemented for [`TcpStream`]; tests supply an in-memory duplex.
pub trait Endpoint: Read + Write {
    /// Set the blocking-receive timeout. `None` blocks indefinitely.
    fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Endpoint for TcpStream {
    fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}

/// Result of one blocking receive attempt.
#[derive(Debug)]
pub enum RecvOutcome {
    /// A complete frame arrived and its checksum verified.
    Delivered(Frame),
    /// A complete frame arrived but failed checksum verification.
    /// The caller discards it; the sender will retransmit.
    Corrupt(Frame),
    /// No complete frame arrived within the receive timeout.
    TimedOut,
    /// The peer closed the stream.
    PeerClosed,
}

enum ReadStatus {
    Full,
    TimedOut,
    Closed,
}

/// Read exactly `buf.len()` bytes, classifying timeouts and closure.
fn read_full<S: Read>(stream: &mut S, buf: &mut [u8]) -> io::Result<ReadStatus> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Ok(ReadStatus::Closed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                return Ok(ReadStatus::TimedOut);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(ReadStatus::Full)
}

/// Write a frame as two back-to-back writes: header, then payload.
///
/// The payload write is skipped for `ping` and `syn+ack` frames, which
/// carry no payload on the wire. A short write is fatal for the
/// connection.
pub fn send_frame<S: Write>(stream: &mut S, frame: &Frame) -> Result<(), ConnectionError> {
    let header = frame.header.encode();
    write_full(stream, &header)?;

    if let Some(payload) = frame.wire_payload() {
        write_full(stream, payload)?;
    }

    stream.flush().map_err(ConnectionError::Stream)?;
    trace!(sequence = frame.sequence(), flags = ?frame.flags(), "frame written");
    Ok(())
}

fn write_full<S: Write>(stream: &mut S, buf: &[u8]) -> Result<(), ConnectionError> {
    let mut written = 0;
    while written < buf.len() {
        match stream.write(&buf[written..]) {
            Ok(0) => {
                return Err(ConnectionError::ShortWrite {
                    written,
                    expected: buf.len(),
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ConnectionError::Stream(e)),
        }
    }
    Ok(())
}

/// Receive one frame, honoring the stream's configured receive timeout.
///
/// The exact header byte count is read before `payload_len` is inspected;
/// the payload is then read exactly, unless the frame is a `ping` or a
/// `syn+ack` negotiation frame (payload absent by protocol convention
/// regardless of the length field).
pub fn recv_frame<S: Read>(stream: &mut S) -> Result<RecvOutcome, Error> {
    let mut header_buf = [0u8; FRAME_HEADER_SIZE];
    match read_full(stream, &mut header_buf)? {
        ReadStatus::TimedOut => return Ok(RecvOutcome::TimedOut),
        ReadStatus::Closed => return Ok(RecvOutcome::PeerClosed),
        ReadStatus::Full => {}
    }

    let header = FrameHeader::decode(&header_buf)?;
    if header.payload_len > MAX_PACKET_SIZE {
        return Err(Error::Frame(FrameError::PayloadOverflow {
            len: header.payload_len,
            packet_size: MAX_PACKET_SIZE,
        }));
    }

    let mut payload = Vec::new();
    if header.flags.carries_payload() && header.payload_len > 0 {
        payload = vec![0u8; header.payload_len as usize];
        match read_full(stream, &mut payload)? {
            ReadStatus::TimedOut => return Ok(RecvOutcome::TimedOut),
            ReadStatus::Closed => return Ok(RecvOutcome::PeerClosed),
            ReadStatus::Full => {}
        }
    }

    let frame = Frame { header, payload };
    if frame.verify_checksum() {
        trace!(sequence = frame.sequence(), flags = ?frame.flags(), "frame received");
        Ok(RecvOutcome::Delivered(frame))
    } else {
        trace!(sequence = frame.sequence(), "checksum mismatch, discarding");
        Ok(RecvOutcome::Corrupt(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuilder;
    use std::io::Cursor;

    fn data_frame(sequence: u32, payload: &[u8]) -> Frame {
        let mut builder = FrameBuilder::new();
        builder.set_sequence(sequence);
        builder.set_packet_size(payload.len() as u32);
        builder.set_payload(payload);
        builder.build()
    }

    #[test]
    fn send_then_receive_roundtrip() {
        let frame = data_frame(7, b"chunk of file data");
        let mut wire = Vec::new();
        send_frame(&mut wire, &frame).unwrap();

        match recv_frame(&mut Cursor::new(wire)).unwrap() {
            RecvOutcome::Delivered(received) => assert_eq!(received, frame),
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn corrupted_frame_reported_not_fatal() {
        let frame = data_frame(3, b"payload");
        let mut wire = Vec::new();
        send_frame(&mut wire, &frame).unwrap();
        // Invert the checksum field on the wire.
        for byte in &mut wire[24..28] {
            *byte = !*byte;
        }

        match recv_frame(&mut Cursor::new(wire)).unwrap() {
            RecvOutcome::Corrupt(received) => assert_eq!(received.sequence(), 3),
            other => panic!("expected corrupt outcome, got {other:?}"),
        }
    }

    #[test]
    fn closed_stream_reported_as_peer_closed() {
        let mut wire = Cursor::new(Vec::new());
        assert!(matches!(
            recv_frame(&mut wire).unwrap(),
            RecvOutcome::PeerClosed
        ));
    }

    #[test]
    fn truncated_header_is_not_a_frame() {
        let frame = data_frame(1, b"abc");
        let mut wire = Vec::new();
        send_frame(&mut wire, &frame).unwrap();
        wire.truncate(10);

        // A stream that ends mid-header reads as peer closure, never as a
        // delivered frame.
        assert!(matches!(
            recv_frame(&mut Cursor::new(wire)).unwrap(),
            RecvOutcome::PeerClosed
        ));
    }

    #[test]
    fn negotiation_frame_skips_payload_bytes() {
        let mut builder = FrameBuilder::new();
        builder.set_sequence(0);
        builder.set_packet_size(1024); // negotiated packet size, not a payload
        builder.enable_syn();
        builder.enable_ack();
        let frame = builder.build();

        let mut wire = Vec::new();
        send_frame(&mut wire, &frame).unwrap();
        assert_eq!(wire.len(), FRAME_HEADER_SIZE);

        match recv_frame(&mut Cursor::new(wire)).unwrap() {
            RecvOutcome::Delivered(received) => {
                assert_eq!(received.header.payload_len, 1024);
                assert!(received.payload.is_empty());
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    struct TimesOut;

    impl Read for TimesOut {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "timed out"))
        }
    }

    #[test]
    fn receive_timeout_classified() {
        assert!(matches!(
            recv_frame(&mut TimesOut).unwrap(),
            RecvOutcome::TimedOut
        ));
    }
}
