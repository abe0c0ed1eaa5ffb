//! Connection state machine.
//!
//! One [`Connection`] owns everything for a single peer session: the
//! stream endpoint, the sliding window, the retransmission queue, the
//! fault injector, and the transfer counters. It is single-threaded and
//! synchronous; the blocking receive (bounded by the stream's receive
//! timeout) is the only wait point and doubles as the retransmission
//! clock tick.
//!
//! Transfers never raise stream failures through the stack: a connection
//! that ends in `Closed` or `Error` is reported to the caller with its
//! accumulated statistics.

use std::io;
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::chunk::{ChunkSink, ChunkSource};
use crate::config::Settings;
use crate::error::{ConnectionError, Error};
use crate::fault::{Fault, FaultInjector};
use crate::frame::{Frame, FrameBuilder};
use crate::retransmit::{PING_ROUND_TRIPS, RetransmitQueue, calibrated_timeout};
use crate::seq::SeqSpace;
use crate::window::{Accept, RecvWindow, SendWindow};
use crate::wire::{Endpoint, MAX_PACKET_SIZE, RecvOutcome, recv_frame, send_frame};

/// Receive timeout while calibrating with pings.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Created but not yet connected.
    Pending,
    /// Stream connected; handshake or transfer in progress.
    Open,
    /// Shut down before completion (retry limit or TTL exhausted).
    Closed,
    /// Unrecoverable stream failure.
    Error,
    /// Transfer finished and fully acknowledged.
    Complete,
}

/// Statistics reported to the caller when a connection ends.
#[derive(Debug, Clone, Copy)]
pub struct TransferStats {
    /// Terminal connection status.
    pub status: Status,
    /// Frames written to the stream (including injected-drop "sends").
    pub frames_sent: u32,
    /// Retransmitted data frames (sender) or duplicate/corrupt data
    /// frames observed (receiver).
    pub frames_resent: u32,
    /// Data frames received from the peer.
    pub frames_received: u32,
    /// Payload bytes read from / written to the file boundary.
    pub bytes_transferred: u64,
    /// Wall-clock session duration.
    pub elapsed: Duration,
    /// Receiver: last in-order sequence number delivered.
    pub last_sequence: u32,
}

impl TransferStats {
    /// Total throughput in megabits per second.
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.bytes_transferred as f64 * 8.0) / 1_000_000.0 / secs
    }

    /// Throughput excluding retransmissions, in megabits per second.
    pub fn effective_throughput_mbps(&self) -> f64 {
        let total = self.throughput_mbps();
        if self.frames_sent == 0 {
            return total;
        }
        let useful = self.frames_sent.saturating_sub(self.frames_resent) as f64;
        total * useful / self.frames_sent as f64
    }
}

/// Negotiated session parameters, seeded from [`Settings`] and adjusted
/// by the handshake.
#[derive(Debug, Clone, Copy)]
struct Negotiated {
    window_size: u16,
    packet_size: u32,
    sequence_bits: u8,
    initial_sequence: u32,
}

impl Negotiated {
    /// Peer-supplied parameters are held to the same ranges local
    /// settings are validated against. A zero packet size would stall
    /// the sender forever; a window at or past half the sequence range
    /// breaks wraparound ordering.
    fn in_range(&self) -> bool {
        if !(1..=32).contains(&self.sequence_bits) {
            return false;
        }
        let range = SeqSpace::new(self.sequence_bits).range();
        (1..=MAX_PACKET_SIZE).contains(&self.packet_size)
            && self.window_size >= 1
            && u64::from(self.window_size) < range / 2
    }
}

/// A single peer session over a connected stream endpoint.
pub struct Connection<S: Endpoint> {
    stream: S,
    status: Status,
    local: SocketAddrV4,
    peer: SocketAddrV4,
    settings: Settings,
    faults: FaultInjector,
    frames_sent: u32,
    frames_resent: u32,
    frames_received: u32,
    bytes_transferred: u64,
    last_sequence: u32,
    started_at: Instant,
}

impl<S: Endpoint> Connection<S> {
    /// Wrap a connected client-side stream. The receive timeout becomes
    /// the retransmission interval.
    pub fn client(
        stream: S,
        local: SocketAddrV4,
        peer: SocketAddrV4,
        settings: Settings,
        faults: FaultInjector,
    ) -> io::Result<Self> {
        let timeout = settings.timeout();
        Self::open(stream, local, peer, settings, faults, timeout)
    }

    /// Wrap an accepted server-side stream. The receive timeout is the
    /// connection TTL: the longest the receiver waits for any frame.
    pub fn server(
        stream: S,
        local: SocketAddrV4,
        peer: SocketAddrV4,
        settings: Settings,
        faults: FaultInjector,
    ) -> io::Result<Self> {
        let ttl = settings.ttl();
        Self::open(stream, local, peer, settings, faults, ttl)
    }

    fn open(
        mut stream: S,
        local: SocketAddrV4,
        peer: SocketAddrV4,
        settings: Settings,
        faults: FaultInjector,
        timeout: Duration,
    ) -> io::Result<Self> {
        stream.set_receive_timeout(Some(timeout))?;
        Ok(Self {
            stream,
            status: Status::Open,
            local,
            peer,
            settings,
            faults,
            frames_sent: 0,
            frames_resent: 0,
            frames_received: 0,
            bytes_transferred: 0,
            last_sequence: 0,
            started_at: Instant::now(),
        })
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Accumulated session statistics.
    pub fn stats(&self) -> TransferStats {
        TransferStats {
            status: self.status,
            frames_sent: self.frames_sent,
            frames_resent: self.frames_resent,
            frames_received: self.frames_received,
            bytes_transferred: self.bytes_transferred,
            elapsed: self.started_at.elapsed(),
            last_sequence: self.last_sequence,
        }
    }

    fn builder(&self) -> FrameBuilder {
        let mut builder = FrameBuilder::new();
        builder.set_endpoints(self.local, self.peer);
        builder.set_sequence_bits(self.settings.sequence_bits);
        builder.set_window_size(self.settings.effective_window());
        builder
    }

    /// Write one frame, applying fault injection first. An injected drop
    /// still counts as a transmission attempt; injected corruption goes
    /// out with a bit-inverted checksum while the local copy stays
    /// intact for retransmission.
    fn transmit(&mut self, frame: &Frame, attempts: u8) -> Result<(), ConnectionError> {
        match self
            .faults
            .decide(frame.sequence(), attempts, frame.flags().is_ping())
        {
            Fault::Drop => {
                debug!(sequence = frame.sequence(), "frame lost in transmission");
            }
            Fault::Corrupt => {
                let mut corrupted = frame.clone();
                corrupted.header.checksum = !corrupted.header.checksum;
                send_frame(&mut self.stream, &corrupted)?;
            }
            Fault::None => send_frame(&mut self.stream, frame)?,
        }

        self.frames_sent += 1;
        if attempts > 0 && !frame.flags().is_ack() {
            self.frames_resent += 1;
            debug!(sequence = frame.sequence(), "frame retransmitted");
        }
        Ok(())
    }

    /// One full round trip: send, then wait for the matching `ack`,
    /// retrying up to the retry limit. `None` means the limit was
    /// exhausted and the connection is now closed.
    fn send_and_recv(&mut self, frame: &Frame) -> Result<Option<Frame>, Error> {
        let mut attempts = 0u8;
        while attempts < self.settings.retry_limit {
            self.transmit(frame, attempts)?;
            attempts += 1;

            match recv_frame(&mut self.stream)? {
                RecvOutcome::Delivered(reply)
                    if reply.flags().is_ack() && reply.sequence() == frame.sequence() =>
                {
                    return Ok(Some(reply));
                }
                RecvOutcome::Delivered(_) | RecvOutcome::Corrupt(_) | RecvOutcome::TimedOut => {}
                RecvOutcome::PeerClosed => {
                    self.status = Status::Error;
                    return Err(ConnectionError::PeerClosedEarly.into());
                }
            }
        }

        self.status = Status::Closed;
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Client side
    // ------------------------------------------------------------------

    /// Send a file: handshake, windowed transfer, termination. Stream
    /// failures end the session in `Error`; the statistics are always
    /// returned.
    pub fn send_file(&mut self, source: &mut dyn ChunkSource, filename: &str) -> TransferStats {
        match self.client_handshake(filename) {
            Ok(Some(negotiated)) => {
                if let Err(e) = self.run_sender(source, negotiated) {
                    warn!(peer = %self.peer, error = %e, "transfer aborted");
                    self.status = Status::Error;
                }
            }
            Ok(None) => {
                warn!(peer = %self.peer, "unable to establish handshake, closing connection");
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "handshake aborted");
                self.status = Status::Error;
            }
        }
        self.stats()
    }

    /// SYN / SYN-ACK exchange. The SYN carries the filename as payload;
    /// the reply carries the server's window size, packet size, and
    /// sequence-bit width, which this side adopts.
    fn client_handshake(&mut self, filename: &str) -> Result<Option<Negotiated>, Error> {
        let mut builder = self.builder();
        builder.set_packet_size(self.settings.packet_size_bytes());
        builder.set_sequence(0);
        builder.set_payload(filename.as_bytes());
        builder.enable_syn();
        let syn = builder.build();

        let reply = match self.send_and_recv(&syn)? {
            Some(reply) if reply.flags().is_syn() => reply,
            _ => {
                self.status = Status::Closed;
                return Ok(None);
            }
        };

        let negotiated = Negotiated {
            window_size: reply.header.window_size,
            packet_size: reply.header.payload_len,
            sequence_bits: reply.header.sequence_bits,
            initial_sequence: reply.sequence(),
        };
        if !negotiated.in_range() {
            warn!(
                peer = %self.peer,
                window = negotiated.window_size,
                packet_size = negotiated.packet_size,
                sequence_bits = negotiated.sequence_bits,
                "rejecting out-of-range negotiated parameters"
            );
            self.status = Status::Closed;
            return Ok(None);
        }
        if negotiated.window_size != self.settings.effective_window()
            || negotiated.packet_size != self.settings.packet_size_bytes()
            || negotiated.sequence_bits != self.settings.sequence_bits
        {
            info!(
                window = negotiated.window_size,
                packet_size = negotiated.packet_size,
                sequence_bits = negotiated.sequence_bits,
                "adopting server-negotiated parameters"
            );
        }
        Ok(Some(negotiated))
    }

    fn run_sender(
        &mut self,
        source: &mut dyn ChunkSource,
        negotiated: Negotiated,
    ) -> Result<(), Error> {
        let seq = SeqSpace::new(negotiated.sequence_bits);
        let mut window = SendWindow::new(negotiated.window_size, seq, negotiated.initial_sequence);
        let mut queue = RetransmitQueue::new(self.settings.timeout());

        let mut builder = self.builder();
        builder.set_sequence_bits(negotiated.sequence_bits);
        builder.set_window_size(negotiated.window_size);

        let mut chunk = vec![0u8; negotiated.packet_size as usize];
        let mut finished = false;

        while self.status == Status::Open {
            // Fill the window: one chunk per open sequence number, FIN on
            // the short read that marks end of file.
            if !finished {
                for sequence in window.open_sequences() {
                    let n = source.read_chunk(&mut chunk).map_err(Error::Io)?;
                    builder.reset_flags();
                    builder.set_sequence(sequence);
                    if n < chunk.len() {
                        builder.enable_fin();
                        finished = true;
                    }
                    builder.set_packet_size(n as u32);
                    builder.set_payload(&chunk[..n]);
                    window.insert(builder.build());
                    if finished {
                        break;
                    }
                }
            }

            // Timeout-driven resend, or retry-limit close.
            if let Some(sequence) = queue.pop_expired(&window) {
                let (frame, attempts) = match window.slot(sequence) {
                    Some(slot) => (slot.frame.clone(), slot.send_count),
                    None => continue,
                };
                if attempts >= self.settings.retry_limit {
                    warn!(
                        sequence,
                        peer = %self.peer,
                        "retry limit exceeded, closing connection"
                    );
                    self.notify_close(sequence);
                    self.status = Status::Closed;
                    break;
                }
                debug!(sequence, "frame timed out");
                self.transmit(&frame, attempts)?;
                window.mark_sent(sequence);
                queue.schedule(sequence);
            }

            // First transmission of freshly buffered frames.
            for sequence in window.unsent_sequences() {
                let frame = match window.slot(sequence) {
                    Some(slot) => slot.frame.clone(),
                    None => continue,
                };
                self.bytes_transferred += u64::from(frame.header.payload_len);
                self.transmit(&frame, 0)?;
                window.mark_sent(sequence);
                queue.schedule(sequence);
            }

            // The sole blocking point: wait for one acknowledgment (or
            // the receive timeout, which is the retransmission tick).
            match recv_frame(&mut self.stream)? {
                RecvOutcome::Delivered(reply) if reply.flags().is_ack() => {
                    if window.record_ack(reply.sequence()) {
                        queue.discard_acked(&window);
                    }
                    if finished && window.all_acked() {
                        info!(peer = %self.peer, "session successfully terminated");
                        self.status = Status::Complete;
                    }
                }
                // Stray non-ack frames and corrupt acks are discarded;
                // timeouts just advance the loop.
                RecvOutcome::Delivered(_) | RecvOutcome::Corrupt(_) | RecvOutcome::TimedOut => {}
                RecvOutcome::PeerClosed => {
                    return Err(ConnectionError::PeerClosedEarly.into());
                }
            }
        }
        Ok(())
    }

    /// Best-effort close signal: a zero-payload `ack` control frame for
    /// the frame that exhausted its retries.
    fn notify_close(&mut self, sequence: u32) {
        let mut builder = self.builder();
        builder.set_sequence(sequence);
        builder.set_packet_size(0);
        builder.enable_ack();
        let frame = builder.build();
        if let Err(e) = send_frame(&mut self.stream, &frame) {
            debug!(error = %e, "close notification not delivered");
        }
    }

    /// Measure a retransmission timeout with ping round trips: send up
    /// to [`PING_ROUND_TRIPS`] pings (the last one carries `fin`),
    /// average the answered trips, scale the result, and floor it. A
    /// trip that exhausts its retries ends the exchange; unanswered
    /// trips never enter the average.
    pub fn calibrate_timeout(&mut self, scale: f64) -> Result<Duration, Error> {
        self.stream.set_receive_timeout(Some(PING_TIMEOUT))?;
        let mut answered = 0u32;
        let mut spent = Duration::ZERO;

        for trip in 0..PING_ROUND_TRIPS {
            let mut builder = self.builder();
            builder.set_sequence(0);
            builder.set_packet_size(0);
            builder.enable_ping();
            if trip + 1 == PING_ROUND_TRIPS {
                builder.enable_fin();
            }
            let trip_started = Instant::now();
            match self.send_and_recv(&builder.build())? {
                Some(_) => {
                    answered += 1;
                    spent += trip_started.elapsed();
                }
                // The peer stopped answering; further trips would only
                // stall here too.
                None => break,
            }
        }

        if answered == 0 {
            self.status = Status::Error;
            return Err(ConnectionError::HandshakeFailed { peer: self.peer }.into());
        }

        self.status = Status::Closed;
        let timeout = calibrated_timeout(spent, answered, scale);
        info!(timeout_ms = timeout.as_millis() as u64, "ping-calibrated timeout");
        Ok(timeout)
    }

    // ------------------------------------------------------------------
    // Server side
    // ------------------------------------------------------------------

    /// Receive a file: answer pings and the SYN, then run the
    /// receive-and-acknowledge loop until the announced FIN sequence has
    /// been written and the TTL drains, or the session fails. The sink
    /// is opened lazily with the filename carried by the SYN.
    pub fn receive_file(
        &mut self,
        open_sink: &mut dyn FnMut(&str) -> io::Result<Box<dyn ChunkSink>>,
    ) -> TransferStats {
        if let Err(e) = self.run_receiver(open_sink) {
            warn!(peer = %self.peer, error = %e, "transfer aborted");
            if self.status != Status::Complete {
                self.status = Status::Error;
            }
        }
        self.stats()
    }

    fn run_receiver(
        &mut self,
        open_sink: &mut dyn FnMut(&str) -> io::Result<Box<dyn ChunkSink>>,
    ) -> Result<(), Error> {
        let seq = SeqSpace::new(self.settings.sequence_bits);
        let mut window = RecvWindow::new(self.settings.effective_window(), seq, 0);
        let mut builder = self.builder();
        let mut sink: Option<Box<dyn ChunkSink>> = None;
        let mut final_sequence: Option<u32> = None;
        let mut finished = false;

        while self.status == Status::Open || finished {
            if !finished && final_sequence == Some(window.last_frame_received()) {
                // The FIN sequence has been written; drain duplicates
                // until the TTL expires.
                finished = true;
                self.status = Status::Complete;
                if let Some(sink) = sink.as_mut() {
                    sink.finish().map_err(Error::Io)?;
                }
            }

            let frame = match recv_frame(&mut self.stream)? {
                RecvOutcome::Delivered(frame) => frame,
                RecvOutcome::Corrupt(frame) => {
                    // The sender will retransmit this one.
                    debug!(sequence = frame.sequence(), "checksum failed, discarding");
                    self.frames_resent += 1;
                    self.frames_received += 1;
                    continue;
                }
                RecvOutcome::TimedOut => {
                    if finished {
                        info!(peer = %self.peer, "session successfully terminated");
                    } else {
                        warn!(peer = %self.peer, "connection TTL expired, closing");
                        self.status = Status::Closed;
                    }
                    break;
                }
                RecvOutcome::PeerClosed => {
                    if finished {
                        break;
                    }
                    return Err(ConnectionError::PeerClosedEarly.into());
                }
            };

            let flags = frame.flags();
            let sequence = frame.sequence();

            if flags.is_ping() {
                builder.reset_flags();
                builder.set_sequence(sequence);
                builder.set_packet_size(0);
                builder.enable_ack();
                builder.enable_ping();
                if flags.is_fin() {
                    builder.enable_fin();
                }
                let ack = builder.build();
                self.transmit(&ack, 0)?;
                if flags.is_fin() {
                    // Calibration session: nothing to transfer.
                    self.status = Status::Closed;
                    break;
                }
                continue;
            }

            self.frames_received += 1;

            if flags.is_syn() {
                let filename = filename_from_payload(&frame.payload);
                debug!(peer = %self.peer, filename = %filename, "handshake received");
                builder.reset_flags();
                builder.set_sequence(sequence);
                builder.set_packet_size(self.settings.packet_size_bytes());
                builder.enable_ack();
                builder.enable_syn();
                let syn_ack = builder.build();
                self.transmit(&syn_ack, 0)?;
                if sink.is_none() {
                    sink = Some(open_sink(&filename).map_err(Error::Io)?);
                }
                continue;
            }

            // Data frame.
            let is_fin = flags.is_fin();
            let payload_len = frame.header.payload_len as usize;
            let accept = window.accept(frame);
            if accept == Accept::OutOfWindow {
                debug!(sequence, "right of window, discarding");
                continue;
            }

            builder.reset_flags();
            builder.set_sequence(sequence);
            builder.set_packet_size(0);
            builder.enable_ack();
            if is_fin {
                builder.enable_fin();
            }
            let ack = builder.build();
            self.transmit(&ack, 0)?;

            match accept {
                Accept::Duplicate => {
                    // Re-acked, never re-delivered.
                    self.frames_resent += 1;
                    continue;
                }
                Accept::InOrder | Accept::Buffered => {
                    if is_fin {
                        final_sequence = Some(sequence);
                        debug!(sequence, payload_len, "final frame announced");
                    }
                }
                Accept::OutOfWindow => unreachable!("discarded above"),
            }

            for delivered in window.take_deliverable() {
                let len = delivered.header.payload_len as usize;
                if len > 0 {
                    let sink = sink
                        .as_mut()
                        .ok_or_else(|| Error::Connection(ConnectionError::InvalidState(Status::Open)))?;
                    sink.write_chunk(&delivered.payload[..len.min(delivered.payload.len())])
                        .map_err(Error::Io)?;
                    self.bytes_transferred += len as u64;
                }
                self.last_sequence = delivered.sequence();
            }
        }
        Ok(())
    }
}

/// The SYN payload is the filename, zero-padded to the packet size.
fn filename_from_payload(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::MemorySource;
    use std::io::{Read, Write};
    use std::net::Ipv4Addr;

    /// Endpoint whose reads always time out and whose writes are kept.
    struct Unresponsive {
        written: Vec<u8>,
    }

    impl Read for Unresponsive {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "timed out"))
        }
    }

    impl Write for Unresponsive {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Endpoint for Unresponsive {
        fn set_receive_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }
    }

    /// Endpoint that replays a canned byte stream, then times out.
    struct Scripted {
        reply: Vec<u8>,
        cursor: usize,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new(reply: Vec<u8>) -> Self {
            Self {
                reply,
                cursor: 0,
                written: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.reply.len() {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "timed out"));
            }
            let n = buf.len().min(self.reply.len() - self.cursor);
            buf[..n].copy_from_slice(&self.reply[self.cursor..self.cursor + n]);
            self.cursor += n;
            Ok(n)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Endpoint for Scripted {
        fn set_receive_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }
    }

    fn addr(host: u8, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, host), port)
    }

    #[test]
    fn unresponsive_peer_closes_after_exactly_retry_limit_attempts() {
        let settings = Settings {
            retry_limit: 3,
            ..Settings::default()
        };
        let faults = FaultInjector::disabled(settings.retry_limit);
        let stream = Unresponsive {
            written: Vec::new(),
        };
        let mut connection =
            Connection::client(stream, addr(1, 4000), addr(2, 4001), settings, faults).unwrap();

        let stats = connection.send_file(&mut MemorySource::new(vec![0u8; 16]), "file.bin");

        assert_eq!(stats.status, Status::Closed);
        // Exactly three SYN transmissions, each a full header + payload.
        assert_eq!(stats.frames_sent, 3);
        let frame_len = crate::FRAME_HEADER_SIZE + 1024;
        assert_eq!(connection.stream.written.len(), 3 * frame_len);
    }

    fn syn_ack_reply(window_size: u16, packet_size: u32, sequence_bits: u8) -> Vec<u8> {
        let mut builder = FrameBuilder::new();
        builder.set_endpoints(addr(2, 4001), addr(1, 4000));
        builder.set_sequence(0);
        builder.set_sequence_bits(sequence_bits);
        builder.set_window_size(window_size);
        builder.set_packet_size(packet_size);
        builder.enable_ack();
        builder.enable_syn();
        let mut wire = Vec::new();
        send_frame(&mut wire, &builder.build()).unwrap();
        wire
    }

    #[test]
    fn out_of_range_negotiated_parameters_close_the_handshake() {
        let hostile = [
            // A zero packet size would stall the sender forever.
            syn_ack_reply(4, 0, 8),
            // Window at or past half the sequence range.
            syn_ack_reply(200, 1024, 8),
            // Zero-width sequence space.
            syn_ack_reply(4, 1024, 0),
        ];

        for reply in hostile {
            let settings = Settings {
                retry_limit: 3,
                ..Settings::default()
            };
            let faults = FaultInjector::disabled(settings.retry_limit);
            let mut connection = Connection::client(
                Scripted::new(reply),
                addr(1, 4000),
                addr(2, 4001),
                settings,
                faults,
            )
            .unwrap();

            let stats =
                connection.send_file(&mut MemorySource::new(vec![1u8; 64]), "file.bin");

            assert_eq!(stats.status, Status::Closed);
            // Only the SYN went out; no data frame was built against the
            // hostile parameters.
            assert_eq!(stats.frames_sent, 1);
        }
    }

    #[test]
    fn calibration_stops_after_an_unanswered_round_trip() {
        // Answer the first ping, then go silent.
        let mut builder = FrameBuilder::new();
        builder.set_endpoints(addr(2, 4001), addr(1, 4000));
        builder.set_sequence(0);
        builder.set_packet_size(0);
        builder.enable_ack();
        builder.enable_ping();
        let mut reply = Vec::new();
        send_frame(&mut reply, &builder.build()).unwrap();

        let settings = Settings {
            retry_limit: 3,
            ..Settings::default()
        };
        let faults = FaultInjector::disabled(settings.retry_limit);
        let mut connection = Connection::client(
            Scripted::new(reply),
            addr(1, 4000),
            addr(2, 4001),
            settings,
            faults,
        )
        .unwrap();

        let timeout = connection.calibrate_timeout(2.0).unwrap();

        assert!(timeout >= crate::retransmit::TIMEOUT_FLOOR);
        assert_eq!(connection.status(), Status::Closed);
        // One answered ping plus a second trip that exhausted its three
        // attempts; the third trip was never started.
        assert_eq!(connection.stats().frames_sent, 4);
    }

    #[test]
    fn filename_parsing_trims_padding() {
        let mut payload = b"report.pdf".to_vec();
        payload.resize(64, 0);
        assert_eq!(filename_from_payload(&payload), "report.pdf");
        assert_eq!(filename_from_payload(b""), "");
    }
}
