//! Shared fixtures for windlass integration tests.
//!
//! Transfers run over an in-memory duplex endpoint built from mpsc
//! channels, so both sides of a connection live in one process with real
//! receive-timeout semantics and no sockets.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use windlass_core::chunk::{ChunkSink, MemorySource};
use windlass_core::wire::Endpoint;
use windlass_core::{Connection, FaultInjector, Settings, TransferStats};

/// One half of an in-memory duplex connection.
///
/// Reads honor the configured receive timeout via `recv_timeout`; a
/// disconnected peer reads as end-of-stream, matching a closed socket.
pub struct DuplexEndpoint {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    timeout: Option<Duration>,
}

/// Create a connected endpoint pair.
pub fn duplex_pair() -> (DuplexEndpoint, DuplexEndpoint) {
    let (tx_a, rx_b) = channel();
    let (tx_b, rx_a) = channel();
    let a = DuplexEndpoint {
        tx: tx_a,
        rx: rx_a,
        pending: Vec::new(),
        timeout: None,
    };
    let b = DuplexEndpoint {
        tx: tx_b,
        rx: rx_b,
        pending: Vec::new(),
        timeout: None,
    };
    (a, b)
}

impl Read for DuplexEndpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            let chunk = match self.timeout {
                Some(timeout) => match self.rx.recv_timeout(timeout) {
                    Ok(chunk) => chunk,
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(io::Error::new(io::ErrorKind::WouldBlock, "receive timeout"));
                    }
                    Err(RecvTimeoutError::Disconnected) => return Ok(0),
                },
                None => match self.rx.recv() {
                    Ok(chunk) => chunk,
                    Err(_) => return Ok(0),
                },
            };
            self.pending = chunk;
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Write for DuplexEndpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A disconnected peer swallows the bytes, like a socket whose
        // remote end already closed mid-shutdown.
        let _ = self.tx.send(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Endpoint for DuplexEndpoint {
    fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }
}

/// Test address for one side of a connection.
pub fn addr(host: u8) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, host), 9344)
}

/// Settings tuned for fast in-process transfers.
pub fn test_settings() -> Settings {
    Settings {
        timeout_ms: 150,
        ttl_ms: 2000,
        window_size: 4,
        packet_size_kb: 1,
        retry_limit: 3,
        ..Settings::default()
    }
}

/// Chunk sink backed by a shared byte buffer, so the test can inspect
/// what the receiver wrote after the connection threads finish.
pub struct SharedSink(pub Arc<Mutex<Vec<u8>>>);

impl ChunkSink for SharedSink {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}

/// Everything observable after a full client/server exchange.
pub struct TransferOutcome {
    pub client: TransferStats,
    pub server: TransferStats,
    pub received: Vec<u8>,
    pub filename: Option<String>,
}

/// Run a complete transfer: the server in a spawned thread, the client on
/// the calling thread, both over a duplex endpoint pair.
pub fn run_transfer(
    client_settings: Settings,
    server_settings: Settings,
    client_faults: FaultInjector,
    server_faults: FaultInjector,
    payload: &[u8],
    filename: &str,
) -> TransferOutcome {
    let (client_end, server_end) = duplex_pair();

    let received = Arc::new(Mutex::new(Vec::new()));
    let announced = Arc::new(Mutex::new(None::<String>));
    let server_received = Arc::clone(&received);
    let server_announced = Arc::clone(&announced);

    let server = thread::spawn(move || {
        let mut connection = Connection::server(
            server_end,
            addr(2),
            addr(1),
            server_settings,
            server_faults,
        )
        .expect("server endpoint setup");
        connection.receive_file(&mut |name| {
            *server_announced.lock().unwrap() = Some(name.to_owned());
            Ok(Box::new(SharedSink(Arc::clone(&server_received))) as Box<dyn ChunkSink>)
        })
    });

    let mut connection = Connection::client(
        client_end,
        addr(1),
        addr(2),
        client_settings,
        client_faults,
    )
    .expect("client endpoint setup");
    let client_stats = connection.send_file(&mut MemorySource::new(payload.to_vec()), filename);

    // Dropping the client endpoint lets the server's drain phase observe
    // stream closure instead of waiting out the TTL.
    drop(connection);
    let server_stats = server.join().expect("server thread");

    TransferOutcome {
        client: client_stats,
        server: server_stats,
        received: received.lock().unwrap().clone(),
        filename: announced.lock().unwrap().clone(),
    }
}

/// Deterministic pseudo-random payload of the given length.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}
