//! windlass command-line interface
//!
//! Sends or receives a file with the sliding-window transfer protocol,
//! with optional synthetic corruption and loss on the send path.

mod config;
mod verify;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use windlass_core::chunk::{ChunkSink, FileSink, FileSource};
use windlass_core::{Connection, FaultInjector, Protocol, Role, Settings, Status, TransferStats};

/// Multiplier applied to the measured ping round-trip average when
/// deriving the retransmission timeout.
const PING_TIMEOUT_SCALE: f64 = 2.0;

/// windlass - sliding-window reliable file transfer
#[derive(Parser)]
#[command(name = "windlass")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file to one or more receivers
    Send {
        /// File to send
        #[arg(required = true)]
        file: PathBuf,

        /// Receiver addresses (host or host:port)
        #[arg(required = true)]
        peers: Vec<String>,

        /// Default port for peers given without one
        #[arg(short, long)]
        port: Option<u16>,

        /// Retransmission policy: sr or gbn
        #[arg(long, value_parser = parse_protocol)]
        protocol: Option<Protocol>,

        /// Sliding-window size
        #[arg(short, long)]
        window: Option<u16>,

        /// Payload size per frame, in kilobytes
        #[arg(long)]
        packet_size_kb: Option<u32>,

        /// Sequence-number width in bits
        #[arg(long)]
        sequence_bits: Option<u8>,

        /// Per-frame retransmission timeout in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Derive the timeout from ping round trips instead
        #[arg(long)]
        ping: bool,

        /// Transmission attempts per frame before closing
        #[arg(long)]
        retry_limit: Option<u8>,

        /// Independent per-frame corruption probability (0..=1)
        #[arg(long)]
        damage_probability: Option<f64>,

        /// Independent per-frame loss probability (0..=1)
        #[arg(long)]
        loss_probability: Option<f64>,

        /// Sequence numbers to corrupt once each, in order
        #[arg(long, value_delimiter = ',')]
        damaged: Option<Vec<u32>>,

        /// Sequence numbers to drop once each, in order
        #[arg(long, value_delimiter = ',')]
        lost: Option<Vec<u32>>,
    },

    /// Receive files from senders
    Receive {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Retransmission policy: sr or gbn
        #[arg(long, value_parser = parse_protocol)]
        protocol: Option<Protocol>,

        /// Sliding-window size
        #[arg(short, long)]
        window: Option<u16>,

        /// Payload size per frame, in kilobytes
        #[arg(long)]
        packet_size_kb: Option<u32>,

        /// Sequence-number width in bits
        #[arg(long)]
        sequence_bits: Option<u8>,

        /// Connection inactivity TTL in milliseconds
        #[arg(long)]
        ttl_ms: Option<u64>,

        /// Connections to serve before exiting
        #[arg(short, long)]
        max_connections: Option<u8>,
    },
}

fn parse_protocol(value: &str) -> Result<Protocol, String> {
    match value.to_ascii_lowercase().as_str() {
        "sr" | "selective-repeat" => Ok(Protocol::Sr),
        "gbn" | "go-back-n" => Ok(Protocol::Gbn),
        other => Err(format!("unknown protocol {other:?}, expected sr or gbn")),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    let mut settings = match &cli.config {
        Some(path) => config::load(path)?,
        None => config::load_or_default()?,
    };

    match cli.command {
        Commands::Send {
            file,
            peers,
            port,
            protocol,
            window,
            packet_size_kb,
            sequence_bits,
            timeout_ms,
            ping,
            retry_limit,
            damage_probability,
            loss_probability,
            damaged,
            lost,
        } => {
            settings.role = Role::Client;
            settings.file_path = file.clone();
            settings.peer_addresses = peers;
            apply(&mut settings.port, port);
            apply(&mut settings.protocol, protocol);
            apply(&mut settings.window_size, window);
            apply(&mut settings.packet_size_kb, packet_size_kb);
            apply(&mut settings.sequence_bits, sequence_bits);
            apply(&mut settings.timeout_ms, timeout_ms);
            apply(&mut settings.retry_limit, retry_limit);
            apply(&mut settings.damage_probability, damage_probability);
            apply(&mut settings.loss_probability, loss_probability);
            apply(&mut settings.damaged_sequences, damaged);
            apply(&mut settings.lost_sequences, lost);
            if ping {
                settings.ping_calculated = true;
            }
            settings.validate()?;
            send_file(settings, &file)
        }
        Commands::Receive {
            output,
            port,
            protocol,
            window,
            packet_size_kb,
            sequence_bits,
            ttl_ms,
            max_connections,
        } => {
            settings.role = Role::Server;
            settings.file_path = output.clone();
            apply(&mut settings.port, port);
            apply(&mut settings.protocol, protocol);
            apply(&mut settings.window_size, window);
            apply(&mut settings.packet_size_kb, packet_size_kb);
            apply(&mut settings.sequence_bits, sequence_bits);
            apply(&mut settings.ttl_ms, ttl_ms);
            apply(&mut settings.max_connections, max_connections);
            settings.validate()?;
            receive_files(settings, &output)
        }
    }
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Send the file to every configured peer, one connection at a time.
fn send_file(mut settings: Settings, file: &Path) -> anyhow::Result<()> {
    anyhow::ensure!(file.is_file(), "file not found: {}", file.display());
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?
        .to_owned();

    verify::report_digest(file);

    let peers = settings.peer_addresses.clone();
    let mut failures = 0usize;
    for peer in &peers {
        let addr = resolve_peer(peer, settings.port)
            .with_context(|| format!("resolving peer {peer}"))?;

        if settings.ping_calculated {
            match calibrate(addr, &settings) {
                Ok(timeout) => settings.timeout_ms = timeout.as_millis() as u64,
                Err(e) => {
                    warn!(peer = %addr, error = %e, "ping calibration failed, keeping configured timeout");
                }
            }
        }

        let stream = match TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer = %addr, error = %e, "connect failed");
                failures += 1;
                continue;
            }
        };
        let local = local_v4(&stream);

        info!(
            peer = %addr,
            file = %file.display(),
            window = settings.effective_window(),
            timeout_ms = settings.timeout_ms,
            "starting transfer"
        );

        let faults = FaultInjector::new(&settings, rand::random());
        let mut source = FileSource::open(file)?;
        let mut connection = Connection::client(stream, local, addr, settings.clone(), faults)?;
        let stats = connection.send_file(&mut source, &filename);
        report(&stats, addr);
        if stats.status != Status::Complete {
            failures += 1;
        }
    }

    anyhow::ensure!(
        failures == 0,
        "{failures} of {} transfers did not complete",
        peers.len()
    );
    Ok(())
}

/// Calibrate the retransmission timeout over a dedicated connection.
fn calibrate(addr: SocketAddrV4, settings: &Settings) -> anyhow::Result<std::time::Duration> {
    let stream = TcpStream::connect(addr)?;
    let local = local_v4(&stream);
    let faults = FaultInjector::disabled(settings.retry_limit);
    let mut connection = Connection::client(stream, local, addr, settings.clone(), faults)?;
    Ok(connection.calibrate_timeout(PING_TIMEOUT_SCALE)?)
}

/// Accept and serve connections until `max_connections` transfers have
/// been attempted. Ping-only calibration sessions do not consume a slot.
fn receive_files(settings: Settings, output: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("creating output directory {}", output.display()))?;

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, settings.port))?;
    info!(port = settings.port, output = %output.display(), "listening");

    let mut served = 0u8;
    while served < settings.max_connections {
        let (stream, peer) = listener.accept()?;
        let peer = match peer {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => {
                warn!(%peer, "rejecting non-IPv4 peer");
                continue;
            }
        };
        let local = local_v4(&stream);
        info!(%peer, "connection accepted");

        let faults = FaultInjector::new(&settings, rand::random());
        let mut connection = Connection::server(stream, local, peer, settings.clone(), faults)?;

        let mut written: Option<PathBuf> = None;
        let stats = connection.receive_file(&mut |name| {
            let path = output.join(sanitize_filename(name));
            info!(file = %path.display(), "writing incoming file");
            let sink = FileSink::create(&path)?;
            written = Some(path);
            Ok(Box::new(sink) as Box<dyn ChunkSink>)
        });

        report(&stats, peer);
        if let Some(path) = &written {
            verify::report_digest(path);
        }
        if stats.frames_received > 0 {
            served += 1;
        }
    }
    Ok(())
}

/// Strip any directory components from a peer-supplied filename.
fn sanitize_filename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or("incoming.bin")
        .to_owned()
}

/// Resolve `host` or `host:port` to an IPv4 socket address.
fn resolve_peer(peer: &str, default_port: u16) -> anyhow::Result<SocketAddrV4> {
    let candidates: Vec<SocketAddr> = if peer.contains(':') {
        peer.to_socket_addrs()?.collect()
    } else {
        (peer, default_port).to_socket_addrs()?.collect()
    };
    candidates
        .into_iter()
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .with_context(|| format!("no IPv4 address for {peer}"))
}

fn local_v4(stream: &TcpStream) -> SocketAddrV4 {
    match stream.local_addr() {
        Ok(SocketAddr::V4(addr)) => addr,
        _ => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
    }
}

fn report(stats: &TransferStats, peer: SocketAddrV4) {
    println!("Peer: {peer}");
    println!("Status: {:?}", stats.status);
    println!("Frames sent: {}", stats.frames_sent);
    println!("Frames received: {}", stats.frames_received);
    println!("Retransmissions: {}", stats.frames_resent);
    println!("Bytes transferred: {}", stats.bytes_transferred);
    println!("Elapsed: {:.3}s", stats.elapsed.as_secs_f64());
    println!("Throughput: {:.3} Mbps", stats.throughput_mbps());
    println!(
        "Effective throughput: {:.3} Mbps",
        stats.effective_throughput_mbps()
    );
}
