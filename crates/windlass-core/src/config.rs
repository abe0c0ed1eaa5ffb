//! Transfer settings.
//!
//! The interactive/CLI layer produces a fully populated [`Settings`]
//! before the core starts; the core only validates and consumes it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of the transfer this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sends the file.
    Client,
    /// Receives the file.
    Server,
}

/// Sliding-window retransmission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Selective Repeat: any window size, per-frame acknowledgment.
    #[serde(alias = "selective-repeat")]
    Sr,
    /// Go-Back-N: window size forced to 1.
    #[serde(alias = "go-back-n")]
    Gbn,
}

/// Invalid settings values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Packet size outside 1..=64 KB
    #[error("packet size must be 1..=64 KB, got {0}")]
    PacketSize(u32),
    /// Window size outside 1..=512
    #[error("window size must be 1..=512, got {0}")]
    WindowSize(u16),
    /// Sequence bits outside 1..=32
    #[error("sequence bits must be 1..=32, got {0}")]
    SequenceBits(u8),
    /// Probability outside 0..=1
    #[error("{name} probability must be within 0..=1, got {value}")]
    Probability {
        /// Which probability field
        name: &'static str,
        /// Offending value
        value: f64,
    },
    /// Retry limit of zero
    #[error("retry limit must be at least 1")]
    RetryLimit,
    /// Sequence range too small for the window
    #[error("window size {window} must be smaller than half the sequence range 2^{bits}")]
    WindowTooWideForSequenceSpace {
        /// Configured window size
        window: u16,
        /// Configured sequence bits
        bits: u8,
    },
}

/// Fully populated transfer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Client or server
    pub role: Role,
    /// Peer addresses the client connects to, in order
    pub peer_addresses: Vec<String>,
    /// TCP port (connect target for clients, listen port for servers)
    pub port: u16,
    /// File to send (client) or output directory (server)
    pub file_path: PathBuf,
    /// Retransmission policy
    pub protocol: Protocol,
    /// Payload size per frame, in kilobytes (1..=64)
    pub packet_size_kb: u32,
    /// Per-frame retransmission timeout in milliseconds
    pub timeout_ms: u64,
    /// Derive the timeout from ping round trips instead of `timeout_ms`
    pub ping_calculated: bool,
    /// Connection inactivity TTL in milliseconds (server side)
    pub ttl_ms: u64,
    /// Sliding-window size (1..=512; effective size is 1 under Go-Back-N)
    pub window_size: u16,
    /// Sequence-number width in bits (1..=32)
    pub sequence_bits: u8,
    /// Independent per-frame corruption probability (0..=1)
    pub damage_probability: f64,
    /// Independent per-frame loss probability (0..=1)
    pub loss_probability: f64,
    /// Explicit sorted sequence numbers to corrupt, once each
    pub damaged_sequences: Vec<u32>,
    /// Explicit sorted sequence numbers to drop, once each
    pub lost_sequences: Vec<u32>,
    /// Connections a server accepts before exiting
    pub max_connections: u8,
    /// Transmission attempts per frame before the connection closes
    pub retry_limit: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            role: Role::Client,
            peer_addresses: Vec::new(),
            port: 9344,
            file_path: PathBuf::new(),
            protocol: Protocol::Sr,
            packet_size_kb: 1,
            timeout_ms: 1000,
            ping_calculated: false,
            ttl_ms: 5000,
            window_size: 8,
            sequence_bits: 8,
            damage_probability: 0.0,
            loss_probability: 0.0,
            damaged_sequences: Vec::new(),
            lost_sequences: Vec::new(),
            max_connections: 1,
            retry_limit: 5,
        }
    }
}

impl Settings {
    /// Check all ranges from the configuration contract.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=64).contains(&self.packet_size_kb) {
            return Err(ConfigError::PacketSize(self.packet_size_kb));
        }
        if !(1..=512).contains(&self.window_size) {
            return Err(ConfigError::WindowSize(self.window_size));
        }
        if !(1..=32).contains(&self.sequence_bits) {
            return Err(ConfigError::SequenceBits(self.sequence_bits));
        }
        for (name, value) in [
            ("damage", self.damage_probability),
            ("loss", self.loss_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::RetryLimit);
        }
        // Half-range ordering breaks down once the window covers half the
        // sequence space.
        let range = 1u64 << self.sequence_bits.min(32);
        if u64::from(self.effective_window()) >= range / 2 {
            return Err(ConfigError::WindowTooWideForSequenceSpace {
                window: self.window_size,
                bits: self.sequence_bits,
            });
        }
        Ok(())
    }

    /// Window size after applying the protocol rule: Go-Back-N always
    /// operates with a single outstanding frame.
    pub fn effective_window(&self) -> u16 {
        match self.protocol {
            Protocol::Gbn => 1,
            Protocol::Sr => self.window_size,
        }
    }

    /// Frame payload size in bytes.
    pub fn packet_size_bytes(&self) -> u32 {
        self.packet_size_kb * 1024
    }

    /// Per-frame retransmission timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connection inactivity TTL.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn gbn_forces_window_of_one() {
        let settings = Settings {
            protocol: Protocol::Gbn,
            window_size: 64,
            ..Settings::default()
        };
        assert_eq!(settings.effective_window(), 1);
    }

    #[test]
    fn out_of_range_values_rejected() {
        let too_big = Settings {
            packet_size_kb: 65,
            ..Settings::default()
        };
        assert!(matches!(
            too_big.validate(),
            Err(ConfigError::PacketSize(65))
        ));

        let bad_prob = Settings {
            loss_probability: 1.5,
            ..Settings::default()
        };
        assert!(matches!(
            bad_prob.validate(),
            Err(ConfigError::Probability { .. })
        ));

        let no_retries = Settings {
            retry_limit: 0,
            ..Settings::default()
        };
        assert!(matches!(no_retries.validate(), Err(ConfigError::RetryLimit)));
    }

    #[test]
    fn window_must_fit_sequence_space() {
        let cramped = Settings {
            window_size: 2,
            sequence_bits: 2,
            ..Settings::default()
        };
        assert!(matches!(
            cramped.validate(),
            Err(ConfigError::WindowTooWideForSequenceSpace { .. })
        ));
    }
}
