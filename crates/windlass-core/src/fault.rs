//! Synthetic corruption and loss, applied on the send path.
//!
//! Faults are decided per frame just before transmission, either from
//! explicit sorted sequence lists or from independent Bernoulli draws.
//! Probabilistic faults are suppressed once a frame is on its final
//! allowed attempt, so a transfer with a finite retry limit always
//! converges. `ping` frames are exempt entirely.
//!
//! Corruption does not touch the payload: the checksum field is
//! bit-inverted on the wire, so the frame is physically sent but fails
//! verification at the receiver. The sender's local copy keeps the
//! original checksum for retransmission.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::Settings;

/// The fault, if any, to apply to an outgoing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Send the frame unmodified.
    None,
    /// Invert the checksum field before transmission.
    Corrupt,
    /// Do not transmit the frame at all.
    Drop,
}

/// Decides, per outgoing frame, whether to corrupt or drop it.
///
/// The random generator is seeded explicitly so test runs reproduce.
#[derive(Debug)]
pub struct FaultInjector {
    damaged: VecDeque<u32>,
    lost: VecDeque<u32>,
    damage_prob: f64,
    loss_prob: f64,
    retry_limit: u8,
    rng: StdRng,
}

impl FaultInjector {
    /// Build an injector from settings with an explicit RNG seed.
    pub fn new(settings: &Settings, seed: u64) -> Self {
        Self {
            damaged: settings.damaged_sequences.iter().copied().collect(),
            lost: settings.lost_sequences.iter().copied().collect(),
            damage_prob: settings.damage_probability,
            loss_prob: settings.loss_probability,
            retry_limit: settings.retry_limit,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// An injector that never faults anything.
    pub fn disabled(retry_limit: u8) -> Self {
        Self {
            damaged: VecDeque::new(),
            lost: VecDeque::new(),
            damage_prob: 0.0,
            loss_prob: 0.0,
            retry_limit,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Decide the fault for a frame about to be sent.
    ///
    /// `attempts` counts prior transmissions of this frame (zero on the
    /// first send). Evaluation order: explicit damage list, probabilistic
    /// damage, explicit loss list, probabilistic loss.
    pub fn decide(&mut self, sequence: u32, attempts: u8, is_ping: bool) -> Fault {
        if is_ping {
            return Fault::None;
        }

        if self.should_corrupt(sequence, attempts) {
            debug!(sequence, "injecting corruption");
            return Fault::Corrupt;
        }
        if self.should_drop(sequence, attempts) {
            debug!(sequence, "injecting loss");
            return Fault::Drop;
        }
        Fault::None
    }

    /// Whether the frame with this sequence number should be corrupted.
    /// Consumes the head of the explicit damage list on a match.
    pub fn should_corrupt(&mut self, sequence: u32, attempts: u8) -> bool {
        if self.damaged.front() == Some(&sequence) {
            self.damaged.pop_front();
            return true;
        }
        self.coin_flip(self.damage_prob, attempts)
    }

    /// Whether the frame with this sequence number should be dropped.
    /// Consumes the head of the explicit loss list on a match.
    pub fn should_drop(&mut self, sequence: u32, attempts: u8) -> bool {
        if self.lost.front() == Some(&sequence) {
            self.lost.pop_front();
            return true;
        }
        self.coin_flip(self.loss_prob, attempts)
    }

    // The final allowed attempt is never probabilistically faulted, so a
    // frame is guaranteed to reach the wire intact before the retry limit
    // closes the connection.
    fn coin_flip(&mut self, probability: f64, attempts: u8) -> bool {
        if probability <= 0.0 || attempts + 1 >= self.retry_limit {
            return false;
        }
        self.rng.gen_bool(probability.min(1.0))
    }
}
