//! Timer-driven retransmission.
//!
//! Every first transmission of a data frame enqueues a value entry
//! `{sequence, deadline}`. Each transfer iteration the queue head is
//! consulted: acknowledged entries are discarded, an expired entry names
//! the frame to resend. Entries own their data outright; nothing borrowed
//! is held across loop iterations.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::window::SendWindow;

/// Minimum usable retransmission interval. Ping calibration on loopback
/// measures round trips short enough to starve real transfers.
pub const TIMEOUT_FLOOR: Duration = Duration::from_millis(100);

/// Round trips performed by ping-based timeout calibration.
pub const PING_ROUND_TRIPS: u32 = 3;

#[derive(Debug)]
struct Entry {
    sequence: u32,
    deadline: Instant,
}

/// FIFO of per-frame retransmission deadlines.
#[derive(Debug)]
pub struct RetransmitQueue {
    entries: VecDeque<Entry>,
    timeout: Duration,
}

impl RetransmitQueue {
    /// Queue with the given per-frame timeout interval.
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            timeout,
        }
    }

    /// Arm (or re-arm) the timer for a just-transmitted frame.
    pub fn schedule(&mut self, sequence: u32) {
        self.entries.push_back(Entry {
            sequence,
            deadline: Instant::now() + self.timeout,
        });
    }

    /// Discard queue-head entries whose frames are already acknowledged.
    pub fn discard_acked(&mut self, window: &SendWindow) {
        while let Some(head) = self.entries.front() {
            if window.is_acked(head.sequence) || window.slot(head.sequence).is_none() {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Pop the head entry if its deadline has passed, returning the
    /// sequence number to resend. Acked heads are discarded first.
    pub fn pop_expired(&mut self, window: &SendWindow) -> Option<u32> {
        self.discard_acked(window);
        let head = self.entries.front()?;
        if head.deadline <= Instant::now() {
            self.entries.pop_front().map(|entry| entry.sequence)
        } else {
            None
        }
    }

    /// Outstanding timer count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no timers are armed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derive a retransmission timeout from ping round trips: the average
/// trip time scaled by `scale`, floored at [`TIMEOUT_FLOOR`].
pub fn calibrated_timeout(elapsed: Duration, round_trips: u32, scale: f64) -> Duration {
    let average = elapsed / round_trips.max(1);
    let scaled = average.mul_f64(scale.max(0.0));
    scaled.max(TIMEOUT_FLOOR)
}
