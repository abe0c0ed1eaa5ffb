//! Sliding-window bookkeeping for sender and receiver.
//!
//! Both sides keep a fixed buffer of `window_size` slots keyed by the
//! occupant's sequence number. Slots are found by scanning rather than
//! by `sequence % window_size`: modulo indexing collides at the wrap
//! boundary whenever the window does not divide the sequence range
//! (range 16, window 3: sequences 15 and 0 share a position), and a
//! collision there evicts a live frame. At most `window_size` sequences
//! are live at once, so capacity always suffices and only slots whose
//! occupant has left the live window are ever reclaimed.
//!
//! The sender tracks last-ack-received (LAR) and last-frame-sent (LFS)
//! with the invariant `LAR <= LFS <= LAR + window`; the receiver mirrors
//! this with last-frame-received (LFR) and the largest acceptable frame
//! `LFR + window`. All comparisons go through [`SeqSpace`] so the logic
//! survives sequence-number wraparound.

use crate::frame::Frame;
use crate::seq::SeqSpace;

/// One window position: a buffered frame plus its delivery state.
#[derive(Debug, Clone)]
pub struct WindowSlot {
    /// The buffered frame
    pub frame: Frame,
    /// Acknowledged (sender) or buffered-for-delivery (receiver)
    pub acked: bool,
    /// Number of times this frame has been transmitted
    pub send_count: u8,
}

/// Sender-side window over outstanding frames.
#[derive(Debug)]
pub struct SendWindow {
    slots: Vec<Option<WindowSlot>>,
    window_size: u16,
    seq: SeqSpace,
    last_ack_received: u32,
    last_frame_sent: u32,
}

impl SendWindow {
    /// Create a window; `initial` becomes both LAR and LFS, so the first
    /// data frame is `initial + 1`.
    pub fn new(window_size: u16, seq: SeqSpace, initial: u32) -> Self {
        Self {
            slots: vec![None; window_size as usize],
            window_size,
            seq,
            last_ack_received: initial,
            last_frame_sent: initial,
        }
    }

    fn position(&self, sequence: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.frame.sequence() == sequence))
    }

    // A slot is reclaimable once empty or once its occupant has fallen
    // out of the live window (acked and coalesced past, or evicted by a
    // window slide).
    fn reclaimable_position(&self) -> usize {
        self.slots
            .iter()
            .position(|slot| match slot {
                None => true,
                Some(s) => !self.seq.in_window(
                    s.frame.sequence(),
                    self.last_ack_received,
                    self.window_size,
                ),
            })
            .expect("a send window holds at most window_size live frames")
    }

    /// Last acknowledgment received (LAR).
    pub fn last_ack_received(&self) -> u32 {
        self.last_ack_received
    }

    /// Last frame sent (LFS).
    pub fn last_frame_sent(&self) -> u32 {
        self.last_frame_sent
    }

    /// Sequence numbers a fresh chunk may be assigned to right now:
    /// `LFS + 1 ..= LAR + window`.
    pub fn open_sequences(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut s = self.seq.next(self.last_frame_sent);
        while self.seq.in_window(s, self.last_ack_received, self.window_size) {
            out.push(s);
            s = self.seq.next(s);
        }
        out
    }

    /// Buffer a frame, reclaiming a dead slot if its sequence is new.
    /// Live in-window frames are never displaced.
    pub fn insert(&mut self, frame: Frame) {
        let sequence = frame.sequence();
        debug_assert!(
            self.seq
                .in_window(sequence, self.last_ack_received, self.window_size),
            "insert outside send window"
        );
        let slot = WindowSlot {
            frame,
            acked: false,
            send_count: 0,
        };
        let idx = self
            .position(sequence)
            .unwrap_or_else(|| self.reclaimable_position());
        self.slots[idx] = Some(slot);
    }

    /// Frames buffered but never transmitted, in sequence order.
    pub fn unsent_sequences(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut s = self.seq.next(self.last_ack_received);
        while self.seq.in_window(s, self.last_ack_received, self.window_size) {
            if self.slot(s).is_some_and(|slot| slot.send_count == 0) {
                out.push(s);
            }
            s = self.seq.next(s);
        }
        out
    }

    /// Look up the live slot for a sequence number.
    pub fn slot(&self, sequence: u32) -> Option<&WindowSlot> {
        self.position(sequence)
            .and_then(|idx| self.slots[idx].as_ref())
    }

    /// Record a transmission: bumps the attempt count and advances LFS.
    pub fn mark_sent(&mut self, sequence: u32) {
        if let Some(idx) = self.position(sequence) {
            if let Some(slot) = &mut self.slots[idx] {
                slot.send_count = slot.send_count.saturating_add(1);
            }
        }
        if self.seq.after(sequence, self.last_frame_sent) {
            self.last_frame_sent = sequence;
        }
        debug_assert!(
            self.seq
                .distance(self.last_ack_received, self.last_frame_sent)
                <= self.window_size as u64,
            "LFS ran ahead of LAR + window"
        );
    }

    /// Record an acknowledgment. Advances LAR past the acked frame and
    /// any consecutive already-acked successors (coalescing out-of-order
    /// acknowledgments). Returns whether the ack named a live frame.
    pub fn record_ack(&mut self, sequence: u32) -> bool {
        let known = match self.position(sequence) {
            Some(idx) => {
                if let Some(slot) = &mut self.slots[idx] {
                    slot.acked = true;
                }
                true
            }
            None => false,
        };

        loop {
            let next = self.seq.next(self.last_ack_received);
            if self.is_acked(next) {
                self.last_ack_received = next;
            } else {
                break;
            }
        }
        known
    }

    /// Whether a given outstanding frame has been acknowledged.
    pub fn is_acked(&self, sequence: u32) -> bool {
        self.slot(sequence).is_some_and(|slot| slot.acked)
    }

    /// All transmitted frames acknowledged.
    pub fn all_acked(&self) -> bool {
        self.last_ack_received == self.last_frame_sent
    }
}

/// How the receive window classified an arriving data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// The next expected frame; deliverable immediately.
    InOrder,
    /// Within the window but ahead of a gap; buffered.
    Buffered,
    /// At or before LFR, or already buffered: acknowledge but do not
    /// deliver again.
    Duplicate,
    /// Beyond `LFR + window`: silently discarded, not acknowledged.
    OutOfWindow,
}

/// Receiver-side window over out-of-order data frames.
#[derive(Debug)]
pub struct RecvWindow {
    slots: Vec<Option<WindowSlot>>,
    window_size: u16,
    seq: SeqSpace,
    last_frame_received: u32,
}

impl RecvWindow {
    /// Create a window expecting `initial + 1` as the first data frame.
    pub fn new(window_size: u16, seq: SeqSpace, initial: u32) -> Self {
        Self {
            slots: vec![None; window_size as usize],
            window_size,
            seq,
            last_frame_received: initial,
        }
    }

    fn position(&self, sequence: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.frame.sequence() == sequence))
    }

    // Buffered frames vacate their slot on delivery, so an empty slot
    // always exists for a not-yet-buffered in-window sequence.
    fn free_position(&self) -> usize {
        self.slots
            .iter()
            .position(Option::is_none)
            .expect("a receive window holds at most window_size buffered frames")
    }

    /// Last in-order frame received (LFR).
    pub fn last_frame_received(&self) -> u32 {
        self.last_frame_received
    }

    /// Largest acceptable frame (LAF): `LFR + window`.
    pub fn largest_acceptable(&self) -> u32 {
        self.seq.add(self.last_frame_received, self.window_size as u64)
    }

    /// Classify and, when acceptable, buffer an arriving data frame.
    pub fn accept(&mut self, frame: Frame) -> Accept {
        let sequence = frame.sequence();
        if self.seq.at_or_before(sequence, self.last_frame_received) {
            return Accept::Duplicate;
        }
        if !self
            .seq
            .in_window(sequence, self.last_frame_received, self.window_size)
        {
            return Accept::OutOfWindow;
        }
        if self.position(sequence).is_some() {
            return Accept::Duplicate;
        }

        let in_order = sequence == self.seq.next(self.last_frame_received);
        let idx = self.free_position();
        self.slots[idx] = Some(WindowSlot {
            frame,
            acked: true,
            send_count: 0,
        });
        if in_order {
            Accept::InOrder
        } else {
            Accept::Buffered
        }
    }

    /// Drain the run of consecutive buffered frames starting at
    /// `LFR + 1`, advancing LFR past each. Empty while a gap remains.
    pub fn take_deliverable(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        loop {
            let next = self.seq.next(self.last_frame_received);
            match self.position(next) {
                Some(idx) => {
                    let slot = self.slots[idx].take().expect("position matched a live slot");
                    self.last_frame_received = next;
                    out.push(slot.frame);
                }
                None => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuilder;

    fn frame(sequence: u32) -> Frame {
        let mut builder = FrameBuilder::new();
        builder.set_sequence(sequence);
        builder.set_packet_size(4);
        builder.set_payload(&sequence.to_be_bytes());
        builder.build()
    }

    fn send_window(size: u16) -> SendWindow {
        SendWindow::new(size, SeqSpace::new(8), 0)
    }

    #[test]
    fn open_sequences_span_lfs_to_lar_plus_window() {
        let mut window = send_window(4);
        assert_eq!(window.open_sequences(), vec![1, 2, 3, 4]);

        window.insert(frame(1));
        window.insert(frame(2));
        window.mark_sent(1);
        window.mark_sent(2);
        assert_eq!(window.open_sequences(), vec![3, 4]);

        window.record_ack(1);
        assert_eq!(window.open_sequences(), vec![3, 4, 5]);
    }

    #[test]
    fn ack_coalescing_fast_forwards_lar() {
        let mut window = send_window(4);
        for s in 1..=4 {
            window.insert(frame(s));
            window.mark_sent(s);
        }

        // Out-of-order acks: 2, 4, then 1 closes the gap up to 2.
        window.record_ack(2);
        assert_eq!(window.last_ack_received(), 0);
        window.record_ack(4);
        assert_eq!(window.last_ack_received(), 0);
        window.record_ack(1);
        assert_eq!(window.last_ack_received(), 2);
        window.record_ack(3);
        assert_eq!(window.last_ack_received(), 4);
        assert!(window.all_acked());
    }

    #[test]
    fn insert_reclaims_slots_of_dead_frames_only() {
        let mut window = send_window(4);
        for s in 1..=4 {
            window.insert(frame(s));
            window.mark_sent(s);
            window.record_ack(s);
        }

        // All four occupants are acked and left of the window; sequence 5
        // reclaims one of their slots.
        window.insert(frame(5));
        assert_eq!(window.slot(5).unwrap().frame.sequence(), 5);
        assert!(window.slot(1).is_none());
    }

    #[test]
    fn single_slot_window_allows_one_outstanding_frame() {
        let mut window = send_window(1);
        assert_eq!(window.open_sequences(), vec![1]);
        window.insert(frame(1));
        window.mark_sent(1);
        assert!(window.open_sequences().is_empty());

        window.record_ack(1);
        assert_eq!(window.open_sequences(), vec![2]);
    }

    #[test]
    fn send_window_wraps_sequence_space() {
        let mut window = SendWindow::new(4, SeqSpace::new(8), 254);
        assert_eq!(window.open_sequences(), vec![255, 0, 1, 2]);
        for s in [255u32, 0, 1] {
            window.insert(frame(s));
            window.mark_sent(s);
        }
        window.record_ack(255);
        window.record_ack(0);
        window.record_ack(1);
        assert_eq!(window.last_ack_received(), 1);
    }

    #[test]
    fn live_frames_survive_a_wrap_that_modulo_would_collide() {
        // Range 16 with window 3: 15 and 0 are both live in the window
        // over base 13, and 15 % 3 == 0 % 3. Neither may displace the
        // other.
        let mut window = SendWindow::new(3, SeqSpace::new(4), 13);
        for s in [14u32, 15, 0] {
            window.insert(frame(s));
        }
        assert!(window.slot(14).is_some());
        assert!(window.slot(15).is_some());
        assert!(window.slot(0).is_some());

        for s in [14u32, 15, 0] {
            window.mark_sent(s);
        }
        for s in [14u32, 15, 0] {
            window.record_ack(s);
        }
        assert_eq!(window.last_ack_received(), 0);
        assert!(window.all_acked());
    }

    #[test]
    fn receiver_buffers_and_flushes_on_gap_close() {
        let mut window = RecvWindow::new(4, SeqSpace::new(8), 0);

        assert_eq!(window.accept(frame(1)), Accept::InOrder);
        assert_eq!(
            window
                .take_deliverable()
                .iter()
                .map(Frame::sequence)
                .collect::<Vec<_>>(),
            vec![1]
        );

        assert_eq!(window.accept(frame(3)), Accept::Buffered);
        assert!(window.take_deliverable().is_empty());

        assert_eq!(window.accept(frame(2)), Accept::InOrder);
        assert_eq!(
            window
                .take_deliverable()
                .iter()
                .map(Frame::sequence)
                .collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(window.last_frame_received(), 3);
    }

    #[test]
    fn receiver_classifies_duplicates_and_out_of_window() {
        let mut window = RecvWindow::new(3, SeqSpace::new(8), 0);
        assert_eq!(window.accept(frame(1)), Accept::InOrder);
        window.take_deliverable();

        // Already delivered.
        assert_eq!(window.accept(frame(1)), Accept::Duplicate);
        // Buffered twice.
        assert_eq!(window.accept(frame(3)), Accept::Buffered);
        assert_eq!(window.accept(frame(3)), Accept::Duplicate);
        // Right of LFR + window.
        assert_eq!(window.accept(frame(5)), Accept::OutOfWindow);
        assert_eq!(window.largest_acceptable(), 4);
    }

    #[test]
    fn receiver_keeps_buffered_frames_across_the_wrap() {
        // Mirror of the sender case: 15 and 0 buffered together over
        // base 13 in a range-16 space, then 14 closes the gap.
        let mut window = RecvWindow::new(3, SeqSpace::new(4), 13);
        assert_eq!(window.accept(frame(15)), Accept::Buffered);
        assert_eq!(window.accept(frame(0)), Accept::Buffered);
        assert_eq!(window.accept(frame(14)), Accept::InOrder);

        assert_eq!(
            window
                .take_deliverable()
                .iter()
                .map(Frame::sequence)
                .collect::<Vec<_>>(),
            vec![14, 15, 0]
        );
        assert_eq!(window.last_frame_received(), 0);
    }
}
