//! Sequence-number arithmetic.
//!
//! Sequence numbers live in a modular space of `2^sequence_bits` values.
//! All ordering decisions use modular distance with a half-range threshold:
//! `b` is "after" `a` when the forward distance from `a` to `b` is non-zero
//! and less than half the range. Plain integer comparison is wrong as soon
//! as the space wraps (255 is followed by 0 in an 8-bit space).

/// Modular sequence-number space of `2^bits` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    range: u64,
}

impl SeqSpace {
    /// Create a sequence space for the given bit width (1..=32).
    ///
    /// At 32 bits the range saturates at `2^32`, the full `u32` space.
    pub fn new(bits: u8) -> Self {
        let bits = bits.clamp(1, 32);
        Self {
            range: 1u64 << bits,
        }
    }

    /// Number of distinct sequence numbers.
    pub fn range(&self) -> u64 {
        self.range
    }

    /// Reduce an arbitrary value into this space.
    pub fn wrap(&self, value: u64) -> u32 {
        (value % self.range) as u32
    }

    /// The sequence number `n` steps after `s`.
    pub fn add(&self, s: u32, n: u64) -> u32 {
        self.wrap(s as u64 + n)
    }

    /// The sequence number immediately after `s`.
    pub fn next(&self, s: u32) -> u32 {
        self.add(s, 1)
    }

    /// Forward (wrapping) distance from `from` to `to`.
    pub fn distance(&self, from: u32, to: u32) -> u64 {
        (to as u64 + self.range - from as u64) % self.range
    }

    /// True when `b` comes strictly after `a` under the half-range rule.
    pub fn after(&self, b: u32, a: u32) -> bool {
        let d = self.distance(a, b);
        d != 0 && d < self.range / 2
    }

    /// True when `b` is `a` or comes before it under the half-range rule.
    pub fn at_or_before(&self, b: u32, a: u32) -> bool {
        !self.after(b, a)
    }

    /// True when `s` falls within `(base, base + window]`.
    pub fn in_window(&self, s: u32, base: u32, window: u16) -> bool {
        let d = self.distance(base, s);
        d >= 1 && d <= window as u64
    }
}
