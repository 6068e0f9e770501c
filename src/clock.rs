//! Converts simulated time to symbol time and superframe slot
//! boundaries.
//!
//! `SlotClock` carries no state of its own — it is a set of pure
//! functions over a beacon anchor time and a symbol rate.

use crate::{SLOTS_PER_SUPERFRAME, UNIT_BACKOFF_PERIOD_SYMBOLS};

/// A beacon timing anchor a device aligns its backoff slots to.
///
/// A device destined for the coordinator aligns to the outgoing
/// superframe (the local beacon transmission time); a device destined
/// elsewhere aligns to the incoming superframe (the reception time of
/// the coordinator's beacon).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconAnchor {
    /// Symbol time at which the reference beacon was sent/received.
    pub anchor_symbols: u64,
    /// Length of the superframe this anchor opens, in symbols.
    pub superframe_duration_symbols: u32,
    /// Index (0..=15) of the final CAP slot of this superframe.
    pub final_cap_slot: u8,
}

/// Pure timing arithmetic for one superframe anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClock {
    pub anchor: BeaconAnchor,
    /// Symbols per second of the active PHY band.
    pub symbol_rate: u32,
}

impl SlotClock {
    pub fn new(anchor: BeaconAnchor, symbol_rate: u32) -> Self {
        Self { anchor, symbol_rate }
    }

    /// Symbols elapsed since the anchor, as of `now_symbols`.
    fn elapsed(&self, now_symbols: u64) -> u64 {
        now_symbols.saturating_sub(self.anchor.anchor_symbols)
    }

    /// Symbol offset of the next backoff-period (slot) boundary at or
    /// after `now_symbols`.
    pub fn next_slot_boundary(&self, now_symbols: u64) -> u64 {
        let elapsed = self.elapsed(now_symbols);
        let u = UNIT_BACKOFF_PERIOD_SYMBOLS as u64;
        let remainder = elapsed % u;
        if remainder == 0 {
            now_symbols
        } else {
            now_symbols + (u - remainder)
        }
    }

    /// Total length of the Contention Access Period, in symbols.
    fn cap_symbols(&self) -> u64 {
        let slot_len =
            self.anchor.superframe_duration_symbols as u64 / SLOTS_PER_SUPERFRAME as u64;
        (self.anchor.final_cap_slot as u64 + 1) * slot_len
    }

    /// Symbols remaining in the CAP as of `now_symbols`. May be
    /// negative (represented as a negative `i64`) once the CAP has
    /// already elapsed; callers must treat `<= 0` as "no time left",
    /// never arm a negative delay.
    pub fn time_left_in_cap_symbols(&self, now_symbols: u64) -> i64 {
        let cap_end = self.anchor.anchor_symbols as i64 + self.cap_symbols() as i64;
        cap_end - now_symbols as i64
    }
}
