//! The shared, process-wide contention-window (CW) range table.
//!
//! `CwTable` is deliberately a single shared table rather than a
//! per-device value — every device in a simulation sees the same
//! snapshot, mutated only by the single-threaded event loop.

use crate::PRIORITY_COUNT;
use log::{debug, trace};

/// Per-priority contention window range, step width and hard ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CwEntry {
    pub lo: u32,
    pub hi: u32,
    pub sw: u32,
    pub wl: u32,
}

/// Thresholds and step-width ladder GNU-NOBA's per-beacon aggregation
/// picks from. The `delta > {10,8,4,2}` / `SW = {1,2,6,12,20}` ladder
/// has no principled derivation, so it is exposed as a tunable default
/// rather than a hard-coded constant.
#[derive(Debug, Clone, PartialEq)]
pub struct GnuNobaRebalanceTable {
    /// Descending delta thresholds, e.g. `[10, 8, 4, 2]`.
    pub thresholds: [i64; 4],
    /// Step widths for `delta > thresholds[i]`, plus one trailing
    /// value for `delta` below every threshold. Length 5.
    pub step_widths: [u32; 5],
}

impl Default for GnuNobaRebalanceTable {
    fn default() -> Self {
        Self {
            thresholds: [10, 8, 4, 2],
            step_widths: [1, 2, 6, 12, 20],
        }
    }
}

impl GnuNobaRebalanceTable {
    /// Picks the step width for a given aggregated success delta.
    pub fn step_width_for(&self, delta: i64) -> u32 {
        for (threshold, width) in self.thresholds.iter().zip(self.step_widths.iter()) {
            if delta > *threshold {
                return *width;
            }
        }
        *self.step_widths.last().unwrap()
    }
}

/// Shared configuration for a [`CwTable`]: the hard ceiling ladder and
/// the (m,k) defaults per priority.
#[derive(Debug, Clone, PartialEq)]
pub struct CwTableConfig {
    /// Hard upper bound `wl(p)` indexed by priority `0..8`.
    pub wl: [u32; PRIORITY_COUNT],
    /// `m` of the (m,k)-firm contract, indexed by priority.
    pub tp_m: [u32; PRIORITY_COUNT],
    /// `k` (window length) of the (m,k)-firm contract, indexed by priority.
    pub tp_k: [u32; PRIORITY_COUNT],
    pub gnu_noba_rebalance: GnuNobaRebalanceTable,
}

impl Default for CwTableConfig {
    fn default() -> Self {
        Self {
            wl: [64, 60, 56, 52, 46, 38, 28, 16],
            tp_m: [6, 6, 7, 7, 8, 8, 9, 10],
            tp_k: [10; PRIORITY_COUNT],
            gnu_noba_rebalance: GnuNobaRebalanceTable::default(),
        }
    }
}

impl CwTableConfig {
    /// WL ladder used by GNU-NOBA's coordinator-driven aggregation
    /// (`{64, 56, 48, 40, 32, 24, 16, 10}`), distinct from the
    /// NOBA/SW-NOBA ladder returned by [`Self::default`].
    pub fn gnu_noba_defaults() -> Self {
        Self {
            wl: [64, 56, 48, 40, 32, 24, 16, 10],
            ..Self::default()
        }
    }
}

/// The shared contention-window range table.
#[derive(Debug, Clone, PartialEq)]
pub struct CwTable {
    entries: [CwEntry; PRIORITY_COUNT],
    config: CwTableConfig,
}

impl CwTable {
    /// Builds a fresh table with `sw(p) = 1` for all `p`, then
    /// rebalances eagerly so the table is consistent before any
    /// traffic starts.
    pub fn new(config: CwTableConfig) -> Self {
        let entries = [CwEntry { lo: 1, hi: 1, sw: 1, wl: 1 }; PRIORITY_COUNT];
        let mut table = Self { entries, config };
        table.reset_default_widths();
        table
    }

    pub fn entry(&self, priority: u8) -> CwEntry {
        self.entries[priority as usize]
    }

    pub fn config(&self) -> &CwTableConfig {
        &self.config
    }

    /// Sets `sw(p)` and rebalances the whole table.
    pub fn set_sw(&mut self, priority: u8, new_sw: u32) {
        debug!("priority {} sw {} -> {}", priority, self.entries[priority as usize].sw, new_sw);
        self.entries[priority as usize].sw = new_sw;
        self.rebalance();
    }

    /// Resets every `sw(p)` to 1 and rebalances — the table's initial
    /// state.
    pub fn reset_default_widths(&mut self) {
        debug!("resetting all sw widths to 1");
        for p in 0..PRIORITY_COUNT {
            self.entries[p].sw = 1;
            self.entries[p].wl = self.config.wl[p];
        }
        self.rebalance();
    }

    /// GNU-NOBA's per-beacon re-allocation: applies a caller-computed
    /// step width per priority (already chosen from
    /// [`GnuNobaRebalanceTable::step_width_for`]) and rebalances.
    pub fn apply_aggregated(&mut self, new_sw: [u32; PRIORITY_COUNT]) {
        debug!("applying aggregated sw widths {:?}", new_sw);
        for p in 0..PRIORITY_COUNT {
            self.entries[p].sw = new_sw[p];
        }
        self.rebalance();
    }

    /// `hi(p) = min(lo(p) + sw(p), wl(p))`, then `lo(p-1) = hi(p) + 1`,
    /// applied top-down from `p = P-1` to `0`. `lo(P-1)` is pinned to 1.
    fn rebalance(&mut self) {
        let last = PRIORITY_COUNT - 1;
        self.entries[last].lo = 1;
        self.entries[last].hi = (self.entries[last].lo + self.entries[last].sw)
            .min(self.entries[last].wl);

        for p in (0..last).rev() {
            self.entries[p].lo = self.entries[p + 1].hi + 1;
            self.entries[p].hi = (self.entries[p].lo + self.entries[p].sw).min(self.entries[p].wl);
        }

        debug_assert_eq!(self.entries[last].lo, 1);
        for p in 0..PRIORITY_COUNT {
            debug_assert!(self.entries[p].lo <= self.entries[p].hi);
            debug_assert!(self.entries[p].hi <= self.entries[p].wl);
        }
        for p in 0..last {
            debug_assert!(self.entries[p + 1].hi < self.entries[p].lo);
        }
        trace!("rebalanced: {:?}", self.entries);
    }
}
