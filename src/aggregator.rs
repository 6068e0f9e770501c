//! Per-coordinator aggregation of success counts, driving GNU-NOBA's
//! beacon-phase CW re-balance.
//!
//! One `SuccessAggregator` per coordinator, owned alongside the shared
//! `CwTable`, keeps a short rolling history of per-priority success
//! counts and re-derives each priority's window width at the start of
//! every beacon interval.

use crate::cw_table::CwTable;
use crate::PRIORITY_COUNT;
use log::debug;
use std::collections::VecDeque;

const HISTORY_LEN: usize = 5;
/// Sentinel value seeding the success history so early beacon
/// intervals don't trigger drastic sw shrinkage.
const HISTORY_SENTINEL: u32 = 9999;

/// State-less except for the success counts themselves. Lives with the
/// coordinator device for the entire simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessAggregator {
    success_count: [u32; PRIORITY_COUNT],
    success_history: [VecDeque<u32>; PRIORITY_COUNT],
}

impl Default for SuccessAggregator {
    fn default() -> Self {
        let history = {
            let mut v: VecDeque<u32> = VecDeque::with_capacity(HISTORY_LEN);
            v.extend(std::iter::repeat(HISTORY_SENTINEL).take(HISTORY_LEN));
            v
        };
        Self {
            success_count: [0; PRIORITY_COUNT],
            success_history: std::array::from_fn(|_| history.clone()),
        }
    }
}

impl SuccessAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful transmission observed during the ongoing
    /// beacon interval.
    pub fn record_success(&mut self, priority: u8) {
        self.success_count[priority as usize] += 1;
    }

    pub fn success_count(&self, priority: u8) -> u32 {
        self.success_count[priority as usize]
    }

    /// Runs the per-beacon-start aggregation: computes
    /// `delta(p) = success_count(p) - mean(history(p))` for every
    /// priority, rotates it into the history, resets the running
    /// count, and applies the resulting step widths to `cw_table` via
    /// [`CwTable::apply_aggregated`].
    pub fn on_beacon_start(&mut self, cw_table: &mut CwTable) {
        let rebalance = cw_table.config().gnu_noba_rebalance.clone();
        let mut new_sw = [0u32; PRIORITY_COUNT];

        for p in 0..PRIORITY_COUNT {
            let history = &self.success_history[p];
            let mean: f64 =
                history.iter().map(|v| *v as f64).sum::<f64>() / history.len() as f64;
            let delta = self.success_count[p] as i64 - mean as i64;

            new_sw[p] = rebalance.step_width_for(delta);

            debug_assert_eq!(history.len(), HISTORY_LEN);
            self.success_history[p].pop_front();
            self.success_history[p].push_back(self.success_count[p]);
            debug_assert_eq!(self.success_history[p].len(), HISTORY_LEN);
        }

        debug!("beacon-phase rebalance, new sw widths {:?}", new_sw);
        self.success_count = [0; PRIORITY_COUNT];
        cw_table.apply_aggregated(new_sw);
    }
}
