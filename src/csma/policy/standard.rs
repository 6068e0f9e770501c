//! Fixed per-priority CW ranges, IEEE 802.15.6-style.
//!
//! Static per-priority range tables that never move, so they are kept
//! as private arrays rather than routed through the shared
//! contention-window table. Serves as the non-adaptive baseline the
//! other variants are compared against.

use super::{PolicyAdapter, PolicyContext};
use crate::backoff;
use crate::PRIORITY_COUNT;

const LO: [u32; PRIORITY_COUNT] = [16, 16, 8, 8, 4, 4, 2, 1];
const HI: [u32; PRIORITY_COUNT] = [64, 32, 32, 16, 16, 8, 8, 4];

/// Fixed `[lo(p), hi(p)]` draws. `on_busy_cca`/`on_tx_success`/
/// `on_tx_failure_no_ack` are all no-ops: "neither collisions nor
/// successes change the ranges".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Standard;

impl Standard {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyAdapter for Standard {
    fn draw_backoff(&mut self, ctx: &mut PolicyContext) -> u32 {
        let p = ctx.priority as usize;
        backoff::uniform(LO[p], HI[p], ctx.rng)
    }

    fn on_busy_cca(&mut self, _ctx: &mut PolicyContext, _collisions: u32) {}

    fn on_tx_success(&mut self, _ctx: &mut PolicyContext) {}

    fn on_tx_failure_no_ack(&mut self, _ctx: &mut PolicyContext) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cw_table::{CwTable, CwTableConfig};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn draws_fall_within_each_priority_fixed_range() {
        let mut policy = Standard::new();
        let mut table = CwTable::new(CwTableConfig::default());
        let mut rng = StdRng::seed_from_u64(9);
        for p in 0..PRIORITY_COUNT as u8 {
            let mut ctx = PolicyContext {
                priority: p,
                cw_table: &mut table,
                rng: &mut rng,
            };
            for _ in 0..200 {
                let b = policy.draw_backoff(&mut ctx);
                assert!((LO[p as usize]..=HI[p as usize]).contains(&b));
            }
        }
    }
}
