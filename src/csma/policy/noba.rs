//! Non-Overlapping Backoff Allocation.
//!
//! Draws from the shared contention-window range and, on every second
//! channel-busy event, grows that priority's `sw` by 2. No success
//! feedback, no (m,k) window — those are SW-NOBA's additions.

use super::{noba_common_on_busy_cca, PolicyAdapter, PolicyContext};
use crate::backoff;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Noba;

impl Noba {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyAdapter for Noba {
    fn draw_backoff(&mut self, ctx: &mut PolicyContext) -> u32 {
        let e = ctx.cw_table.entry(ctx.priority);
        backoff::uniform(e.lo, e.hi, ctx.rng)
    }

    fn on_busy_cca(&mut self, ctx: &mut PolicyContext, collisions: u32) {
        noba_common_on_busy_cca(ctx, collisions);
    }

    fn on_tx_success(&mut self, _ctx: &mut PolicyContext) {}

    fn on_tx_failure_no_ack(&mut self, _ctx: &mut PolicyContext) {}
}
