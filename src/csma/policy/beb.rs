//! Classical binary exponential backoff.
//!
//! The plain `BE`-escalation baseline every other variant specializes
//! away from. Ignores the shared contention-window table entirely —
//! its range is never consulted.

use super::{PolicyAdapter, PolicyContext};
use crate::backoff;

const MIN_BE: u8 = 3;
const MAX_BE: u8 = 5;

/// Draws uniformly on `[0, 2^BE - 1]`, escalating `BE` by one (capped at
/// [`MAX_BE`]) on every channel-busy event and resetting it to
/// [`MIN_BE`] at the start of each new attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beb {
    be: u8,
}

impl Default for Beb {
    fn default() -> Self {
        Self { be: MIN_BE }
    }
}

impl Beb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PolicyAdapter for Beb {
    fn on_start(&mut self) {
        self.be = MIN_BE;
    }

    fn draw_backoff(&mut self, ctx: &mut PolicyContext) -> u32 {
        let hi = (1u32 << self.be) - 1;
        backoff::uniform(0, hi, ctx.rng)
    }

    fn on_busy_cca(&mut self, _ctx: &mut PolicyContext, _collisions: u32) {
        self.be = (self.be + 1).min(MAX_BE);
    }

    fn on_tx_success(&mut self, _ctx: &mut PolicyContext) {}

    fn on_tx_failure_no_ack(&mut self, _ctx: &mut PolicyContext) {}
}
