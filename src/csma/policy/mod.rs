//! The five CW-adjust-and-draw strategies [`crate::csma::CsmaStateMachine`]
//! delegates to.
//!
//! All five variants override the same handful of points against one
//! shared base — how to draw a backoff count, what a busy CCA does to
//! the contention window, and what a transmission result does to it —
//! which is exactly the shape `PolicyAdapter` generalizes into a trait.

mod beb;
mod gnu_noba;
mod noba;
mod standard;
mod sw_noba;

pub use beb::Beb;
pub use gnu_noba::GnuNoba;
pub use noba::Noba;
pub use standard::Standard;
pub use sw_noba::{SwNoba, SwNobaShared, SwNobaSharedHandle};

use crate::cw_table::CwTable;
use rand_core::RngCore;

/// Borrowed state a [`PolicyAdapter`] call needs: which priority it is
/// acting for, the shared CW table, and a source of randomness. Bundled
/// into one struct so every adapter method has the same shape
/// regardless of whether it touches the table or the RNG.
pub struct PolicyContext<'a> {
    pub priority: u8,
    pub cw_table: &'a mut CwTable,
    pub rng: &'a mut dyn RngCore,
}

/// A pluggable CW-adjustment and backoff-draw strategy.
/// [`crate::csma::CsmaStateMachine`] owns exactly one and never
/// inspects which variant it is.
pub trait PolicyAdapter {
    /// Resets any per-attempt adapter state. Called once at the start
    /// of [`crate::csma::CsmaStateMachine::start`], after the state
    /// machine has cleared its own `collisions` counter.
    fn on_start(&mut self) {}

    /// Draws the backoff count for a fresh or re-armed attempt.
    fn draw_backoff(&mut self, ctx: &mut PolicyContext) -> u32;

    /// Called once per busy or TRX_OFF CCA result, after the state
    /// machine has incremented its own local `collisions` counter.
    /// `collisions` is that counter's new value.
    fn on_busy_cca(&mut self, ctx: &mut PolicyContext, collisions: u32);

    /// Called when an externally-observed ACK arrives for this
    /// device's priority.
    fn on_tx_success(&mut self, ctx: &mut PolicyContext);

    /// Called when an externally-observed ACK timeout occurs.
    fn on_tx_failure_no_ack(&mut self, ctx: &mut PolicyContext);

    /// `true` if the most recent `on_tx_success`/`on_tx_failure_no_ack`
    /// call violated the (m,k)-firm contract. Only SW-NOBA and
    /// GNU-NOBA track an MKWindow; BEB/STANDARD/NOBA never violate.
    fn mk_violated(&self) -> bool {
        false
    }
}

/// `n!` for `n <= 4`, the only domain SW-NOBA's step-width formula ever
/// evaluates — the formula is frozen for collision counts above 4, so
/// it never needs a larger factorial.
pub(crate) fn factorial_u32(n: u32) -> u32 {
    match n {
        0 | 1 => 1,
        2 => 2,
        3 => 6,
        4 => 24,
        _ => unreachable!("SW-NOBA collision count is frozen at c=4"),
    }
}

/// `sw = 2^(c+1) - min(c!, 2^c)` for `c in 1..=4`, `sw = 1` for `c == 0`,
/// frozen (returns `current`) for `c > 4`. SW-NOBA's failure-path step
/// width.
pub(crate) fn failure_step_width(c: u32, current: u32) -> u32 {
    match c {
        0 => 1,
        1..=4 => {
            let pow = 1u32 << (c + 1);
            pow - factorial_u32(c).min(1u32 << c)
        }
        _ => current,
    }
}

/// `sw = 2^c - floor((c-1)!)` for `c in 1..=4`, `sw = 1` for `c == 0`,
/// frozen for `c > 4`. SW-NOBA's success-path step width.
pub(crate) fn success_step_width(c: u32, current: u32) -> u32 {
    match c {
        0 => 1,
        1..=4 => (1u32 << c) - factorial_u32(c - 1),
        _ => current,
    }
}

/// Common NOBA busy-CCA rule shared by NOBA, SW-NOBA and GNU-NOBA: every
/// second collision (`collisions % 2 == 0`) widens `sw(p)` by 2 and
/// re-balances.
pub(crate) fn noba_common_on_busy_cca(ctx: &mut PolicyContext, collisions: u32) {
    if collisions % 2 == 0 {
        let sw = ctx.cw_table.entry(ctx.priority).sw + 2;
        ctx.cw_table.set_sw(ctx.priority, sw);
    }
}
