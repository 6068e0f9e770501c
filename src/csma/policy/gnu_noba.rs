//! SW-NOBA augmented with a coordinator-aggregated beacon-phase
//! re-balance and a Beta-distributed backoff draw tuned by a
//! Distance-Based Priority score.
//!
//! Unlike SW-NOBA, a transmission result here never recomputes `sw`
//! directly — that is the coordinator's job, driven once per beacon by
//! [`crate::aggregator::SuccessAggregator::on_beacon_start`]. A result
//! only ever updates the shared success counter and this device's own
//! Beta shape parameter.

use super::{noba_common_on_busy_cca, PolicyAdapter, PolicyContext};
use crate::backoff;
use crate::csma::policy::sw_noba::SwNobaSharedHandle;
use crate::mk_window::MkWindow;

const BETA: f64 = 1.1;
const ALPHA_MIN: f64 = 0.8;
const ALPHA_MAX: f64 = 1.7;
const ALPHA_INITIAL: f64 = 1.7;
const ALPHA_STEP: f64 = 0.02;
const ALPHA_ON_VIOLATION: f64 = 0.8;

/// Beta-mapped draw with a self-tuning shape parameter `alpha`, plus
/// the shared success counter the coordinator's per-beacon aggregation
/// reads (via [`SwNobaSharedHandle`], the same shared cell SW-NOBA
/// uses — GNU-NOBA only ever *writes* `success_count`, never `sw`
/// directly).
pub struct GnuNoba {
    shared: SwNobaSharedHandle,
    mk_window: MkWindow,
    alpha: f64,
    mk_violated: bool,
}

impl GnuNoba {
    pub fn new(shared: SwNobaSharedHandle, m: u32, k: u32) -> Self {
        Self {
            shared,
            mk_window: MkWindow::new(m, k),
            alpha: ALPHA_INITIAL,
            mk_violated: false,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The low-pass filter driving `alpha` from the window's
    /// Distance-Based Priority.
    fn modify_alpha(&mut self) {
        if self.mk_window.violates_mk() {
            self.mk_violated = true;
            self.alpha = ALPHA_ON_VIOLATION;
            self.mk_window.refill_with_successes();
            return;
        }
        self.mk_violated = false;

        let dbp = self.mk_window.distance_based_priority() as f64;
        let decay = dbp * dbp - dbp;
        let target_alpha = 1.65 - 0.12 * decay;

        self.alpha = if self.alpha < target_alpha {
            (self.alpha + ALPHA_STEP).min(target_alpha)
        } else {
            target_alpha
        };
        self.alpha = self.alpha.clamp(ALPHA_MIN, ALPHA_MAX);
    }
}

impl PolicyAdapter for GnuNoba {
    fn draw_backoff(&mut self, ctx: &mut PolicyContext) -> u32 {
        let e = ctx.cw_table.entry(ctx.priority);
        backoff::beta_mapped(e.lo, e.hi, self.alpha, BETA, ctx.rng)
    }

    fn on_busy_cca(&mut self, ctx: &mut PolicyContext, collisions: u32) {
        noba_common_on_busy_cca(ctx, collisions);
    }

    fn on_tx_success(&mut self, ctx: &mut PolicyContext) {
        self.shared.borrow_mut().record_success(ctx.priority);
        self.mk_window.push_outcome(true);
        self.modify_alpha();
    }

    fn on_tx_failure_no_ack(&mut self, _ctx: &mut PolicyContext) {
        self.mk_window.push_outcome(false);
        self.modify_alpha();
    }

    fn mk_violated(&self) -> bool {
        self.mk_violated
    }
}
