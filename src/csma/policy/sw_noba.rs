//! NOBA with a sliding step-width feedback loop and an (m,k)-firm
//! delivery tracker per source.
//!
//! The collision/success counters are global to a priority across
//! every device running this variant, so they live in a shared
//! `Rc<RefCell<..>>` handle threaded to each device at construction
//! rather than as process-wide statics.

use super::{failure_step_width, noba_common_on_busy_cca, success_step_width};
use super::{PolicyAdapter, PolicyContext};
use crate::backoff;
use crate::mk_window::MkWindow;
use crate::PRIORITY_COUNT;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared per-priority collision/success counters, one instance per
/// simulation, cloned (by `Rc`) into every SW-NOBA (and GNU-NOBA)
/// device.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SwNobaShared {
    collision_count: [u32; PRIORITY_COUNT],
    success_count: [u32; PRIORITY_COUNT],
}

impl SwNobaShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collision_count(&self, priority: u8) -> u32 {
        self.collision_count[priority as usize]
    }

    pub fn success_count(&self, priority: u8) -> u32 {
        self.success_count[priority as usize]
    }

    /// Bumps the success counter without touching `sw` — GNU-NOBA uses
    /// this so the coordinator's per-beacon aggregation is the only
    /// thing that adjusts its window.
    pub fn record_success(&mut self, priority: u8) {
        self.success_count[priority as usize] += 1;
    }
}

pub type SwNobaSharedHandle = Rc<RefCell<SwNobaShared>>;

/// Draws from the shared [`CwTable`](crate::cw_table::CwTable) range,
/// applies NOBA's common busy-CCA rule, and additionally recomputes
/// `sw(p)` from the shared collision/success counters on every
/// transmission result, tracking an [`MkWindow`] per device.
pub struct SwNoba {
    shared: SwNobaSharedHandle,
    mk_window: MkWindow,
    mk_violated: bool,
}

impl SwNoba {
    pub fn new(shared: SwNobaSharedHandle, m: u32, k: u32) -> Self {
        Self {
            shared,
            mk_window: MkWindow::new(m, k),
            mk_violated: false,
        }
    }
}

impl PolicyAdapter for SwNoba {
    fn draw_backoff(&mut self, ctx: &mut PolicyContext) -> u32 {
        let e = ctx.cw_table.entry(ctx.priority);
        backoff::uniform(e.lo, e.hi, ctx.rng)
    }

    fn on_busy_cca(&mut self, ctx: &mut PolicyContext, collisions: u32) {
        noba_common_on_busy_cca(ctx, collisions);
    }

    fn on_tx_success(&mut self, ctx: &mut PolicyContext) {
        self.mk_window.push_outcome(true);
        self.mk_violated = self.mk_window.violates_mk();

        let p = ctx.priority;
        let mut shared = self.shared.borrow_mut();
        shared.success_count[p as usize] += 1;
        // sw/collision_count only move once every three successes; the
        // two in between just build up toward the next reset.
        if shared.success_count[p as usize] < 3 {
            return;
        }
        shared.success_count[p as usize] = 1;
        if shared.collision_count[p as usize] >= 1 {
            shared.collision_count[p as usize] -= 1;
        }
        let c = shared.collision_count[p as usize];
        drop(shared);

        if c == 0 {
            debug!("priority {} collision count recovered, resetting sw to 1", p);
            ctx.cw_table.set_sw(p, 1);
            return;
        }
        let current = ctx.cw_table.entry(p).sw;
        let new_sw = success_step_width(c, current);
        debug!("priority {} recovering sw {} -> {} ({} collisions left)", p, current, new_sw, c);
        ctx.cw_table.set_sw(p, new_sw);
    }

    fn on_tx_failure_no_ack(&mut self, ctx: &mut PolicyContext) {
        let p = ctx.priority;
        let mut shared = self.shared.borrow_mut();
        shared.collision_count[p as usize] += 1;
        shared.success_count[p as usize] = 0;
        let c = shared.collision_count[p as usize];
        drop(shared);

        let current = ctx.cw_table.entry(p).sw;
        let new_sw = failure_step_width(c, current);
        debug!("priority {} widening sw {} -> {} ({} collisions)", p, current, new_sw, c);
        ctx.cw_table.set_sw(p, new_sw);

        self.mk_window.push_outcome(false);
        self.mk_violated = self.mk_window.violates_mk();
    }

    fn mk_violated(&self) -> bool {
        self.mk_violated
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cw_table::{CwTable, CwTableConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ctx<'a>(priority: u8, table: &'a mut CwTable, rng: &'a mut StdRng) -> PolicyContext<'a> {
        PolicyContext {
            priority,
            cw_table: table,
            rng,
        }
    }

    #[test]
    fn recovery_after_failures_then_successes_returns_sw_and_collisions_to_baseline() {
        // Priority 5, 4 consecutive failures, then enough successes to
        // fully recover. Collision count only steps down once every
        // three successes, so undoing 4 collisions takes 12.
        let shared: SwNobaSharedHandle = Rc::new(RefCell::new(SwNobaShared::new()));
        let mut policy = SwNoba::new(Rc::clone(&shared), 6, 10);
        let mut table = CwTable::new(CwTableConfig::default());
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..4 {
            let mut c = ctx(5, &mut table, &mut rng);
            policy.on_tx_failure_no_ack(&mut c);
        }
        assert_eq!(shared.borrow().collision_count(5), 4);

        for _ in 0..12 {
            let mut c = ctx(5, &mut table, &mut rng);
            policy.on_tx_success(&mut c);
        }

        assert_eq!(shared.borrow().collision_count(5), 0);
        assert_eq!(table.entry(5).sw, 1);
    }

    #[test]
    fn mk_violation_fires_once_on_tftftfffff() {
        // priority 0, m=6, k=10, "TFTFTFFFFF". The window
        // starts pre-filled with trues, so the violation trips at the
        // 8th push (index 7), once enough of the initial trues have
        // rolled off -- not necessarily on the sequence's last entry.
        let shared: SwNobaSharedHandle = Rc::new(RefCell::new(SwNobaShared::new()));
        let mut policy = SwNoba::new(shared, 6, 10);
        let mut table = CwTable::new(CwTableConfig::default());
        let mut rng = StdRng::seed_from_u64(12);

        let sequence = [
            true, false, true, false, true, false, false, false, false, false,
        ];
        let mut violated_at = None;
        for (i, outcome) in sequence.iter().enumerate() {
            let mut c = ctx(0, &mut table, &mut rng);
            if *outcome {
                policy.on_tx_success(&mut c);
            } else {
                policy.on_tx_failure_no_ack(&mut c);
            }
            if policy.mk_violated() && violated_at.is_none() {
                violated_at = Some(i);
            }
        }
        assert_eq!(violated_at, Some(7));
    }
}
