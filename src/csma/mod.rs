//! The generic slotted CSMA/CA control flow every variant shares,
//! parameterized over a [`policy::PolicyAdapter`].
//!
//! `Idle -> WaitSlot -> CountDown -> ReqCca -> ...`, driven off the
//! [`crate::scheduler::Scheduler`] rather than per-tick polling. The
//! actual backoff-draw and CW-adjust rules are factored out into
//! [`policy::PolicyAdapter`] so one state machine body serves all five
//! algorithm variants.

pub mod policy;

use crate::clock::SlotClock;
use crate::cw_table::CwTable;
use crate::mac::{CsmaCallbacks, MacContext, MacStateSignal};
use crate::phy::{CcaStatus, PhyChannel};
use crate::scheduler::{EventId, Scheduler, SimTime};
use crate::{CsmaError, PRIORITY_COUNT, UNIT_BACKOFF_PERIOD_SYMBOLS};
use log::{debug, trace, warn};
use policy::{PolicyAdapter, PolicyContext};
use rand_core::RngCore;

/// Identifies which device a scheduled [`CsmaTimerEvent`] belongs to.
/// A plain index into whatever collection the caller (typically
/// [`crate::sim::Simulation`]) keeps its devices in.
pub type DeviceId = usize;

/// The two kinds of timer this state machine ever arms. Request-CCA
/// and can-proceed are not separately scheduled: they run synchronously
/// off the back of a fired `BackoffTick`, since nothing suspends
/// between "backoff period elapsed" and "decide whether to ask the PHY
/// for a CCA".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsmaTimerKind {
    /// Fires at the next backoff-period boundary after `Start()`.
    AlignToSlot,
    /// Fires one backoff period after a backoff count was drawn (or
    /// re-drawn), whether that's the first wait of an attempt or the
    /// re-arm after an idle CCA that still has backoff remaining.
    BackoffTick,
}

/// Payload scheduled on the shared [`Scheduler`] for a CSMA/CA timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsmaTimerEvent {
    pub device: DeviceId,
    pub kind: CsmaTimerKind,
}

/// The scheduler type this core drives: one queue, shared by every
/// device in a simulation.
pub type CsmaScheduler = Scheduler<CsmaTimerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CsmaState {
    Idle,
    WaitSlot,
    CountDown,
    ReqCca,
}

/// Per-device CSMA/CA state plus the policy it delegates backoff draws
/// and CW adjustments to.
///
/// At most one timer is ever outstanding for a device at a time: the
/// state diagram is strictly sequential, so a single `pending_event`
/// slot satisfies the "at most one of {backoff, cca, can-proceed,
/// end-cap} scheduled" ordering guarantee by construction rather than
/// by bookkeeping four separate slots.
#[derive(Debug)]
pub struct CsmaStateMachine<P: PolicyAdapter> {
    device_id: DeviceId,
    priority: u8,
    target_is_coord: bool,
    policy: P,

    state: CsmaState,
    backoff_count: u32,
    collisions: u32,
    cca_pending: bool,
    pending_event: Option<EventId>,
}

impl<P: PolicyAdapter> CsmaStateMachine<P> {
    pub fn new(
        device_id: DeviceId,
        priority: u8,
        target_is_coord: bool,
        policy: P,
    ) -> Result<Self, CsmaError> {
        if priority as usize >= PRIORITY_COUNT {
            return Err(CsmaError::PriorityOutOfRange(priority));
        }
        Ok(Self {
            device_id,
            priority,
            target_is_coord,
            policy,
            state: CsmaState::Idle,
            backoff_count: 0,
            collisions: 0,
            cca_pending: false,
            pending_event: None,
        })
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn collisions(&self) -> u32 {
        self.collisions
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, CsmaState::Idle)
    }

    fn slot_clock(&self, mac: &impl MacContext, phy: &impl PhyChannel) -> SlotClock {
        let anchor = if self.target_is_coord {
            mac.outgoing_anchor()
        } else {
            mac.incoming_anchor()
        };
        SlotClock::new(anchor, phy.symbol_rate())
    }

    fn cancel_pending(&mut self, scheduler: &mut CsmaScheduler) {
        if let Some(id) = self.pending_event.take() {
            scheduler.cancel(id);
        }
    }

    fn arm(&mut self, scheduler: &mut CsmaScheduler, at: SimTime, kind: CsmaTimerKind) {
        debug_assert!(self.pending_event.is_none());
        let id = scheduler.schedule(
            at,
            CsmaTimerEvent {
                device: self.device_id,
                kind,
            },
        );
        self.pending_event = Some(id);
    }

    /// `IDLE -> WAIT_SLOT`. Clears the local collision counter (never
    /// the shared CwTable) and arms the next slot-boundary timer.
    pub fn start(
        &mut self,
        scheduler: &mut CsmaScheduler,
        mac: &impl MacContext,
        phy: &impl PhyChannel,
    ) {
        self.cancel_pending(scheduler);
        self.collisions = 0;
        self.cca_pending = false;
        self.policy.on_start();

        let now = scheduler.now();
        let clock = self.slot_clock(mac, phy);
        let at = clock.next_slot_boundary(now);
        debug!(
            "device {} priority {} starting, aligning to slot at {}",
            self.device_id, self.priority, at
        );
        self.state = CsmaState::WaitSlot;
        self.arm(scheduler, at, CsmaTimerKind::AlignToSlot);
    }

    /// Cancels every timer this device holds and instructs the PHY to
    /// abort any outstanding CCA. Idempotent; safe to call from any
    /// state, including `IDLE`.
    pub fn cancel(&mut self, scheduler: &mut CsmaScheduler, phy: &mut impl PhyChannel) {
        trace!("device {} cancel requested, state {:?}", self.device_id, self.state);
        self.cancel_pending(scheduler);
        if self.cca_pending {
            phy.cancel_cca();
            self.cca_pending = false;
        }
        self.state = CsmaState::Idle;
    }

    /// Dispatches a timer previously armed for this device.
    #[allow(clippy::too_many_arguments)]
    pub fn on_timer(
        &mut self,
        kind: CsmaTimerKind,
        scheduler: &mut CsmaScheduler,
        cw_table: &mut CwTable,
        mac: &impl MacContext,
        phy: &mut impl PhyChannel,
        callbacks: &mut impl CsmaCallbacks,
        rng: &mut dyn RngCore,
    ) {
        self.pending_event = None;
        match kind {
            CsmaTimerKind::AlignToSlot => {
                self.draw_and_arm(scheduler, cw_table, mac, phy, callbacks, rng)
            }
            CsmaTimerKind::BackoffTick => {
                self.check_proceed(scheduler, cw_table, mac, phy, callbacks, rng)
            }
        }
    }

    /// `DRAW_BACKOFF`: draws a fresh backoff count. `COUNT_DOWN` if it's
    /// nonzero (the common case), straight to `CHECK_PROCEED` in the
    /// degenerate zero-draw case.
    #[allow(clippy::too_many_arguments)]
    fn draw_and_arm(
        &mut self,
        scheduler: &mut CsmaScheduler,
        cw_table: &mut CwTable,
        mac: &impl MacContext,
        phy: &mut impl PhyChannel,
        callbacks: &mut impl CsmaCallbacks,
        rng: &mut dyn RngCore,
    ) {
        self.backoff_count = {
            let mut ctx = PolicyContext {
                priority: self.priority,
                cw_table,
                rng,
            };
            self.policy.draw_backoff(&mut ctx)
        };
        trace!("device {} drew backoff count {}", self.device_id, self.backoff_count);

        if self.backoff_count == 0 {
            self.check_proceed(scheduler, cw_table, mac, phy, callbacks, rng);
            return;
        }

        self.state = CsmaState::CountDown;
        let now = scheduler.now();
        self.arm(
            scheduler,
            now + UNIT_BACKOFF_PERIOD_SYMBOLS as u64,
            CsmaTimerKind::BackoffTick,
        );
    }

    /// `CHECK_PROCEED`: defers unless the whole remaining transaction
    /// (the CCA-gated packet, its ACK wait, and the trailing IFS) still
    /// fits in the CAP, otherwise issues the next CCA request.
    #[allow(clippy::too_many_arguments)]
    fn check_proceed(
        &mut self,
        scheduler: &mut CsmaScheduler,
        _cw_table: &mut CwTable,
        mac: &impl MacContext,
        phy: &mut impl PhyChannel,
        callbacks: &mut impl CsmaCallbacks,
        _rng: &mut dyn RngCore,
    ) {
        let clock = self.slot_clock(mac, phy);
        let now = scheduler.now();

        let ack = if mac.is_tx_ack_required() {
            mac.ack_wait_symbols()
        } else {
            0
        };
        let cost = mac.tx_packet_symbols() + ack + mac.ifs_symbols();

        if clock.time_left_in_cap_symbols(now) <= cost as i64 {
            debug!(
                "device {} deferring, {} symbols left in CAP but transaction costs {}",
                self.device_id,
                clock.time_left_in_cap_symbols(now),
                cost
            );
            self.state = CsmaState::Idle;
            callbacks.mac_state_callback(MacStateSignal::Deferred);
            return;
        }

        self.state = CsmaState::ReqCca;
        if self.backoff_count == 1 {
            callbacks.trans_cost_callback(cost);
        }
        self.cca_pending = true;
        phy.request_cca();
    }

    /// `REQ_CCA`'s result transition: decrements and re-arms on idle,
    /// reports channel-idle once the backoff is exhausted, or freezes
    /// and re-draws on a busy/TRX_OFF result.
    #[allow(clippy::too_many_arguments)]
    pub fn plme_cca_confirm(
        &mut self,
        status: CcaStatus,
        scheduler: &mut CsmaScheduler,
        cw_table: &mut CwTable,
        mac: &impl MacContext,
        phy: &mut impl PhyChannel,
        callbacks: &mut impl CsmaCallbacks,
        rng: &mut dyn RngCore,
    ) {
        if !self.cca_pending {
            // Spurious: the MAC cancelled after the PHY had already
            // launched the request. Silently discarded.
            return;
        }
        self.cca_pending = false;

        match status {
            CcaStatus::Idle => {
                // Saturating: a degenerate zero draw reaches here with
                // `backoff_count` already 0 (see `draw_and_arm`), and
                // one confirming CCA is enough to resolve it.
                self.backoff_count = self.backoff_count.saturating_sub(1);
                if self.backoff_count == 0 {
                    debug!("device {} channel idle, proceeding to transmit", self.device_id);
                    self.state = CsmaState::Idle;
                    callbacks.mac_state_callback(MacStateSignal::ChannelIdle);
                } else {
                    self.state = CsmaState::CountDown;
                    let now = scheduler.now();
                    self.arm(
                        scheduler,
                        now + UNIT_BACKOFF_PERIOD_SYMBOLS as u64,
                        CsmaTimerKind::BackoffTick,
                    );
                }
            }
            CcaStatus::Busy | CcaStatus::TrxOff => {
                self.collisions += 1;
                warn!(
                    "device {} priority {} cca busy, collision {}",
                    self.device_id, self.priority, self.collisions
                );
                {
                    let mut ctx = PolicyContext {
                        priority: self.priority,
                        cw_table,
                        rng,
                    };
                    self.policy.on_busy_cca(&mut ctx, self.collisions);
                }
                callbacks.collision_trace(self.priority, self.collisions);
                self.draw_and_arm(scheduler, cw_table, mac, phy, callbacks, rng);
            }
        }
    }

    /// Driven externally once an ACK arrives for this device's
    /// priority. Not part of the per-attempt CCA chain; forwarded
    /// straight to the policy.
    pub fn on_tx_success(
        &mut self,
        cw_table: &mut CwTable,
        rng: &mut dyn RngCore,
        callbacks: &mut impl CsmaCallbacks,
    ) {
        let mut ctx = PolicyContext {
            priority: self.priority,
            cw_table,
            rng,
        };
        self.policy.on_tx_success(&mut ctx);
        if self.policy.mk_violated() {
            warn!("device {} priority {} (m,k)-firm contract violated", self.device_id, self.priority);
            callbacks.mk_violation_trace(self.priority);
        }
    }

    /// Driven externally on an ACK-wait timeout for this device's
    /// priority.
    pub fn on_tx_failure_no_ack(
        &mut self,
        cw_table: &mut CwTable,
        rng: &mut dyn RngCore,
        callbacks: &mut impl CsmaCallbacks,
    ) {
        let mut ctx = PolicyContext {
            priority: self.priority,
            cw_table,
            rng,
        };
        self.policy.on_tx_failure_no_ack(&mut ctx);
        if self.policy.mk_violated() {
            warn!("device {} priority {} (m,k)-firm contract violated", self.device_id, self.priority);
            callbacks.mk_violation_trace(self.priority);
        }
    }
}

#[cfg(test)]
mod test {
    use super::policy::Beb;
    use super::*;
    use crate::clock::BeaconAnchor;
    use crate::cw_table::CwTableConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;

    struct FakeMac {
        anchor: BeaconAnchor,
        ack_required: bool,
    }

    impl MacContext for FakeMac {
        fn is_coord_destination(&self) -> bool {
            true
        }
        fn is_tx_ack_required(&self) -> bool {
            self.ack_required
        }
        fn tx_packet_symbols(&self) -> u32 {
            100
        }
        fn ack_wait_symbols(&self) -> u32 {
            50
        }
        fn ifs_symbols(&self) -> u32 {
            10
        }
        fn outgoing_anchor(&self) -> BeaconAnchor {
            self.anchor
        }
        fn incoming_anchor(&self) -> BeaconAnchor {
            self.anchor
        }
    }

    #[derive(Default)]
    struct FakePhy {
        cca_requests: u32,
        cancelled: u32,
        symbol_rate: u32,
    }

    impl PhyChannel for FakePhy {
        fn request_cca(&mut self) {
            self.cca_requests += 1;
        }
        fn cancel_cca(&mut self) {
            self.cancelled += 1;
        }
        fn symbol_rate(&self) -> u32 {
            self.symbol_rate
        }
    }

    #[derive(Default)]
    struct FakeCallbacks {
        states: RefCell<Vec<MacStateSignal>>,
        collisions: RefCell<Vec<(u8, u32)>>,
        mk_violations: RefCell<Vec<u8>>,
    }

    impl CsmaCallbacks for FakeCallbacks {
        fn mac_state_callback(&mut self, state: MacStateSignal) {
            self.states.borrow_mut().push(state);
        }
        fn collision_trace(&mut self, priority: u8, count: u32) {
            self.collisions.borrow_mut().push((priority, count));
        }
        fn mk_violation_trace(&mut self, priority: u8) {
            self.mk_violations.borrow_mut().push(priority);
        }
    }

    fn full_superframe_mac() -> FakeMac {
        FakeMac {
            anchor: BeaconAnchor {
                anchor_symbols: 0,
                superframe_duration_symbols: 16 * 60,
                final_cap_slot: 15,
            },
            ack_required: true,
        }
    }

    /// A policy that always draws the same backoff count and never
    /// adjusts anything, so a test can know the exact number of CCA
    /// requests a channel-idle run must issue.
    struct ConstDraw(u32);

    impl PolicyAdapter for ConstDraw {
        fn draw_backoff(&mut self, _ctx: &mut PolicyContext) -> u32 {
            self.0
        }
        fn on_busy_cca(&mut self, _ctx: &mut PolicyContext, _collisions: u32) {}
        fn on_tx_success(&mut self, _ctx: &mut PolicyContext) {}
        fn on_tx_failure_no_ack(&mut self, _ctx: &mut PolicyContext) {}
    }

    /// Drives `Start()` through CCA confirms until the device reports
    /// a result, always confirming `IDLE`.
    fn run_to_channel_idle<P: PolicyAdapter>(
        sm: &mut CsmaStateMachine<P>,
        scheduler: &mut CsmaScheduler,
        cw_table: &mut CwTable,
        mac: &FakeMac,
        phy: &mut FakePhy,
        callbacks: &mut FakeCallbacks,
        rng: &mut StdRng,
    ) {
        sm.start(scheduler, mac, phy);
        loop {
            let Some((_, event)) = scheduler.step() else {
                break;
            };
            sm.on_timer(event.kind, scheduler, cw_table, mac, phy, callbacks, rng);
            if sm.cca_pending {
                sm.plme_cca_confirm(CcaStatus::Idle, scheduler, cw_table, mac, phy, callbacks, rng);
            }
            if !callbacks.states.borrow().is_empty() {
                break;
            }
        }
    }

    #[test]
    fn channel_idle_fires_exactly_once_when_every_cca_is_idle() {
        let mut sm = CsmaStateMachine::new(0, 0, true, Beb::new()).unwrap();
        let mut scheduler = CsmaScheduler::new();
        let mut cw_table = CwTable::new(CwTableConfig::default());
        let mac = full_superframe_mac();
        let mut phy = FakePhy {
            symbol_rate: 62500,
            ..Default::default()
        };
        let mut callbacks = FakeCallbacks::default();
        let mut rng = StdRng::seed_from_u64(1);

        run_to_channel_idle(
            &mut sm,
            &mut scheduler,
            &mut cw_table,
            &mac,
            &mut phy,
            &mut callbacks,
            &mut rng,
        );

        assert_eq!(
            callbacks.states.borrow().as_slice(),
            [MacStateSignal::ChannelIdle]
        );
        assert!(sm.is_idle());
    }

    #[test]
    fn cca_request_count_matches_the_drawn_backoff_count() {
        // Every idle CCA decrements the backoff count by exactly one,
        // so a channel-idle run issues exactly as many CCA requests as
        // the drawn backoff count.
        let mut sm = CsmaStateMachine::new(0, 0, true, ConstDraw(4)).unwrap();
        let mut scheduler = CsmaScheduler::new();
        let mut cw_table = CwTable::new(CwTableConfig::default());
        let mac = full_superframe_mac();
        let mut phy = FakePhy {
            symbol_rate: 62500,
            ..Default::default()
        };
        let mut callbacks = FakeCallbacks::default();
        let mut rng = StdRng::seed_from_u64(1);

        run_to_channel_idle(
            &mut sm,
            &mut scheduler,
            &mut cw_table,
            &mac,
            &mut phy,
            &mut callbacks,
            &mut rng,
        );

        assert_eq!(phy.cca_requests, 4);
    }

    #[test]
    fn defers_when_no_time_left_in_cap_and_issues_no_cca() {
        let mut sm = CsmaStateMachine::new(0, 0, true, Beb::new()).unwrap();
        let mut scheduler = CsmaScheduler::new();
        let mut cw_table = CwTable::new(CwTableConfig::default());
        // CAP ends at symbol 15 -- the very first backoff tick already
        // runs past it for any nonzero draw, and even a zero draw lands
        // exactly on the boundary.
        let mac = FakeMac {
            anchor: BeaconAnchor {
                anchor_symbols: 0,
                superframe_duration_symbols: 16,
                final_cap_slot: 0,
            },
            ack_required: true,
        };
        let mut phy = FakePhy {
            symbol_rate: 62500,
            ..Default::default()
        };
        let mut callbacks = FakeCallbacks::default();
        let mut rng = StdRng::seed_from_u64(2);

        sm.start(&mut scheduler, &mac, &phy);
        while let Some((_, event)) = scheduler.step() {
            sm.on_timer(
                event.kind,
                &mut scheduler,
                &mut cw_table,
                &mac,
                &mut phy,
                &mut callbacks,
                &mut rng,
            );
            if !callbacks.states.borrow().is_empty() {
                break;
            }
        }

        assert_eq!(callbacks.states.borrow().as_slice(), [MacStateSignal::Deferred]);
        assert_eq!(phy.cca_requests, 0);
    }

    #[test]
    fn defers_when_time_left_is_shorter_than_the_whole_transaction() {
        // time_left_in_cap_symbols = 15, tx_packet_symbols = 120: the CAP
        // has time left, but not enough to fit the transaction, so this
        // must still defer rather than request a CCA.
        struct ShortCapMac {
            anchor: BeaconAnchor,
        }
        impl MacContext for ShortCapMac {
            fn is_coord_destination(&self) -> bool {
                true
            }
            fn is_tx_ack_required(&self) -> bool {
                false
            }
            fn tx_packet_symbols(&self) -> u32 {
                120
            }
            fn ack_wait_symbols(&self) -> u32 {
                0
            }
            fn ifs_symbols(&self) -> u32 {
                0
            }
            fn outgoing_anchor(&self) -> BeaconAnchor {
                self.anchor
            }
            fn incoming_anchor(&self) -> BeaconAnchor {
                self.anchor
            }
        }

        let mut sm = CsmaStateMachine::new(0, 0, true, ConstDraw(1)).unwrap();
        let mut scheduler = CsmaScheduler::new();
        let mut cw_table = CwTable::new(CwTableConfig::default());
        // A backoff count of 1 counts down one full unit backoff period
        // (20 symbols) before CHECK_PROCEED runs, so the CAP is sized so
        // time_left_in_cap_symbols at that point (symbol 20) is exactly
        // 15: slot_len = 560 / 16 = 35, cap = (0+1)*35 = 35, 35 - 20 = 15.
        let mac = ShortCapMac {
            anchor: BeaconAnchor {
                anchor_symbols: 0,
                superframe_duration_symbols: 560,
                final_cap_slot: 0,
            },
        };
        let mut phy = FakePhy {
            symbol_rate: 62500,
            ..Default::default()
        };
        let mut callbacks = FakeCallbacks::default();
        let mut rng = StdRng::seed_from_u64(4);

        sm.start(&mut scheduler, &mac, &phy);
        while let Some((_, event)) = scheduler.step() {
            sm.on_timer(
                event.kind,
                &mut scheduler,
                &mut cw_table,
                &mac,
                &mut phy,
                &mut callbacks,
                &mut rng,
            );
            if !callbacks.states.borrow().is_empty() {
                break;
            }
        }

        assert_eq!(callbacks.states.borrow().as_slice(), [MacStateSignal::Deferred]);
        assert_eq!(phy.cca_requests, 0);
    }

    #[test]
    fn cancel_twice_is_idempotent_and_leaves_no_scheduled_events() {
        let mut sm = CsmaStateMachine::new(0, 0, true, Beb::new()).unwrap();
        let mut scheduler = CsmaScheduler::new();
        let mac = full_superframe_mac();
        let mut phy = FakePhy {
            symbol_rate: 62500,
            ..Default::default()
        };

        sm.start(&mut scheduler, &mac, &phy);
        assert!(!scheduler.is_empty());

        sm.cancel(&mut scheduler, &mut phy);
        assert!(scheduler.is_empty());
        assert!(sm.is_idle());

        sm.cancel(&mut scheduler, &mut phy);
        assert!(scheduler.is_empty());
        assert!(sm.is_idle());
    }

    #[test]
    fn spurious_cca_confirm_while_not_pending_is_discarded() {
        let mut sm = CsmaStateMachine::new(0, 0, true, Beb::new()).unwrap();
        let mut scheduler = CsmaScheduler::new();
        let mut cw_table = CwTable::new(CwTableConfig::default());
        let mac = full_superframe_mac();
        let mut phy = FakePhy {
            symbol_rate: 62500,
            ..Default::default()
        };
        let mut callbacks = FakeCallbacks::default();
        let mut rng = StdRng::seed_from_u64(3);

        // Never started: cca_pending is false.
        sm.plme_cca_confirm(
            CcaStatus::Idle,
            &mut scheduler,
            &mut cw_table,
            &mac,
            &mut phy,
            &mut callbacks,
            &mut rng,
        );
        assert!(callbacks.states.borrow().is_empty());
        assert!(sm.is_idle());
    }

    #[test]
    fn construction_rejects_out_of_range_priority() {
        let err = CsmaStateMachine::new(0, 8, true, Beb::new()).unwrap_err();
        assert_eq!(err, CsmaError::PriorityOutOfRange(8));
    }
}
