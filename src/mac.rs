//! The narrow MAC-facing surface the core consumes and exposes.
//!
//! The external MAC owns beacon timing and transaction bookkeeping; the
//! core only reads from it (`MacContext`) and calls back into it
//! (`CsmaCallbacks`). Splitting those into two small traits keeps the
//! read-only anchors separate from the mutable callback surface.

use crate::clock::BeaconAnchor;

/// Read-only beacon timing and per-transaction facts the core needs
/// from the MAC to run the state machine. Implemented by whatever owns
/// the superframe (a simulated MAC, in tests and in
/// [`crate::sim::Simulation`]).
pub trait MacContext {
    /// `true` if this transmission's destination is the coordinator —
    /// selects the outgoing vs. incoming beacon reference for slot
    /// alignment.
    fn is_coord_destination(&self) -> bool;

    /// `true` if the pending transmission requires an ACK.
    fn is_tx_ack_required(&self) -> bool;

    /// Length of the pending frame, in symbols.
    fn tx_packet_symbols(&self) -> u32;

    /// ACK wait timeout, in symbols.
    fn ack_wait_symbols(&self) -> u32;

    /// Inter-frame spacing, in symbols.
    fn ifs_symbols(&self) -> u32;

    /// The outgoing superframe's beacon anchor (this device's own
    /// beacon transmission).
    fn outgoing_anchor(&self) -> BeaconAnchor;

    /// The incoming superframe's beacon anchor (the coordinator's
    /// beacon, as received by this device).
    fn incoming_anchor(&self) -> BeaconAnchor;
}

/// Outbound signal the core reports to the MAC once CSMA/CA resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacStateSignal {
    /// The channel was acquired; the MAC may transmit immediately.
    ChannelIdle,
    /// There was not enough time left in the CAP; retry next superframe.
    Deferred,
}

/// Callbacks the core drives on the MAC. All have a sensible no-op
/// default except `mac_state_callback`, which must fire exactly once
/// per `Start()`.
pub trait CsmaCallbacks {
    /// Reports the CSMA/CA outcome for the current attempt.
    fn mac_state_callback(&mut self, state: MacStateSignal);

    /// Optional: reports the estimated total transaction cost (2 CCA +
    /// frame + turnaround/ACK + IFS), in symbols, before the final CCA
    /// request.
    fn trans_cost_callback(&mut self, _symbols: u32) {}

    /// Observability trace: a channel-busy collision occurred for
    /// `priority`, and the device's local collision counter is now
    /// `count`. Informational only, never an error.
    fn collision_trace(&mut self, _priority: u8, _count: u32) {}

    /// Observability trace: the (m,k)-firm contract was violated for
    /// `priority`. Informational only, never an error.
    fn mk_violation_trace(&mut self, _priority: u8) {}
}
