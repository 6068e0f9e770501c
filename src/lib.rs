//! Priority-differentiated slotted CSMA/CA channel access simulation core.
//!
//! Implements the family of slotted CSMA/CA algorithms used by
//! beacon-enabled low-rate WPANs: classical binary exponential backoff
//! (BEB), fixed per-priority ranges (STANDARD), non-overlapping backoff
//! allocation (NOBA) and its sliding-window and coordinator-aggregated
//! descendants (SW-NOBA, GNU-NOBA). The core is PHY- and MAC-agnostic:
//! it consumes CCA results and beacon timing through the traits in
//! [`phy`] and [`mac`], and drives a caller-owned [`scheduler::Scheduler`].

pub mod error;

pub mod clock;

pub mod backoff;

pub mod cw_table;

pub mod mk_window;

pub mod aggregator;

pub mod scheduler;

pub mod phy;

pub mod mac;

pub mod csma;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

/// Number of traffic priorities, 0 (lowest) through 7 (highest).
pub const PRIORITY_COUNT: usize = 8;

/// aUnitBackoffPeriod, the granularity of CSMA/CA waiting, in symbols.
pub const UNIT_BACKOFF_PERIOD_SYMBOLS: u32 = 20;

/// Number of equal slots a superframe is divided into.
pub const SLOTS_PER_SUPERFRAME: u32 = 16;

pub use error::CsmaError;
