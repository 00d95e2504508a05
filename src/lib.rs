//! Double-sided two-way ranging on DW1000-class UWB transceivers
//!
//! This crate implements the protocol and arithmetic of an asymmetric DS-TWR
//! ranging exchange: the 40-bit rollover-safe timestamp type ([`time`]), the
//! range computation and its receive-power bias correction ([`ranging`],
//! [`range_bias`]), the wire format of the six ranging frames ([`frame`]),
//! and the blocking tag/anchor state machines that drive an exchange end to
//! end ([`session`]).
//!
//! The register-level chip driver is deliberately not part of this crate;
//! everything the sessions need from the radio is behind the
//! [`Transceiver`] trait.

#![no_std]
#![deny(missing_docs)]

#[cfg(test)]
extern crate std;

pub mod configs;
pub mod frame;
pub mod range_bias;
pub mod ranging;
pub mod session;
pub mod time;
pub mod transceiver;

pub use ieee802154::mac;

pub use crate::configs::{PulseRepetitionFrequency, UwbChannel};
pub use crate::frame::{Frame, FunctionCode};
pub use crate::range_bias::correct_range_m;
pub use crate::ranging::{compute_range_m, RangingExchange};
pub use crate::session::{
    AnchorSession, Error, RangeReport, RangingDirective, TagConfig, TagOutcome, TagSession,
};
pub use crate::time::{Timestamp, TIME_MAX};
pub use crate::transceiver::{EventSink, Transceiver};
