//! The asymmetric double-sided two-way ranging formula
//!
//! One ranging attempt produces six timestamps: three captured on the tag's
//! clock (poll sent, response received, final sent) and three on the anchor's
//! clock (poll received, response sent, final received). The asymmetric
//! DS-TWR formula combines them as
//!
//! ```text
//! tof = (round1 * round2 - reply1 * reply2)
//!     / (round1 + round2 + reply1 + reply2)
//! ```
//!
//! which cancels first-order clock-rate offset between the two independently
//! clocked nodes. That is the whole point of spending three messages and six
//! timestamps where a single-sided exchange needs two and four: no clock
//! synchronization is required.
//!
//! Each of the four intervals is a difference of two 40-bit counter values
//! and must be individually rollover-corrected with [`Timestamp::wrap`]
//! before they are combined. Skipping the correction on even one of them
//! corrupts the result silently whenever the exchange straddles a counter
//! rollover (roughly every 17.2 seconds).

use serde::{Deserialize, Serialize};

use crate::time::{Timestamp, METERS_PER_TICK};

/// The six timestamps collected during one ranging attempt
///
/// Created when a poll is sent (tag) or received (anchor), filled in as the
/// exchange progresses, and consumed exactly once by [`compute_range_m`].
/// An exchange is never reused across ranging attempts.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RangingExchange {
    /// When the tag sent the poll, on the tag's clock
    pub poll_sent: Timestamp,
    /// When the anchor received the poll, on the anchor's clock
    pub poll_received: Timestamp,
    /// When the anchor sent the response, on the anchor's clock
    pub response_sent: Timestamp,
    /// When the tag received the response, on the tag's clock
    pub response_received: Timestamp,
    /// When the tag sent the final message, on the tag's clock
    pub final_sent: Timestamp,
    /// When the anchor received the final message, on the anchor's clock
    pub final_received: Timestamp,
}

/// Returned by [`compute_range_m`] when the exchange can't produce a range
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComputeRangeError {
    /// A rollover-corrected interval is still outside the 40-bit range
    ///
    /// The six timestamps cannot have come from a single exchange. The
    /// ranging attempt must be treated as failed.
    InvalidInterval,
    /// All four intervals are zero, so the formula's denominator vanishes
    DegenerateExchange,
}

/// Computes the one-way distance from a completed exchange, in meters
///
/// Applies the asymmetric DS-TWR formula described in the [module
/// documentation](self). The four intervals are each wrapped individually;
/// products and sums are formed exactly in the 128-bit integer domain, and
/// only the final division is done in floating point to keep sub-tick
/// resolution.
///
/// The result is the raw time-of-flight distance. It still carries the
/// receive-power dependent bias; see
/// [`correct_range_m`](crate::range_bias::correct_range_m).
pub fn compute_range_m(exchange: &RangingExchange) -> Result<f64, ComputeRangeError> {
    let round1 = (exchange.response_received - exchange.poll_sent).wrap();
    let reply1 = (exchange.response_sent - exchange.poll_received).wrap();
    let round2 = (exchange.final_received - exchange.response_sent).wrap();
    let reply2 = (exchange.final_sent - exchange.response_received).wrap();

    if !(round1.is_valid() && reply1.is_valid() && round2.is_valid() && reply2.is_valid()) {
        return Err(ComputeRangeError::InvalidInterval);
    }

    let numerator = round1 * round2 - reply1 * reply2;
    let denominator = round1 + round2 + reply1 + reply2;

    if denominator.value() == 0 {
        return Err(ComputeRangeError::DegenerateExchange);
    }

    let tof_ticks = numerator.value() as f64 / denominator.value() as f64;

    Ok(tof_ticks * METERS_PER_TICK)
}
