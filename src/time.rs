//! Time-related types based on the transceiver's 40-bit system time

use core::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xffffffffff;

/// The counter period of the 40-bit system time, i.e. `TIME_MAX + 1`.
const TIME_MODULUS: i128 = 1 << 40;

/// Duration of one counter tick, in microseconds
///
/// The counter runs at 128 * 499.2 MHz, so one tick is roughly 15.65 ps.
pub const MICROS_PER_TICK: f64 = 0.000015650040064103;

/// Distance light travels during one counter tick, in meters
pub const METERS_PER_TICK: f64 = 0.0046917639786159;

/// A value of the transceiver's wrapping 40-bit clock
///
/// The hardware reports transmit, receive and system timestamps as 40-bit
/// counter values that roll over roughly every 17.2 seconds. This type keeps
/// such a value in a signed 128-bit integer, wide enough that differences can
/// go transiently negative and that products of two differences (up to 80
/// bits) never truncate.
///
/// None of the arithmetic operators normalize their result. Rollover
/// correction is applied explicitly, by calling [`Timestamp::wrap`] on a
/// *difference* at the points where the ranging formula requires it. This
/// matches the hardware semantics: absolute counter values are already on the
/// 40-bit ring, only differences need correction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[repr(C)]
pub struct Timestamp(i128);

impl Timestamp {
    /// Creates a timestamp from a raw 40-bit counter value
    ///
    /// Only the lower 40 bits of `raw` are used; anything above them is
    /// masked off, as the hardware registers only ever hold 40 bits.
    pub fn from_raw(raw: u64) -> Self {
        Timestamp((raw & TIME_MAX) as i128)
    }

    /// Returns the raw 40-bit counter value
    ///
    /// The value is reduced modulo 2^40, so the result always fits the
    /// hardware's delayed-transmit and timestamp registers. Call
    /// [`Timestamp::is_valid`] first if reduction would be a sign of error.
    pub fn to_raw(self) -> u64 {
        self.0.rem_euclid(TIME_MODULUS) as u64
    }

    /// Returns the inner signed tick count
    pub fn value(self) -> i128 {
        self.0
    }

    /// Applies rollover correction to a difference of two timestamps
    ///
    /// Adds the counter period once if the value is negative. This is only
    /// meaningful for the difference of two counter values captured less than
    /// one rollover period (~17.2 s) apart; it is not defined for absolute
    /// timestamps. Idempotent: wrapping an already-wrapped difference changes
    /// nothing.
    pub fn wrap(self) -> Self {
        if self.0 < 0 {
            Timestamp(self.0 + TIME_MODULUS)
        } else {
            self
        }
    }

    /// Returns whether the value lies within the 40-bit counter range
    ///
    /// Validity is advisory: arithmetic never fails, but a wrapped difference
    /// that is still out of range means the captured timestamps cannot have
    /// come from one exchange, and the caller must treat the ranging attempt
    /// as failed.
    pub fn is_valid(self) -> bool {
        self.0 >= 0 && self.0 <= TIME_MAX as i128
    }

    /// Creates a timestamp from a number of nanoseconds
    ///
    /// The counter runs at nominally 64 ticks per nanosecond. Useful for
    /// constructing reply delays.
    pub fn from_nanos(nanos: u32) -> Self {
        Timestamp(nanos as i128 * 64)
    }

    /// Converts the tick count to microseconds
    pub fn as_micros(self) -> f64 {
        self.0 as f64 * MICROS_PER_TICK
    }

    /// Converts the tick count to meters of radio propagation
    ///
    /// This is the speed of light times the tick period.
    pub fn as_meters(self) -> f64 {
        self.0 as f64 * METERS_PER_TICK
    }

    /// Returns the lower 32 bits of the counter value
    ///
    /// This is the 4-octet truncation embedded in the final ranging message.
    pub fn low32(self) -> u32 {
        self.to_raw() as u32
    }
}

impl Add for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Timestamp) -> Self::Output {
        Timestamp(self.0 + rhs.0)
    }
}

impl Sub for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        Timestamp(self.0 - rhs.0)
    }
}

impl Mul for Timestamp {
    type Output = Timestamp;

    fn mul(self, rhs: Timestamp) -> Self::Output {
        Timestamp(self.0 * rhs.0)
    }
}

impl Div for Timestamp {
    type Output = Timestamp;

    fn div(self, rhs: Timestamp) -> Self::Output {
        Timestamp(self.0 / rhs.0)
    }
}

impl Mul<i128> for Timestamp {
    type Output = Timestamp;

    fn mul(self, rhs: i128) -> Self::Output {
        Timestamp(self.0 * rhs)
    }
}

impl Div<i128> for Timestamp {
    type Output = Timestamp;

    fn div(self, rhs: i128) -> Self::Output {
        Timestamp(self.0 / rhs)
    }
}
