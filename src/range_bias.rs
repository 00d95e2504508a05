//! Receive-power based range bias correction
//!
//! The distance computed from raw timestamps carries a systematic error that
//! depends on the received signal level, as described in APS011 1.1. This
//! module holds the APS011-derived correction tables as sorted breakpoint
//! sets and applies them by linear interpolation.
//!
//! Which table applies depends on the channel's bandwidth (500 vs 900 MHz)
//! and the pulse repetition frequency. The tables are read-only calibration
//! data; they are never mutated at runtime.

use crate::configs::{PulseRepetitionFrequency, UwbChannel};

/// One calibration breakpoint: receive power to range bias
#[derive(Clone, Copy, Debug)]
pub struct Breakpoint {
    /// Receive signal level, in dBm
    pub power_dbm: f32,
    /// The bias added to the raw distance at this signal level, in millimeters
    pub bias_mm: f32,
}

/// An ordered, immutable set of calibration breakpoints
///
/// Breakpoints are sorted by ascending receive power. Lookups interpolate
/// linearly between the two bracketing breakpoints and clamp to the edge
/// values outside the table's domain; there is no extrapolation.
#[derive(Debug)]
pub struct RangeBiasTable {
    breakpoints: &'static [Breakpoint],
}

/// Floor for corrected distances, in meters
///
/// A corrected distance that comes out at or below zero is clamped to this
/// value. Physical distance cannot be zero or negative, and a literal zero
/// would read as "no signal" downstream.
pub const RANGE_EPSILON_M: f64 = 0.001;

impl RangeBiasTable {
    /// Selects the calibration table for the given radio configuration
    pub fn for_config(
        channel: UwbChannel,
        prf: PulseRepetitionFrequency,
    ) -> &'static RangeBiasTable {
        match (channel.is_narrowband(), prf) {
            (true, PulseRepetitionFrequency::Mhz16) => &PRF16_MHZ500,
            (true, PulseRepetitionFrequency::Mhz64) => &PRF64_MHZ500,
            (false, PulseRepetitionFrequency::Mhz16) => &PRF16_MHZ900,
            (false, PulseRepetitionFrequency::Mhz64) => &PRF64_MHZ900,
        }
    }

    /// Returns the interpolated bias for the given receive power
    ///
    /// Clamps to the first/last breakpoint's bias when the power lies outside
    /// the table.
    pub fn bias_mm(&self, power_dbm: f32) -> f32 {
        // The tables are nonempty compile-time constants, so first/last always
        // exist.
        let first = self.breakpoints.first().unwrap();
        let last = self.breakpoints.last().unwrap();

        if power_dbm <= first.power_dbm {
            return first.bias_mm;
        }
        if power_dbm >= last.power_dbm {
            return last.bias_mm;
        }

        for window in self.breakpoints.windows(2) {
            let (lower, upper) = (window[0], window[1]);
            if power_dbm <= upper.power_dbm {
                let t = (power_dbm - lower.power_dbm) / (upper.power_dbm - lower.power_dbm);
                return lower.bias_mm + t * (upper.bias_mm - lower.bias_mm);
            }
        }

        // Unreachable: power_dbm < last.power_dbm means some window brackets
        // it.
        last.bias_mm
    }
}

/// Applies the bias correction to a raw distance
///
/// Looks up the interpolated bias for the measured receive power under the
/// given radio configuration and adds it to `raw_distance_m`. The result is
/// clamped to [`RANGE_EPSILON_M`] if it would come out at or below zero.
pub fn correct_range_m(
    raw_distance_m: f64,
    rx_power_dbm: f32,
    channel: UwbChannel,
    prf: PulseRepetitionFrequency,
) -> f64 {
    let bias_mm = RangeBiasTable::for_config(channel, prf).bias_mm(rx_power_dbm);
    let corrected = raw_distance_m + bias_mm as f64 / 1000.0;

    if corrected <= 0.0 {
        RANGE_EPSILON_M
    } else {
        corrected
    }
}

macro_rules! breakpoints {
    ($(($power:expr, $bias:expr)),* $(,)?) => {
        &[$(Breakpoint { power_dbm: $power, bias_mm: $bias }),*]
    };
}

/// 500 MHz channels, PRF 16 MHz; values from APS011 1.1
static PRF16_MHZ500: RangeBiasTable = RangeBiasTable {
    breakpoints: breakpoints![
        (-93.0, 110.0),
        (-91.0, 106.0),
        (-89.0, 97.0),
        (-87.0, 84.0),
        (-85.0, 65.0),
        (-83.0, 36.0),
        (-81.0, 0.0),
        (-79.0, -31.0),
        (-77.0, -59.0),
        (-75.0, -84.0),
        (-73.0, -109.0),
        (-71.0, -127.0),
        (-69.0, -143.0),
        (-67.0, -163.0),
        (-65.0, -179.0),
        (-63.0, -187.0),
        (-61.0, -198.0),
    ],
};

/// 500 MHz channels, PRF 64 MHz; values from APS011 1.1
static PRF64_MHZ500: RangeBiasTable = RangeBiasTable {
    breakpoints: breakpoints![
        (-93.0, 81.0),
        (-91.0, 76.0),
        (-89.0, 71.0),
        (-87.0, 62.0),
        (-85.0, 49.0),
        (-83.0, 42.0),
        (-81.0, 35.0),
        (-79.0, 21.0),
        (-77.0, 0.0),
        (-75.0, -27.0),
        (-73.0, -51.0),
        (-71.0, -69.0),
        (-69.0, -82.0),
        (-67.0, -93.0),
        (-65.0, -100.0),
        (-63.0, -105.0),
        (-61.0, -110.0),
    ],
};

/// 900 MHz channels (4 and 7), PRF 16 MHz; values from APS011 1.1
static PRF16_MHZ900: RangeBiasTable = RangeBiasTable {
    breakpoints: breakpoints![
        (-95.0, 394.0),
        (-93.0, 356.0),
        (-91.0, 339.0),
        (-89.0, 321.0),
        (-87.0, 294.0),
        (-85.0, 254.0),
        (-83.0, 210.0),
        (-81.0, 158.0),
        (-79.0, 97.0),
        (-77.0, 42.0),
        (-75.0, 0.0),
        (-73.0, -51.0),
        (-71.0, -95.0),
        (-69.0, -138.0),
        (-67.0, -176.0),
        (-65.0, -210.0),
        (-63.0, -244.0),
        (-61.0, -275.0),
    ],
};

/// 900 MHz channels (4 and 7), PRF 64 MHz; values from APS011 1.1
static PRF64_MHZ900: RangeBiasTable = RangeBiasTable {
    breakpoints: breakpoints![
        (-95.0, 284.0),
        (-93.0, 264.0),
        (-91.0, 245.0),
        (-89.0, 233.0),
        (-87.0, 197.0),
        (-85.0, 175.0),
        (-83.0, 153.0),
        (-81.0, 127.0),
        (-79.0, 91.0),
        (-77.0, 49.0),
        (-75.0, 0.0),
        (-73.0, -58.0),
        (-71.0, -100.0),
        (-69.0, -150.0),
        (-67.0, -199.0),
        (-65.0, -235.0),
        (-63.0, -266.0),
        (-61.0, -295.0),
    ],
};
