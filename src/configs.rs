//! Radio configuration parameters that affect ranging
//!
//! Only the parameters the ranging core actually consumes live here: the UWB
//! channel and the pulse repetition frequency together select the
//! range-bias correction table. Everything else about the radio setup
//! (bitrate, preamble, SFD, tuning) belongs to the chip driver behind the
//! [`Transceiver`] trait.
//!
//! [`Transceiver`]: ../transceiver/trait.Transceiver.html

/// An enum that specifies which UWB channel the radio is operating on
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UwbChannel {
    /// Channel 1
    /// - Center frequency: 3494.4 MHz
    /// - Bandwidth: 499.2 MHz
    Channel1 = 1,
    /// Channel 2
    /// - Center frequency: 3993.6 MHz
    /// - Bandwidth: 499.2 MHz
    Channel2 = 2,
    /// Channel 3
    /// - Center frequency: 4492.8 MHz
    /// - Bandwidth: 499.2 MHz
    Channel3 = 3,
    /// Channel 4
    /// - Center frequency: 3993.6 MHz
    /// - Bandwidth: 1331.2 MHz
    Channel4 = 4,
    /// Channel 5
    /// - Center frequency: 6489.6 MHz
    /// - Bandwidth: 499.2 MHz
    Channel5 = 5,
    /// Channel 7
    /// - Center frequency: 6489.6 MHz
    /// - Bandwidth: 1081.6 MHz
    Channel7 = 7,
}

impl Default for UwbChannel {
    fn default() -> Self {
        UwbChannel::Channel5
    }
}

impl UwbChannel {
    /// Returns whether the channel uses the narrow 500 MHz band
    ///
    /// Channels 4 and 7 are the wideband (900 MHz) channels; the bias
    /// correction tables are split along this line.
    pub fn is_narrowband(&self) -> bool {
        !matches!(self, UwbChannel::Channel4 | UwbChannel::Channel7)
    }
}

/// The pulse repetition frequency the radio is configured for
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PulseRepetitionFrequency {
    /// 16 megahertz
    Mhz16 = 0b01,
    /// 64 megahertz
    Mhz64 = 0b10,
}

impl Default for PulseRepetitionFrequency {
    fn default() -> Self {
        PulseRepetitionFrequency::Mhz16
    }
}
