//! The interface to the radio driver
//!
//! The register-level chip driver is not part of this crate. Everything the
//! ranging sessions need from it is captured by the [`Transceiver`] trait:
//! sending (immediately or at a scheduled counter time), receiving,
//! completion/timeout flags to poll, the hardware timestamps, and a few
//! pieces of node identity and radio configuration.
//!
//! The radio is half-duplex and a session owns its transceiver exclusively
//! for the duration of an exchange; no two exchanges may be in flight on the
//! same radio. Multiple radios can run independent sessions in parallel as
//! long as each has its own handle.

use crate::configs::{PulseRepetitionFrequency, UwbChannel};
use crate::mac::{ExtendedAddress, PanId, ShortAddress};
use crate::time::Timestamp;

/// The radio driver as seen by a ranging session
///
/// All waiting in this crate is done by polling the `*_done` / `*_timed_out`
/// flags; implementations are free to back them with interrupt-set state, but
/// no callback ever runs concurrently with protocol logic.
///
/// Receive timeouts are the hardware's own frame-wait timeout: after
/// [`start_receive`](Transceiver::start_receive), either
/// [`receive_done`](Transceiver::receive_done) or
/// [`receive_timed_out`](Transceiver::receive_timed_out) eventually becomes
/// true.
pub trait Transceiver {
    /// The hardware fault type reported by the driver
    ///
    /// For example a clock-PLL lock loss or a bus error. When a session
    /// surfaces one of these, the caller must force the transceiver idle and
    /// reset the receiver before reuse.
    type Error;

    /// Starts transmitting the given frame immediately
    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Schedules the given frame for transmission at a future counter time
    ///
    /// The hardware transmits at exactly `tx_time`, regardless of host
    /// scheduling jitter. This is how the final message's embedded send time
    /// is made to match the transmit timestamp the hardware will report.
    fn transmit_delayed(&mut self, frame: &[u8], tx_time: Timestamp) -> Result<(), Self::Error>;

    /// Starts the receiver, arming the frame-wait timeout
    fn start_receive(&mut self) -> Result<(), Self::Error>;

    /// Returns whether the last transmission has completed
    fn transmit_done(&mut self) -> Result<bool, Self::Error>;

    /// Returns whether a frame has been received and is ready to read
    fn receive_done(&mut self) -> Result<bool, Self::Error>;

    /// Returns whether the receive operation hit the frame-wait timeout
    fn receive_timed_out(&mut self) -> Result<bool, Self::Error>;

    /// Forces the transceiver back to the idle state
    ///
    /// Aborts any transmit or receive in progress. Called after every aborted
    /// exchange so no half-processed frame survives into the next operation.
    fn force_idle(&mut self) -> Result<(), Self::Error>;

    /// Returns the timestamp of the last completed transmission
    fn tx_timestamp(&mut self) -> Result<Timestamp, Self::Error>;

    /// Returns the timestamp of the last received frame
    fn rx_timestamp(&mut self) -> Result<Timestamp, Self::Error>;

    /// Returns the current value of the system time counter
    fn sys_timestamp(&mut self) -> Result<Timestamp, Self::Error>;

    /// Copies the last received frame into `buffer`
    ///
    /// Returns the occupied prefix of `buffer`. Only valid after
    /// [`receive_done`](Transceiver::receive_done) has returned true.
    fn read_frame<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b [u8], Self::Error>;

    /// Returns the estimated receive power of the last frame, in dBm
    fn rx_power_dbm(&mut self) -> Result<f32, Self::Error>;

    /// The channel the radio is configured for
    fn channel(&self) -> UwbChannel;

    /// The pulse repetition frequency the radio is configured for
    fn pulse_repetition_frequency(&self) -> PulseRepetitionFrequency;

    /// This node's extended unique identifier
    fn extended_identifier(&self) -> ExtendedAddress;

    /// This node's short address
    fn short_address(&self) -> ShortAddress;

    /// Sets this node's short address
    ///
    /// A tag adopts the address assigned to it by the ranging initiation.
    fn set_short_address(&mut self, address: ShortAddress);

    /// The network this node operates on
    fn network_id(&self) -> PanId;
}

/// Event sink a driver implementation can feed from its interrupt handling
///
/// This replaces per-event function-pointer callbacks with a single
/// capability set that a driver accepts once. All methods default to no-ops.
/// The ranging sessions themselves never consume these events; they rely
/// solely on the polling primitives of [`Transceiver`]. The sink exists for
/// applications that want visibility into the radio's lifecycle (logging,
/// LEDs, statistics) without hooking the driver's interrupt plumbing
/// directly.
pub trait EventSink {
    /// A transmission completed at the given counter time
    fn on_sent(&mut self, tx_time: Timestamp) {
        let _ = tx_time;
    }

    /// A frame was received at the given counter time
    fn on_received(&mut self, rx_time: Timestamp) {
        let _ = rx_time;
    }

    /// A receive operation failed (bad FCS, PHY error, ...)
    fn on_receive_failed(&mut self) {}

    /// A receive operation hit the frame-wait timeout
    fn on_receive_timeout(&mut self) {}

    /// A hardware timestamp became available
    fn on_timestamp_available(&mut self, time: Timestamp) {
        let _ = time;
    }
}

/// The do-nothing event sink
impl EventSink for () {}
