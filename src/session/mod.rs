//! The tag and anchor ranging state machines
//!
//! A session borrows a [`Transceiver`] exclusively and drives one side of the
//! ranging exchange to completion, blocking on the radio's status flags at
//! every step. Execution is single-threaded and synchronous; the only form of
//! cancellation is the radio's own receive timeout, which aborts the exchange
//! and forces the transceiver idle before anything else happens.
//!
//! Neither session retries. Every timeout, protocol violation or hardware
//! fault surfaces as an [`Error`] and it is the caller's decision whether to
//! start a fresh exchange.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::{self, DecodeError, Frame, FunctionCode, MAX_FRAME_LEN};
use crate::mac::ShortAddress;
use crate::ranging::ComputeRangeError;
use crate::time::Timestamp;
use crate::transceiver::Transceiver;

pub use self::anchor::{AnchorSession, AnchorState};
pub use self::tag::{TagConfig, TagOutcome, TagSession, TagState};

mod anchor;
mod tag;

/// Upper bound on received frame sizes, per IEEE 802.15.4
const RX_BUFFER_LEN: usize = 127;

/// An error that ended a ranging exchange
///
/// Generic over the transceiver's hardware error type. None of these are
/// retried inside the session; the caller decides whether to restart the
/// exchange from idle. After [`Error::Hardware`], the caller must also reset
/// the receiver before reusing the radio.
#[derive(Clone, Copy, PartialEq)]
pub enum Error<E> {
    /// The transceiver reported a hardware fault
    Hardware(E),

    /// The expected frame did not arrive within the wait window
    ExchangeTimeout,

    /// The peer sent something the protocol does not allow at this step
    ProtocolViolation(Violation),

    /// The collected timestamps could not produce a range
    Ranging(ComputeRangeError),

    /// An internal encode buffer was too small
    BufferTooSmall {
        /// How large a buffer would have been required
        required_len: usize,
    },
}

/// The ways a received frame can violate the protocol
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Violation {
    /// The frame could not be decoded
    Malformed(DecodeError),

    /// A well-formed frame of the wrong kind for this step
    UnexpectedFrame {
        /// The function code the state machine was waiting for
        expected: FunctionCode,
        /// The function code that actually arrived
        got: FunctionCode,
    },

    /// The frame came from, or was addressed to, the wrong node
    AddressMismatch,

    /// A response-to-poll with an activity octet other than "continue"
    UnexpectedActivity(u8),
}

impl<E> From<ComputeRangeError> for Error<E> {
    fn from(error: ComputeRangeError) -> Self {
        Error::Ranging(error)
    }
}

impl<E> From<Violation> for Error<E> {
    fn from(violation: Violation) -> Self {
        Error::ProtocolViolation(violation)
    }
}

// Can't be derived without requiring `Debug` on the hardware error itself in
// every bound that mentions `Error`.
impl<E> fmt::Debug for Error<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Hardware(error) => write!(f, "Hardware({:?})", error),
            Error::ExchangeTimeout => write!(f, "ExchangeTimeout"),
            Error::ProtocolViolation(violation) => {
                write!(f, "ProtocolViolation({:?})", violation)
            }
            Error::Ranging(error) => write!(f, "Ranging({:?})", error),
            Error::BufferTooSmall { required_len } => {
                write!(f, "BufferTooSmall {{ required_len: {:?} }}", required_len)
            }
        }
    }
}

/// One successfully computed range measurement
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct RangeReport {
    /// The bias-corrected distance, in meters
    pub distance_m: f64,

    /// The raw time-of-flight distance before bias correction, in meters
    pub raw_distance_m: f64,

    /// The receive power the correction was based on, in dBm
    pub rx_power_dbm: f32,
}

/// What the anchor tells the tag to do after a completed measurement
///
/// Supplied by the caller; the session has no policy of its own.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangingDirective {
    /// Confirm the measurement and chain the tag to the next anchor
    ContinueChain(ShortAddress),

    /// Finish the round and suggest a new blink interval to the tag
    Finish {
        /// Suggested interval between blinks, in milliseconds
        blink_interval_ms: u16,
    },
}

/// When a frame transmission should start
pub enum SendTime {
    /// As fast as possible
    Now,
    /// At the given counter time, using the radio's delayed-transmit register
    Delayed(Timestamp),
}

fn hardware<E>(error: E) -> nb::Error<Error<E>> {
    nb::Error::Other(Error::Hardware(error))
}

fn poll_transmit<T: Transceiver>(radio: &mut T) -> nb::Result<Timestamp, Error<T::Error>> {
    if !radio.transmit_done().map_err(hardware)? {
        return Err(nb::Error::WouldBlock);
    }

    radio.tx_timestamp().map_err(hardware)
}

fn poll_receive<T: Transceiver>(radio: &mut T) -> nb::Result<Timestamp, Error<T::Error>> {
    if radio.receive_timed_out().map_err(hardware)? {
        return Err(nb::Error::Other(Error::ExchangeTimeout));
    }
    if !radio.receive_done().map_err(hardware)? {
        return Err(nb::Error::WouldBlock);
    }

    radio.rx_timestamp().map_err(hardware)
}

/// Encodes and transmits a frame
pub(crate) fn send_frame<T: Transceiver>(
    radio: &mut T,
    frame: &Frame,
    send_time: SendTime,
) -> Result<(), Error<T::Error>> {
    let mut buffer = [0; MAX_FRAME_LEN];
    let len = frame
        .encode(&mut buffer)
        .map_err(|frame::EncodeError::BufferTooSmall { required_len }| Error::BufferTooSmall {
            required_len,
        })?;

    match send_time {
        SendTime::Now => radio.transmit(&buffer[..len]),
        SendTime::Delayed(tx_time) => radio.transmit_delayed(&buffer[..len], tx_time),
    }
    .map_err(Error::Hardware)
}

/// Blocks until the transmission in flight has completed
///
/// Returns the hardware transmit timestamp.
pub(crate) fn wait_for_transmit<T: Transceiver>(
    radio: &mut T,
) -> Result<Timestamp, Error<T::Error>> {
    nb::block!(poll_transmit(radio))
}

/// Starts the receiver and blocks until a frame arrives or the wait times out
///
/// On timeout the transceiver is forced idle before the error is returned, so
/// no half-processed frame survives into the next operation. A frame that
/// fails to decode is a [`Violation::Malformed`] protocol violation.
pub(crate) fn wait_for_receive<T: Transceiver>(
    radio: &mut T,
) -> Result<(Frame, Timestamp), Error<T::Error>> {
    radio.start_receive().map_err(Error::Hardware)?;

    let rx_time = match nb::block!(poll_receive(radio)) {
        Ok(rx_time) => rx_time,
        Err(error) => {
            radio.force_idle().map_err(Error::Hardware)?;
            return Err(error);
        }
    };

    let mut buffer = [0; RX_BUFFER_LEN];
    let bytes = radio.read_frame(&mut buffer).map_err(Error::Hardware)?;
    let frame = Frame::decode(bytes)
        .map_err(|error| Error::ProtocolViolation(Violation::Malformed(error)))?;

    Ok((frame, rx_time))
}

/// Builds the violation for a well-formed frame of the wrong kind
pub(crate) fn unexpected<E>(expected: FunctionCode, got: &Frame) -> Error<E> {
    Error::ProtocolViolation(Violation::UnexpectedFrame {
        expected,
        got: got.function_code(),
    })
}
