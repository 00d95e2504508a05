//! The anchor side of the ranging exchange

use core::num::Wrapping;

use crate::frame::{self, Frame, FunctionCode, ACTIVITY_CONTINUE};
use crate::mac::{ExtendedAddress, ShortAddress};
use crate::range_bias::correct_range_m;
use crate::ranging::{compute_range_m, RangingExchange};
use crate::time::Timestamp;
use crate::transceiver::Transceiver;

use super::{
    send_frame, unexpected, wait_for_receive, wait_for_transmit, Error, RangeReport,
    RangingDirective, SendTime, Violation,
};

/// Where the anchor state machine currently is
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnchorState {
    /// No exchange in progress
    Idle,
    /// Listening for a blink
    AwaitingBlink,
    /// The ranging initiation has been handed to the radio
    InitiationSent,
    /// Listening for a poll from the admitted tag
    AwaitingPoll,
    /// The response to the poll has been handed to the radio
    ResponseSent,
    /// Waiting for the tag's final message
    AwaitingFinal,
    /// All six timestamps are in and the range came out
    RangeComputed,
    /// The tag was chained to the next anchor
    ConfirmSent,
    /// The tag was told the round is over
    FinishedSent,
}

/// Drives the anchor side of ranging exchanges
///
/// An anchor first admits a tag ([`AnchorSession::accept_tag`]), then runs
/// measurements against it ([`AnchorSession::ranging_round`]). Which anchor
/// the tag is chained to next, and when the round ends, is the caller's
/// decision via [`RangingDirective`]; the session implements the exchange,
/// not the deployment's anchor topology.
pub struct AnchorSession<'r, T: Transceiver> {
    radio: &'r mut T,
    seq: Wrapping<u8>,
    state: AnchorState,
}

impl<'r, T> AnchorSession<'r, T>
where
    T: Transceiver,
{
    /// Creates an anchor session on the given radio
    pub fn new(radio: &'r mut T) -> Self {
        AnchorSession {
            radio,
            seq: Wrapping(0),
            state: AnchorState::Idle,
        }
    }

    /// Returns the current state of the anchor state machine
    pub fn state(&self) -> AnchorState {
        self.state
    }

    /// Waits for a blink and admits the tag into the network
    ///
    /// Replies with a ranging initiation that carries this anchor's short
    /// address and assigns `assigned` to the tag. Returns the admitted tag's
    /// extended identifier; the caller is responsible for picking an
    /// `assigned` address that is unique on the network.
    pub fn accept_tag(
        &mut self,
        assigned: ShortAddress,
    ) -> Result<ExtendedAddress, Error<T::Error>> {
        self.state = AnchorState::Idle;

        match self.run_admission(assigned) {
            Ok(tag_eui) => Ok(tag_eui),
            Err(error) => {
                self.state = AnchorState::Idle;
                let _ = self.radio.force_idle();
                Err(error)
            }
        }
    }

    /// Runs one measurement against an admitted tag
    ///
    /// Blocks through poll, response and final message, computes the
    /// bias-corrected range, and closes the exchange with the given
    /// directive. On failure the radio is forced idle and the state machine
    /// parks in [`AnchorState::Idle`]; a failed measurement produces no
    /// report.
    pub fn ranging_round(
        &mut self,
        tag: ShortAddress,
        directive: RangingDirective,
    ) -> Result<RangeReport, Error<T::Error>> {
        self.state = AnchorState::Idle;

        match self.run_round(tag, directive) {
            Ok(report) => Ok(report),
            Err(error) => {
                self.state = AnchorState::Idle;
                let _ = self.radio.force_idle();
                Err(error)
            }
        }
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq.0;
        self.seq += Wrapping(1);
        seq
    }

    fn run_admission(
        &mut self,
        assigned: ShortAddress,
    ) -> Result<ExtendedAddress, Error<T::Error>> {
        self.state = AnchorState::AwaitingBlink;
        let (received, _) = wait_for_receive(self.radio)?;
        let blink = match received {
            Frame::Blink(blink) => blink,
            other => return Err(unexpected(FunctionCode::Blink, &other)),
        };

        let initiation = Frame::RangingInitiation(frame::RangingInitiation {
            seq: self.next_seq(),
            pan_id: self.radio.network_id(),
            tag_eui: blink.tag_eui,
            anchor: self.radio.short_address(),
            assigned,
        });
        send_frame(self.radio, &initiation, SendTime::Now)?;
        self.state = AnchorState::InitiationSent;
        wait_for_transmit(self.radio)?;

        Ok(blink.tag_eui)
    }

    fn run_round(
        &mut self,
        tag: ShortAddress,
        directive: RangingDirective,
    ) -> Result<RangeReport, Error<T::Error>> {
        let pan_id = self.radio.network_id();
        let own = self.radio.short_address();

        self.state = AnchorState::AwaitingPoll;
        let (received, poll_received) = wait_for_receive(self.radio)?;
        let poll = match received {
            Frame::Poll(poll) => poll,
            other => return Err(unexpected(FunctionCode::Poll, &other)),
        };
        if poll.source != tag || poll.destination != own {
            return Err(Violation::AddressMismatch.into());
        }

        let response = Frame::ResponseToPoll(frame::ResponseToPoll {
            seq: self.next_seq(),
            pan_id,
            destination: tag,
            source: own,
            activity: ACTIVITY_CONTINUE,
        });
        send_frame(self.radio, &response, SendTime::Now)?;
        self.state = AnchorState::ResponseSent;
        let response_sent = wait_for_transmit(self.radio)?;

        self.state = AnchorState::AwaitingFinal;
        let (received, final_received) = wait_for_receive(self.radio)?;
        let final_message = match received {
            Frame::Final(final_message) => final_message,
            other => return Err(unexpected(FunctionCode::Final, &other)),
        };
        if final_message.source != tag || final_message.destination != own {
            return Err(Violation::AddressMismatch.into());
        }

        // The final message carries only the low 32 bits of the tag's
        // timestamps. Re-anchor on the poll transmit time and unwrap the
        // tag-local deltas modulo 2^32; each delta is far below 2^32 in any
        // real exchange, so the reconstruction is exact even when the tag's
        // full counter wrapped in between.
        let poll_sent = Timestamp::from_raw(u64::from(final_message.poll_sent));
        let response_received = poll_sent
            + Timestamp::from_raw(u64::from(
                final_message
                    .response_received
                    .wrapping_sub(final_message.poll_sent),
            ));
        let final_sent = response_received
            + Timestamp::from_raw(u64::from(
                final_message
                    .final_sent
                    .wrapping_sub(final_message.response_received),
            ));

        let exchange = RangingExchange {
            poll_sent,
            poll_received,
            response_sent,
            response_received,
            final_sent,
            final_received,
        };

        let raw_distance_m = compute_range_m(&exchange)?;
        self.state = AnchorState::RangeComputed;

        let rx_power_dbm = self.radio.rx_power_dbm().map_err(Error::Hardware)?;
        let distance_m = correct_range_m(
            raw_distance_m,
            rx_power_dbm,
            self.radio.channel(),
            self.radio.pulse_repetition_frequency(),
        );

        let control = Frame::ActivityControl(frame::ActivityControl {
            seq: self.next_seq(),
            pan_id,
            destination: tag,
            source: own,
            directive: match directive {
                RangingDirective::ContinueChain(next_anchor) => {
                    frame::Directive::RangingConfirm { next_anchor }
                }
                RangingDirective::Finish { blink_interval_ms } => {
                    frame::Directive::Finished { blink_interval_ms }
                }
            },
        });
        send_frame(self.radio, &control, SendTime::Now)?;
        wait_for_transmit(self.radio)?;
        self.state = match directive {
            RangingDirective::ContinueChain(_) => AnchorState::ConfirmSent,
            RangingDirective::Finish { .. } => AnchorState::FinishedSent,
        };

        Ok(RangeReport {
            distance_m,
            raw_distance_m,
            rx_power_dbm,
        })
    }
}
