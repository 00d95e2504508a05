//! The tag side of the ranging exchange

use core::num::Wrapping;

use crate::frame::{self, Frame, FunctionCode, ACTIVITY_CONTINUE};
use crate::time::Timestamp;
use crate::transceiver::Transceiver;

use super::{
    send_frame, unexpected, wait_for_receive, wait_for_transmit, Error, SendTime, Violation,
};

/// Delay between receiving a frame and the scheduled reply, in nanoseconds
///
/// 10 ms is enough leeway for a slow host to have the final message encoded
/// and handed to the radio well before the scheduled transmit time passes.
const REPLY_DELAY_NANOS: u32 = 10_000_000;

/// Where the tag state machine currently is
///
/// Observable through [`TagSession::state`] at any time, mostly useful for
/// debugging and for telling a timed-out round from a never-started one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagState {
    /// No exchange in progress
    Idle,
    /// The blink has been handed to the radio
    BlinkSent,
    /// Waiting for a ranging initiation addressed to this tag
    AwaitingInitiation,
    /// The poll has been handed to the radio
    PollSent,
    /// Waiting for the anchor's response to the poll
    AwaitingResponse,
    /// The final message has been scheduled
    FinalSent,
    /// Waiting for the anchor's activity control frame
    AwaitingConfirm,
    /// Chained to the next anchor, about to poll again
    NextAnchor,
    /// The round completed
    Done,
    /// The round was aborted; the radio has been forced idle
    Failed,
}

/// Tunables of the tag session
#[derive(Clone, Copy, Debug)]
pub struct TagConfig {
    /// How far in the future the final message is scheduled
    ///
    /// Measured from the system counter value sampled after the response to
    /// the poll arrives. Must leave the host enough time to encode the frame
    /// and write it to the radio.
    pub reply_delay: Timestamp,
}

impl Default for TagConfig {
    fn default() -> Self {
        TagConfig {
            reply_delay: Timestamp::from_nanos(REPLY_DELAY_NANOS),
        }
    }
}

/// What a completed tag round reports back
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TagOutcome {
    /// How many anchors were ranged against in this round
    pub anchors_ranged: u8,

    /// The blink interval suggested by the last anchor, in milliseconds
    pub blink_interval_ms: u16,
}

/// Drives the tag side of a ranging round
///
/// A round is: blink, get admitted by an anchor, then poll/final against one
/// or more anchors as the activity control frames chain the tag along, until
/// an anchor finishes the round.
///
/// The session owns the radio for the duration of the round and owns the
/// sequence number that stamps every outgoing frame.
pub struct TagSession<'r, T: Transceiver> {
    radio: &'r mut T,
    config: TagConfig,
    seq: Wrapping<u8>,
    state: TagState,
}

impl<'r, T> TagSession<'r, T>
where
    T: Transceiver,
{
    /// Creates a tag session on the given radio
    pub fn new(radio: &'r mut T, config: TagConfig) -> Self {
        TagSession {
            radio,
            config,
            seq: Wrapping(0),
            state: TagState::Idle,
        }
    }

    /// Returns the current state of the tag state machine
    pub fn state(&self) -> TagState {
        self.state
    }

    /// Runs one full ranging round
    ///
    /// Blocks until an anchor finishes the round or the exchange fails. On
    /// failure the state machine parks in [`TagState::Failed`] and the radio
    /// is forced idle; calling this again starts over from the blink.
    pub fn ranging_round(&mut self) -> Result<TagOutcome, Error<T::Error>> {
        self.state = TagState::Idle;

        match self.run_round() {
            Ok(outcome) => {
                self.state = TagState::Done;
                Ok(outcome)
            }
            Err(error) => {
                self.state = TagState::Failed;
                // Report the failure that aborted the round, not a secondary
                // idle fault.
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

    fn run_round(&mut self) -> Result<TagOutcome, Error<T::Error>> {
        let pan_id = self.radio.network_id();
        let tag_eui = self.radio.extended_identifier();

        let blink = Frame::Blink(frame::Blink {
            seq: self.next_seq(),
            tag_eui,
        });
        send_frame(self.radio, &blink, SendTime::Now)?;
        self.state = TagState::BlinkSent;
        wait_for_transmit(self.radio)?;

        self.state = TagState::AwaitingInitiation;
        let (received, _) = wait_for_receive(self.radio)?;
        let initiation = match received {
            Frame::RangingInitiation(initiation) => initiation,
            other => return Err(unexpected(FunctionCode::RangingInitiation, &other)),
        };
        if initiation.tag_eui != tag_eui {
            return Err(Violation::AddressMismatch.into());
        }
        self.radio.set_short_address(initiation.assigned);

        let own = initiation.assigned;
        let mut anchor = initiation.anchor;
        let mut anchors_ranged: u8 = 0;

        loop {
            let poll = Frame::Poll(frame::Poll {
                seq: self.next_seq(),
                pan_id,
                destination: anchor,
                source: own,
            });
            send_frame(self.radio, &poll, SendTime::Now)?;
            self.state = TagState::PollSent;
            let poll_sent = wait_for_transmit(self.radio)?;

            self.state = TagState::AwaitingResponse;
            let (received, response_received) = wait_for_receive(self.radio)?;
            let response = match received {
                Frame::ResponseToPoll(response) => response,
                other => return Err(unexpected(FunctionCode::ResponseToPoll, &other)),
            };
            if response.source != anchor || response.destination != own {
                return Err(Violation::AddressMismatch.into());
            }
            if response.activity != ACTIVITY_CONTINUE {
                return Err(Violation::UnexpectedActivity(response.activity).into());
            }

            let now = self.radio.sys_timestamp().map_err(Error::Hardware)?;
            // The scheduled transmit time lives on the 40-bit counter ring.
            // Since the hardware sends at exactly this counter value, the
            // embedded send time and the actual one agree.
            let final_sent = Timestamp::from_raw((now + self.config.reply_delay).to_raw());

            let final_message = Frame::Final(frame::Final {
                seq: self.next_seq(),
                pan_id,
                destination: anchor,
                source: own,
                poll_sent: poll_sent.low32(),
                response_received: response_received.low32(),
                final_sent: final_sent.low32(),
            });
            send_frame(self.radio, &final_message, SendTime::Delayed(final_sent))?;
            self.state = TagState::FinalSent;
            wait_for_transmit(self.radio)?;

            anchors_ranged = anchors_ranged.saturating_add(1);

            self.state = TagState::AwaitingConfirm;
            let (received, _) = wait_for_receive(self.radio)?;
            let control = match received {
                Frame::ActivityControl(control) => control,
                other => return Err(unexpected(FunctionCode::ActivityControl, &other)),
            };
            if control.source != anchor || control.destination != own {
                return Err(Violation::AddressMismatch.into());
            }

            match control.directive {
                frame::Directive::RangingConfirm { next_anchor } => {
                    self.state = TagState::NextAnchor;
                    anchor = next_anchor;
                }
                frame::Directive::Finished { blink_interval_ms } => {
                    return Ok(TagOutcome {
                        anchors_ranged,
                        blink_interval_ms,
                    });
                }
            }
        }
    }
}
