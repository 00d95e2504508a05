//! End-to-end ranging exchanges against a scripted radio
//!
//! The mock transceiver plays back a queue of incoming frames (or timeouts)
//! and records everything the session hands it, so both state machines can be
//! driven through whole exchanges without hardware.

use std::collections::VecDeque;

use uwb_twr::configs::{PulseRepetitionFrequency, UwbChannel};
use uwb_twr::frame::{self, Directive, Frame, FunctionCode, ACTIVITY_CONTINUE};
use uwb_twr::mac::{ExtendedAddress, PanId, ShortAddress};
use uwb_twr::session::{
    AnchorSession, AnchorState, Error, RangingDirective, TagConfig, TagSession, TagState,
    Violation,
};
use uwb_twr::time::{Timestamp, METERS_PER_TICK};
use uwb_twr::transceiver::Transceiver;

const PAN: PanId = PanId(0xDECA);
const TAG_EUI: ExtendedAddress = ExtendedAddress(0x0123_4567_89AB_CDEF);
const TAG_SHORT: ShortAddress = ShortAddress(0x1234);
const ANCHOR_SHORT: ShortAddress = ShortAddress(0x5678);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MockError {}

#[derive(Clone, Copy)]
enum Incoming {
    Frame {
        frame: Frame,
        rx_time: u64,
        rx_power_dbm: f32,
    },
    Timeout,
}

struct Sent {
    frame: Frame,
    scheduled: Option<u64>,
}

struct MockRadio {
    incoming: VecDeque<Incoming>,
    tx_stamps: VecDeque<u64>,
    sent: Vec<Sent>,
    current_rx: Option<Incoming>,
    last_tx_stamp: Option<u64>,
    last_rx_power: f32,
    sys_time: u64,
    idle_count: usize,
    short_address: ShortAddress,
    eui: ExtendedAddress,
}

impl MockRadio {
    fn new(short_address: ShortAddress, eui: ExtendedAddress) -> Self {
        MockRadio {
            incoming: VecDeque::new(),
            tx_stamps: VecDeque::new(),
            sent: Vec::new(),
            current_rx: None,
            last_tx_stamp: None,
            last_rx_power: 0.0,
            sys_time: 1_000_000,
            idle_count: 0,
            short_address,
            eui,
        }
    }

    fn script_frame(&mut self, frame: Frame, rx_time: u64, rx_power_dbm: f32) {
        self.incoming.push_back(Incoming::Frame {
            frame,
            rx_time,
            rx_power_dbm,
        });
    }

    fn script_timeout(&mut self) {
        self.incoming.push_back(Incoming::Timeout);
    }

    fn script_tx_stamp(&mut self, tx_time: u64) {
        self.tx_stamps.push_back(tx_time);
    }
}

impl Transceiver for MockRadio {
    type Error = MockError;

    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        let frame = Frame::decode(frame).expect("session transmitted a malformed frame");
        self.sent.push(Sent {
            frame,
            scheduled: None,
        });
        self.last_tx_stamp = Some(self.tx_stamps.pop_front().unwrap_or(self.sys_time));
        Ok(())
    }

    fn transmit_delayed(&mut self, frame: &[u8], tx_time: Timestamp) -> Result<(), Self::Error> {
        let frame = Frame::decode(frame).expect("session transmitted a malformed frame");
        self.sent.push(Sent {
            frame,
            scheduled: Some(tx_time.to_raw()),
        });
        // The hardware transmits at exactly the scheduled counter time.
        self.last_tx_stamp = Some(tx_time.to_raw());
        Ok(())
    }

    fn start_receive(&mut self) -> Result<(), Self::Error> {
        self.current_rx = Some(self.incoming.pop_front().unwrap_or(Incoming::Timeout));
        if let Some(Incoming::Frame { rx_power_dbm, .. }) = self.current_rx {
            self.last_rx_power = rx_power_dbm;
        }
        Ok(())
    }

    fn transmit_done(&mut self) -> Result<bool, Self::Error> {
        Ok(self.last_tx_stamp.is_some())
    }

    fn receive_done(&mut self) -> Result<bool, Self::Error> {
        Ok(matches!(self.current_rx, Some(Incoming::Frame { .. })))
    }

    fn receive_timed_out(&mut self) -> Result<bool, Self::Error> {
        Ok(matches!(self.current_rx, Some(Incoming::Timeout)))
    }

    fn force_idle(&mut self) -> Result<(), Self::Error> {
        self.current_rx = None;
        self.idle_count += 1;
        Ok(())
    }

    fn tx_timestamp(&mut self) -> Result<Timestamp, Self::Error> {
        let stamp = self.last_tx_stamp.take().expect("no transmission in flight");
        Ok(Timestamp::from_raw(stamp))
    }

    fn rx_timestamp(&mut self) -> Result<Timestamp, Self::Error> {
        match self.current_rx {
            Some(Incoming::Frame { rx_time, .. }) => Ok(Timestamp::from_raw(rx_time)),
            _ => panic!("no frame received"),
        }
    }

    fn sys_timestamp(&mut self) -> Result<Timestamp, Self::Error> {
        Ok(Timestamp::from_raw(self.sys_time))
    }

    fn read_frame<'b>(&mut self, buffer: &'b mut [u8]) -> Result<&'b [u8], Self::Error> {
        match &self.current_rx {
            Some(Incoming::Frame { frame, .. }) => {
                let len = frame.encode(buffer).expect("scripted frame too large");
                Ok(&buffer[..len])
            }
            _ => panic!("no frame received"),
        }
    }

    fn rx_power_dbm(&mut self) -> Result<f32, Self::Error> {
        Ok(self.last_rx_power)
    }

    fn channel(&self) -> UwbChannel {
        UwbChannel::Channel5
    }

    fn pulse_repetition_frequency(&self) -> PulseRepetitionFrequency {
        PulseRepetitionFrequency::Mhz16
    }

    fn extended_identifier(&self) -> ExtendedAddress {
        self.eui
    }

    fn short_address(&self) -> ShortAddress {
        self.short_address
    }

    fn set_short_address(&mut self, address: ShortAddress) {
        self.short_address = address;
    }

    fn network_id(&self) -> PanId {
        PAN
    }
}

fn poll_frame() -> Frame {
    Frame::Poll(frame::Poll {
        seq: 0,
        pan_id: PAN,
        destination: ANCHOR_SHORT,
        source: TAG_SHORT,
    })
}

fn response_frame(source: ShortAddress) -> Frame {
    Frame::ResponseToPoll(frame::ResponseToPoll {
        seq: 1,
        pan_id: PAN,
        destination: TAG_SHORT,
        source,
        activity: ACTIVITY_CONTINUE,
    })
}

fn initiation_frame() -> Frame {
    Frame::RangingInitiation(frame::RangingInitiation {
        seq: 0,
        pan_id: PAN,
        tag_eui: TAG_EUI,
        anchor: ANCHOR_SHORT,
        assigned: TAG_SHORT,
    })
}

fn control_frame(source: ShortAddress, directive: Directive) -> Frame {
    Frame::ActivityControl(frame::ActivityControl {
        seq: 2,
        pan_id: PAN,
        destination: TAG_SHORT,
        source,
        directive,
    })
}

#[test]
fn anchor_round_computes_expected_distance() {
    let mut radio = MockRadio::new(ANCHOR_SHORT, ExtendedAddress(0xAAAA));

    // Poll arrives at 120_000 on the anchor's clock.
    radio.script_frame(poll_frame(), 120_000, -81.0);
    // The response goes out at 130_000.
    radio.script_tx_stamp(130_000);
    // The final message arrives at 250_000, carrying the tag's timestamps.
    radio.script_frame(
        Frame::Final(frame::Final {
            seq: 2,
            pan_id: PAN,
            destination: ANCHOR_SHORT,
            source: TAG_SHORT,
            poll_sent: 100_000,
            response_received: 150_000,
            final_sent: 214_000,
        }),
        250_000,
        -81.0,
    );

    let mut anchor = AnchorSession::new(&mut radio);
    let report = anchor
        .ranging_round(
            TAG_SHORT,
            RangingDirective::Finish {
                blink_interval_ms: 200,
            },
        )
        .unwrap();

    // round1 = 50_000, reply1 = 10_000, round2 = 120_000, reply2 = 64_000
    let expected = (50_000.0f64 * 120_000.0 - 10_000.0 * 64_000.0)
        / (50_000.0 + 120_000.0 + 10_000.0 + 64_000.0)
        * METERS_PER_TICK;
    assert_eq!(report.raw_distance_m, expected);
    // -81 dBm sits exactly on the zero-bias breakpoint of the 500 MHz /
    // PRF 16 table, so the corrected distance equals the raw one.
    assert_eq!(report.distance_m, expected);
    assert_eq!(report.rx_power_dbm, -81.0);
    assert_eq!(anchor.state(), AnchorState::FinishedSent);

    assert_eq!(radio.sent.len(), 2);
    assert_eq!(
        radio.sent[0].frame,
        Frame::ResponseToPoll(frame::ResponseToPoll {
            seq: 0,
            pan_id: PAN,
            destination: TAG_SHORT,
            source: ANCHOR_SHORT,
            activity: ACTIVITY_CONTINUE,
        })
    );
    assert_eq!(
        radio.sent[1].frame,
        Frame::ActivityControl(frame::ActivityControl {
            seq: 1,
            pan_id: PAN,
            destination: TAG_SHORT,
            source: ANCHOR_SHORT,
            directive: Directive::Finished {
                blink_interval_ms: 200,
            },
        })
    );
}

#[test]
fn anchor_handles_truncated_tag_timestamps_across_rollover() {
    // The tag's 40-bit counter wrapped between poll and final, so the
    // truncated values in the final message are not monotonic. The anchor
    // must still reconstruct the same intervals.
    let mut radio = MockRadio::new(ANCHOR_SHORT, ExtendedAddress(0xAAAA));

    let poll_sent: u32 = u32::MAX - 20_000;
    let response_received = poll_sent.wrapping_add(50_000);
    let final_sent = response_received.wrapping_add(64_000);

    radio.script_frame(poll_frame(), 120_000, -81.0);
    radio.script_tx_stamp(130_000);
    radio.script_frame(
        Frame::Final(frame::Final {
            seq: 2,
            pan_id: PAN,
            destination: ANCHOR_SHORT,
            source: TAG_SHORT,
            poll_sent,
            response_received,
            final_sent,
        }),
        250_000,
        -81.0,
    );

    let mut anchor = AnchorSession::new(&mut radio);
    let report = anchor
        .ranging_round(
            TAG_SHORT,
            RangingDirective::Finish {
                blink_interval_ms: 200,
            },
        )
        .unwrap();

    // Same intervals as the straight-line case above.
    let expected = (50_000.0f64 * 120_000.0 - 10_000.0 * 64_000.0)
        / (50_000.0 + 120_000.0 + 10_000.0 + 64_000.0)
        * METERS_PER_TICK;
    assert_eq!(report.raw_distance_m, expected);
}

#[test]
fn anchor_rejects_poll_from_wrong_tag() {
    let mut radio = MockRadio::new(ANCHOR_SHORT, ExtendedAddress(0xAAAA));

    radio.script_frame(
        Frame::Poll(frame::Poll {
            seq: 0,
            pan_id: PAN,
            destination: ANCHOR_SHORT,
            source: ShortAddress(0x9999),
        }),
        120_000,
        -81.0,
    );

    let mut anchor = AnchorSession::new(&mut radio);
    let result = anchor.ranging_round(
        TAG_SHORT,
        RangingDirective::Finish {
            blink_interval_ms: 200,
        },
    );

    assert_eq!(
        result,
        Err(Error::ProtocolViolation(Violation::AddressMismatch))
    );
    assert_eq!(anchor.state(), AnchorState::Idle);
    // No response goes out for a mismatched poll.
    assert!(radio.sent.is_empty());
    assert!(radio.idle_count >= 1);
}

#[test]
fn anchor_accepts_tag_and_assigns_address() {
    let mut radio = MockRadio::new(ANCHOR_SHORT, ExtendedAddress(0xAAAA));

    radio.script_frame(
        Frame::Blink(frame::Blink {
            seq: 7,
            tag_eui: TAG_EUI,
        }),
        50_000,
        -85.0,
    );

    let mut anchor = AnchorSession::new(&mut radio);
    let tag_eui = anchor.accept_tag(TAG_SHORT).unwrap();

    assert_eq!(tag_eui, TAG_EUI);
    assert_eq!(anchor.state(), AnchorState::InitiationSent);
    assert_eq!(
        radio.sent[0].frame,
        Frame::RangingInitiation(frame::RangingInitiation {
            seq: 0,
            pan_id: PAN,
            tag_eui: TAG_EUI,
            anchor: ANCHOR_SHORT,
            assigned: TAG_SHORT,
        })
    );
}

#[test]
fn tag_round_against_a_single_anchor() {
    let mut radio = MockRadio::new(ShortAddress(0xFFFF), TAG_EUI);
    radio.sys_time = 150_000_000;

    // Blink transmit stamp is irrelevant to the protocol.
    radio.script_tx_stamp(10_000);
    radio.script_frame(initiation_frame(), 20_000, -83.0);
    // Poll goes out at 100_000.
    radio.script_tx_stamp(100_000);
    radio.script_frame(response_frame(ANCHOR_SHORT), 150_000, -83.0);
    radio.script_frame(
        control_frame(
            ANCHOR_SHORT,
            Directive::Finished {
                blink_interval_ms: 500,
            },
        ),
        400_000_000,
        -83.0,
    );

    let mut tag = TagSession::new(&mut radio, TagConfig::default());
    let outcome = tag.ranging_round().unwrap();

    assert_eq!(outcome.anchors_ranged, 1);
    assert_eq!(outcome.blink_interval_ms, 500);
    assert_eq!(tag.state(), TagState::Done);
    assert_eq!(radio.short_address, TAG_SHORT);

    assert_eq!(radio.sent.len(), 3);
    assert_eq!(
        radio.sent[0].frame,
        Frame::Blink(frame::Blink {
            seq: 0,
            tag_eui: TAG_EUI,
        })
    );
    assert_eq!(
        radio.sent[1].frame,
        Frame::Poll(frame::Poll {
            seq: 1,
            pan_id: PAN,
            destination: ANCHOR_SHORT,
            source: TAG_SHORT,
        })
    );

    // The final message is scheduled one reply delay past the sampled system
    // time, and its embedded send time matches the schedule.
    let reply_delay = TagConfig::default().reply_delay;
    let expected_tx = (Timestamp::from_raw(150_000_000) + reply_delay).to_raw();
    assert_eq!(radio.sent[2].scheduled, Some(expected_tx));
    assert_eq!(
        radio.sent[2].frame,
        Frame::Final(frame::Final {
            seq: 2,
            pan_id: PAN,
            destination: ANCHOR_SHORT,
            source: TAG_SHORT,
            poll_sent: 100_000,
            response_received: 150_000,
            final_sent: expected_tx as u32,
        })
    );
}

#[test]
fn tag_follows_the_anchor_chain() {
    let next_anchor = ShortAddress(0x9ABC);

    let mut radio = MockRadio::new(ShortAddress(0xFFFF), TAG_EUI);
    radio.script_frame(initiation_frame(), 20_000, -83.0);
    radio.script_frame(response_frame(ANCHOR_SHORT), 150_000, -83.0);
    radio.script_frame(
        control_frame(
            ANCHOR_SHORT,
            Directive::RangingConfirm { next_anchor },
        ),
        800_000_000,
        -83.0,
    );
    radio.script_frame(response_frame(next_anchor), 900_000_000, -83.0);
    radio.script_frame(
        control_frame(
            next_anchor,
            Directive::Finished {
                blink_interval_ms: 250,
            },
        ),
        1_700_000_000,
        -83.0,
    );

    let mut tag = TagSession::new(&mut radio, TagConfig::default());
    let outcome = tag.ranging_round().unwrap();

    assert_eq!(outcome.anchors_ranged, 2);
    assert_eq!(outcome.blink_interval_ms, 250);

    // Blink, then a poll/final pair per anchor.
    let polls: Vec<_> = radio
        .sent
        .iter()
        .filter_map(|sent| match sent.frame {
            Frame::Poll(poll) => Some(poll.destination),
            _ => None,
        })
        .collect();
    assert_eq!(polls, [ANCHOR_SHORT, next_anchor]);
}

#[test]
fn tag_fails_on_response_timeout() {
    let mut radio = MockRadio::new(ShortAddress(0xFFFF), TAG_EUI);
    radio.script_frame(initiation_frame(), 20_000, -83.0);
    radio.script_timeout();

    let mut tag = TagSession::new(&mut radio, TagConfig::default());
    let result = tag.ranging_round();

    assert_eq!(result, Err(Error::ExchangeTimeout));
    assert_eq!(tag.state(), TagState::Failed);
    assert!(radio.idle_count >= 1);
    // Blink and poll went out, but no final message.
    assert_eq!(radio.sent.len(), 2);
}

#[test]
fn tag_rejects_a_frame_of_the_wrong_kind() {
    let mut radio = MockRadio::new(ShortAddress(0xFFFF), TAG_EUI);
    // A poll where the ranging initiation should be.
    radio.script_frame(poll_frame(), 20_000, -83.0);

    let mut tag = TagSession::new(&mut radio, TagConfig::default());
    let result = tag.ranging_round();

    assert_eq!(
        result,
        Err(Error::ProtocolViolation(Violation::UnexpectedFrame {
            expected: FunctionCode::RangingInitiation,
            got: FunctionCode::Poll,
        }))
    );
    assert_eq!(tag.state(), TagState::Failed);
}

#[test]
fn tag_ignores_initiation_for_another_tag() {
    let mut radio = MockRadio::new(ShortAddress(0xFFFF), TAG_EUI);
    radio.script_frame(
        Frame::RangingInitiation(frame::RangingInitiation {
            seq: 0,
            pan_id: PAN,
            tag_eui: ExtendedAddress(0xDEAD_BEEF),
            anchor: ANCHOR_SHORT,
            assigned: TAG_SHORT,
        }),
        20_000,
        -83.0,
    );

    let mut tag = TagSession::new(&mut radio, TagConfig::default());
    let result = tag.ranging_round();

    assert_eq!(
        result,
        Err(Error::ProtocolViolation(Violation::AddressMismatch))
    );
    // The tag must not adopt an address assigned to someone else.
    assert_eq!(radio.short_address, ShortAddress(0xFFFF));
}

#[test]
fn tag_stops_on_unexpected_activity() {
    let mut radio = MockRadio::new(ShortAddress(0xFFFF), TAG_EUI);
    radio.script_frame(initiation_frame(), 20_000, -83.0);
    radio.script_frame(
        Frame::ResponseToPoll(frame::ResponseToPoll {
            seq: 1,
            pan_id: PAN,
            destination: TAG_SHORT,
            source: ANCHOR_SHORT,
            activity: 0x42,
        }),
        150_000,
        -83.0,
    );

    let mut tag = TagSession::new(&mut radio, TagConfig::default());
    let result = tag.ranging_round();

    assert_eq!(
        result,
        Err(Error::ProtocolViolation(Violation::UnexpectedActivity(
            0x42
        )))
    );
    assert_eq!(tag.state(), TagState::Failed);
}
