//! Wire codec for the ranging exchange frames
//!
//! Six frame kinds make up the exchange. A tag announces itself with a
//! [`Blink`], an anchor admits it with a [`RangingInitiation`], and the
//! measurement itself is the [`Poll`] / [`ResponseToPoll`] / [`Final`]
//! triplet, closed out by an [`ActivityControl`] that either chains the tag
//! to the next anchor or finishes the round.
//!
//! The layouts are fixed for interoperability with deployed nodes: a one-octet
//! function code, a one-octet sequence number, the addressing block, then the
//! payload. All multi-octet fields are little-endian. Decoding never panics;
//! anything shorter than the minimum length for its function code is a typed
//! [`DecodeError`].

use byte::{ctx::LE, BytesExt as _};
use core::convert::TryFrom;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::mac::{ExtendedAddress, PanId, ShortAddress};

/// The size of the largest frame on the wire (the final message), rounded up
///
/// Encode buffers of this size always suffice.
pub const MAX_FRAME_LEN: usize = 24;

/// Activity octet of [`ResponseToPoll`] that tells the tag to proceed to the
/// final message
pub const ACTIVITY_CONTINUE: u8 = 0x01;

/// The function code, the first octet of every frame
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    /// Unaddressed tag announcement
    Blink = 0xC5,
    /// Anchor admits a tag and assigns it a short address
    RangingInitiation = 0x20,
    /// Tag requests a range measurement
    Poll = 0x61,
    /// Anchor tells the tag to continue with the final message
    ResponseToPoll = 0x50,
    /// Tag's delayed final message with its embedded timestamps
    Final = 0x69,
    /// Anchor closes the round: chain to the next anchor or finish
    ActivityControl = 0x10,
}

/// A decoded ranging frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Frame {
    /// See [`Blink`]
    Blink(Blink),
    /// See [`RangingInitiation`]
    RangingInitiation(RangingInitiation),
    /// See [`Poll`]
    Poll(Poll),
    /// See [`ResponseToPoll`]
    ResponseToPoll(ResponseToPoll),
    /// See [`Final`]
    Final(Final),
    /// See [`ActivityControl`]
    ActivityControl(ActivityControl),
}

/// Tag announcement requesting network admission
///
/// Carries no addressing block; the tag doesn't have a short address yet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Blink {
    /// Sender's sequence number
    pub seq: u8,
    /// The tag's extended unique identifier
    pub tag_eui: ExtendedAddress,
}

/// Anchor-to-tag admission, mixing extended and short addressing
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangingInitiation {
    /// Sender's sequence number
    pub seq: u8,
    /// The network this exchange runs on
    pub pan_id: PanId,
    /// The extended identifier of the tag being admitted
    pub tag_eui: ExtendedAddress,
    /// The anchor's own short address, the target for the upcoming poll
    pub anchor: ShortAddress,
    /// The short address assigned to the tag
    pub assigned: ShortAddress,
}

/// Tag-to-anchor request to start a measurement
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Poll {
    /// Sender's sequence number
    pub seq: u8,
    /// The network this exchange runs on
    pub pan_id: PanId,
    /// The anchor being polled
    pub destination: ShortAddress,
    /// The polling tag
    pub source: ShortAddress,
}

/// Anchor-to-tag reply to a poll
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResponseToPoll {
    /// Sender's sequence number
    pub seq: u8,
    /// The network this exchange runs on
    pub pan_id: PanId,
    /// The tag that polled
    pub destination: ShortAddress,
    /// The responding anchor
    pub source: ShortAddress,
    /// Activity octet; [`ACTIVITY_CONTINUE`] proceeds to the final message
    pub activity: u8,
}

/// Tag-to-anchor final message
///
/// Embeds the 4-octet truncations of the tag's local timestamps. The frame is
/// transmitted with the radio's delayed-transmit mechanism so that
/// `final_sent` — the scheduled send time — matches the transmit timestamp
/// the hardware will actually report.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Final {
    /// Sender's sequence number
    pub seq: u8,
    /// The network this exchange runs on
    pub pan_id: PanId,
    /// The anchor that will compute the range
    pub destination: ShortAddress,
    /// The tag finishing the exchange
    pub source: ShortAddress,
    /// Lower 32 bits of the tag's poll transmit timestamp
    pub poll_sent: u32,
    /// Lower 32 bits of the tag's response receive timestamp
    pub response_received: u32,
    /// Lower 32 bits of the scheduled transmit time of this very frame
    pub final_sent: u32,
}

/// Anchor-to-tag round closure
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ActivityControl {
    /// Sender's sequence number
    pub seq: u8,
    /// The network this exchange runs on
    pub pan_id: PanId,
    /// The tag being directed
    pub destination: ShortAddress,
    /// The directing anchor
    pub source: ShortAddress,
    /// What the tag should do next
    pub directive: Directive,
}

/// The payload of an [`ActivityControl`] frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Directive {
    /// Ranging confirmed; continue the chain with the given anchor
    RangingConfirm {
        /// Short address of the next anchor to poll
        next_anchor: ShortAddress,
    },
    /// The round is over; blink again later at the suggested rate
    Finished {
        /// Suggested interval between blinks, in milliseconds
        blink_interval_ms: u16,
    },
}

const DIRECTIVE_FINISHED: u8 = 0x00;
const DIRECTIVE_CONFIRM: u8 = 0x01;

/// An error that occured while decoding a frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The frame is shorter than the minimum length for its function code
    UnexpectedEnd,
    /// The first octet is not a known function code
    UnknownFunctionCode(u8),
    /// The activity-control directive octet is not a known directive
    UnknownDirective(u8),
}

impl From<byte::Error> for DecodeError {
    fn from(_: byte::Error) -> Self {
        // The only primitive read failure on a fixed layout is running out of
        // input.
        DecodeError::UnexpectedEnd
    }
}

/// An error that occured while encoding a frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EncodeError {
    /// The provided buffer can't hold the frame
    BufferTooSmall {
        /// How large a buffer would have been required
        required_len: usize,
    },
}

impl Frame {
    /// Returns the frame's function code
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Frame::Blink(_) => FunctionCode::Blink,
            Frame::RangingInitiation(_) => FunctionCode::RangingInitiation,
            Frame::Poll(_) => FunctionCode::Poll,
            Frame::ResponseToPoll(_) => FunctionCode::ResponseToPoll,
            Frame::Final(_) => FunctionCode::Final,
            Frame::ActivityControl(_) => FunctionCode::ActivityControl,
        }
    }

    /// Returns the frame's sequence number
    pub fn seq(&self) -> u8 {
        match self {
            Frame::Blink(frame) => frame.seq,
            Frame::RangingInitiation(frame) => frame.seq,
            Frame::Poll(frame) => frame.seq,
            Frame::ResponseToPoll(frame) => frame.seq,
            Frame::Final(frame) => frame.seq,
            Frame::ActivityControl(frame) => frame.seq,
        }
    }

    /// Returns the exact length of the frame on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Blink(_) => 10,
            Frame::RangingInitiation(_) => 16,
            Frame::Poll(_) => 8,
            Frame::ResponseToPoll(_) => 9,
            Frame::Final(_) => 20,
            Frame::ActivityControl(_) => 11,
        }
    }

    /// Encodes the frame into `buffer`, returning the number of octets written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, EncodeError> {
        self.try_encode(buffer).map_err(|_| EncodeError::BufferTooSmall {
            required_len: self.encoded_len(),
        })
    }

    fn try_encode(&self, buffer: &mut [u8]) -> Result<usize, byte::Error> {
        let offset = &mut 0;
        buffer.write_with::<u8>(offset, self.function_code().into(), LE)?;

        match self {
            Frame::Blink(frame) => {
                buffer.write_with(offset, frame.seq, LE)?;
                buffer.write_with(offset, frame.tag_eui.0, LE)?;
            }
            Frame::RangingInitiation(frame) => {
                buffer.write_with(offset, frame.seq, LE)?;
                buffer.write_with(offset, frame.pan_id.0, LE)?;
                buffer.write_with(offset, frame.tag_eui.0, LE)?;
                buffer.write_with(offset, frame.anchor.0, LE)?;
                buffer.write_with(offset, frame.assigned.0, LE)?;
            }
            Frame::Poll(frame) => {
                buffer.write_with(offset, frame.seq, LE)?;
                buffer.write_with(offset, frame.pan_id.0, LE)?;
                buffer.write_with(offset, frame.destination.0, LE)?;
                buffer.write_with(offset, frame.source.0, LE)?;
            }
            Frame::ResponseToPoll(frame) => {
                buffer.write_with(offset, frame.seq, LE)?;
                buffer.write_with(offset, frame.pan_id.0, LE)?;
                buffer.write_with(offset, frame.destination.0, LE)?;
                buffer.write_with(offset, frame.source.0, LE)?;
                buffer.write_with(offset, frame.activity, LE)?;
            }
            Frame::Final(frame) => {
                buffer.write_with(offset, frame.seq, LE)?;
                buffer.write_with(offset, frame.pan_id.0, LE)?;
                buffer.write_with(offset, frame.destination.0, LE)?;
                buffer.write_with(offset, frame.source.0, LE)?;
                buffer.write_with(offset, frame.poll_sent, LE)?;
                buffer.write_with(offset, frame.response_received, LE)?;
                buffer.write_with(offset, frame.final_sent, LE)?;
            }
            Frame::ActivityControl(frame) => {
                buffer.write_with(offset, frame.seq, LE)?;
                buffer.write_with(offset, frame.pan_id.0, LE)?;
                buffer.write_with(offset, frame.destination.0, LE)?;
                buffer.write_with(offset, frame.source.0, LE)?;
                let (directive, param) = match frame.directive {
                    Directive::RangingConfirm { next_anchor } => {
                        (DIRECTIVE_CONFIRM, next_anchor.0)
                    }
                    Directive::Finished { blink_interval_ms } => {
                        (DIRECTIVE_FINISHED, blink_interval_ms)
                    }
                };
                buffer.write_with(offset, directive, LE)?;
                buffer.write_with(offset, param, LE)?;
            }
        }

        Ok(*offset)
    }

    /// Decodes a frame from received octets
    ///
    /// Rejects anything shorter than the minimum length for its function code
    /// with [`DecodeError::UnexpectedEnd`]; no input can cause a panic or an
    /// out-of-bounds access.
    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        let offset = &mut 0;

        let code: u8 = bytes.read_with(offset, LE)?;
        let code = FunctionCode::try_from(code)
            .map_err(|_| DecodeError::UnknownFunctionCode(code))?;

        let frame = match code {
            FunctionCode::Blink => Frame::Blink(Blink {
                seq: bytes.read_with(offset, LE)?,
                tag_eui: ExtendedAddress(bytes.read_with(offset, LE)?),
            }),
            FunctionCode::RangingInitiation => Frame::RangingInitiation(RangingInitiation {
                seq: bytes.read_with(offset, LE)?,
                pan_id: PanId(bytes.read_with(offset, LE)?),
                tag_eui: ExtendedAddress(bytes.read_with(offset, LE)?),
                anchor: ShortAddress(bytes.read_with(offset, LE)?),
                assigned: ShortAddress(bytes.read_with(offset, LE)?),
            }),
            FunctionCode::Poll => Frame::Poll(Poll {
                seq: bytes.read_with(offset, LE)?,
                pan_id: PanId(bytes.read_with(offset, LE)?),
                destination: ShortAddress(bytes.read_with(offset, LE)?),
                source: ShortAddress(bytes.read_with(offset, LE)?),
            }),
            FunctionCode::ResponseToPoll => Frame::ResponseToPoll(ResponseToPoll {
                seq: bytes.read_with(offset, LE)?,
                pan_id: PanId(bytes.read_with(offset, LE)?),
                destination: ShortAddress(bytes.read_with(offset, LE)?),
                source: ShortAddress(bytes.read_with(offset, LE)?),
                activity: bytes.read_with(offset, LE)?,
            }),
            FunctionCode::Final => Frame::Final(Final {
                seq: bytes.read_with(offset, LE)?,
                pan_id: PanId(bytes.read_with(offset, LE)?),
                destination: ShortAddress(bytes.read_with(offset, LE)?),
                source: ShortAddress(bytes.read_with(offset, LE)?),
                poll_sent: bytes.read_with(offset, LE)?,
                response_received: bytes.read_with(offset, LE)?,
                final_sent: bytes.read_with(offset, LE)?,
            }),
            FunctionCode::ActivityControl => {
                let seq = bytes.read_with(offset, LE)?;
                let pan_id = PanId(bytes.read_with(offset, LE)?);
                let destination = ShortAddress(bytes.read_with(offset, LE)?);
                let source = ShortAddress(bytes.read_with(offset, LE)?);
                let directive: u8 = bytes.read_with(offset, LE)?;
                let param: u16 = bytes.read_with(offset, LE)?;

                let directive = match directive {
                    DIRECTIVE_CONFIRM => Directive::RangingConfirm {
                        next_anchor: ShortAddress(param),
                    },
                    DIRECTIVE_FINISHED => Directive::Finished {
                        blink_interval_ms: param,
                    },
                    unknown => return Err(DecodeError::UnknownDirective(unknown)),
                };

                Frame::ActivityControl(ActivityControl {
                    seq,
                    pan_id,
                    destination,
                    source,
                    directive,
                })
            }
        };

        Ok(frame)
    }
}
