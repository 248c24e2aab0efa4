use crate::{Error, Result};
use binrw::{binrw, BinRead, BinWrite};
#[cfg(feature = "clap")]
use clap::ValueEnum;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// VISCA-over-IP payload type, the first two bytes of a [ViscaPacket].
#[binrw]
#[brw(big, repr = u16)]
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[repr(u16)]
pub enum PayloadType {
    /// VISCA command or inquiry.
    ///
    /// Inquiries are also sent with this type; the cameras accept both.
    Command = 0x0100,
    Inquiry = 0x0110,
    /// VISCA reply (acknowledge, completion or error).
    Reply = 0x0111,
    DeviceSetting = 0x0120,
    /// Control command, used to reset the sequence number.
    ControlCommand = 0x0200,
    ControlReply = 0x0201,
}

/// Which framing a camera expects on its control port.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProtocolVariant {
    /// Sony-style VISCA-over-IP: framed with a [ViscaPacket] header, and the
    /// camera sends acknowledge and completion replies.
    #[default]
    Full,

    /// Bare VISCA payloads with no framing, and no replies are read.
    Simplified,
}

/// [ViscaPacket] is the basic unit of communication with a full-protocol
/// camera over UDP.
///
/// ## Packet format
///
/// * `u16`: [payload type][PayloadType]
/// * `u16`: payload length
/// * `u32`: sequence number
/// * payload (the VISCA message, `8x ... FF`)
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big)]
pub struct ViscaPacket {
    pub payload_type: PayloadType,

    #[br(temp)]
    #[bw(try_calc(u16::try_from(payload.len())))]
    length: u16,

    pub sequence: u32,

    #[br(count = length)]
    pub payload: Vec<u8>,
}

impl ViscaPacket {
    /// Length of the packet header, before the payload.
    pub const HEADERS_LENGTH: usize = 8;

    /// Maximum packet size we expect from a camera, including headers.
    pub const MAX_PACKET_LENGTH: usize = 1024;

    /// Payload of the control command which resets the camera's sequence
    /// number.
    const RESET_SEQUENCE: u8 = 0x01;

    /// Frames a VISCA command or inquiry.
    pub fn command(sequence: u32, payload: &[u8]) -> Self {
        Self {
            payload_type: PayloadType::Command,
            sequence,
            payload: payload.to_vec(),
        }
    }

    /// Makes the control command that resets the camera's sequence number to
    /// `1`.
    pub fn reset_sequence() -> Self {
        Self {
            payload_type: PayloadType::ControlCommand,
            sequence: 1,
            payload: vec![Self::RESET_SEQUENCE],
        }
    }

    /// Returns `true` if `raw` is the camera's acknowledgement of
    /// [ViscaPacket::reset_sequence].
    pub fn is_reset_sequence_reply(raw: &[u8]) -> bool {
        matches!(
            Self::from_bytes(raw),
            Ok(Self {
                payload_type: PayloadType::ControlReply,
                ref payload,
                ..
            }) if payload.as_slice() == [Self::RESET_SEQUENCE]
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::with_capacity(Self::HEADERS_LENGTH + self.payload.len()));
        self.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Parses exactly one packet.
    ///
    /// Returns [Error::InvalidLength] if `raw` continues past the payload
    /// length in the header.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(raw);
        let pkt = Self::read(&mut cursor)?;
        if cursor.position() != raw.len() as u64 {
            return Err(Error::InvalidLength);
        }
        Ok(pkt)
    }
}

/// Frames `payload` for the wire according to `variant`.
///
/// [ProtocolVariant::Simplified] cameras get the payload as-is.
pub fn frame(variant: ProtocolVariant, sequence: u32, payload: &[u8]) -> Result<Vec<u8>> {
    match variant {
        ProtocolVariant::Full => ViscaPacket::command(sequence, payload).to_bytes(),
        ProtocolVariant::Simplified => Ok(payload.to_vec()),
    }
}
