//! Classification of camera replies.
//!
//! A full-protocol reply is a [ViscaPacket][crate::ViscaPacket] whose payload
//! is `y0 zz ... FF`, where `y = 8 + camera address`. The high nibble of `zz`
//! selects the reply kind, the low nibble is the camera's command socket.
//!
//! Raw reply offset | Meaning
//! ---------------- | -------
//! `8` | `y0`: reply address
//! `9` | `0x4z`: acknowledge, `0x5z`: completion, `0x6z`: error
//! `10` | error reason, if `0x6z`
use crate::ViscaPacket;
use num_traits::FromPrimitive;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Reason code of an error reply.
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ErrorCode {
    MessageLength = 0x01,
    Syntax = 0x02,
    CommandBufferFull = 0x03,
    CommandCanceled = 0x04,
    NoSocket = 0x05,
    NotExecutable = 0x41,
}

impl ErrorCode {
    pub const fn description(&self) -> &'static str {
        match self {
            Self::MessageLength => "Message length error",
            Self::Syntax => "Syntax Error",
            Self::CommandBufferFull => "Command buffer full",
            Self::CommandCanceled => "Command canceled",
            Self::NoSocket => "No socket",
            Self::NotExecutable => "Command not executable",
        }
    }
}

/// Kind of a reply from the camera.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReplyKind {
    /// The command was accepted into `socket`.
    Acknowledge { socket: u8 },
    /// The command in `socket` finished executing. Inquiry results are also
    /// completions.
    Completion { socket: u8 },
    /// The command failed. `code` is [None] for reason codes outside the
    /// known table.
    Error { socket: u8, code: Option<ErrorCode>, raw_code: u8 },
    /// The camera reset its sequence number.
    SequenceReset,
    /// The camera sent a textual `NAK`.
    Nak,
    /// Anything else, including replies too short to classify.
    Unknown,
}

impl ReplyKind {
    /// Minimum length of a reply which can be classified by reply address.
    const MIN_LENGTH: usize = ViscaPacket::HEADERS_LENGTH + 3;

    pub fn classify(raw: &[u8]) -> Self {
        if raw.windows(3).any(|w| w == b"NAK") {
            return Self::Nak;
        }

        if raw.len() < Self::MIN_LENGTH {
            if ViscaPacket::is_reset_sequence_reply(raw) {
                return Self::SequenceReset;
            }
            return Self::Unknown;
        }

        let address = raw[ViscaPacket::HEADERS_LENGTH];
        if address & 0x8f != 0x80 {
            return Self::Unknown;
        }

        let kind = raw[ViscaPacket::HEADERS_LENGTH + 1];
        let socket = kind & 0x0f;
        match kind & 0xf0 {
            0x40 => Self::Acknowledge { socket },
            0x50 => Self::Completion { socket },
            0x60 => {
                let raw_code = raw[ViscaPacket::HEADERS_LENGTH + 2];
                Self::Error {
                    socket,
                    code: ErrorCode::from_u8(raw_code),
                    raw_code,
                }
            }
            _ => Self::Unknown,
        }
    }

    /// Returns `true` if the reply means the camera accepted or finished the
    /// command.
    pub const fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Acknowledge { .. } | Self::Completion { .. } | Self::SequenceReset
        )
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Nak)
    }
}

impl Display for ReplyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acknowledge { socket } => write!(f, "acknowledge (socket {socket})"),
            Self::Completion { socket } => write!(f, "completion (socket {socket})"),
            Self::Error { code, .. } => write!(
                f,
                "error: {}",
                code.as_ref().map_or("Unknown", ErrorCode::description)
            ),
            Self::SequenceReset => write!(f, "sequence number reset"),
            Self::Nak => write!(f, "NAK"),
            Self::Unknown => write!(f, "unknown reply"),
        }
    }
}

/// A reply received from the camera, with its classification.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reply {
    pub kind: ReplyKind,
    /// The reply as received, including the frame header.
    pub raw: Vec<u8>,
}

impl Reply {
    pub fn new(raw: Vec<u8>) -> Self {
        Self {
            kind: ReplyKind::classify(&raw),
            raw,
        }
    }

    /// The reply without its frame header.
    pub fn payload(&self) -> &[u8] {
        self.raw.get(ViscaPacket::HEADERS_LENGTH..).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Result;

    #[test]
    fn classify() -> Result<()> {
        assert_eq!(
            ReplyKind::Acknowledge { socket: 1 },
            ReplyKind::classify(&hex::decode("01110003000000019041ff")?)
        );
        assert_eq!(
            ReplyKind::Completion { socket: 1 },
            ReplyKind::classify(&hex::decode("01110003000000019051ff")?)
        );
        assert_eq!(
            ReplyKind::Completion { socket: 0 },
            ReplyKind::classify(&hex::decode("011100070000000290500400ff")?)
        );
        assert_eq!(
            ReplyKind::SequenceReset,
            ReplyKind::classify(&hex::decode("020100010000000001")?)
        );
        assert_eq!(ReplyKind::Unknown, ReplyKind::classify(&[0x90, 0x41]));
        assert_eq!(ReplyKind::Nak, ReplyKind::classify(b"\x02NAK:network\xff\x03"));
        Ok(())
    }

    #[test]
    fn error_reasons() -> Result<()> {
        let kind = ReplyKind::classify(&hex::decode("0111000400000003906002ff")?);
        assert_eq!(
            ReplyKind::Error {
                socket: 0,
                code: Some(ErrorCode::Syntax),
                raw_code: 2
            },
            kind
        );
        assert!(kind.is_error());
        assert_eq!("error: Syntax Error", kind.to_string());

        let kind = ReplyKind::classify(&hex::decode("0111000400000003906141ff")?);
        assert_eq!("error: Command not executable", kind.to_string());

        // Unknown codes fall back to a generic reason.
        let kind = ReplyKind::classify(&hex::decode("011100040000000390607fff")?);
        assert_eq!(
            ReplyKind::Error {
                socket: 0,
                code: None,
                raw_code: 0x7f
            },
            kind
        );
        assert_eq!("error: Unknown", kind.to_string());
        Ok(())
    }

    #[test]
    fn payload() -> Result<()> {
        let reply = Reply::new(hex::decode("01110003000000019041ff")?);
        assert_eq!([0x90, 0x41, 0xff], reply.payload());
        assert!(reply.kind.is_success());
        assert!(Reply::new(vec![1, 2]).payload().is_empty());
        Ok(())
    }
}
