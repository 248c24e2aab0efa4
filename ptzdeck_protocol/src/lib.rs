#![doc = include_str!("../README.md")]

#[macro_use]
extern crate num_derive;

#[macro_use]
extern crate tracing;

pub mod command;
pub mod console;
pub mod discovery;
mod error;
pub mod inquiry;
pub mod lookup;
mod packet;
mod reply;
mod util;

pub use crate::{
    command::{CameraCommand, PanTiltDirection},
    console::ConsoleMessage,
    error::Error,
    inquiry::{decode_video_format, CameraProperties, Inquiry, InquiryBlock, PanTiltPosition},
    packet::{frame, PayloadType, ProtocolVariant, ViscaPacket},
    reply::{ErrorCode, Reply, ReplyKind},
    util::{join_nibbles, split_nibbles_u16, split_nibbles_u8},
};

/// Result type.
pub type Result<T = ()> = std::result::Result<T, Error>;
