use std::io::Error as IoError;
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    #[error(transparent)]
    IoError(#[from] IoError),

    #[error(transparent)]
    Protocol(#[from] crate::protocol::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("channel unavailable, likely dropped")]
    ChannelUnavailable,

    #[error("internal error")]
    Internal,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("camera did not acknowledge sequence number reset")]
    HandshakeTimeout,

    #[error("disconnected")]
    Disconnected,

    #[error("receive endpoint closed")]
    EndpointClosed,

    #[error("unexpected state")]
    UnexpectedState,
}
