use thiserror::Error;

/// Error types.
#[derive(Debug, Error)]
pub enum Error {
    #[cfg(test)]
    #[error(transparent)]
    FromHexError(#[from] hex::FromHexError),

    /// A packet's length doesn't match its header.
    #[error("invalid length")]
    InvalidLength,

    #[error("data parse error: {0}")]
    BinRwError(#[from] binrw::Error),

    #[error("malformed console line: {0:?}")]
    MalformedLine(String),

    #[error("console command {command} expects {expected} argument(s), got {actual}")]
    MissingArgument {
        command: String,
        expected: usize,
        actual: usize,
    },
}
