//! Codec error types.

use thiserror::Error;

/// Errors that can occur when decoding data.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("end of buffer")]
    EndOfBuffer,

    #[error("extra data: {0} bytes left over")]
    ExtraData(usize),

    #[error("invalid length: {0}")]
    InvalidLength(usize),

    #[error("invalid {0}: {1}")]
    Invalid(&'static str, &'static str),
}
