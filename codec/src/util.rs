//! Codec utility functions.

use crate::Error;
use bytes::Buf;

/// Returns an error if the buffer has fewer than `len` bytes remaining.
///
/// Call before any read or length-driven allocation so that a malformed
/// length prefix cannot trigger an oversized allocation.
#[inline]
pub fn at_least(buf: &mut impl Buf, len: usize) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    Ok(())
}
