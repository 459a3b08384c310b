//! Core codec traits.

use crate::error::Error;
use bytes::{Buf, BufMut, BytesMut};

/// Trait for types that can be written to a buffer.
pub trait Write {
    /// Writes this value to the buffer.
    fn write(&self, buf: &mut impl BufMut);
}

/// Trait for types that know their encoded length.
pub trait EncodeSize {
    /// Returns the encoded length of this value in bytes.
    fn encode_size(&self) -> usize;
}

/// Trait for types that can be encoded to bytes.
pub trait Encode: Write + EncodeSize {
    /// Encodes a value to bytes.
    fn encode(&self) -> BytesMut {
        let size = self.encode_size();
        let mut buf = BytesMut::with_capacity(size);
        self.write(&mut buf);
        assert_eq!(buf.len(), size);
        buf
    }
}

impl<T: Write + EncodeSize> Encode for T {}

/// Trait for types that can be read from a buffer.
pub trait Read: Sized {
    /// Reads a value from the buffer, returning an error if the input is
    /// malformed or truncated.
    fn read(buf: &mut impl Buf) -> Result<Self, Error>;
}

/// Trait for types that can be decoded from bytes.
pub trait Decode: Read {
    /// Decodes a value from a buffer.
    ///
    /// Returns an error if reading fails or if data remains in the buffer
    /// after the value has been read.
    fn decode(mut buf: impl Buf) -> Result<Self, Error> {
        let value = Self::read(&mut buf)?;
        let remaining = buf.remaining();
        if remaining > 0 {
            return Err(Error::ExtraData(remaining));
        }
        Ok(value)
    }
}

impl<T: Read> Decode for T {}

/// Trait for types with a fixed-length encoding.
pub trait FixedSize {
    /// The encoded length of this value.
    const SIZE: usize;
}

impl<T: FixedSize> EncodeSize for T {
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}
