//! Codec implementations for primitive and collection types.
//!
//! Integers are little-endian. `Vec<T>` encodes as a little-endian `u32`
//! count followed by the items in order.

use crate::{codec::FixedSize, util::at_least, EncodeSize, Error, Read, Write};
use bytes::{Buf, BufMut};

impl Write for u8 {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(*self);
    }
}

impl FixedSize for u8 {
    const SIZE: usize = 1;
}

impl Read for u8 {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        at_least(buf, Self::SIZE)?;
        Ok(buf.get_u8())
    }
}

impl Write for u32 {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(*self);
    }
}

impl FixedSize for u32 {
    const SIZE: usize = 4;
}

impl Read for u32 {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        at_least(buf, Self::SIZE)?;
        Ok(buf.get_u32_le())
    }
}

impl Write for u64 {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(*self);
    }
}

impl FixedSize for u64 {
    const SIZE: usize = 8;
}

impl Read for u64 {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        at_least(buf, Self::SIZE)?;
        Ok(buf.get_u64_le())
    }
}

impl<const N: usize> Write for [u8; N] {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(self);
    }
}

impl<const N: usize> FixedSize for [u8; N] {
    const SIZE: usize = N;
}

impl<const N: usize> Read for [u8; N] {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        at_least(buf, N)?;
        let mut out = [0u8; N];
        buf.copy_to_slice(&mut out);
        Ok(out)
    }
}

impl<T: Write> Write for Vec<T> {
    fn write(&self, buf: &mut impl BufMut) {
        let len = u32::try_from(self.len()).expect("length exceeds u32");
        len.write(buf);
        for item in self {
            item.write(buf);
        }
    }
}

impl<T: EncodeSize> EncodeSize for Vec<T> {
    fn encode_size(&self) -> usize {
        u32::SIZE + self.iter().map(|item| item.encode_size()).sum::<usize>()
    }
}

impl<T: Read> Read for Vec<T> {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        let len = u32::read(buf)? as usize;
        // Every supported item occupies at least one byte, so this bounds the
        // allocation below by the remaining input.
        at_least(buf, len)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::read(buf)?);
        }
        Ok(items)
    }
}
