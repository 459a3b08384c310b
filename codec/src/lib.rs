//! Serialize structured data.
//!
//! # Overview
//!
//! A binary serialization library designed to efficiently and safely:
//! - Serialize structured data into a binary format
//! - Deserialize untrusted binary input into structured data
//!
//! All multi-byte integers encode little-endian, and length prefixes are
//! little-endian `u32`, matching the ledger's block wire format (block headers
//! serialize their fields in the same order the block-ID transcript commits
//! them).
//!
//! # Supported Types
//!
//! Natively supports:
//! - Primitives: `u8`, `u32`, `u64`
//! - Fixed-size byte arrays like `[u8; N]`
//! - Collections: `Vec<T>` (u32 count prefix, then items in order)
//!
//! User-defined types implement [Write], [EncodeSize] and [Read]; the
//! [Encode]/[Decode] extension traits are provided for free.
//!
//! # Example
//!
//! ```
//! use bytes::{Buf, BufMut};
//! use umbra_codec::{Decode, Encode, EncodeSize, Error, Read, Write};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Record {
//!     seq: u64,
//!     payload: Vec<u8>,
//! }
//!
//! impl Write for Record {
//!     fn write(&self, buf: &mut impl BufMut) {
//!         self.seq.write(buf);
//!         self.payload.write(buf);
//!     }
//! }
//!
//! impl EncodeSize for Record {
//!     fn encode_size(&self) -> usize {
//!         self.seq.encode_size() + self.payload.encode_size()
//!     }
//! }
//!
//! impl Read for Record {
//!     fn read(buf: &mut impl Buf) -> Result<Self, Error> {
//!         let seq = u64::read(buf)?;
//!         let payload = Vec::<u8>::read(buf)?;
//!         Ok(Self { seq, payload })
//!     }
//! }
//!
//! let record = Record { seq: 7, payload: vec![1, 2, 3] };
//! let encoded = record.encode();
//! let decoded = Record::decode(encoded).unwrap();
//! assert_eq!(record, decoded);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod util;

pub use codec::{Decode, Encode, EncodeSize, FixedSize, Read, Write};
pub use error::Error;
