//! Block and block-header schema, the canonical block ID, and the stateless
//! header rules.
//!
//! A header is immutable once built; its ID is the 32-byte challenge of a
//! transcript that commits every header field in wire order. The wire format
//! serializes the fields in exactly the order the transcript commits them,
//! integers little-endian and `ext` length-prefixed.

use crate::{
    define_id,
    transaction::TxId,
    Error, BLOCKHEADER_LABEL, NONCEROOT_LABEL, TXROOT_LABEL, UTXOROOT_LABEL,
};
use bytes::{Buf, BufMut};
use umbra_codec::{EncodeSize, Error as CodecError, Read, Write};
use umbra_merkle::{binary, patricia};
use umbra_transcript::{Digest, Transcript};

define_id!(
    /// Canonical 32-byte hash of a block header.
    BlockId
);

/// Header of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Network version rules the block was produced under.
    pub version: u64,
    /// Height of the block; the initial block has height 1.
    pub height: u64,
    /// ID of the preceding block header (all zero for the initial block).
    pub previd: BlockId,
    /// Block timestamp in milliseconds; strictly increases along the chain.
    pub timestamp_ms: u64,
    /// Merkle binary root of the block's transaction IDs.
    pub txroot: Digest,
    /// Merkle-Patricia root of the unspent-output set after this block.
    pub utxoroot: Digest,
    /// Merkle-Patricia root of the active-nonce set after this block.
    pub nonceroot: Digest,
    /// Size of the reference window of recent block IDs after this block.
    pub refscount: u64,
    /// Extension field; must be empty at version 1.
    pub ext: Vec<u8>,
}

impl BlockHeader {
    /// Computes the canonical ID of this header.
    pub fn id(&self) -> BlockId {
        let mut transcript = Transcript::new(BLOCKHEADER_LABEL);
        transcript.commit_u64(b"version", self.version);
        transcript.commit_u64(b"height", self.height);
        transcript.commit_bytes(b"previd", self.previd.as_ref());
        transcript.commit_u64(b"timestamp_ms", self.timestamp_ms);
        transcript.commit_bytes(b"txroot", self.txroot.as_ref());
        transcript.commit_bytes(b"utxoroot", self.utxoroot.as_ref());
        transcript.commit_bytes(b"nonceroot", self.nonceroot.as_ref());
        transcript.commit_u64(b"refscount", self.refscount);
        transcript.commit_bytes(b"ext", &self.ext);
        BlockId(transcript.challenge_digest(b"id"))
    }

    /// Builds the initial header for a new network: version 1, height 1,
    /// all-zero `previd`, empty-set roots and empty `ext`.
    pub fn make_initial(timestamp_ms: u64, refscount: u64) -> Self {
        Self {
            version: 1,
            height: 1,
            previd: BlockId::default(),
            timestamp_ms,
            txroot: binary::root::<TxId>(TXROOT_LABEL, &[]),
            utxoroot: patricia::root_sorted(UTXOROOT_LABEL, &[]),
            nonceroot: patricia::root_sorted(NONCEROOT_LABEL, &[]),
            refscount,
            ext: Vec::new(),
        }
    }

    /// Checks the stateless rules for `next` as this header's successor.
    pub fn verify_next(&self, next: &BlockHeader) -> Result<(), Error> {
        if next.version < self.version {
            return Err(Error::HeaderInvalid("version regression"));
        }
        if next.version == 1 && !next.ext.is_empty() {
            return Err(Error::HeaderInvalid("nonempty ext in a version 1 block"));
        }
        if next.height != self.height + 1 {
            return Err(Error::HeaderInvalid("height does not follow the tip"));
        }
        if next.previd != self.id() {
            return Err(Error::HeaderInvalid("previd does not match the tip id"));
        }
        if next.timestamp_ms <= self.timestamp_ms {
            return Err(Error::HeaderInvalid("timestamp does not increase"));
        }
        // The window may shrink to any size but grows by at most one.
        if next.refscount > self.refscount + 1 {
            return Err(Error::HeaderInvalid("refscount grows by more than one"));
        }
        Ok(())
    }
}

impl Write for BlockHeader {
    fn write(&self, buf: &mut impl BufMut) {
        self.version.write(buf);
        self.height.write(buf);
        self.previd.write(buf);
        self.timestamp_ms.write(buf);
        self.txroot.write(buf);
        self.utxoroot.write(buf);
        self.nonceroot.write(buf);
        self.refscount.write(buf);
        self.ext.write(buf);
    }
}

impl EncodeSize for BlockHeader {
    fn encode_size(&self) -> usize {
        self.version.encode_size()
            + self.height.encode_size()
            + self.previd.encode_size()
            + self.timestamp_ms.encode_size()
            + self.txroot.encode_size()
            + self.utxoroot.encode_size()
            + self.nonceroot.encode_size()
            + self.refscount.encode_size()
            + self.ext.encode_size()
    }
}

impl Read for BlockHeader {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let version = u64::read(buf)?;
        let height = u64::read(buf)?;
        let previd = BlockId::read(buf)?;
        let timestamp_ms = u64::read(buf)?;
        let txroot = Digest::read(buf)?;
        let utxoroot = Digest::read(buf)?;
        let nonceroot = Digest::read(buf)?;
        let refscount = u64::read(buf)?;
        let ext = Vec::<u8>::read(buf)?;
        Ok(Self {
            version,
            height,
            previd,
            timestamp_ms,
            txroot,
            utxoroot,
            nonceroot,
            refscount,
            ext,
        })
    }
}

/// A block: a header plus the transactions it commits to.
///
/// The transaction type is opaque to the core; only the logs the VM derives
/// from it matter for state transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block<T> {
    pub header: BlockHeader,
    pub txs: Vec<T>,
}

impl<T> Block<T> {
    /// Returns the canonical ID of this block.
    pub fn id(&self) -> BlockId {
        self.header.id()
    }
}

impl<T: Write> Write for Block<T> {
    fn write(&self, buf: &mut impl BufMut) {
        self.header.write(buf);
        self.txs.write(buf);
    }
}

impl<T: EncodeSize> EncodeSize for Block<T> {
    fn encode_size(&self) -> usize {
        self.header.encode_size() + self.txs.encode_size()
    }
}

impl<T: Read> Read for Block<T> {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let header = BlockHeader::read(buf)?;
        let txs = Vec::<T>::read(buf)?;
        Ok(Self { header, txs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_codec::{Decode, Encode};

    fn header() -> BlockHeader {
        BlockHeader {
            version: 1,
            height: 4,
            previd: BlockId::from([2u8; 32]),
            timestamp_ms: 1_700_000_000_000,
            txroot: Digest::from([3u8; 32]),
            utxoroot: Digest::from([4u8; 32]),
            nonceroot: Digest::from([5u8; 32]),
            refscount: 3,
            ext: Vec::new(),
        }
    }

    #[test]
    fn test_id_deterministic() {
        assert_eq!(header().id(), header().id());
    }

    #[test]
    fn test_id_field_sensitivity() {
        let base = header().id();
        let mut changed = header();
        changed.version = 2;
        assert_ne!(changed.id(), base);
        let mut changed = header();
        changed.height = 5;
        assert_ne!(changed.id(), base);
        let mut changed = header();
        changed.timestamp_ms += 1;
        assert_ne!(changed.id(), base);
        let mut changed = header();
        changed.refscount = 0;
        assert_ne!(changed.id(), base);
        let mut changed = header();
        changed.ext = vec![1];
        assert_ne!(changed.id(), base);
        let mut changed = header();
        changed.txroot = Digest::from([9u8; 32]);
        assert_ne!(changed.id(), base);
    }

    #[test]
    fn test_make_initial() {
        let initial = BlockHeader::make_initial(1000, 3);
        assert_eq!(initial.version, 1);
        assert_eq!(initial.height, 1);
        assert_eq!(initial.previd, BlockId::default());
        assert_eq!(initial.timestamp_ms, 1000);
        assert_eq!(initial.refscount, 3);
        assert!(initial.ext.is_empty());
        // Roots commit to empty sets, each under its own label.
        assert_ne!(initial.txroot, initial.utxoroot);
        assert_ne!(initial.utxoroot, initial.nonceroot);
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = header();
        header.ext = vec![7, 8, 9];
        let decoded = BlockHeader::decode(header.encode()).unwrap();
        assert_eq!(header, decoded);
        // Version 1 rejects nonempty ext at validation, not decoding.
        assert_eq!(header.encode_size(), 4 * 8 + 4 * 32 + 4 + 3);
    }

    #[test]
    fn test_verify_next_rules() {
        let prev = BlockHeader::make_initial(1000, 3);
        let mut next = BlockHeader {
            version: 1,
            height: 2,
            previd: prev.id(),
            timestamp_ms: 1001,
            txroot: Digest::default(),
            utxoroot: Digest::default(),
            nonceroot: Digest::default(),
            refscount: 3,
            ext: Vec::new(),
        };
        prev.verify_next(&next).unwrap();

        next.version = 0;
        assert!(matches!(
            prev.verify_next(&next),
            Err(Error::HeaderInvalid("version regression"))
        ));
        next.version = 1;

        next.ext = vec![1];
        assert!(matches!(prev.verify_next(&next), Err(Error::HeaderInvalid(_))));
        next.ext = Vec::new();

        next.height = 3;
        assert!(matches!(prev.verify_next(&next), Err(Error::HeaderInvalid(_))));
        next.height = 2;

        next.previd = BlockId::default();
        assert!(matches!(prev.verify_next(&next), Err(Error::HeaderInvalid(_))));
        next.previd = prev.id();

        next.timestamp_ms = 1000;
        assert!(matches!(prev.verify_next(&next), Err(Error::HeaderInvalid(_))));
        next.timestamp_ms = 1001;

        next.refscount = 5;
        assert!(matches!(prev.verify_next(&next), Err(Error::HeaderInvalid(_))));
        next.refscount = 4;
        prev.verify_next(&next).unwrap();
        next.refscount = 0;
        prev.verify_next(&next).unwrap();
    }
}
