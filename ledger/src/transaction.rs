//! The transaction-log model.
//!
//! The virtual machine executes a transaction and emits an ordered log of
//! typed entries; the core consumes logs, never bytecode. Only `Nonce`,
//! `Input` and `Output` entries drive state transition; the rest participate
//! in the transaction ID and are otherwise ignored by the state engine.

use crate::{block::BlockId, define_id, TXID_LABEL};
use bytes::{Buf, BufMut};
use umbra_codec::{EncodeSize, Error as CodecError, FixedSize, Read, Write};
use umbra_merkle::{binary, MerkleItem};
use umbra_transcript::{Digest, Transcript};

define_id!(
    /// Unique 32-byte identifier of a transaction, derived from its log.
    TxId
);

define_id!(
    /// Opaque 32-byte identifier of an unspent transaction output.
    UtxoId
);

define_id!(
    /// 32-byte identifier of a nonce; unique across all live nonces.
    Anchor
);

impl MerkleItem for TxId {
    fn commit(&self, transcript: &mut Transcript) {
        transcript.commit_bytes(b"txid", self.0.as_ref());
    }
}

impl TxId {
    /// Derives the transaction ID from its log.
    pub fn from_log(log: &[Entry]) -> Self {
        Self(binary::root(TXID_LABEL, log))
    }
}

/// Header entry of a transaction log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxHeader {
    /// Transaction version; version 1 blocks admit only version 1 txs.
    pub version: u64,
    /// Earliest block timestamp (inclusive, ms) the tx may be included at.
    pub mintime_ms: u64,
    /// Latest block timestamp (inclusive, ms) the tx may be included at.
    pub maxtime_ms: u64,
}

impl Write for TxHeader {
    fn write(&self, buf: &mut impl BufMut) {
        self.version.write(buf);
        self.mintime_ms.write(buf);
        self.maxtime_ms.write(buf);
    }
}

impl FixedSize for TxHeader {
    const SIZE: usize = 3 * u64::SIZE;
}

impl Read for TxHeader {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let version = u64::read(buf)?;
        let mintime_ms = u64::read(buf)?;
        let maxtime_ms = u64::read(buf)?;
        Ok(Self {
            version,
            mintime_ms,
            maxtime_ms,
        })
    }
}

/// Entry in a transaction log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// Transaction header; a well-formed log begins with one.
    Header(TxHeader),
    /// Issuance of value (quantity and flavor commitments, opaque here).
    Issue { quantity: Digest, flavor: Digest },
    /// Retirement of value (quantity and flavor commitments, opaque here).
    Retire { quantity: Digest, flavor: Digest },
    /// Anti-replay marker tied to a recent block ID and an expiry.
    Nonce {
        anchor: Anchor,
        blockid: BlockId,
        maxtime_ms: u64,
    },
    /// Spend of an unspent output.
    Input(UtxoId),
    /// Creation of an unspent output.
    Output(UtxoId),
    /// Arbitrary committed data.
    Data(Vec<u8>),
}

/// Wire kind tags, one byte per entry.
const KIND_HEADER: u8 = 0;
const KIND_ISSUE: u8 = 1;
const KIND_RETIRE: u8 = 2;
const KIND_NONCE: u8 = 3;
const KIND_INPUT: u8 = 4;
const KIND_OUTPUT: u8 = 5;
const KIND_DATA: u8 = 6;

impl MerkleItem for Entry {
    fn commit(&self, transcript: &mut Transcript) {
        match self {
            Entry::Header(header) => {
                transcript.commit_u64(b"tx.version", header.version);
                transcript.commit_u64(b"tx.mintime", header.mintime_ms);
                transcript.commit_u64(b"tx.maxtime", header.maxtime_ms);
            }
            Entry::Issue { quantity, flavor } => {
                transcript.commit_bytes(b"issue.q", quantity.as_ref());
                transcript.commit_bytes(b"issue.f", flavor.as_ref());
            }
            Entry::Retire { quantity, flavor } => {
                transcript.commit_bytes(b"retire.q", quantity.as_ref());
                transcript.commit_bytes(b"retire.f", flavor.as_ref());
            }
            Entry::Nonce {
                anchor,
                blockid,
                maxtime_ms,
            } => {
                transcript.commit_bytes(b"nonce.anchor", anchor.as_ref());
                transcript.commit_bytes(b"nonce.blockid", blockid.as_ref());
                transcript.commit_u64(b"nonce.maxtime", *maxtime_ms);
            }
            Entry::Input(utxo) => {
                transcript.commit_bytes(b"input", utxo.as_ref());
            }
            Entry::Output(utxo) => {
                transcript.commit_bytes(b"output", utxo.as_ref());
            }
            Entry::Data(data) => {
                transcript.commit_bytes(b"data", data);
            }
        }
    }
}

impl Write for Entry {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Entry::Header(header) => {
                KIND_HEADER.write(buf);
                header.write(buf);
            }
            Entry::Issue { quantity, flavor } => {
                KIND_ISSUE.write(buf);
                quantity.write(buf);
                flavor.write(buf);
            }
            Entry::Retire { quantity, flavor } => {
                KIND_RETIRE.write(buf);
                quantity.write(buf);
                flavor.write(buf);
            }
            Entry::Nonce {
                anchor,
                blockid,
                maxtime_ms,
            } => {
                KIND_NONCE.write(buf);
                anchor.write(buf);
                blockid.write(buf);
                maxtime_ms.write(buf);
            }
            Entry::Input(utxo) => {
                KIND_INPUT.write(buf);
                utxo.write(buf);
            }
            Entry::Output(utxo) => {
                KIND_OUTPUT.write(buf);
                utxo.write(buf);
            }
            Entry::Data(data) => {
                KIND_DATA.write(buf);
                data.write(buf);
            }
        }
    }
}

impl EncodeSize for Entry {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Entry::Header(header) => header.encode_size(),
                Entry::Issue { quantity, flavor } | Entry::Retire { quantity, flavor } => {
                    quantity.encode_size() + flavor.encode_size()
                }
                Entry::Nonce {
                    anchor,
                    blockid,
                    maxtime_ms,
                } => anchor.encode_size() + blockid.encode_size() + maxtime_ms.encode_size(),
                Entry::Input(utxo) | Entry::Output(utxo) => utxo.encode_size(),
                Entry::Data(data) => data.encode_size(),
            }
    }
}

impl Read for Entry {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let kind = u8::read(buf)?;
        match kind {
            KIND_HEADER => Ok(Entry::Header(TxHeader::read(buf)?)),
            KIND_ISSUE => Ok(Entry::Issue {
                quantity: Digest::read(buf)?,
                flavor: Digest::read(buf)?,
            }),
            KIND_RETIRE => Ok(Entry::Retire {
                quantity: Digest::read(buf)?,
                flavor: Digest::read(buf)?,
            }),
            KIND_NONCE => Ok(Entry::Nonce {
                anchor: Anchor::read(buf)?,
                blockid: BlockId::read(buf)?,
                maxtime_ms: u64::read(buf)?,
            }),
            KIND_INPUT => Ok(Entry::Input(UtxoId::read(buf)?)),
            KIND_OUTPUT => Ok(Entry::Output(UtxoId::read(buf)?)),
            KIND_DATA => Ok(Entry::Data(Vec::<u8>::read(buf)?)),
            _ => Err(CodecError::Invalid("Entry", "unknown kind tag")),
        }
    }
}

/// Transaction log: the ordered entries the VM derived from one transaction.
pub type TxLog = Vec<Entry>;

/// A transaction the VM has executed: its header entry, recomputed ID and
/// full log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedTx {
    pub header: TxHeader,
    pub id: TxId,
    pub log: TxLog,
}

/// The transaction virtual machine, as consumed by the core.
///
/// Execution must be pure in `(tx, block_version, timestamp_ms)`: the core
/// trusts the VM's validity predicate but recomputes every transaction ID
/// and the transaction root itself.
pub trait Executor {
    /// Transaction type executed by this VM; opaque to the core.
    type Transaction;

    /// Execution failure, surfaced unchanged as [Error::Vm](crate::Error::Vm).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Executes `tx` in the context of the including block and returns its
    /// log.
    fn execute(
        &self,
        tx: &Self::Transaction,
        block_version: u64,
        timestamp_ms: u64,
    ) -> Result<TxLog, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_codec::{Decode, Encode};

    fn log() -> TxLog {
        vec![
            Entry::Header(TxHeader {
                version: 1,
                mintime_ms: 0,
                maxtime_ms: 10_000,
            }),
            Entry::Nonce {
                anchor: Anchor::from([1u8; 32]),
                blockid: BlockId::from([2u8; 32]),
                maxtime_ms: 5_000,
            },
            Entry::Input(UtxoId::from([3u8; 32])),
            Entry::Output(UtxoId::from([4u8; 32])),
            Entry::Issue {
                quantity: Digest::from([5u8; 32]),
                flavor: Digest::from([6u8; 32]),
            },
            Entry::Data(vec![7, 8, 9]),
        ]
    }

    #[test]
    fn test_txid_deterministic() {
        assert_eq!(TxId::from_log(&log()), TxId::from_log(&log()));
    }

    #[test]
    fn test_txid_entry_sensitivity() {
        let base = TxId::from_log(&log());
        let mut changed = log();
        changed[2] = Entry::Input(UtxoId::from([9u8; 32]));
        assert_ne!(TxId::from_log(&changed), base);

        // Order matters.
        let mut reordered = log();
        reordered.swap(2, 3);
        assert_ne!(TxId::from_log(&reordered), base);
    }

    #[test]
    fn test_entry_roundtrip() {
        for entry in log() {
            let encoded = entry.encode();
            assert_eq!(encoded.len(), entry.encode_size());
            assert_eq!(Entry::decode(encoded).unwrap(), entry);
        }
    }

    #[test]
    fn test_unknown_kind_tag() {
        let encoded = vec![0xFFu8];
        assert!(matches!(
            Entry::decode(bytes::Bytes::from(encoded)),
            Err(CodecError::Invalid("Entry", _))
        ));
    }
}
