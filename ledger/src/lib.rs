//! Blockchain state-transition core of the Umbra confidential-asset ledger.
//!
//! # Overview
//!
//! The core is the authoritative rule that maps a `(state, block)` pair to a
//! new state or rejects the block. Every node must reproduce the exact same
//! state and the exact same root hashes from the same inputs:
//!
//! - [block]: the block and header schema, the canonical block ID, and the
//!   stateless header rules.
//! - [transaction]: the typed transaction log the virtual machine emits, the
//!   transaction-ID derivation, and the [Executor](transaction::Executor)
//!   seam through which the VM is consumed.
//! - [state]: the [State](state::State) object and the atomic apply-block
//!   procedure: nonce expiry, log application, root recomputation, tip
//!   advancement and reference-ID pruning in a single step.
//! - [mocks]: deterministic VM doubles for tests and embedding harnesses.
//!
//! The core performs no I/O and exposes no configuration surface; consensus,
//! block production, networking and persistence belong to the embedding.
//! Transaction execution is pure in `(tx, block version, block timestamp)`,
//! so embeddings may fan it out; state application is single-writer.
//!
//! # Determinism
//!
//! All hashing flows through the challenge transcript: block IDs under the
//! `ZkVM.blockheader` label, the transaction root as a Merkle binary tree,
//! and the unspent-output and active-nonce sets as Merkle-Patricia trees.
//! [State::apply_block](state::State::apply_block) returns a successor state
//! and never mutates its receiver, so a failed application leaves no trace.

use thiserror::Error as ThisError;
use umbra_transcript::Digest;

pub mod block;
pub mod mocks;
pub mod state;
pub mod transaction;

pub use block::{Block, BlockHeader, BlockId};
pub use state::{NonceRecord, Snapshot, State};
pub use transaction::{
    Anchor, Entry, Executor, TxHeader, TxId, TxLog, UtxoId, VerifiedTx,
};

/// Transcript label for block-header hashing.
pub(crate) const BLOCKHEADER_LABEL: &[u8] = b"ZkVM.blockheader";
/// Transcript label for the transaction-ID root of a block.
pub(crate) const TXROOT_LABEL: &[u8] = b"ZkVM.txroot";
/// Transcript label for deriving a transaction ID from its log.
pub(crate) const TXID_LABEL: &[u8] = b"ZkVM.txid";
/// Transcript label for the unspent-output set root.
pub(crate) const UTXOROOT_LABEL: &[u8] = b"ZkVM.utxoroot";
/// Transcript label for the active-nonce set root.
pub(crate) const NONCEROOT_LABEL: &[u8] = b"ZkVM.nonceroot";

/// Errors that can occur when validating or applying a block.
///
/// Every error is fatal to the call that produced it and leaves the
/// caller-visible [State](state::State) unchanged.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A header failed stateless validation against the tip.
    #[error("invalid block header: {0}")]
    HeaderInvalid(&'static str),

    #[error("transaction root mismatch: header {expected}, computed {actual}")]
    TxRootMismatch { expected: Digest, actual: Digest },

    #[error(
        "transaction time window [{mintime_ms}, {maxtime_ms}] excludes block timestamp {timestamp_ms}"
    )]
    TxTimeOutOfRange {
        mintime_ms: u64,
        maxtime_ms: u64,
        timestamp_ms: u64,
    },

    /// A version 1 block may only carry version 1 transactions.
    #[error("transaction version {0} invalid in a version 1 block")]
    TxVersionInvalid(u64),

    #[error("malformed transaction log: {0}")]
    MalformedLog(&'static str),

    /// A nonce referenced a block ID that is neither the initial block nor
    /// in the reference window.
    #[error("nonce references unknown block {0}")]
    NonceUnknownBlockRef(block::BlockId),

    #[error("nonce anchor already in use: {0}")]
    NonceAnchorDuplicate(transaction::Anchor),

    #[error("input not in the utxo set: {0}")]
    InputMissing(transaction::UtxoId),

    #[error("output already in the utxo set: {0}")]
    OutputDuplicate(transaction::UtxoId),

    #[error("utxo root mismatch: header {expected}, computed {actual}")]
    UtxoRootMismatch { expected: Digest, actual: Digest },

    #[error("nonce root mismatch: header {expected}, computed {actual}")]
    NonceRootMismatch { expected: Digest, actual: Digest },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(&'static str),

    /// The virtual machine reported execution failure (opaque pass-through).
    #[error("transaction execution failed: {0}")]
    Vm(Box<dyn std::error::Error + Send + Sync>),
}

/// Declares a 32-byte identifier newtype over [Digest].
macro_rules! define_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub umbra_transcript::Digest);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<[u8; umbra_transcript::DIGEST_LENGTH]> for $name {
            fn from(value: [u8; umbra_transcript::DIGEST_LENGTH]) -> Self {
                Self(value.into())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_ref()
            }
        }

        impl umbra_codec::Write for $name {
            fn write(&self, buf: &mut impl bytes::BufMut) {
                umbra_codec::Write::write(&self.0, buf)
            }
        }

        impl umbra_codec::FixedSize for $name {
            const SIZE: usize = umbra_transcript::DIGEST_LENGTH;
        }

        impl umbra_codec::Read for $name {
            fn read(buf: &mut impl bytes::Buf) -> Result<Self, umbra_codec::Error> {
                Ok(Self(umbra_codec::Read::read(buf)?))
            }
        }
    };
}
pub(crate) use define_id;
