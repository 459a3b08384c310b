//! Authenticated tree commitments.
//!
//! Two structures, both hashed exclusively through the challenge
//! [Transcript](umbra_transcript::Transcript):
//!
//! - [binary]: the root of an *ordered sequence* of items (RFC-6962 tree
//!   shape), with inclusion proofs. The ledger uses it for the
//!   transaction-ID root of a block.
//! - [patricia]: the root of a *set* of 32-byte digests, shaped uniquely by
//!   its membership. The ledger uses it for the unspent-output set and the
//!   active-nonce set, with incremental re-hashing on small deltas.

pub mod binary;
pub mod patricia;

pub use binary::MerkleItem;
