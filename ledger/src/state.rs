//! The blockchain state and the atomic apply-block procedure.
//!
//! [State] owns the tip and initial headers, the unspent-output set, the
//! active-nonce set and the bounded window of recent block IDs. It is
//! mutated only by [State::apply_block], which returns a *successor* state
//! and never touches its receiver: the unspent-output set is a persistent
//! Merkle-Patricia tree, so forking it is O(1) and a failed application
//! leaves no trace. Across blocks, application is single-writer; reads of an
//! existing `State` always observe a consistent snapshot.

use crate::{
    block::{Block, BlockHeader, BlockId},
    transaction::{Anchor, Entry, Executor, TxId, UtxoId, VerifiedTx},
    Error, NONCEROOT_LABEL, TXROOT_LABEL, UTXOROOT_LABEL,
};
use bytes::{Buf, BufMut};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};
use umbra_codec::{EncodeSize, Error as CodecError, FixedSize, Read, Write};
use umbra_merkle::{binary, patricia};
use umbra_transcript::Digest;

/// Computes the active-nonce set root over the anchors of `nonces`.
pub(crate) fn nonce_root(nonces: &BTreeMap<Anchor, u64>) -> Digest {
    // BTreeMap iteration is already sorted by anchor bytes.
    let anchors: Vec<Digest> = nonces.keys().map(|anchor| anchor.0).collect();
    patricia::root_sorted(NONCEROOT_LABEL, &anchors)
}

/// The authoritative per-node view of the chain.
#[derive(Clone, Debug)]
pub struct State {
    /// Header of the initial block; never changes after construction.
    initial: BlockHeader,
    /// Header of the most recently applied block.
    tip: BlockHeader,
    /// Unspent-output set.
    utxos: patricia::Tree,
    /// Active nonces: anchor to expiry timestamp (ms).
    nonces: BTreeMap<Anchor, u64>,
    /// Recent block IDs, oldest first, ending with the tip's ID.
    refids: VecDeque<BlockId>,
}

impl State {
    /// Starts a new network: an initial state whose tip is the initial
    /// header built from `timestamp_ms` and `refscount`, with empty sets.
    pub fn new_network(timestamp_ms: u64, refscount: u64) -> Self {
        let initial = BlockHeader::make_initial(timestamp_ms, refscount);
        Self {
            tip: initial.clone(),
            initial,
            utxos: patricia::Tree::new(UTXOROOT_LABEL),
            nonces: BTreeMap::new(),
            refids: VecDeque::new(),
        }
    }

    /// Returns the initial block header.
    pub fn initial(&self) -> &BlockHeader {
        &self.initial
    }

    /// Returns the tip block header.
    pub fn tip(&self) -> &BlockHeader {
        &self.tip
    }

    /// Returns the recent block IDs, oldest first.
    pub fn refids(&self) -> impl Iterator<Item = &BlockId> {
        self.refids.iter()
    }

    /// Returns whether `utxo` is unspent.
    pub fn contains_utxo(&self, utxo: &UtxoId) -> bool {
        self.utxos.contains(&utxo.0)
    }

    /// Returns the expiry of an active nonce, if any.
    pub fn nonce_maxtime(&self, anchor: &Anchor) -> Option<u64> {
        self.nonces.get(anchor).copied()
    }

    /// Returns the Merkle-Patricia root of the unspent-output set.
    pub fn utxo_root(&self) -> Digest {
        self.utxos.root()
    }

    /// Returns the Merkle-Patricia root of the active-nonce anchors.
    pub fn nonce_root(&self) -> Digest {
        nonce_root(&self.nonces)
    }

    /// Statelessly validates `block` against the tip: header rules, per-tx
    /// execution in the block's `(version, timestamp)` context, time-window
    /// and version checks, and the recomputed transaction root.
    ///
    /// Block producers use this to preview a candidate block; [apply_block]
    /// starts with it.
    ///
    /// [apply_block]: State::apply_block
    pub fn validate_block<E: Executor>(
        &self,
        block: &Block<E::Transaction>,
        executor: &E,
    ) -> Result<Vec<VerifiedTx>, Error> {
        self.tip.verify_next(&block.header)?;

        let mut txs = Vec::with_capacity(block.txs.len());
        for tx in &block.txs {
            let log = executor
                .execute(tx, block.header.version, block.header.timestamp_ms)
                .map_err(|err| Error::Vm(Box::new(err)))?;
            let header = match log.first() {
                Some(Entry::Header(header)) => *header,
                _ => return Err(Error::MalformedLog("log does not begin with a header entry")),
            };
            if header.mintime_ms > block.header.timestamp_ms
                || header.maxtime_ms < block.header.timestamp_ms
            {
                return Err(Error::TxTimeOutOfRange {
                    mintime_ms: header.mintime_ms,
                    maxtime_ms: header.maxtime_ms,
                    timestamp_ms: block.header.timestamp_ms,
                });
            }
            if block.header.version == 1 && header.version != 1 {
                return Err(Error::TxVersionInvalid(header.version));
            }
            let id = TxId::from_log(&log);
            txs.push(VerifiedTx { header, id, log });
        }

        let ids: Vec<TxId> = txs.iter().map(|tx| tx.id).collect();
        let txroot = binary::root(TXROOT_LABEL, &ids);
        if txroot != block.header.txroot {
            return Err(Error::TxRootMismatch {
                expected: block.header.txroot,
                actual: txroot,
            });
        }
        Ok(txs)
    }

    /// Forks the utxo and nonce sets and applies the given logs: nonces with
    /// `maxtime_ms < timestamp_ms` are pruned first, then every log entry is
    /// applied strictly in listed order.
    ///
    /// Nonce block references are checked against the *pre-block* reference
    /// window (plus the initial block ID), never the evolving one.
    pub(crate) fn apply_logs(
        &self,
        timestamp_ms: u64,
        txs: &[VerifiedTx],
    ) -> Result<(patricia::Tree, BTreeMap<Anchor, u64>), Error> {
        let mut utxos = self.utxos.clone();
        let mut nonces = self.nonces.clone();
        nonces.retain(|_, maxtime_ms| *maxtime_ms >= timestamp_ms);

        let initial_id = self.initial.id();
        for tx in txs {
            for entry in &tx.log {
                match entry {
                    Entry::Nonce {
                        anchor,
                        blockid,
                        maxtime_ms,
                    } => {
                        if *blockid != initial_id && !self.refids.contains(blockid) {
                            return Err(Error::NonceUnknownBlockRef(*blockid));
                        }
                        if nonces.insert(*anchor, *maxtime_ms).is_some() {
                            return Err(Error::NonceAnchorDuplicate(*anchor));
                        }
                    }
                    Entry::Input(utxo) => {
                        utxos
                            .remove(&utxo.0)
                            .map_err(|_| Error::InputMissing(*utxo))?;
                    }
                    Entry::Output(utxo) => {
                        utxos
                            .insert(utxo.0)
                            .map_err(|_| Error::OutputDuplicate(*utxo))?;
                    }
                    _ => {}
                }
            }
        }
        Ok((utxos, nonces))
    }

    /// Applies a block and returns the successor state.
    ///
    /// The receiver is unchanged on any failure, and on success as well:
    /// commit by replacing it with the returned state. Order: stateless
    /// validation, nonce expiry, log application, root comparison, tip
    /// advancement and reference-window pruning.
    pub fn apply_block<E: Executor>(
        &self,
        block: &Block<E::Transaction>,
        executor: &E,
    ) -> Result<State, Error> {
        let txs = self.validate_block(block, executor)?;
        let (utxos, nonces) = self.apply_logs(block.header.timestamp_ms, &txs)?;

        let utxoroot = utxos.root();
        if utxoroot != block.header.utxoroot {
            return Err(Error::UtxoRootMismatch {
                expected: block.header.utxoroot,
                actual: utxoroot,
            });
        }
        let nonceroot = nonce_root(&nonces);
        if nonceroot != block.header.nonceroot {
            return Err(Error::NonceRootMismatch {
                expected: block.header.nonceroot,
                actual: nonceroot,
            });
        }

        let mut refids = self.refids.clone();
        refids.push_back(block.header.id());
        while refids.len() as u64 > block.header.refscount {
            refids.pop_front();
        }

        debug!(
            height = block.header.height,
            txs = block.txs.len(),
            utxos = utxos.len(),
            nonces = nonces.len(),
            "applied block"
        );
        Ok(State {
            initial: self.initial.clone(),
            tip: block.header.clone(),
            utxos,
            nonces,
            refids,
        })
    }

    /// Exports a portable snapshot of this state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            initial: self.initial.clone(),
            tip: self.tip.clone(),
            utxos: self.utxos.iter().map(|digest| UtxoId(*digest)).collect(),
            nonces: self
                .nonces
                .iter()
                .map(|(anchor, maxtime_ms)| NonceRecord {
                    anchor: *anchor,
                    maxtime_ms: *maxtime_ms,
                })
                .collect(),
            refids: self.refids.iter().copied().collect(),
        }
    }

    /// Joins an existing network from a snapshot obtained out of band.
    ///
    /// The snapshot is verified before it is trusted: set membership must be
    /// unique, no nonce may already be expired at the tip, the reference
    /// window must respect its bound and end at the tip, and both recomputed
    /// set roots must match the tip header.
    pub fn restore(snapshot: Snapshot) -> Result<State, Error> {
        if snapshot.initial.height != 1 || snapshot.initial.previd != BlockId::default() {
            return Err(Error::InvalidSnapshot("initial header is not at height 1"));
        }
        if snapshot.tip.height < 1 {
            return Err(Error::InvalidSnapshot("tip height below 1"));
        }

        let mut utxos = patricia::Tree::new(UTXOROOT_LABEL);
        for utxo in &snapshot.utxos {
            utxos
                .insert(utxo.0)
                .map_err(|_| Error::InvalidSnapshot("duplicate utxo id"))?;
        }
        let mut nonces = BTreeMap::new();
        for record in &snapshot.nonces {
            if record.maxtime_ms < snapshot.tip.timestamp_ms {
                return Err(Error::InvalidSnapshot("expired nonce record"));
            }
            if nonces.insert(record.anchor, record.maxtime_ms).is_some() {
                return Err(Error::InvalidSnapshot("duplicate nonce anchor"));
            }
        }

        if snapshot.refids.len() as u64 > snapshot.tip.refscount {
            return Err(Error::InvalidSnapshot("refids exceed refscount"));
        }
        if let Some(last) = snapshot.refids.last() {
            if *last != snapshot.tip.id() {
                return Err(Error::InvalidSnapshot("refids do not end at the tip"));
            }
        }

        let utxoroot = utxos.root();
        if utxoroot != snapshot.tip.utxoroot {
            return Err(Error::UtxoRootMismatch {
                expected: snapshot.tip.utxoroot,
                actual: utxoroot,
            });
        }
        let nonceroot = nonce_root(&nonces);
        if nonceroot != snapshot.tip.nonceroot {
            return Err(Error::NonceRootMismatch {
                expected: snapshot.tip.nonceroot,
                actual: nonceroot,
            });
        }

        info!(
            height = snapshot.tip.height,
            utxos = utxos.len(),
            nonces = nonces.len(),
            "restored state from snapshot"
        );
        Ok(State {
            initial: snapshot.initial,
            tip: snapshot.tip,
            utxos,
            nonces,
            refids: snapshot.refids.into_iter().collect(),
        })
    }
}

/// An active nonce: its anchor and expiry timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NonceRecord {
    pub anchor: Anchor,
    pub maxtime_ms: u64,
}

impl Write for NonceRecord {
    fn write(&self, buf: &mut impl BufMut) {
        self.anchor.write(buf);
        self.maxtime_ms.write(buf);
    }
}

impl FixedSize for NonceRecord {
    const SIZE: usize = Anchor::SIZE + u64::SIZE;
}

impl Read for NonceRecord {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let anchor = Anchor::read(buf)?;
        let maxtime_ms = u64::read(buf)?;
        Ok(Self { anchor, maxtime_ms })
    }
}

/// A portable snapshot of a [State]: everything needed to recompute both set
/// roots bit-exactly, plus the headers and the reference window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub initial: BlockHeader,
    pub tip: BlockHeader,
    /// Unspent-output IDs in sorted order.
    pub utxos: Vec<UtxoId>,
    /// Active nonces in anchor order.
    pub nonces: Vec<NonceRecord>,
    /// Recent block IDs, oldest first.
    pub refids: Vec<BlockId>,
}

impl Write for Snapshot {
    fn write(&self, buf: &mut impl BufMut) {
        self.initial.write(buf);
        self.tip.write(buf);
        self.utxos.write(buf);
        self.nonces.write(buf);
        self.refids.write(buf);
    }
}

impl EncodeSize for Snapshot {
    fn encode_size(&self) -> usize {
        self.initial.encode_size()
            + self.tip.encode_size()
            + self.utxos.encode_size()
            + self.nonces.encode_size()
            + self.refids.encode_size()
    }
}

impl Read for Snapshot {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let initial = BlockHeader::read(buf)?;
        let tip = BlockHeader::read(buf)?;
        let utxos = Vec::<UtxoId>::read(buf)?;
        let nonces = Vec::<NonceRecord>::read(buf)?;
        let refids = Vec::<BlockId>::read(buf)?;
        Ok(Self {
            initial,
            tip,
            utxos,
            nonces,
            refids,
        })
    }
}
