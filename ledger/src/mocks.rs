//! Test doubles for the transaction virtual machine.
//!
//! [Tx] is a transaction whose log is declared up front; [Vm] "executes" it
//! by echoing that log, so tests and embedding harnesses can drive the state
//! engine without a real VM. [build_block] projects the forked sets to mint
//! the unique valid next block for a list of such transactions.

use crate::{
    block::{Block, BlockHeader},
    state::{nonce_root, State},
    transaction::{Entry, Executor, TxHeader, TxId, TxLog, VerifiedTx},
    TXROOT_LABEL,
};
use bytes::{Buf, BufMut};
use thiserror::Error;
use umbra_codec::{EncodeSize, Error as CodecError, Read, Write};
use umbra_merkle::binary;
use umbra_transcript::Digest;

/// A mock transaction: a header plus the log entries its execution yields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tx {
    pub header: TxHeader,
    pub entries: Vec<Entry>,
}

impl Tx {
    /// Creates a transaction with the given header and effect entries.
    pub fn new(header: TxHeader, entries: Vec<Entry>) -> Self {
        Self { header, entries }
    }

    /// Returns the log this transaction executes to: the header entry
    /// followed by the declared entries.
    pub fn log(&self) -> TxLog {
        let mut log = Vec::with_capacity(1 + self.entries.len());
        log.push(Entry::Header(self.header));
        log.extend(self.entries.iter().cloned());
        log
    }

    /// Returns the transaction's ID.
    pub fn id(&self) -> TxId {
        TxId::from_log(&self.log())
    }
}

impl Write for Tx {
    fn write(&self, buf: &mut impl BufMut) {
        self.header.write(buf);
        self.entries.write(buf);
    }
}

impl EncodeSize for Tx {
    fn encode_size(&self) -> usize {
        self.header.encode_size() + self.entries.encode_size()
    }
}

impl Read for Tx {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let header = TxHeader::read(buf)?;
        let entries = Vec::<Entry>::read(buf)?;
        Ok(Self { header, entries })
    }
}

/// Errors the mock VMs report.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("transaction rejected by the vm")]
    Rejected,
}

/// A VM that executes every [Tx] to its declared log.
#[derive(Clone, Debug, Default)]
pub struct Vm;

impl Executor for Vm {
    type Transaction = Tx;
    type Error = VmError;

    fn execute(
        &self,
        tx: &Self::Transaction,
        _block_version: u64,
        _timestamp_ms: u64,
    ) -> Result<TxLog, Self::Error> {
        Ok(tx.log())
    }
}

/// A VM that rejects every transaction.
#[derive(Clone, Debug, Default)]
pub struct FailingVm;

impl Executor for FailingVm {
    type Transaction = Tx;
    type Error = VmError;

    fn execute(
        &self,
        _tx: &Self::Transaction,
        _block_version: u64,
        _timestamp_ms: u64,
    ) -> Result<TxLog, Self::Error> {
        Err(VmError::Rejected)
    }
}

/// Computes the transaction root for a list of mock transactions.
pub fn txroot(txs: &[Tx]) -> Digest {
    let ids: Vec<TxId> = txs.iter().map(Tx::id).collect();
    binary::root(TXROOT_LABEL, &ids)
}

/// Builds the valid next block for `state` carrying `txs`.
///
/// The header is fully linked (height, previd) and commits to the roots the
/// state engine will recompute, so applying the result succeeds whenever the
/// logs themselves are applicable.
///
/// # Panics
///
/// Panics if the transaction logs do not apply to `state` (say, an input
/// that does not exist); tests exercising rejection paths should assemble
/// the header by hand instead.
pub fn build_block(state: &State, timestamp_ms: u64, refscount: u64, txs: Vec<Tx>) -> Block<Tx> {
    let verified: Vec<VerifiedTx> = txs
        .iter()
        .map(|tx| {
            let log = tx.log();
            VerifiedTx {
                header: tx.header,
                id: TxId::from_log(&log),
                log,
            }
        })
        .collect();
    let (utxos, nonces) = state
        .apply_logs(timestamp_ms, &verified)
        .expect("transaction logs must apply to the state");

    let tip = state.tip();
    let header = BlockHeader {
        version: tip.version,
        height: tip.height + 1,
        previd: tip.id(),
        timestamp_ms,
        txroot: txroot(&txs),
        utxoroot: utxos.root(),
        nonceroot: nonce_root(&nonces),
        refscount,
        ext: Vec::new(),
    };
    Block { header, txs }
}
