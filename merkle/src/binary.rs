//! Merkle binary tree over an ordered sequence of items.
//!
//! The root is a function of the item *order*: reversing the list changes the
//! root. The tree need not be balanced: for `n` items the left subtree
//! covers the largest power of two strictly below `n`, so the shape is
//! uniquely determined by `n`.
//!
//! Every recursive step hashes with a fresh transcript bound to the tree
//! label: an empty list challenges `merkle.empty`, a single item is committed
//! and challenged under `merkle.leaf`, and an interior node commits its child
//! roots under `L` and `R` before challenging `merkle.node`.

use thiserror::Error;
use umbra_transcript::{Digest, Transcript};

/// Errors that can occur when proving or verifying inclusion.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("index {0} out of bounds for tree of size {1}")]
    IndexOutOfBounds(usize, usize),

    #[error("proof does not match root")]
    InvalidProof,
}

/// An item that can be committed into a transcript.
///
/// The commitment schema (labels and field order) is part of the consensus
/// rule for whatever root the item participates in.
pub trait MerkleItem {
    /// Commits this item into the transcript.
    fn commit(&self, transcript: &mut Transcript);
}

impl MerkleItem for Digest {
    fn commit(&self, transcript: &mut Transcript) {
        transcript.commit_bytes(b"item", self.as_ref());
    }
}

/// Computes the root of an ordered list of items without retaining the tree.
pub fn root<I: MerkleItem>(label: &'static [u8], items: &[I]) -> Digest {
    hash_items(Transcript::new(label), items)
}

fn hash_items<I: MerkleItem>(mut transcript: Transcript, items: &[I]) -> Digest {
    match items.len() {
        0 => transcript.challenge_digest(b"merkle.empty"),
        1 => {
            items[0].commit(&mut transcript);
            transcript.challenge_digest(b"merkle.leaf")
        }
        n => {
            let k = n.next_power_of_two() / 2;
            let left = hash_items(transcript.clone(), &items[..k]);
            let right = hash_items(transcript.clone(), &items[k..]);
            transcript.commit_bytes(b"L", left.as_ref());
            transcript.commit_bytes(b"R", right.as_ref());
            transcript.challenge_digest(b"merkle.node")
        }
    }
}

/// A Merkle binary tree with interior hashes retained for proving.
pub struct Tree {
    size: usize,
    root: Node,
}

enum Node {
    Leaf(Digest),
    Internal(Digest, Box<Node>, Box<Node>),
}

impl Node {
    fn digest(&self) -> &Digest {
        match self {
            Node::Leaf(digest) => digest,
            Node::Internal(digest, _, _) => digest,
        }
    }
}

impl Tree {
    /// Builds a tree over the given items.
    pub fn build<I: MerkleItem>(label: &'static [u8], items: &[I]) -> Self {
        let transcript = Transcript::new(label);
        Self {
            size: items.len(),
            root: Self::build_node(transcript, items),
        }
    }

    fn build_node<I: MerkleItem>(mut transcript: Transcript, items: &[I]) -> Node {
        match items.len() {
            0 => Node::Leaf(transcript.challenge_digest(b"merkle.empty")),
            1 => {
                items[0].commit(&mut transcript);
                Node::Leaf(transcript.challenge_digest(b"merkle.leaf"))
            }
            n => {
                let k = n.next_power_of_two() / 2;
                let left = Self::build_node(transcript.clone(), &items[..k]);
                let right = Self::build_node(transcript.clone(), &items[k..]);
                transcript.commit_bytes(b"L", left.digest().as_ref());
                transcript.commit_bytes(b"R", right.digest().as_ref());
                Node::Internal(
                    transcript.challenge_digest(b"merkle.node"),
                    Box::new(left),
                    Box::new(right),
                )
            }
        }
    }

    /// Returns the root of the tree.
    pub fn root(&self) -> Digest {
        *self.root.digest()
    }

    /// Returns the number of items in the tree.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Builds a proof of inclusion for the item at the given index.
    pub fn prove(&self, index: usize) -> Result<Proof, Error> {
        if index >= self.size {
            return Err(Error::IndexOutOfBounds(index, self.size));
        }
        let mut steps = Vec::new();
        Self::subproof(&self.root, index, self.size, &mut steps);
        Ok(Proof { steps })
    }

    fn subproof(node: &Node, index: usize, size: usize, steps: &mut Vec<Step>) {
        let Node::Internal(_, left, right) = node else {
            return;
        };
        let k = size.next_power_of_two() / 2;
        if index < k {
            Self::subproof(left, index, k, steps);
            steps.push(Step::Right(*right.digest()));
        } else {
            Self::subproof(right, index - k, size - k, steps);
            steps.push(Step::Left(*left.digest()));
        }
    }
}

/// A single step of an inclusion proof: the sibling subtree root on the
/// named side.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Step {
    Left(Digest),
    Right(Digest),
}

/// A proof of inclusion, ordered leaf to root.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Proof {
    steps: Vec<Step>,
}

impl Proof {
    /// Verifies that `item` is included in the tree with the given root.
    pub fn verify<I: MerkleItem>(
        &self,
        label: &'static [u8],
        item: &I,
        root: &Digest,
    ) -> Result<(), Error> {
        let base = Transcript::new(label);
        let mut current = {
            let mut transcript = base.clone();
            item.commit(&mut transcript);
            transcript.challenge_digest(b"merkle.leaf")
        };
        for step in &self.steps {
            let mut transcript = base.clone();
            match step {
                Step::Left(sibling) => {
                    transcript.commit_bytes(b"L", sibling.as_ref());
                    transcript.commit_bytes(b"R", current.as_ref());
                }
                Step::Right(sibling) => {
                    transcript.commit_bytes(b"L", current.as_ref());
                    transcript.commit_bytes(b"R", sibling.as_ref());
                }
            }
            current = transcript.challenge_digest(b"merkle.node");
        }
        if current != *root {
            return Err(Error::InvalidProof);
        }
        Ok(())
    }
}
