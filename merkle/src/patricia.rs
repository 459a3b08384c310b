//! Merkle-Patricia set commitment.
//!
//! The root of a *set* of 32-byte digests: membership alone determines the
//! tree shape, so inserting the same keys in any order yields the same root.
//! Keys are ordered bit-lexicographically, most-significant bit first. Each
//! interior node splits its key range at the first bit position where the
//! range diverges (the end of the longest common bit prefix): keys with a `0`
//! at that position hash into the left child, keys with a `1` into the right.
//!
//! Hashing goes through a fresh transcript bound to the tree label at every
//! node: the empty set challenges `patricia.empty`, a single key is committed
//! and challenged under `patricia.leaf`, and an interior node commits its
//! child roots under `patricia.left`/`patricia.right` before challenging
//! `patricia.node`.
//!
//! [Tree] is a persistent crit-bit trie: nodes are immutable, shared through
//! `Arc`, and carry their digest, so a clone is O(1), an insert or remove
//! re-hashes only the path from the changed leaf to the root, and an old
//! clone keeps committing to the old membership. [root_sorted] recomputes the
//! same root from scratch over a sorted slice; the two must agree
//! bit-for-bit.

use std::sync::Arc;
use thiserror::Error;
use umbra_transcript::{Digest, Transcript};

/// Errors that can occur when updating a [Tree].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("key already present: {0}")]
    DuplicateKey(Digest),

    #[error("key not found: {0}")]
    KeyNotFound(Digest),
}

/// Returns the bit of `key` at `index` (most-significant bit of byte 0 is
/// index 0).
fn bit(key: &Digest, index: u32) -> bool {
    (key[(index / 8) as usize] >> (7 - index % 8)) & 1 == 1
}

/// Returns the index of the first bit where `a` and `b` differ, or `None` if
/// they are equal.
fn first_diff_bit(a: &Digest, b: &Digest) -> Option<u32> {
    for (index, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = x ^ y;
        if diff != 0 {
            return Some(index as u32 * 8 + diff.leading_zeros());
        }
    }
    None
}

#[derive(Debug)]
enum Node {
    Leaf {
        key: Digest,
        digest: Digest,
    },
    Branch {
        /// First bit position at which the keys below this node diverge.
        split: u32,
        /// Smallest key below this node; shares all bits before `split` with
        /// every key below this node.
        min: Digest,
        left: Arc<Node>,
        right: Arc<Node>,
        digest: Digest,
    },
}

impl Node {
    fn leaf(label: &'static [u8], key: Digest) -> Node {
        let mut transcript = Transcript::new(label);
        transcript.commit_bytes(b"patricia.leaf", key.as_ref());
        Node::Leaf {
            key,
            digest: transcript.challenge_digest(b"patricia.leaf"),
        }
    }

    fn branch(label: &'static [u8], split: u32, left: Arc<Node>, right: Arc<Node>) -> Node {
        let mut transcript = Transcript::new(label);
        transcript.commit_bytes(b"patricia.left", left.digest().as_ref());
        transcript.commit_bytes(b"patricia.right", right.digest().as_ref());
        let digest = transcript.challenge_digest(b"patricia.node");
        Node::Branch {
            split,
            min: *left.min(),
            left,
            right,
            digest,
        }
    }

    fn digest(&self) -> &Digest {
        match self {
            Node::Leaf { digest, .. } => digest,
            Node::Branch { digest, .. } => digest,
        }
    }

    fn min(&self) -> &Digest {
        match self {
            Node::Leaf { key, .. } => key,
            Node::Branch { min, .. } => min,
        }
    }
}

/// A persistent Merkle-Patricia set over 32-byte digests.
#[derive(Clone, Debug)]
pub struct Tree {
    label: &'static [u8],
    root: Option<Arc<Node>>,
    keys: usize,
}

impl Tree {
    /// Returns a new (empty) tree bound to the given label.
    pub fn new(label: &'static [u8]) -> Self {
        Self {
            label,
            root: None,
            keys: 0,
        }
    }

    /// Returns the number of keys in the set.
    pub fn len(&self) -> usize {
        self.keys
    }

    /// Returns whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.keys == 0
    }

    /// Returns whether `key` is in the set.
    pub fn contains(&self, key: &Digest) -> bool {
        let mut node = match &self.root {
            None => return false,
            Some(node) => node,
        };
        loop {
            match node.as_ref() {
                Node::Leaf { key: existing, .. } => return existing == key,
                Node::Branch {
                    split, left, right, ..
                } => node = if bit(key, *split) { right } else { left },
            }
        }
    }

    /// Inserts `key` into the set, re-hashing only the path to the root.
    ///
    /// The tree is unchanged on error.
    pub fn insert(&mut self, key: Digest) -> Result<(), Error> {
        let updated = match &self.root {
            None => Node::leaf(self.label, key),
            Some(node) => Self::insert_at(self.label, node, key)?,
        };
        self.root = Some(Arc::new(updated));
        self.keys += 1;
        Ok(())
    }

    fn insert_at(label: &'static [u8], node: &Arc<Node>, key: Digest) -> Result<Node, Error> {
        // Where does the key diverge from the common prefix of this subtree?
        let diverged = first_diff_bit(node.min(), &key);
        match node.as_ref() {
            Node::Leaf { .. } => match diverged {
                None => Err(Error::DuplicateKey(key)),
                Some(diff) => Ok(Self::split_at(label, node, key, diff)),
            },
            Node::Branch {
                split, left, right, ..
            } => match diverged {
                Some(diff) if diff < *split => Ok(Self::split_at(label, node, key, diff)),
                // The key shares the subtree prefix (a key equal to `min`
                // surfaces as a duplicate at the leftmost leaf).
                _ => {
                    if bit(&key, *split) {
                        let updated = Self::insert_at(label, right, key)?;
                        Ok(Node::branch(label, *split, left.clone(), Arc::new(updated)))
                    } else {
                        let updated = Self::insert_at(label, left, key)?;
                        Ok(Node::branch(label, *split, Arc::new(updated), right.clone()))
                    }
                }
            },
        }
    }

    /// Joins an existing subtree and a new leaf at bit position `diff`.
    fn split_at(label: &'static [u8], node: &Arc<Node>, key: Digest, diff: u32) -> Node {
        let leaf = Arc::new(Node::leaf(label, key));
        if bit(&key, diff) {
            Node::branch(label, diff, node.clone(), leaf)
        } else {
            Node::branch(label, diff, leaf, node.clone())
        }
    }

    /// Removes `key` from the set, re-hashing only the path to the root.
    ///
    /// The tree is unchanged on error.
    pub fn remove(&mut self, key: &Digest) -> Result<(), Error> {
        let root = self.root.as_ref().ok_or(Error::KeyNotFound(*key))?;
        self.root = Self::remove_at(self.label, root, key)?;
        self.keys -= 1;
        Ok(())
    }

    fn remove_at(
        label: &'static [u8],
        node: &Arc<Node>,
        key: &Digest,
    ) -> Result<Option<Arc<Node>>, Error> {
        match node.as_ref() {
            Node::Leaf { key: existing, .. } => {
                if existing == key {
                    Ok(None)
                } else {
                    Err(Error::KeyNotFound(*key))
                }
            }
            Node::Branch {
                split, left, right, ..
            } => {
                if matches!(first_diff_bit(node.min(), key), Some(diff) if diff < *split) {
                    return Err(Error::KeyNotFound(*key));
                }
                if bit(key, *split) {
                    match Self::remove_at(label, right, key)? {
                        // Last key on the right: the branch collapses.
                        None => Ok(Some(left.clone())),
                        Some(updated) => {
                            Ok(Some(Arc::new(Node::branch(label, *split, left.clone(), updated))))
                        }
                    }
                } else {
                    match Self::remove_at(label, left, key)? {
                        None => Ok(Some(right.clone())),
                        Some(updated) => {
                            Ok(Some(Arc::new(Node::branch(label, *split, updated, right.clone()))))
                        }
                    }
                }
            }
        }
    }

    /// Returns the root of the set.
    pub fn root(&self) -> Digest {
        match &self.root {
            None => Transcript::new(self.label).challenge_digest(b"patricia.empty"),
            Some(node) => *node.digest(),
        }
    }

    /// Returns the keys in sorted order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            stack: self.root.as_deref().into_iter().collect(),
        }
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.root() == other.root()
    }
}

impl Eq for Tree {}

/// Sorted iterator over the keys of a [Tree].
pub struct Iter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Digest;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                Node::Leaf { key, .. } => return Some(key),
                Node::Branch { left, right, .. } => {
                    self.stack.push(right.as_ref());
                    self.stack.push(left.as_ref());
                }
            }
        }
        None
    }
}

/// Computes the root of a sorted, de-duplicated slice of keys from scratch.
///
/// Agrees bit-for-bit with [Tree::root] over the same membership.
///
/// # Panics
///
/// Panics if the keys are not sorted and distinct.
pub fn root_sorted(label: &'static [u8], keys: &[Digest]) -> Digest {
    let mut transcript = Transcript::new(label);
    match keys.len() {
        0 => transcript.challenge_digest(b"patricia.empty"),
        1 => {
            transcript.commit_bytes(b"patricia.leaf", keys[0].as_ref());
            transcript.challenge_digest(b"patricia.leaf")
        }
        n => {
            // Sorted input: the common prefix of the whole range is the
            // common prefix of its first and last keys.
            let split = first_diff_bit(&keys[0], &keys[n - 1]).expect("keys must be distinct");
            let partition = keys.partition_point(|key| !bit(key, split));
            let left = root_sorted(label, &keys[..partition]);
            let right = root_sorted(label, &keys[partition..]);
            transcript.commit_bytes(b"patricia.left", left.as_ref());
            transcript.commit_bytes(b"patricia.right", right.as_ref());
            transcript.challenge_digest(b"patricia.node")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    fn sorted(keys: &Tree) -> Vec<Digest> {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_empty_root_is_labeled_challenge() {
        let tree = Tree::new(b"test");
        assert_eq!(
            tree.root(),
            Transcript::new(b"test").challenge_digest(b"patricia.empty")
        );
        assert_eq!(tree.root(), root_sorted(b"test", &[]));
        assert_ne!(tree.root(), Tree::new(b"other").root());
    }

    #[test]
    fn test_singleton() {
        let mut tree = Tree::new(b"test");
        let key = Digest::from([7u8; 32]);
        tree.insert(key).unwrap();
        assert_eq!(tree.root(), root_sorted(b"test", &[key]));
        assert!(tree.contains(&key));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_incremental_matches_scratch() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut tree = Tree::new(b"test");
        let mut keys = Vec::new();
        for round in 0..500 {
            if !keys.is_empty() && rng.gen_bool(0.3) {
                let index = rng.gen_range(0..keys.len());
                let key: Digest = keys.swap_remove(index);
                tree.remove(&key).unwrap();
            } else {
                let key = Digest::random(&mut rng);
                tree.insert(key).unwrap();
                keys.push(key);
            }
            if round % 25 == 0 {
                let mut reference = keys.clone();
                reference.sort();
                assert_eq!(tree.root(), root_sorted(b"test", &reference));
                assert_eq!(sorted(&tree), reference);
            }
        }
        assert_eq!(tree.len(), keys.len());
    }

    #[test]
    fn test_insertion_order_independence() {
        let mut rng = StdRng::seed_from_u64(7);
        let keys: Vec<Digest> = (0..64).map(|_| Digest::random(&mut rng)).collect();

        let mut forward = Tree::new(b"test");
        for key in &keys {
            forward.insert(*key).unwrap();
        }
        let mut shuffled = keys.clone();
        shuffled.shuffle(&mut rng);
        let mut permuted = Tree::new(b"test");
        for key in &shuffled {
            permuted.insert(*key).unwrap();
        }
        assert_eq!(forward.root(), permuted.root());
        assert_eq!(forward, permuted);
    }

    #[test]
    fn test_duplicate_insert() {
        let mut tree = Tree::new(b"test");
        let key = Digest::from([1u8; 32]);
        tree.insert(key).unwrap();
        let root = tree.root();
        assert_eq!(tree.insert(key), Err(Error::DuplicateKey(key)));
        assert_eq!(tree.root(), root);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_remove_missing() {
        let mut tree = Tree::new(b"test");
        let key = Digest::from([1u8; 32]);
        assert_eq!(tree.remove(&key), Err(Error::KeyNotFound(key)));
        tree.insert(key).unwrap();
        // A key sharing a prefix with a member but absent from the set.
        let mut near = [1u8; 32];
        near[31] ^= 1;
        let near = Digest::from(near);
        let root = tree.root();
        assert_eq!(tree.remove(&near), Err(Error::KeyNotFound(near)));
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_insert_remove_all_returns_empty() {
        let mut rng = StdRng::seed_from_u64(3);
        let keys: Vec<Digest> = (0..32).map(|_| Digest::random(&mut rng)).collect();
        let mut tree = Tree::new(b"test");
        let empty_root = tree.root();
        for key in &keys {
            tree.insert(*key).unwrap();
        }
        for key in &keys {
            tree.remove(key).unwrap();
        }
        assert!(tree.is_empty());
        assert_eq!(tree.root(), empty_root);
    }

    #[test]
    fn test_clone_shares_structure() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut tree = Tree::new(b"test");
        for _ in 0..16 {
            tree.insert(Digest::random(&mut rng)).unwrap();
        }
        let snapshot = tree.clone();
        let before = snapshot.root();

        let key = Digest::random(&mut rng);
        tree.insert(key).unwrap();
        assert_ne!(tree.root(), before);
        // The fork still commits to the old membership.
        assert_eq!(snapshot.root(), before);
        assert!(!snapshot.contains(&key));
        assert!(tree.contains(&key));
    }

    #[test]
    fn test_adjacent_keys() {
        // Keys differing only in the final bit exercise the deepest splits.
        let mut tree = Tree::new(b"test");
        let mut keys = Vec::new();
        for i in 0u8..8 {
            let mut bytes = [0xAAu8; 32];
            bytes[31] = i;
            let key = Digest::from(bytes);
            tree.insert(key).unwrap();
            keys.push(key);
        }
        keys.sort();
        assert_eq!(tree.root(), root_sorted(b"test", &keys));
        assert_eq!(sorted(&tree), keys);
    }
}
