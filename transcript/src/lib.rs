//! Domain-separated challenge transcript.
//!
//! Every hash the ledger commits to consensus (block IDs, Merkle binary
//! roots, Merkle-Patricia roots) is produced by a [Transcript]: a stateful
//! object that absorbs labeled byte strings and emits labeled challenges.
//! Challenges are a pure function of the initial label and the ordered
//! sequence of operations, and distinct labels separate otherwise identical
//! inputs.
//!
//! The transcript is backed by Merlin (a STROBE-128 sponge with 128-bit
//! security); Merlin's protocol framing supplies the domain-separation tag.
//! There is no failure surface: malformed input still yields a defined
//! result, and what that result means is the caller's problem.

use rand::{CryptoRng, Rng};
use std::{
    fmt,
    ops::{Deref, DerefMut},
};
use thiserror::Error;
use umbra_codec::{util::at_least, Error as CodecError, FixedSize, Read, Write};

/// Length of a [Digest] in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Errors that can occur when constructing a [Digest].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid digest length")]
    InvalidDigestLength,
}

/// A stateful, labeled challenge-hash object.
#[derive(Clone)]
pub struct Transcript {
    inner: merlin::Transcript,
}

impl Transcript {
    /// Creates a fresh transcript bound to the given label.
    pub fn new(label: &'static [u8]) -> Self {
        Self {
            inner: merlin::Transcript::new(label),
        }
    }

    /// Absorbs a labeled byte string.
    pub fn commit_bytes(&mut self, label: &'static [u8], message: &[u8]) {
        self.inner.append_message(label, message);
    }

    /// Absorbs a labeled `u64`, committed little-endian.
    pub fn commit_u64(&mut self, label: &'static [u8], value: u64) {
        self.inner.append_message(label, &value.to_le_bytes());
    }

    /// Fills `dest` with challenge bytes dependent on all prior operations
    /// and the label.
    pub fn challenge_bytes(&mut self, label: &'static [u8], dest: &mut [u8]) {
        self.inner.challenge_bytes(label, dest);
    }

    /// Produces a 32-byte challenge [Digest].
    pub fn challenge_digest(&mut self, label: &'static [u8]) -> Digest {
        let mut digest = [0u8; DIGEST_LENGTH];
        self.challenge_bytes(label, &mut digest);
        Digest(digest)
    }
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transcript")
    }
}

/// A 32-byte challenge output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// Generate a random digest (for tests and benchmarks).
    pub fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let mut digest = [0u8; DIGEST_LENGTH];
        rng.fill_bytes(&mut digest);
        Self(digest)
    }
}

impl From<[u8; DIGEST_LENGTH]> for Digest {
    fn from(value: [u8; DIGEST_LENGTH]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let value: [u8; DIGEST_LENGTH] =
            value.try_into().map_err(|_| Error::InvalidDigestLength)?;
        Ok(Self(value))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Digest {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for Digest {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Write for Digest {
    fn write(&self, buf: &mut impl bytes::BufMut) {
        buf.put_slice(&self.0);
    }
}

impl FixedSize for Digest {
    const SIZE: usize = DIGEST_LENGTH;
}

impl Read for Digest {
    fn read(buf: &mut impl bytes::Buf) -> Result<Self, CodecError> {
        at_least(buf, DIGEST_LENGTH)?;
        let mut digest = [0u8; DIGEST_LENGTH];
        buf.copy_to_slice(&mut digest);
        Ok(Self(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let mut t1 = Transcript::new(b"test");
        let mut t2 = Transcript::new(b"test");

        t1.commit_bytes(b"data", b"hello world");
        t2.commit_bytes(b"data", b"hello world");

        assert_eq!(
            t1.challenge_digest(b"challenge"),
            t2.challenge_digest(b"challenge")
        );
    }

    #[test]
    fn test_distinct_transcript_labels() {
        let mut t1 = Transcript::new(b"domain1");
        let mut t2 = Transcript::new(b"domain2");

        assert_ne!(
            t1.challenge_digest(b"challenge"),
            t2.challenge_digest(b"challenge")
        );
    }

    #[test]
    fn test_distinct_commit_labels() {
        let mut t1 = Transcript::new(b"test");
        let mut t2 = Transcript::new(b"test");

        t1.commit_bytes(b"left", b"payload");
        t2.commit_bytes(b"right", b"payload");

        assert_ne!(
            t1.challenge_digest(b"challenge"),
            t2.challenge_digest(b"challenge")
        );
    }

    #[test]
    fn test_distinct_challenge_labels() {
        let mut t1 = Transcript::new(b"test");
        let mut t2 = Transcript::new(b"test");

        assert_ne!(t1.challenge_digest(b"first"), t2.challenge_digest(b"second"));
    }

    #[test]
    fn test_challenges_chain() {
        // A second challenge depends on the first having been issued.
        let mut t1 = Transcript::new(b"test");
        let mut t2 = Transcript::new(b"test");

        let first = t1.challenge_digest(b"challenge");
        let second = t1.challenge_digest(b"challenge");
        assert_ne!(first, second);

        assert_eq!(t2.challenge_digest(b"challenge"), first);
    }

    #[test]
    fn test_commit_u64_changes_state() {
        let mut t1 = Transcript::new(b"test");
        let mut t2 = Transcript::new(b"test");

        t1.commit_u64(b"height", 1);
        t2.commit_u64(b"height", 2);

        assert_ne!(
            t1.challenge_digest(b"challenge"),
            t2.challenge_digest(b"challenge")
        );
    }

    #[test]
    fn test_clone_branches_state() {
        let mut base = Transcript::new(b"test");
        base.commit_bytes(b"data", b"shared prefix");

        let mut left = base.clone();
        let mut right = base.clone();
        left.commit_bytes(b"data", b"left");
        right.commit_bytes(b"data", b"right");

        assert_ne!(
            left.challenge_digest(b"challenge"),
            right.challenge_digest(b"challenge")
        );
    }

    #[test]
    fn test_digest_try_from() {
        let bytes = [3u8; DIGEST_LENGTH];
        let digest = Digest::try_from(bytes.as_slice()).unwrap();
        assert_eq!(digest, Digest::from(bytes));
        assert_eq!(
            Digest::try_from([0u8; 16].as_slice()),
            Err(Error::InvalidDigestLength)
        );
    }

    #[test]
    fn test_digest_display() {
        let digest = Digest::from([0xABu8; DIGEST_LENGTH]);
        assert_eq!(format!("{}", digest), "ab".repeat(DIGEST_LENGTH));
    }
}
