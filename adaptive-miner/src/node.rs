//! Interfaces to the node that owns the miner.
//!
//! The engine does not know how blocks are assembled, validated or hashed.
//! The node hands it opaque candidates through [`MinerHandler`] and the
//! proof-of-work function through [`PowHasher`].

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::{Difficulty, Hash};

/// Block skeleton being searched.
///
/// The header bytes are opaque to the miner; only the nonce is rolled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockCandidate {
    pub header: Vec<u8>,
    pub nonce: u32,
}

impl BlockCandidate {
    pub fn new(header: Vec<u8>) -> Self {
        Self { header, nonce: 0 }
    }

    /// Header bytes followed by the little-endian nonce.
    pub fn hashing_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.header.len() + 4);
        blob.extend_from_slice(&self.header);
        blob.extend_from_slice(&self.nonce.to_le_bytes());
        blob
    }
}

/// Template returned by the node for a given address and extra nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub candidate: BlockCandidate,
    pub difficulty: Difficulty,
    pub height: u64,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("node cannot produce a block template: {0}")]
    Unavailable(String),

    #[error("node rejected mining address {0}")]
    BadAddress(MiningAddress),
}

/// Callbacks into the node.
pub trait MinerHandler: Send + Sync {
    /// Build a block template paying `address`, embedding `extra_nonce` in the
    /// coinbase extra field.
    fn get_block_template(
        &self,
        address: &MiningAddress,
        extra_nonce: &[u8],
    ) -> Result<BlockTemplate, TemplateError>;

    /// Submit a block whose hash met the template difficulty. Returns whether
    /// the node accepted it.
    fn handle_block_found(&self, block: &BlockCandidate) -> bool;
}

/// Proof-of-work hash primitive.
pub trait PowHasher: Send + Sync {
    fn block_hash(&self, block: &BlockCandidate, height: u64) -> Hash;
}

/// Double SHA-256 over the hashing blob. Height independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256dHasher;

impl PowHasher for Sha256dHasher {
    fn block_hash(&self, block: &BlockCandidate, _height: u64) -> Hash {
        let first = Sha256::digest(block.hashing_blob());
        let second = Sha256::digest(first);
        Hash(second.into())
    }
}

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const MAX_ADDRESS_LEN: usize = 128;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("mining address is empty")]
    Empty,

    #[error("mining address is longer than {MAX_ADDRESS_LEN} characters")]
    TooLong,

    #[error("mining address contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Base58 wallet address that block rewards are paid to.
///
/// Only the encoding is checked here; the node decides whether the address
/// belongs to its network when it builds templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MiningAddress(String);

impl MiningAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MiningAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if s.len() > MAX_ADDRESS_LEN {
            return Err(AddressError::TooLong);
        }
        if let Some(c) = s.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
            return Err(AddressError::InvalidCharacter(c));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for MiningAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_blob_appends_nonce() {
        let mut block = BlockCandidate::new(vec![1, 2, 3]);
        block.nonce = 0x0403_0201;
        assert_eq!(block.hashing_blob(), vec![1, 2, 3, 1, 2, 3, 4]);
    }

    #[test]
    fn test_sha256d_depends_on_nonce() {
        let hasher = Sha256dHasher;
        let mut block = BlockCandidate::new(b"header".to_vec());
        let first = hasher.block_hash(&block, 1);
        block.nonce = 1;
        let second = hasher.block_hash(&block, 1);
        assert_ne!(first, second);
        assert_eq!(second, hasher.block_hash(&block, 99));
    }

    #[test]
    fn test_address_parse() {
        let addr: MiningAddress = " 44AFFq5kSiGBoZ4NMDwYtN18obc8AemS33DBLWs3H7otXft3XjrpDtQGv7SqSsaBYBb98uNbr2VBBEt7f2wfn3RVGQBEP3A "
            .parse()
            .unwrap();
        assert!(addr.as_str().starts_with("44AFF"));
        assert!(!addr.as_str().ends_with(' '));
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert_eq!("".parse::<MiningAddress>(), Err(AddressError::Empty));
        assert_eq!(
            "abc0def".parse::<MiningAddress>(),
            Err(AddressError::InvalidCharacter('0'))
        );
        assert_eq!(
            "1".repeat(MAX_ADDRESS_LEN + 1).parse::<MiningAddress>(),
            Err(AddressError::TooLong)
        );
    }
}
