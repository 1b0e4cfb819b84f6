//! Shared value types.

mod difficulty;

use std::fmt;

use ruint::aliases::U256;

pub use difficulty::{hash_meets_difficulty, Difficulty};

/// Output of the proof-of-work hash function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Self = Self([0; 32]);

    /// Interpret the hash bytes as a little-endian 256-bit integer.
    pub fn to_u256(&self) -> U256 {
        U256::from_le_bytes(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

/// Mining throughput in hashes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct HashRate(pub u64);

impl fmt::Display for HashRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0 as f64;
        let (scaled, unit) = if value >= 1e9 {
            (value / 1e9, "GH/s")
        } else if value >= 1e6 {
            (value / 1e6, "MH/s")
        } else if value >= 1e3 {
            (value / 1e3, "kH/s")
        } else {
            return write!(f, "{} H/s", self.0);
        };
        write!(f, "{:.2} {}", scaled, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_display_is_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let text = Hash(bytes).to_string();
        assert_eq!(text.len(), 64);
        assert!(text.starts_with("ab00"));
    }

    #[test]
    fn test_hashrate_display() {
        assert_eq!(HashRate(512).to_string(), "512 H/s");
        assert_eq!(HashRate(1_500).to_string(), "1.50 kH/s");
        assert_eq!(HashRate(2_250_000).to_string(), "2.25 MH/s");
    }
}
