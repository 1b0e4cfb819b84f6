//! Difficulty type and the proof-of-work target check.

use std::fmt;

use ruint::aliases::U256;
use serde::{Deserialize, Serialize};

use super::Hash;

/// Mining difficulty.
///
/// Difficulty and target have an inverse relationship:
/// ```text
/// target = floor(MAX / difficulty)      MAX = 2^256 - 1
/// ```
///
/// A hash is valid when its value, read as a little-endian 256-bit integer,
/// is less than or equal to the target:
/// - Difficulty 1: target = MAX (every hash qualifies)
/// - Difficulty 1000: target = MAX / 1000 (one hash in ~1000 qualifies)
///
/// Higher difficulty produces a smaller target, so the check is monotone: a
/// hash that satisfies some difficulty also satisfies every lower one.
/// Difficulty 0 is treated like difficulty 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(u64);

impl Difficulty {
    /// Difficulty 1, the easiest target.
    pub const ONE: Self = Self(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Target a hash must not exceed.
    pub fn to_target(self) -> U256 {
        if self.0 <= 1 {
            return U256::MAX;
        }
        U256::MAX / U256::from_limbs([self.0, 0, 0, 0])
    }

    /// Check whether `hash` satisfies this difficulty.
    pub fn is_met_by(self, hash: &Hash) -> bool {
        hash.to_u256() <= self.to_target()
    }
}

impl From<u64> for Difficulty {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Target check used by the search loop.
pub fn hash_meets_difficulty(hash: &Hash, difficulty: Difficulty) -> bool {
    difficulty.is_met_by(hash)
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0 as f64;

        // Format with SI suffixes (K, M, G, T, P)
        let (scaled, suffix) = if value >= 1e15 {
            (value / 1e15, "P")
        } else if value >= 1e12 {
            (value / 1e12, "T")
        } else if value >= 1e9 {
            (value / 1e9, "G")
        } else if value >= 1e6 {
            (value / 1e6, "M")
        } else if value >= 1e3 {
            (value / 1e3, "K")
        } else {
            (value, "")
        };

        if scaled >= 100.0 || scaled.fract() == 0.0 {
            write!(f, "{:.0}{}", scaled, suffix)
        } else if scaled >= 10.0 {
            write!(f, "{:.1}{}", scaled, suffix)
        } else {
            write!(f, "{:.2}{}", scaled, suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn hash_from_u256(value: U256) -> Hash {
        Hash(value.to_le_bytes::<32>())
    }

    #[test]
    fn test_difficulty_one_and_zero_accept_everything() {
        let worst = Hash([0xff; 32]);
        assert!(Difficulty::ONE.is_met_by(&worst));
        assert!(Difficulty::new(0).is_met_by(&worst));
        assert_eq!(Difficulty::new(0).to_target(), U256::MAX);
    }

    #[test]
    fn test_target_boundary_is_inclusive() {
        let diff = Difficulty::new(1000);
        let target = diff.to_target();

        assert!(diff.is_met_by(&hash_from_u256(target)));
        assert!(!diff.is_met_by(&hash_from_u256(target + U256::from_limbs([1, 0, 0, 0]))));
    }

    #[test]
    fn test_hash_bytes_are_little_endian() {
        // Only the most significant byte set: huge value, fails any real target.
        let mut high = [0u8; 32];
        high[31] = 0x80;
        assert!(!Difficulty::new(2).is_met_by(&Hash(high)));

        // Only the least significant byte set: tiny value, passes.
        let mut low = [0u8; 32];
        low[0] = 0x80;
        assert!(Difficulty::new(1_000_000).is_met_by(&Hash(low)));
    }

    #[test_case(2, 1 ; "two over one")]
    #[test_case(1000, 999 ; "adjacent")]
    #[test_case(1_000_000, 17 ; "far apart")]
    #[test_case(u64::MAX, 2 ; "extreme")]
    fn test_check_is_monotone(d1: u64, d2: u64) {
        let hard = Difficulty::new(d1);
        let easy = Difficulty::new(d2);
        assert!(easy.to_target() >= hard.to_target());

        // Sample hashes around the stricter target.
        let target = hard.to_target();
        let one = U256::from_limbs([1, 0, 0, 0]);
        for value in [U256::ZERO, target >> 1, target - one, target, target + one] {
            let hash = hash_from_u256(value);
            if hash_meets_difficulty(&hash, hard) {
                assert!(hash_meets_difficulty(&hash, easy));
            }
        }
    }

    #[test]
    fn test_difficulty_ordering() {
        assert!(Difficulty::new(1000) > Difficulty::new(100));
        assert_eq!(Difficulty::from(500), Difficulty::new(500));
    }

    #[test]
    fn test_difficulty_display() {
        assert_eq!(Difficulty::new(1_500_000_000_000_000).to_string(), "1.50P");
        assert_eq!(Difficulty::new(112_700_000_000_000).to_string(), "113T");
        assert_eq!(Difficulty::new(11_200_000_000_000).to_string(), "11.2T");
        assert_eq!(Difficulty::new(1_500_000).to_string(), "1.50M");
        assert_eq!(Difficulty::new(500).to_string(), "500");
        assert_eq!(Difficulty::new(1).to_string(), "1");
    }
}
