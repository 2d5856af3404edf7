//! 128-bit blocks, the unit of all seed and correction-word material.
use std::convert::TryInto;
use std::fmt;
use std::ops;

use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

/// A 128-bit value, stored host-side as a `u128` and serialized little-endian.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block(u128);

impl Block {
    pub const SIZE: usize = 16;

    pub fn zero() -> Block {
        Block(0)
    }

    /// samples a uniform block from the thread-local CSPRNG
    pub fn random() -> Block {
        Block(thread_rng().gen())
    }

    pub fn lsb(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn with_lsb_zero(self) -> Block {
        Block(self.0 & !1)
    }

    pub fn with_lsb_toggled(self) -> Block {
        Block(self.0 ^ 1)
    }

    /// Low `width` bits, packed in a `u32`. Used to carry wide control words.
    pub fn low_bits(self, width: usize) -> u32 {
        debug_assert!(width >= 1 && width <= 32);
        (self.0 & ((1u128 << width) - 1)) as u32
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Block {
        Block(u128::from_le_bytes(bytes))
    }

    /// reads a block from the first 16 bytes of `slice`
    pub fn read(slice: &[u8]) -> Block {
        Block::from_bytes(slice[..16].try_into().expect("16-byte slice"))
    }
}

impl From<u64> for Block {
    fn from(value: u64) -> Block {
        Block(value as u128)
    }
}

impl ops::BitXor for Block {
    type Output = Block;

    fn bitxor(self, rhs: Block) -> Block {
        Block(self.0 ^ rhs.0)
    }
}

impl ops::BitXorAssign for Block {
    fn bitxor_assign(&mut self, rhs: Block) {
        self.0 ^= rhs.0;
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({})", hex::encode(self.to_bytes()))
    }
}

#[cfg(test)]
use proptest::prelude::*;

#[cfg(test)]
impl Arbitrary for Block {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        any::<u128>().prop_map(Block).boxed()
    }
}
