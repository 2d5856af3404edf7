//! Byte strings with cheap XOR, the payload type of every evaluation.
use std::iter::FromIterator;
use std::ops;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Default, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    pub fn empty(len: usize) -> Bytes {
        vec![0; len].into()
    }

    pub fn random<R: Rng>(len: usize, rng: &mut R) -> Bytes {
        let mut buf = vec![0u8; len];
        rng.fill(&mut buf[..]);
        Bytes(buf)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// XOR `src` into `dst`; the operands must have equal length.
pub(crate) fn xor_into(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), src.len());
    dst.iter_mut().zip(src.iter()).for_each(|(x, y)| *x ^= y);
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(other: Vec<u8>) -> Self {
        Bytes(other)
    }
}

impl From<&[u8]> for Bytes {
    fn from(other: &[u8]) -> Self {
        Bytes(other.to_vec())
    }
}

impl From<Bytes> for Vec<u8> {
    fn from(value: Bytes) -> Vec<u8> {
        value.0
    }
}

impl FromIterator<u8> for Bytes {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<u8>>().into()
    }
}

impl ops::BitXor<&Bytes> for Bytes {
    type Output = Bytes;

    fn bitxor(mut self, rhs: &Bytes) -> Bytes {
        xor_into(&mut self.0, &rhs.0);
        self
    }
}

impl ops::BitXor<Bytes> for Bytes {
    type Output = Bytes;

    fn bitxor(self, rhs: Bytes) -> Bytes {
        self ^ &rhs
    }
}

impl ops::BitXorAssign<&Bytes> for Bytes {
    fn bitxor_assign(&mut self, rhs: &Bytes) {
        xor_into(&mut self.0, &rhs.0);
    }
}

impl ops::BitXorAssign<Bytes> for Bytes {
    fn bitxor_assign(&mut self, rhs: Bytes) {
        *self ^= &rhs;
    }
}

#[cfg(test)]
use proptest::prelude::*;

#[cfg(test)]
impl Arbitrary for Bytes {
    type Parameters = prop::collection::SizeRange;
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(size: Self::Parameters) -> Self::Strategy {
        any_with::<Vec<u8>>((size, ()))
            .prop_map(Bytes::from)
            .boxed()
    }
}
