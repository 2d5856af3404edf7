//! Verifiable single-point function sharing.
//!
//! Wraps the point-function tree with the proof layer of de Castro and
//! Polychroniadou (EUROCRYPT 2022): the dealer rejection-samples roots until
//! the two leaf seeds at the programmed point have different low bits, then
//! publishes `cs`, the XOR of both leaves' hashes. Each evaluator chains a
//! hash of every visited leaf into an accumulator seeded with `cs`; the
//! final digests agree on both sides iff the key pair was honestly generated
//! and both evaluated the same inputs.
use std::convert::TryFrom;
use std::fmt;

use log::debug;
use openssl::sha::sha256;
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::bytes::{xor_into, Bytes};
use crate::dpf::{self, PointKey, CW_SIZE, MAX_DOMAIN_BITS};
use crate::error::Error;
use crate::mmo::{MmoHash, DIGEST_BLOCKS};
use crate::prg::{convert, PrgContext};

/// Default retry budget for the root rejection-sampling loop.
pub const SAMPLING_RETRIES: usize = 32;

/// Per-point proof material: four blocks.
pub(crate) const CS_SIZE: usize = Block::SIZE * DIGEST_BLOCKS;

/// 32-byte evaluation digest; byte-equal on both parties iff the keys are an
/// honest pair and the evaluated input sets match.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof([u8; 32]);

impl Proof {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Proof {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proof({})", hex::encode(&self.0[..]))
    }
}

/// The evaluator's accumulator. Each visited leaf contributes
/// `pi ^= H'(pi ^ H(y||s) ^ correction)`, where `correction` is the
/// `cs`-derived value that cancels the two parties' hash difference at a
/// programmed point and is identical on both sides everywhere else.
pub(crate) struct ProofChain {
    pi: [Block; DIGEST_BLOCKS],
}

impl ProofChain {
    pub fn new(init: [Block; DIGEST_BLOCKS]) -> ProofChain {
        ProofChain { pi: init }
    }

    pub fn step(
        &mut self,
        inner: &mut MmoHash,
        tpi: &[Block; DIGEST_BLOCKS],
        correction: [Block; DIGEST_BLOCKS],
    ) -> Result<(), Error> {
        let mut input = [Block::zero(); DIGEST_BLOCKS];
        for j in 0..DIGEST_BLOCKS {
            input[j] = self.pi[j] ^ tpi[j] ^ correction[j];
        }
        let cpi = inner.hash_4to4(input)?;
        for j in 0..DIGEST_BLOCKS {
            self.pi[j] ^= cpi[j];
        }
        Ok(())
    }

    /// SHA-256 of the final accumulator.
    pub fn finish(self) -> Proof {
        let mut acc = [0u8; CS_SIZE];
        for (chunk, block) in acc.chunks_exact_mut(Block::SIZE).zip(self.pi.iter()) {
            chunk.copy_from_slice(&block.to_bytes());
        }
        Proof(sha256(&acc))
    }
}

/// `cs` if `bit` is set, zero otherwise.
pub(crate) fn gate(cs: &[Block; DIGEST_BLOCKS], bit: bool) -> [Block; DIGEST_BLOCKS] {
    if bit {
        *cs
    } else {
        [Block::zero(); DIGEST_BLOCKS]
    }
}

/// Wire-format verifiable point-function key: the plain point-function
/// layout with the dealer's 64-byte `cs` appended after the leaf correction
/// word.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Key {
    bytes: Vec<u8>,
}

impl TryFrom<Vec<u8>> for Key {
    type Error = Error;

    fn try_from(bytes: Vec<u8>) -> Result<Key, Error> {
        Key::from_bytes(bytes)
    }
}

impl From<Key> for Vec<u8> {
    fn from(key: Key) -> Vec<u8> {
        key.bytes
    }
}

impl PointKey for Key {
    fn key_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Key {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Key, Error> {
        if bytes.len() < CW_SIZE {
            return Err(Error::ShortKey {
                expected: CW_SIZE,
                actual: bytes.len(),
            });
        }
        let n = bytes[0];
        if n == 0 || n > MAX_DOMAIN_BITS {
            return Err(Error::DomainTooLarge(n));
        }
        let min = CW_SIZE * (n as usize + 1) + CS_SIZE + 1;
        if bytes.len() < min {
            return Err(Error::ShortKey {
                expected: min,
                actual: bytes.len(),
            });
        }
        Ok(Key { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn domain_bits(&self) -> u8 {
        self.tree_bits()
    }

    pub fn data_size(&self) -> usize {
        self.bytes.len() - CW_SIZE * (self.tree_bits() as usize + 1) - CS_SIZE
    }

    fn last_cw(&self) -> &[u8] {
        let start = CW_SIZE * (self.tree_bits() as usize + 1);
        &self.bytes[start..self.bytes.len() - CS_SIZE]
    }

    fn proof_cs(&self) -> [Block; DIGEST_BLOCKS] {
        read_cs(&self.bytes[self.bytes.len() - CS_SIZE..])
    }
}

pub(crate) fn read_cs(slice: &[u8]) -> [Block; DIGEST_BLOCKS] {
    let mut cs = [Block::zero(); DIGEST_BLOCKS];
    for (j, chunk) in slice[..CS_SIZE].chunks_exact(Block::SIZE).enumerate() {
        cs[j] = Block::read(chunk);
    }
    cs
}

pub(crate) fn cs_bytes(
    pi0: &[Block; DIGEST_BLOCKS],
    pi1: &[Block; DIGEST_BLOCKS],
) -> [u8; CS_SIZE] {
    let mut out = [0u8; CS_SIZE];
    for j in 0..DIGEST_BLOCKS {
        out[Block::SIZE * j..Block::SIZE * (j + 1)].copy_from_slice(&(pi0[j] ^ pi1[j]).to_bytes());
    }
    out
}

/// Generates a verifiable key pair with the default retry budget.
pub fn gen(
    ctx: &mut PrgContext,
    hash: &mut MmoHash,
    domain_bits: u8,
    idx: u64,
    value: &Bytes,
) -> Result<(Key, Key), Error> {
    gen_with_retries(ctx, hash, domain_bits, idx, value, SAMPLING_RETRIES)
}

/// Generates a verifiable key pair, rejection-sampling the roots until the
/// two leaf seeds at the programmed point have different low bits.
pub fn gen_with_retries(
    ctx: &mut PrgContext,
    hash: &mut MmoHash,
    domain_bits: u8,
    idx: u64,
    value: &Bytes,
    retries: usize,
) -> Result<(Key, Key), Error> {
    dpf::check_domain(domain_bits, idx)?;
    assert!(!value.is_empty(), "value must not be empty");

    for attempt in 1..=retries {
        let tree = dpf::grow(ctx, domain_bits, idx)?;
        if tree.leaf0.lsb() == tree.leaf1.lsb() {
            debug!("leaf seeds indistinguishable, resampling roots (attempt {})", attempt);
            continue;
        }

        let pi0 = hash.hash_2to4([Block::from(idx), tree.leaf0])?;
        let pi1 = hash.hash_2to4([Block::from(idx), tree.leaf1])?;

        let mut tail = value.as_ref().to_vec();
        let len = tail.len();
        let c0 = convert(tree.leaf0, len)?;
        xor_into(&mut tail, &c0);
        let c1 = convert(tree.leaf1, len)?;
        xor_into(&mut tail, &c1);
        tail.extend_from_slice(&cs_bytes(&pi0, &pi1));

        let k0 = dpf::encode(domain_bits, tree.root0, false, &tree.cws, &tail);
        let k1 = dpf::encode(domain_bits, tree.root1, true, &tree.cws, &tail);
        return Ok((Key { bytes: k0 }, Key { bytes: k1 }));
    }
    Err(Error::FailedSampling(retries))
}

/// Evaluates this party's shares at each of `xs`, chaining one proof across
/// all of them. Output is `xs.len() * B` bytes, point-major.
pub fn batch_eval(
    ctx: &mut PrgContext,
    outer: &mut MmoHash,
    inner: &mut MmoHash,
    key: &Key,
    xs: &[u64],
) -> Result<(Bytes, Proof), Error> {
    let b = key.data_size();
    let cs = key.proof_cs();
    let mut chain = ProofChain::new(cs);

    let mut out = vec![0u8; xs.len() * b];
    for (l, &x) in xs.iter().enumerate() {
        let (seed, bit) = dpf::descend(ctx, key, x)?;
        let chunk = &mut out[l * b..(l + 1) * b];
        chunk.copy_from_slice(&convert(seed, b)?);
        if bit {
            xor_into(chunk, key.last_cw());
        }
        // the leaf's low bit decides whether cs is folded in; the dealer
        // sampled the roots so the two parties disagree on it exactly at
        // the programmed point
        let tpi = outer.hash_2to4([Block::from(x), seed])?;
        chain.step(inner, &tpi, gate(&cs, seed.lsb()))?;
    }
    Ok((out.into(), chain.finish()))
}

/// Evaluates this party's share of f(x) along with its proof.
pub fn eval(
    ctx: &mut PrgContext,
    outer: &mut MmoHash,
    inner: &mut MmoHash,
    key: &Key,
    x: u64,
) -> Result<(Bytes, Proof), Error> {
    batch_eval(ctx, outer, inner, key, &[x])
}

/// Full-domain evaluation with a proof over every leaf, hashed under its
/// domain point; the digest equals the one from a batch evaluation of
/// `0..2^n`.
pub fn eval_full(
    ctx: &mut PrgContext,
    outer: &mut MmoHash,
    inner: &mut MmoHash,
    key: &Key,
) -> Result<(Bytes, Proof), Error> {
    let b = key.data_size();
    let (leaves, total) = dpf::full_table_dims(key.domain_bits(), b)?;
    let (seeds, ctrl) = dpf::expand_tree(ctx, key)?;
    let cs = key.proof_cs();
    let mut chain = ProofChain::new(cs);

    let mut out = vec![0u8; total];
    for i in 0..leaves {
        let node = seeds.len() - leaves + i;
        let chunk = &mut out[i * b..(i + 1) * b];
        chunk.copy_from_slice(&convert(seeds[node], b)?);
        if ctrl[node] {
            xor_into(chunk, key.last_cw());
        }
        let tpi = outer.hash_2to4([Block::from(i as u64), seeds[node]])?;
        chain.step(inner, &tpi, gate(&cs, seeds[node].lsb()))?;
    }
    Ok((out.into(), chain.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn ctx() -> PrgContext {
        PrgContext::new(Block::from(0xD00Du64)).unwrap()
    }

    fn hashes() -> (MmoHash, MmoHash) {
        (
            MmoHash::new(Block::from(111u64)).unwrap(),
            MmoHash::new(Block::from(222u64)).unwrap(),
        )
    }

    #[test]
    fn test_full_domain_proofs_agree() {
        let mut ctx = ctx();
        let (mut h1, mut h2) = hashes();
        let value = Bytes::random(16, &mut thread_rng());
        let (k0, k1) = gen(&mut ctx, &mut h1, 4, 1, &value).unwrap();

        let (full0, proof0) = eval_full(&mut ctx, &mut h1, &mut h2, &k0).unwrap();
        let (full1, proof1) = eval_full(&mut ctx, &mut h1, &mut h2, &k1).unwrap();
        assert_eq!(proof0, proof1);

        let table = full0 ^ full1;
        for x in 0..16usize {
            let chunk = &table.as_ref()[x * 16..(x + 1) * 16];
            if x == 1 {
                assert_eq!(chunk, value.as_ref());
            } else {
                assert_eq!(chunk, &[0u8; 16][..]);
            }
        }
    }

    #[test]
    fn test_tampered_key_changes_proof() {
        let mut ctx = ctx();
        let (mut h1, mut h2) = hashes();
        let value = Bytes::random(16, &mut thread_rng());
        let (k0, k1) = gen(&mut ctx, &mut h1, 4, 1, &value).unwrap();

        let mut bytes = k1.into_bytes();
        bytes[CW_SIZE + 2] ^= 0x40; // inside the first level's seed correction word
        let tampered = Key::from_bytes(bytes).unwrap();

        let (_, proof0) = eval_full(&mut ctx, &mut h1, &mut h2, &k0).unwrap();
        let (_, proof1) = eval_full(&mut ctx, &mut h1, &mut h2, &tampered).unwrap();
        assert_ne!(proof0, proof1);
    }

    #[test]
    fn test_batch_eval_values_and_proof() {
        let mut ctx = ctx();
        let (mut h1, mut h2) = hashes();
        let value = Bytes::random(16, &mut thread_rng());
        let (k0, k1) = gen(&mut ctx, &mut h1, 4, 1, &value).unwrap();

        let xs = [0u64, 1];
        let (out0, proof0) = batch_eval(&mut ctx, &mut h1, &mut h2, &k0, &xs).unwrap();
        let (out1, proof1) = batch_eval(&mut ctx, &mut h1, &mut h2, &k1, &xs).unwrap();
        assert_eq!(proof0, proof1);

        let combined = out0 ^ out1;
        assert_eq!(&combined.as_ref()[..16], &[0u8; 16][..]);
        assert_eq!(&combined.as_ref()[16..], value.as_ref());
    }

    #[test]
    fn test_eval_every_point() {
        let mut ctx = ctx();
        let (mut h1, mut h2) = hashes();
        let value = Bytes::random(16, &mut thread_rng());
        let (k0, k1) = gen(&mut ctx, &mut h1, 4, 6, &value).unwrap();

        for x in 0..16u64 {
            let (out0, proof0) = eval(&mut ctx, &mut h1, &mut h2, &k0, x).unwrap();
            let (out1, proof1) = eval(&mut ctx, &mut h1, &mut h2, &k1, x).unwrap();
            assert_eq!(proof0, proof1, "x = {}", x);
            let combined = out0 ^ out1;
            if x == 6 {
                assert_eq!(combined, value);
            } else {
                assert_eq!(combined, Bytes::empty(16));
            }
        }
    }

    #[test]
    fn test_no_retry_budget_fails() {
        let mut ctx = ctx();
        let (mut h1, _) = hashes();
        let value = Bytes::random(4, &mut thread_rng());
        match gen_with_retries(&mut ctx, &mut h1, 4, 1, &value, 0) {
            Err(Error::FailedSampling(0)) => {}
            other => panic!("expected FailedSampling, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut ctx = ctx();
        let (mut h1, mut h2) = hashes();
        let value = Bytes::random(8, &mut thread_rng());
        let (k0, _) = gen(&mut ctx, &mut h1, 5, 17, &value).unwrap();

        let parsed = Key::from_bytes(k0.as_bytes().to_vec()).unwrap();
        assert_eq!(parsed, k0);
        assert_eq!(parsed.data_size(), 8);
        assert_eq!(
            eval(&mut ctx, &mut h1, &mut h2, &parsed, 17).unwrap().0,
            eval(&mut ctx, &mut h1, &mut h2, &k0, 17).unwrap().0
        );
    }
}
