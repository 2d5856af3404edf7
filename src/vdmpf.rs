//! Verifiable multi-point function sharing.
//!
//! The proof layer of the verifiable single-point variant, generalized to t
//! programmed points: the dealer appends one `cs_i` per point, and the
//! evaluator's per-leaf correction is the fold of the `cs_i` selected by its
//! final t-wide control word. The two parties' control words differ in
//! exactly the slot of the programmed point being visited (and nowhere
//! else), so the folds differ by exactly `cs_i` there — cancelling the two
//! leaf hashes' difference the same way the single-point layer does with its
//! one `cs`.
use std::convert::TryFrom;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bits;
use crate::block::Block;
use crate::bytes::Bytes;
use crate::dmpf::{self, validate_multi, MultiKey, CW_SIZE, HEAD_SIZE};
use crate::dpf::full_table_dims;
use crate::error::Error;
use crate::mmo::{MmoHash, DIGEST_BLOCKS};
use crate::prg::PrgContext;
use crate::vdpf::{cs_bytes, read_cs, Proof, ProofChain, CS_SIZE, SAMPLING_RETRIES};

/// Wire-format verifiable multi-point key: the plain multi-point layout with
/// one 64-byte `cs_i` per point appended after the leaf correction words.
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

impl MultiKey for Key {
    fn key_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn payload_size(&self) -> usize {
        let n = self.bytes[0] as usize;
        let t = self.bytes[1] as usize;
        (self.bytes.len() - HEAD_SIZE - n * t * CW_SIZE - t * CS_SIZE) / t
    }
}

impl Key {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Key, Error> {
        validate_multi(&bytes, HEAD_SIZE, CS_SIZE)?;
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

    pub fn points(&self) -> usize {
        self.points_count()
    }

    pub fn data_size(&self) -> usize {
        self.payload_size()
    }

    fn proof_cs(&self, i: usize) -> [Block; DIGEST_BLOCKS] {
        let base = HEAD_SIZE
            + self.domain_bits() as usize * self.points() * CW_SIZE
            + self.points() * self.data_size();
        read_cs(&self.bytes[base + i * CS_SIZE..base + (i + 1) * CS_SIZE])
    }

    fn cs_table(&self) -> Vec<[Block; DIGEST_BLOCKS]> {
        (0..self.points()).map(|i| self.proof_cs(i)).collect()
    }
}

/// XOR of all `cs_i`: the (public) accumulator seed, identical in both keys.
fn chain_init(cs: &[[Block; DIGEST_BLOCKS]]) -> [Block; DIGEST_BLOCKS] {
    let mut acc = [Block::zero(); DIGEST_BLOCKS];
    for cs_i in cs {
        for j in 0..DIGEST_BLOCKS {
            acc[j] ^= cs_i[j];
        }
    }
    acc
}

/// Fold of the `cs_i` at the hot slots of the evaluator's control word.
fn ctrl_fold(cs: &[[Block; DIGEST_BLOCKS]], t: usize, ctrl: u32) -> [Block; DIGEST_BLOCKS] {
    let mut acc = [Block::zero(); DIGEST_BLOCKS];
    for (i, cs_i) in cs.iter().enumerate() {
        if bits::cw_bit(ctrl, t, i + 1) {
            for j in 0..DIGEST_BLOCKS {
                acc[j] ^= cs_i[j];
            }
        }
    }
    acc
}

/// Generates a verifiable key pair with the default retry budget.
///
/// Every extra point halves the per-attempt acceptance probability, so large
/// point sets want [`gen_with_retries`] and a budget around `2^(t+3)`.
pub fn gen(
    ctx: &mut PrgContext,
    hash: &mut MmoHash,
    domain_bits: u8,
    points: &[u64],
    values: &[Bytes],
) -> Result<(Key, Key), Error> {
    gen_with_retries(ctx, hash, domain_bits, points, values, SAMPLING_RETRIES)
}

/// Generates a verifiable key pair, rejection-sampling the roots until every
/// programmed point's two leaf seeds have different low bits.
pub fn gen_with_retries(
    ctx: &mut PrgContext,
    hash: &mut MmoHash,
    domain_bits: u8,
    points: &[u64],
    values: &[Bytes],
    retries: usize,
) -> Result<(Key, Key), Error> {
    dmpf::check_params(domain_bits, points)?;
    dmpf::check_values(points, values);
    let t = points.len();

    for attempt in 1..=retries {
        let tree = dmpf::grow(ctx, domain_bits, points)?;
        let distinguishable =
            (0..t).all(|i| tree.leaves0[i].lsb() != tree.leaves1[i].lsb());
        if !distinguishable {
            debug!("leaf seeds indistinguishable, resampling roots (attempt {})", attempt);
            continue;
        }

        let mut tail = dmpf::leaf_corrections(values, &tree.leaves0, &tree.leaves1)?;
        for i in 0..t {
            let pi0 = hash.hash_2to4([Block::from(points[i]), tree.leaves0[i]])?;
            let pi1 = hash.hash_2to4([Block::from(points[i]), tree.leaves1[i]])?;
            tail.extend_from_slice(&cs_bytes(&pi0, &pi1));
        }

        let k0 = dmpf::encode(domain_bits, t, tree.root0, 0, &tree.cws, &tail);
        let k1 = dmpf::encode(domain_bits, t, tree.root1, 1, &tree.cws, &tail);
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
    let t = key.points();
    let b = key.data_size();
    let layers = key.layers();
    let cs = key.cs_table();
    let mut chain = ProofChain::new(chain_init(&cs));

    let mut out = vec![0u8; xs.len() * b];
    for (l, &x) in xs.iter().enumerate() {
        let (seed, ctrl) = dmpf::walk(
            ctx,
            t,
            &layers,
            key.root_seed(),
            key.root_ctrl(),
            key.domain_bits(),
            x,
        )?;
        let share = dmpf::finalize_leaf(seed, ctrl, t, b, key.last_region())?;
        out[l * b..(l + 1) * b].copy_from_slice(&share);

        let tpi = outer.hash_2to4([Block::from(x), seed])?;
        chain.step(inner, &tpi, ctrl_fold(&cs, t, ctrl))?;
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

/// Full-domain evaluation with a proof over every leaf. The hashed label of
/// a leaf is its domain point, which both parties mirror.
pub fn eval_full(
    ctx: &mut PrgContext,
    outer: &mut MmoHash,
    inner: &mut MmoHash,
    key: &Key,
) -> Result<(Bytes, Proof), Error> {
    let t = key.points();
    let b = key.data_size();
    let (leaves, total) = full_table_dims(key.domain_bits(), b)?;
    let layers = key.layers();
    let (seeds, ctrls) = dmpf::walk_full(
        ctx,
        t,
        &layers,
        key.root_seed(),
        key.root_ctrl(),
        key.domain_bits(),
    )?;
    let cs = key.cs_table();
    let mut chain = ProofChain::new(chain_init(&cs));

    let mut out = vec![0u8; total];
    for x in 0..leaves {
        let share = dmpf::finalize_leaf(seeds[x], ctrls[x], t, b, key.last_region())?;
        out[x * b..(x + 1) * b].copy_from_slice(&share);

        let tpi = outer.hash_2to4([Block::from(x as u64), seeds[x]])?;
        chain.step(inner, &tpi, ctrl_fold(&cs, t, ctrls[x]))?;
    }
    Ok((out.into(), chain.finish()))
}
