//! Big-state multi-point function sharing.
//!
//! A single GGM-style tree is shared by all t programmed points. Every node
//! on an active path carries a t-wide control word; one slot per point stays
//! "hot" along the path to that point. Correction words are produced per
//! (level, active prefix) and applied by folding the level's t records under
//! the evaluator's current control word.
use std::convert::TryFrom;

use itertools::Itertools;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::bits;
use crate::block::Block;
use crate::bytes::{xor_into, Bytes};
use crate::dpf::{full_table_dims, MAX_DOMAIN_BITS};
use crate::error::Error;
use crate::prg::{convert, PrgContext};

/// Header: `n (1) | t (1) | root seed (16) | party id (1)`.
pub(crate) const HEAD_SIZE: usize = 19;

/// Per-record: 16-byte seed correction word plus two packed `u32` control
/// words (little-endian).
pub(crate) const CW_SIZE: usize = 24;

/// Hard cap on t: the control word is packed into a `u32`.
pub const MAX_POINTS: usize = 32;

/// One correction-word record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct LayerCw {
    pub seed: Block,
    pub left: u32,
    pub right: u32,
}

/// Accessors over the shared multi-point wire layout. Verifiable keys append
/// proof material after the leaf correction words but keep the same prefix.
pub(crate) trait MultiKey {
    fn key_bytes(&self) -> &[u8];

    /// payload size B, inferred from the key length
    fn payload_size(&self) -> usize;

    fn tree_bits(&self) -> u8 {
        self.key_bytes()[0]
    }

    fn points_count(&self) -> usize {
        self.key_bytes()[1] as usize
    }

    fn root_seed(&self) -> Block {
        Block::read(&self.key_bytes()[2..18])
    }

    fn root_ctrl(&self) -> u32 {
        if self.key_bytes()[18] == 1 {
            bits::one_hot(self.points_count(), 0)
        } else {
            0
        }
    }

    fn layers(&self) -> Vec<Vec<LayerCw>> {
        parse_layers(
            self.key_bytes(),
            HEAD_SIZE,
            self.tree_bits() as usize,
            self.points_count(),
        )
    }

    /// the t contiguous B-byte leaf correction words
    fn last_region(&self) -> &[u8] {
        let start = HEAD_SIZE + self.tree_bits() as usize * self.points_count() * CW_SIZE;
        let len = self.points_count() * self.payload_size();
        &self.key_bytes()[start..start + len]
    }
}

/// Wire-format multi-point key: a validated view over its own bytes.
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
        (self.bytes.len() - HEAD_SIZE - n * t * CW_SIZE) / t
    }
}

impl Key {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Key, Error> {
        validate_multi(&bytes, HEAD_SIZE, 0)?;
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
}

/// Bundled two-party key: `n (1) | t (1) | root0 (16) | root1 (16)`, then the
/// same correction-word and leaf regions as a single-party key. Holding it is
/// equivalent to holding both keys; it only supports one-shot reconstruction.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct CompressedKey {
    bytes: Vec<u8>,
}

impl TryFrom<Vec<u8>> for CompressedKey {
    type Error = Error;

    fn try_from(bytes: Vec<u8>) -> Result<CompressedKey, Error> {
        CompressedKey::from_bytes(bytes)
    }
}

impl From<CompressedKey> for Vec<u8> {
    fn from(key: CompressedKey) -> Vec<u8> {
        key.bytes
    }
}

pub(crate) const COMPRESSED_HEAD_SIZE: usize = 34;

impl CompressedKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<CompressedKey, Error> {
        validate_multi(&bytes, COMPRESSED_HEAD_SIZE, 0)?;
        Ok(CompressedKey { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn domain_bits(&self) -> u8 {
        self.bytes[0]
    }

    pub fn points(&self) -> usize {
        self.bytes[1] as usize
    }

    pub fn data_size(&self) -> usize {
        let n = self.domain_bits() as usize;
        let t = self.points();
        (self.bytes.len() - COMPRESSED_HEAD_SIZE - n * t * CW_SIZE) / t
    }

    fn roots(&self) -> (Block, Block) {
        (
            Block::read(&self.bytes[2..18]),
            Block::read(&self.bytes[18..34]),
        )
    }

    fn last_region(&self) -> &[u8] {
        let start = COMPRESSED_HEAD_SIZE + self.domain_bits() as usize * self.points() * CW_SIZE;
        &self.bytes[start..]
    }
}

/// Shared header/length validation: `head` bytes, `n * t` records, then a
/// non-empty region divisible by t (plus `suffix_per_point` trailing bytes
/// per point for the verifiable layout).
pub(crate) fn validate_multi(
    bytes: &[u8],
    head: usize,
    suffix_per_point: usize,
) -> Result<(), Error> {
    if bytes.len() < head {
        return Err(Error::ShortKey {
            expected: head,
            actual: bytes.len(),
        });
    }
    let n = bytes[0];
    if n == 0 || n > MAX_DOMAIN_BITS {
        return Err(Error::DomainTooLarge(n));
    }
    let t = bytes[1] as usize;
    if t == 0 || t > MAX_POINTS {
        return Err(Error::ControlWordTooWide(t));
    }
    let fixed = head + n as usize * t * CW_SIZE + t * suffix_per_point;
    let min = fixed + t;
    if bytes.len() < min {
        return Err(Error::ShortKey {
            expected: min,
            actual: bytes.len(),
        });
    }
    let payload = bytes.len() - fixed;
    if payload % t != 0 {
        return Err(Error::ShortKey {
            expected: bytes.len() - payload % t,
            actual: bytes.len(),
        });
    }
    Ok(())
}

pub(crate) fn parse_layers(bytes: &[u8], base: usize, n: usize, t: usize) -> Vec<Vec<LayerCw>> {
    (0..n)
        .map(|level| {
            (0..t)
                .map(|j| {
                    let off = base + (level * t + j) * CW_SIZE;
                    LayerCw {
                        seed: Block::read(&bytes[off..off + 16]),
                        left: u32::from_le_bytes([
                            bytes[off + 16],
                            bytes[off + 17],
                            bytes[off + 18],
                            bytes[off + 19],
                        ]),
                        right: u32::from_le_bytes([
                            bytes[off + 20],
                            bytes[off + 21],
                            bytes[off + 22],
                            bytes[off + 23],
                        ]),
                    }
                })
                .collect()
        })
        .collect()
}

/// Linear GF(2) fold: XOR of the level's records at the slots set in `ctrl`.
pub(crate) fn fold(t: usize, ctrl: u32, layer: &[LayerCw]) -> LayerCw {
    let mut acc = LayerCw::default();
    for (c, cw) in layer.iter().enumerate() {
        if bits::cw_bit(ctrl, t, c + 1) {
            acc.seed ^= cw.seed;
            acc.left ^= cw.left;
            acc.right ^= cw.right;
        }
    }
    acc
}

/// Both parties' tree material before leaf conversion. Leaves are in sorted
/// point order.
pub(crate) struct TreeShares {
    pub root0: Block,
    pub root1: Block,
    pub cws: Vec<Vec<LayerCw>>,
    pub leaves0: Vec<Block>,
    pub leaves1: Vec<Block>,
}

pub(crate) fn check_params(domain_bits: u8, points: &[u64]) -> Result<(), Error> {
    if domain_bits == 0 || domain_bits > MAX_DOMAIN_BITS {
        return Err(Error::DomainTooLarge(domain_bits));
    }
    assert!(!points.is_empty(), "at least one point required");
    if points.len() > MAX_POINTS {
        return Err(Error::ControlWordTooWide(points.len()));
    }
    if !points.windows(2).all(|w| w[0] < w[1]) {
        return Err(Error::InputsUnsorted);
    }
    assert_eq!(
        points[points.len() - 1] >> domain_bits,
        0,
        "point outside the domain"
    );
    Ok(())
}

/// Runs the level-by-level construction over the prefix trie of `points`.
///
/// Unused record slots (while the active set is still smaller than t) stay
/// zero and fold to nothing.
pub(crate) fn grow(
    ctx: &mut PrgContext,
    domain_bits: u8,
    points: &[u64],
) -> Result<TreeShares, Error> {
    let n = domain_bits as usize;
    let t = points.len();

    // active set per depth: the distinct length-d prefixes, sorted
    let mut active: Vec<Vec<u64>> = Vec::with_capacity(n + 1);
    active.push(vec![0]);
    for d in 1..=n {
        active.push(points.iter().map(|&x| x >> (n - d)).dedup().collect());
    }

    let root0 = Block::random();
    let root1 = Block::random();
    let mut seeds0 = vec![root0];
    let mut seeds1 = vec![root1];
    let mut ctrl0: Vec<u32> = vec![0];
    let mut ctrl1: Vec<u32> = vec![bits::one_hot(t, 0)];

    let mut cws: Vec<Vec<LayerCw>> = vec![vec![LayerCw::default(); t]; n];

    for d in 1..=n {
        let parents = &active[d - 1];
        let children = &active[d];

        // first pass: expand every active node and fix this level's records
        let mut exp0 = Vec::with_capacity(parents.len());
        let mut exp1 = Vec::with_capacity(parents.len());
        for (j, &prefix) in parents.iter().enumerate() {
            let e0 = ctx.expand(seeds0[j], t)?;
            let e1 = ctx.expand(seeds1[j], t)?;

            let left_idx = children.binary_search(&(prefix << 1)).ok();
            let right_idx = children.binary_search(&((prefix << 1) | 1)).ok();

            let mut cw_left = e0.ctrl_left ^ e1.ctrl_left;
            let mut cw_right = e0.ctrl_right ^ e1.ctrl_right;
            // hot-slot placement: a one-hot patch makes exactly one party's
            // control word carry the child's slot after correction
            let seed_cw = match (left_idx, right_idx) {
                (Some(li), Some(ri)) => {
                    // sibling prefixes are adjacent in the sorted active set
                    debug_assert_eq!(ri, li + 1);
                    cw_left ^= bits::one_hot(t, li);
                    cw_right ^= bits::one_hot(t, ri);
                    Block::random()
                }
                (Some(li), None) => {
                    cw_left ^= bits::one_hot(t, li);
                    e0.right ^ e1.right
                }
                (None, Some(ri)) => {
                    cw_right ^= bits::one_hot(t, ri);
                    e0.left ^ e1.left
                }
                (None, None) => unreachable!("active prefix without active child"),
            };
            cws[d - 1][j] = LayerCw {
                seed: seed_cw,
                left: cw_left,
                right: cw_right,
            };
            exp0.push(e0);
            exp1.push(e1);
        }

        // second pass: advance both parties' state into the next level
        let mut next_seeds0 = vec![Block::zero(); children.len()];
        let mut next_seeds1 = vec![Block::zero(); children.len()];
        let mut next_ctrl0 = vec![0u32; children.len()];
        let mut next_ctrl1 = vec![0u32; children.len()];
        for (j, &prefix) in parents.iter().enumerate() {
            let f0 = fold(t, ctrl0[j], &cws[d - 1]);
            let f1 = fold(t, ctrl1[j], &cws[d - 1]);

            if let Ok(li) = children.binary_search(&(prefix << 1)) {
                next_seeds0[li] = exp0[j].left ^ f0.seed;
                next_ctrl0[li] = exp0[j].ctrl_left ^ f0.left;
                next_seeds1[li] = exp1[j].left ^ f1.seed;
                next_ctrl1[li] = exp1[j].ctrl_left ^ f1.left;
            }
            if let Ok(ri) = children.binary_search(&((prefix << 1) | 1)) {
                next_seeds0[ri] = exp0[j].right ^ f0.seed;
                next_ctrl0[ri] = exp0[j].ctrl_right ^ f0.right;
                next_seeds1[ri] = exp1[j].right ^ f1.seed;
                next_ctrl1[ri] = exp1[j].ctrl_right ^ f1.right;
            }
        }
        seeds0 = next_seeds0;
        seeds1 = next_seeds1;
        ctrl0 = next_ctrl0;
        ctrl1 = next_ctrl1;
    }

    Ok(TreeShares {
        root0,
        root1,
        cws,
        leaves0: seeds0,
        leaves1: seeds1,
    })
}

pub(crate) fn check_values(points: &[u64], values: &[Bytes]) -> usize {
    assert_eq!(
        points.len(),
        values.len(),
        "one value per point required"
    );
    let b = values[0].len();
    assert!(b > 0, "values must not be empty");
    assert!(
        values.iter().all(|v| v.len() == b),
        "values must have equal length"
    );
    b
}

/// `lastCW_i = v_i ^ convert(leaf0_i) ^ convert(leaf1_i)`, concatenated.
pub(crate) fn leaf_corrections(
    values: &[Bytes],
    leaves0: &[Block],
    leaves1: &[Block],
) -> Result<Vec<u8>, Error> {
    let b = values[0].len();
    let mut out = Vec::with_capacity(values.len() * b);
    for i in 0..values.len() {
        let mut cw = values[i].as_ref().to_vec();
        xor_into(&mut cw, &convert(leaves0[i], b)?);
        xor_into(&mut cw, &convert(leaves1[i], b)?);
        out.extend_from_slice(&cw);
    }
    Ok(out)
}

/// Serializes one party's key: header, record region, then `tail` (leaf
/// correction words plus any trailing proof material).
pub(crate) fn encode(
    domain_bits: u8,
    t: usize,
    root: Block,
    party: u8,
    cws: &[Vec<LayerCw>],
    tail: &[u8],
) -> Vec<u8> {
    let mut bytes =
        Vec::with_capacity(HEAD_SIZE + domain_bits as usize * t * CW_SIZE + tail.len());
    bytes.push(domain_bits);
    bytes.push(t as u8);
    bytes.extend_from_slice(&root.to_bytes());
    bytes.push(party);
    for layer in cws {
        for cw in layer {
            bytes.extend_from_slice(&cw.seed.to_bytes());
            bytes.extend_from_slice(&cw.left.to_le_bytes());
            bytes.extend_from_slice(&cw.right.to_le_bytes());
        }
    }
    bytes.extend_from_slice(tail);
    bytes
}

/// Generates a key pair hiding the strictly-ascending `points` and their
/// `values`.
pub fn gen(
    ctx: &mut PrgContext,
    domain_bits: u8,
    points: &[u64],
    values: &[Bytes],
) -> Result<(Key, Key), Error> {
    check_params(domain_bits, points)?;
    let b = check_values(points, values);
    trace!(
        "generating multi-point keys: domain=2^{}, points={}, payload={}B",
        domain_bits,
        points.len(),
        b
    );

    let tree = grow(ctx, domain_bits, points)?;
    let last = leaf_corrections(values, &tree.leaves0, &tree.leaves1)?;

    let t = points.len();
    let k0 = encode(domain_bits, t, tree.root0, 0, &tree.cws, &last);
    let k1 = encode(domain_bits, t, tree.root1, 1, &tree.cws, &last);
    Ok((Key { bytes: k0 }, Key { bytes: k1 }))
}

/// Walks the tree along `x`, folding each level's records under the current
/// control word; returns the leaf seed and final control word.
pub(crate) fn walk(
    ctx: &mut PrgContext,
    t: usize,
    layers: &[Vec<LayerCw>],
    root: Block,
    root_ctrl: u32,
    domain_bits: u8,
    x: u64,
) -> Result<(Block, u32), Error> {
    let mut seed = root;
    let mut ctrl = root_ctrl;
    for (level, layer) in layers.iter().enumerate() {
        let f = fold(t, ctrl, layer);
        let e = ctx.expand(seed, t)?;
        if bits::index_bit(x, domain_bits, level + 1) {
            seed = e.right ^ f.seed;
            ctrl = e.ctrl_right ^ f.right;
        } else {
            seed = e.left ^ f.seed;
            ctrl = e.ctrl_left ^ f.left;
        }
    }
    Ok((seed, ctrl))
}

/// Doubling full-domain walk; returns leaf seeds and control words for every
/// point, in domain order.
pub(crate) fn walk_full(
    ctx: &mut PrgContext,
    t: usize,
    layers: &[Vec<LayerCw>],
    root: Block,
    root_ctrl: u32,
    domain_bits: u8,
) -> Result<(Vec<Block>, Vec<u32>), Error> {
    let (leaves, _) = full_table_dims(domain_bits, 1)?;
    let mut seeds = Vec::with_capacity(leaves);
    let mut ctrls = Vec::with_capacity(leaves);
    seeds.push(root);
    ctrls.push(root_ctrl);

    for layer in layers {
        let mut next_seeds = Vec::with_capacity(seeds.len() * 2);
        let mut next_ctrls = Vec::with_capacity(seeds.len() * 2);
        for j in 0..seeds.len() {
            let f = fold(t, ctrls[j], layer);
            let e = ctx.expand(seeds[j], t)?;
            next_seeds.push(e.left ^ f.seed);
            next_ctrls.push(e.ctrl_left ^ f.left);
            next_seeds.push(e.right ^ f.seed);
            next_ctrls.push(e.ctrl_right ^ f.right);
        }
        seeds = next_seeds;
        ctrls = next_ctrls;
    }
    Ok((seeds, ctrls))
}

/// Converts a leaf and XORs in the correction word of every hot slot.
pub(crate) fn finalize_leaf(
    seed: Block,
    ctrl: u32,
    t: usize,
    b: usize,
    last_region: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut share = convert(seed, b)?;
    for i in 0..t {
        if bits::cw_bit(ctrl, t, i + 1) {
            xor_into(&mut share, &last_region[i * b..(i + 1) * b]);
        }
    }
    Ok(share)
}

/// Evaluates this party's share of f(x).
pub fn eval(ctx: &mut PrgContext, key: &Key, x: u64) -> Result<Bytes, Error> {
    let t = key.points();
    let layers = key.layers();
    let (seed, ctrl) = walk(
        ctx,
        t,
        &layers,
        key.root_seed(),
        key.root_ctrl(),
        key.domain_bits(),
        x,
    )?;
    finalize_leaf(seed, ctrl, t, key.data_size(), key.last_region()).map(Bytes::from)
}

/// Evaluates this party's shares at each of `xs`; output is
/// `xs.len() * B` bytes, point-major.
pub fn batch_eval(ctx: &mut PrgContext, key: &Key, xs: &[u64]) -> Result<Bytes, Error> {
    let t = key.points();
    let b = key.data_size();
    let layers = key.layers();

    let mut out = vec![0u8; xs.len() * b];
    for (l, &x) in xs.iter().enumerate() {
        let (seed, ctrl) = walk(
            ctx,
            t,
            &layers,
            key.root_seed(),
            key.root_ctrl(),
            key.domain_bits(),
            x,
        )?;
        let share = finalize_leaf(seed, ctrl, t, b, key.last_region())?;
        out[l * b..(l + 1) * b].copy_from_slice(&share);
    }
    Ok(out.into())
}

/// Evaluates this party's share table over the whole domain; output is
/// `2^n * B` bytes, point-major.
pub fn eval_full(ctx: &mut PrgContext, key: &Key) -> Result<Bytes, Error> {
    let t = key.points();
    let b = key.data_size();
    let (leaves, total) = full_table_dims(key.domain_bits(), b)?;
    let layers = key.layers();
    let (seeds, ctrls) = walk_full(
        ctx,
        t,
        &layers,
        key.root_seed(),
        key.root_ctrl(),
        key.domain_bits(),
    )?;

    let mut out = vec![0u8; total];
    for x in 0..leaves {
        let share = finalize_leaf(seeds[x], ctrls[x], t, b, key.last_region())?;
        out[x * b..(x + 1) * b].copy_from_slice(&share);
    }
    Ok(out.into())
}

/// Generates both parties' material and bundles it into one blob; anyone
/// holding it can reconstruct the plaintext function table.
pub fn compress(
    ctx: &mut PrgContext,
    domain_bits: u8,
    points: &[u64],
    values: &[Bytes],
) -> Result<CompressedKey, Error> {
    check_params(domain_bits, points)?;
    check_values(points, values);

    let tree = grow(ctx, domain_bits, points)?;
    let last = leaf_corrections(values, &tree.leaves0, &tree.leaves1)?;

    let t = points.len();
    let mut bytes = Vec::with_capacity(
        COMPRESSED_HEAD_SIZE + domain_bits as usize * t * CW_SIZE + last.len(),
    );
    bytes.push(domain_bits);
    bytes.push(t as u8);
    bytes.extend_from_slice(&tree.root0.to_bytes());
    bytes.extend_from_slice(&tree.root1.to_bytes());
    for layer in &tree.cws {
        for cw in layer {
            bytes.extend_from_slice(&cw.seed.to_bytes());
            bytes.extend_from_slice(&cw.left.to_le_bytes());
            bytes.extend_from_slice(&cw.right.to_le_bytes());
        }
    }
    bytes.extend_from_slice(&last);
    Ok(CompressedKey { bytes })
}

/// One-shot full-domain reconstruction: walks both parties' trees in step
/// and XORs their leaf finalizations into the plaintext table.
pub fn decompress(ctx: &mut PrgContext, key: &CompressedKey) -> Result<Bytes, Error> {
    let t = key.points();
    let b = key.data_size();
    let n = key.domain_bits();
    let (leaves, total) = full_table_dims(n, b)?;
    let layers = parse_layers(&key.bytes, COMPRESSED_HEAD_SIZE, n as usize, t);
    let (root0, root1) = key.roots();

    let (seeds0, ctrls0) = walk_full(ctx, t, &layers, root0, 0, n)?;
    let (seeds1, ctrls1) = walk_full(ctx, t, &layers, root1, bits::one_hot(t, 0), n)?;

    let mut out = vec![0u8; total];
    for x in 0..leaves {
        let chunk = &mut out[x * b..(x + 1) * b];
        chunk.copy_from_slice(&finalize_leaf(seeds0[x], ctrls0[x], t, b, key.last_region())?);
        xor_into(
            chunk,
            &finalize_leaf(seeds1[x], ctrls1[x], t, b, key.last_region())?,
        );
    }
    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::thread_rng;

    fn ctx() -> PrgContext {
        PrgContext::new(Block::from(0xC0FFEEu64)).unwrap()
    }

    fn combine(a: &Bytes, b: &Bytes) -> Bytes {
        a.clone() ^ b
    }

    #[test]
    fn test_points_recovered_elsewhere_zero() {
        let mut ctx = ctx();
        let value: Bytes = b"aaaaaaaaaaaaaaa\0".to_vec().into();
        let points = [1u64, 2, 3, 4];
        let values = vec![value.clone(); 4];
        let (k0, k1) = gen(&mut ctx, 4, &points, &values).unwrap();

        for x in 0..16u64 {
            let out = combine(
                &eval(&mut ctx, &k0, x).unwrap(),
                &eval(&mut ctx, &k1, x).unwrap(),
            );
            if points.contains(&x) {
                assert_eq!(out, value, "x = {}", x);
            } else {
                assert_eq!(out, Bytes::empty(16), "x = {}", x);
            }
        }
    }

    #[test]
    fn test_distinct_values_recovered() {
        let mut ctx = ctx();
        let points = [0u64, 4, 7];
        let values: Vec<Bytes> = vec![
            vec![0x01, 0x02, 0x03, 0x04].into(),
            vec![0xAA, 0xBB, 0xCC, 0xDD].into(),
            vec![0xFF, 0xEE, 0xDD, 0xCC].into(),
        ];
        let (k0, k1) = gen(&mut ctx, 3, &points, &values).unwrap();

        let full0 = eval_full(&mut ctx, &k0).unwrap();
        let full1 = eval_full(&mut ctx, &k1).unwrap();
        let table = combine(&full0, &full1);
        for x in 0..8usize {
            let chunk = &table.as_ref()[x * 4..(x + 1) * 4];
            match points.iter().position(|&p| p == x as u64) {
                Some(i) => assert_eq!(chunk, values[i].as_ref(), "x = {}", x),
                None => assert_eq!(chunk, &[0u8; 4][..], "x = {}", x),
            }
        }
    }

    #[test]
    fn test_full_domain_matches_pointwise() {
        let mut ctx = ctx();
        let points = [3u64, 11, 12];
        let values: Vec<Bytes> = (0..3).map(|_| Bytes::random(8, &mut thread_rng())).collect();
        let (k0, _) = gen(&mut ctx, 4, &points, &values).unwrap();

        let full = eval_full(&mut ctx, &k0).unwrap();
        for x in 0..16u64 {
            let share = eval(&mut ctx, &k0, x).unwrap();
            assert_eq!(
                &full.as_ref()[x as usize * 8..(x as usize + 1) * 8],
                share.as_ref()
            );
        }
    }

    #[test]
    fn test_batch_eval_matches_pointwise() {
        let mut ctx = ctx();
        let points = [1u64, 6, 13];
        let values: Vec<Bytes> = (0..3).map(|_| Bytes::random(5, &mut thread_rng())).collect();
        let (k0, _) = gen(&mut ctx, 4, &points, &values).unwrap();

        let xs = [0u64, 1, 6, 13, 15];
        let batch = batch_eval(&mut ctx, &k0, &xs).unwrap();
        for (l, &x) in xs.iter().enumerate() {
            let share = eval(&mut ctx, &k0, x).unwrap();
            assert_eq!(&batch.as_ref()[l * 5..(l + 1) * 5], share.as_ref());
        }
    }

    #[test]
    fn test_unsorted_points_rejected() {
        let mut ctx = ctx();
        let values: Vec<Bytes> = vec![Bytes::empty(4); 2];
        match gen(&mut ctx, 4, &[5, 2], &values) {
            Err(Error::InputsUnsorted) => {}
            other => panic!("expected InputsUnsorted, got {:?}", other.map(|_| ())),
        }
        match gen(&mut ctx, 4, &[2, 2], &values) {
            Err(Error::InputsUnsorted) => {}
            other => panic!("expected InputsUnsorted, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_too_many_points_rejected() {
        let mut ctx = ctx();
        let points: Vec<u64> = (0..33).collect();
        let values: Vec<Bytes> = vec![Bytes::empty(4); 33];
        match gen(&mut ctx, 6, &points, &values) {
            Err(Error::ControlWordTooWide(33)) => {}
            other => panic!("expected ControlWordTooWide, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut ctx = ctx();
        let points = [2u64, 9];
        let values: Vec<Bytes> = (0..2).map(|_| Bytes::random(6, &mut thread_rng())).collect();
        let (k0, _) = gen(&mut ctx, 4, &points, &values).unwrap();

        let parsed = Key::from_bytes(k0.as_bytes().to_vec()).unwrap();
        assert_eq!(parsed, k0);
        assert_eq!(parsed.domain_bits(), 4);
        assert_eq!(parsed.points(), 2);
        assert_eq!(parsed.data_size(), 6);
    }

    #[test]
    fn test_truncated_key_rejected() {
        let mut ctx = ctx();
        let points = [2u64, 9];
        let values: Vec<Bytes> = vec![Bytes::empty(6); 2];
        let (k0, _) = gen(&mut ctx, 4, &points, &values).unwrap();

        let mut bytes = k0.into_bytes();
        bytes.truncate(bytes.len() - 7); // leaf region no longer divides by t
        match Key::from_bytes(bytes) {
            Err(Error::ShortKey { .. }) => {}
            other => panic!("expected ShortKey, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_compress_decompress() {
        let mut ctx = ctx();
        let points = [2u64, 5];
        let values: Vec<Bytes> = (0..2)
            .map(|_| Bytes::random(16, &mut thread_rng()))
            .collect();
        let key = compress(&mut ctx, 4, &points, &values).unwrap();
        let table = decompress(&mut ctx, &key).unwrap();

        assert_eq!(table.len(), 16 * 16);
        for x in 0..16usize {
            let chunk = &table.as_ref()[x * 16..(x + 1) * 16];
            match points.iter().position(|&p| p == x as u64) {
                Some(i) => assert_eq!(chunk, values[i].as_ref(), "x = {}", x),
                None => assert_eq!(chunk, &[0u8; 16][..], "x = {}", x),
            }
        }
    }

    fn params() -> impl Strategy<Value = (u8, usize, Vec<u64>)> {
        (1u8..=6, 1usize..=12).prop_flat_map(|(n, b)| {
            let max = 1u64 << n;
            let count = 1..=std::cmp::min(8, max as usize);
            (
                Just(n),
                Just(b),
                prop::collection::btree_set(0..max, count)
                    .prop_map(|set| set.into_iter().collect()),
            )
        })
    }

    proptest! {
        #[test]
        fn test_correct_everywhere((domain_bits, b, points) in params()) {
            let mut ctx = ctx();
            let values: Vec<Bytes> = (0..points.len())
                .map(|_| Bytes::random(b, &mut thread_rng()))
                .collect();
            let (k0, k1) = gen(&mut ctx, domain_bits, &points, &values).unwrap();

            for x in 0..(1u64 << domain_bits) {
                let out = combine(
                    &eval(&mut ctx, &k0, x).unwrap(),
                    &eval(&mut ctx, &k1, x).unwrap(),
                );
                match points.iter().position(|&p| p == x) {
                    Some(i) => prop_assert_eq!(out, values[i].clone()),
                    None => prop_assert_eq!(out, Bytes::empty(b)),
                }
            }
        }

        #[test]
        fn test_compress_matches_gen_table((domain_bits, b, points) in params()) {
            let mut ctx = ctx();
            let values: Vec<Bytes> = (0..points.len())
                .map(|_| Bytes::random(b, &mut thread_rng()))
                .collect();

            let compressed = compress(&mut ctx, domain_bits, &points, &values).unwrap();
            let table = decompress(&mut ctx, &compressed).unwrap();
            for x in 0..(1usize << domain_bits) {
                let chunk = &table.as_ref()[x * b..(x + 1) * b];
                match points.iter().position(|&p| p == x as u64) {
                    Some(i) => prop_assert_eq!(chunk, values[i].as_ref()),
                    None => prop_assert!(chunk.iter().all(|&byte| byte == 0)),
                }
            }
        }
    }
}
