//! Two-party distributed point function over a binary-tree domain.
//!
//! The classic construction: each party descends a GGM-style tree from its
//! own root seed, and a public per-level correction word cancels the two
//! parties' states everywhere except on the path to the programmed point.
//! XOR of the two leaf conversions is the programmed value at the point and
//! zero elsewhere.
use std::convert::TryFrom;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::bits;
use crate::block::Block;
use crate::bytes::{xor_into, Bytes};
use crate::error::Error;
use crate::prg::{convert, PrgContext};

/// Per-level record: 16-byte seed correction word plus two control bytes.
pub(crate) const CW_SIZE: usize = 18;

/// Largest domain addressable by a `u64` point.
pub const MAX_DOMAIN_BITS: u8 = 63;

/// Accessors over the shared single-point wire layout:
/// `n (1) | root seed (16) | root control bit (1)`, then one [`CW_SIZE`]-byte
/// record per level. Verifiable keys append trailing material after the leaf
/// correction word but keep the same prefix.
pub(crate) trait PointKey {
    fn key_bytes(&self) -> &[u8];

    fn tree_bits(&self) -> u8 {
        self.key_bytes()[0]
    }

    fn root_seed(&self) -> Block {
        Block::read(&self.key_bytes()[1..17])
    }

    fn root_bit(&self) -> bool {
        self.key_bytes()[17] == 1
    }

    fn level_cw(&self, level: usize) -> (Block, bool, bool) {
        let record = &self.key_bytes()[CW_SIZE * (level + 1)..CW_SIZE * (level + 2)];
        (Block::read(&record[..16]), record[16] == 1, record[17] == 1)
    }
}

/// Wire-format point-function key: a validated view over its own bytes.
///
/// Layout: header and level records as in [`PointKey`], then the B-byte leaf
/// correction word. The two keys of a pair differ only in root seed and root
/// control bit.
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
        let min = CW_SIZE * (n as usize + 1) + 1;
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

    /// payload size B, inferred from the key length
    pub fn data_size(&self) -> usize {
        self.bytes.len() - CW_SIZE * (self.tree_bits() as usize + 1)
    }

    fn last_cw(&self) -> &[u8] {
        &self.bytes[CW_SIZE * (self.tree_bits() as usize + 1)..]
    }
}

/// Both parties' tree material before leaf conversion.
pub(crate) struct PointTree {
    pub root0: Block,
    pub root1: Block,
    pub cws: Vec<(Block, bool, bool)>,
    pub leaf0: Block,
    pub leaf1: Block,
}

/// Runs the level-by-level correction-word construction for a single point.
pub(crate) fn grow(ctx: &mut PrgContext, domain_bits: u8, idx: u64) -> Result<PointTree, Error> {
    let n = domain_bits as usize;

    let root0 = Block::random();
    let root1 = Block::random();
    let (mut seed0, mut seed1) = (root0, root1);
    let (mut bit0, mut bit1) = (false, true);

    let mut cws = Vec::with_capacity(n);
    for level in 1..=n {
        let e0 = ctx.expand(seed0, 1)?;
        let e1 = ctx.expand(seed1, 1)?;
        let (tl0, tr0) = (e0.ctrl_left == 1, e0.ctrl_right == 1);
        let (tl1, tr1) = (e1.ctrl_left == 1, e1.ctrl_right == 1);

        // keep the child on the point's path, cancel the other
        let keep_right = bits::index_bit(idx, domain_bits, level);
        let seed_cw = if keep_right {
            e0.left ^ e1.left
        } else {
            e0.right ^ e1.right
        };
        let t_cw_left = !(tl0 ^ tl1 ^ keep_right);
        let t_cw_right = tr0 ^ tr1 ^ keep_right;

        let (keep0, keep1) = if keep_right {
            (e0.right, e1.right)
        } else {
            (e0.left, e1.left)
        };
        let (keep_t0, keep_t1) = if keep_right { (tr0, tr1) } else { (tl0, tl1) };
        let keep_t_cw = if keep_right { t_cw_right } else { t_cw_left };

        if bit0 {
            seed0 = keep0 ^ seed_cw;
            bit0 = keep_t0 ^ keep_t_cw;
        } else {
            seed0 = keep0;
            bit0 = keep_t0;
        }
        if bit1 {
            seed1 = keep1 ^ seed_cw;
            bit1 = keep_t1 ^ keep_t_cw;
        } else {
            seed1 = keep1;
            bit1 = keep_t1;
        }

        cws.push((seed_cw, t_cw_left, t_cw_right));
    }

    Ok(PointTree {
        root0,
        root1,
        cws,
        leaf0: seed0,
        leaf1: seed1,
    })
}

/// Serializes one party's key: header, level records, then `tail` (leaf
/// correction word, plus any trailing proof material).
pub(crate) fn encode(
    domain_bits: u8,
    root: Block,
    root_bit: bool,
    cws: &[(Block, bool, bool)],
    tail: &[u8],
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(CW_SIZE * (cws.len() + 1) + tail.len());
    bytes.push(domain_bits);
    bytes.extend_from_slice(&root.to_bytes());
    bytes.push(root_bit as u8);
    for &(seed_cw, t_left, t_right) in cws {
        bytes.extend_from_slice(&seed_cw.to_bytes());
        bytes.push(t_left as u8);
        bytes.push(t_right as u8);
    }
    bytes.extend_from_slice(tail);
    bytes
}

pub(crate) fn check_domain(domain_bits: u8, idx: u64) -> Result<(), Error> {
    if domain_bits == 0 || domain_bits > MAX_DOMAIN_BITS {
        return Err(Error::DomainTooLarge(domain_bits));
    }
    assert_eq!(idx >> domain_bits, 0, "point outside the domain");
    Ok(())
}

/// Generates a key pair hiding `idx` and its `value`.
pub fn gen(
    ctx: &mut PrgContext,
    domain_bits: u8,
    idx: u64,
    value: &Bytes,
) -> Result<(Key, Key), Error> {
    check_domain(domain_bits, idx)?;
    assert!(!value.is_empty(), "value must not be empty");
    trace!(
        "generating point-function keys: domain=2^{}, payload={}B",
        domain_bits,
        value.len()
    );

    let tree = grow(ctx, domain_bits, idx)?;

    let mut last = value.as_ref().to_vec();
    let len = last.len();
    let c0 = convert(tree.leaf0, len)?;
    xor_into(&mut last, &c0);
    let c1 = convert(tree.leaf1, len)?;
    xor_into(&mut last, &c1);

    let k0 = encode(domain_bits, tree.root0, false, &tree.cws, &last);
    let k1 = encode(domain_bits, tree.root1, true, &tree.cws, &last);
    Ok((Key { bytes: k0 }, Key { bytes: k1 }))
}

/// Walks the tree along `x`, returning the leaf seed and control bit.
pub(crate) fn descend<K: PointKey>(
    ctx: &mut PrgContext,
    key: &K,
    x: u64,
) -> Result<(Block, bool), Error> {
    let n = key.tree_bits();
    let mut seed = key.root_seed();
    let mut bit = key.root_bit();
    for level in 1..=n as usize {
        let e = ctx.expand(seed, 1)?;
        let (mut sl, mut sr) = (e.left, e.right);
        let (mut tl, mut tr) = (e.ctrl_left == 1, e.ctrl_right == 1);
        if bit {
            let (seed_cw, t_cw_left, t_cw_right) = key.level_cw(level - 1);
            sl ^= seed_cw;
            sr ^= seed_cw;
            tl ^= t_cw_left;
            tr ^= t_cw_right;
        }
        if bits::index_bit(x, n, level) {
            seed = sr;
            bit = tr;
        } else {
            seed = sl;
            bit = tl;
        }
    }
    Ok((seed, bit))
}

/// Evaluates this party's share of f(x).
pub fn eval(ctx: &mut PrgContext, key: &Key, x: u64) -> Result<Bytes, Error> {
    let (seed, bit) = descend(ctx, key, x)?;
    let mut share = convert(seed, key.data_size())?;
    if bit {
        xor_into(&mut share, key.last_cw());
    }
    Ok(share.into())
}

/// Evaluates this party's shares at each of `xs`; output is
/// `xs.len() * B` bytes, point-major.
pub fn batch_eval(ctx: &mut PrgContext, key: &Key, xs: &[u64]) -> Result<Bytes, Error> {
    let b = key.data_size();
    let mut out = vec![0u8; xs.len() * b];
    for (l, &x) in xs.iter().enumerate() {
        let (seed, bit) = descend(ctx, key, x)?;
        let chunk = &mut out[l * b..(l + 1) * b];
        chunk.copy_from_slice(&convert(seed, b)?);
        if bit {
            xor_into(chunk, key.last_cw());
        }
    }
    Ok(out.into())
}

/// Leaf count and output size for a full-domain evaluation, or
/// `DomainTooLarge` if they cannot be addressed.
pub(crate) fn full_table_dims(domain_bits: u8, data_size: usize) -> Result<(usize, usize), Error> {
    let leaves = 1usize
        .checked_shl(domain_bits as u32)
        .ok_or(Error::DomainTooLarge(domain_bits))?;
    let total = leaves
        .checked_mul(data_size)
        .ok_or(Error::DomainTooLarge(domain_bits))?;
    Ok((leaves, total))
}

/// Expands the whole tree breadth-first into a flat array of
/// `2 * 2^n - 1` nodes; level d occupies positions `[2^d - 1, 2^(d+1) - 1)`.
pub(crate) fn expand_tree<K: PointKey>(
    ctx: &mut PrgContext,
    key: &K,
) -> Result<(Vec<Block>, Vec<bool>), Error> {
    let n = key.tree_bits() as usize;
    let (leaves, _) = full_table_dims(key.tree_bits(), 1)?;
    let nodes = leaves
        .checked_mul(2)
        .and_then(|x| x.checked_sub(1))
        .ok_or(Error::DomainTooLarge(key.tree_bits()))?;

    let mut seeds = vec![Block::zero(); nodes];
    let mut ctrl = vec![false; nodes];
    seeds[0] = key.root_seed();
    ctrl[0] = key.root_bit();

    for level in 0..n {
        let parent_base = (1usize << level) - 1;
        let child_base = (1usize << (level + 1)) - 1;
        for j in 0..(1usize << level) {
            let parent = parent_base + j;
            let e = ctx.expand(seeds[parent], 1)?;
            let (mut sl, mut sr) = (e.left, e.right);
            let (mut tl, mut tr) = (e.ctrl_left == 1, e.ctrl_right == 1);
            if ctrl[parent] {
                let (seed_cw, t_cw_left, t_cw_right) = key.level_cw(level);
                sl ^= seed_cw;
                sr ^= seed_cw;
                tl ^= t_cw_left;
                tr ^= t_cw_right;
            }
            seeds[child_base + 2 * j] = sl;
            ctrl[child_base + 2 * j] = tl;
            seeds[child_base + 2 * j + 1] = sr;
            ctrl[child_base + 2 * j + 1] = tr;
        }
    }
    Ok((seeds, ctrl))
}

/// Evaluates this party's share table over the whole domain; output is
/// `2^n * B` bytes, point-major.
pub fn eval_full(ctx: &mut PrgContext, key: &Key) -> Result<Bytes, Error> {
    let b = key.data_size();
    let (leaves, total) = full_table_dims(key.domain_bits(), b)?;
    let (seeds, ctrl) = expand_tree(ctx, key)?;

    let mut out = vec![0u8; total];
    for i in 0..leaves {
        let node = seeds.len() - leaves + i;
        let chunk = &mut out[i * b..(i + 1) * b];
        chunk.copy_from_slice(&convert(seeds[node], b)?);
        if ctrl[node] {
            xor_into(chunk, key.last_cw());
        }
    }
    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx() -> PrgContext {
        PrgContext::new(Block::from(0xA5A5u64)).unwrap()
    }

    fn combine(a: &Bytes, b: &Bytes) -> Bytes {
        a.clone() ^ b
    }

    #[test]
    fn test_point_recovered_elsewhere_zero() {
        let mut ctx = ctx();
        let value: Bytes = b"aaaaaaaaaaaaaaa\0".to_vec().into();
        let (k0, k1) = gen(&mut ctx, 4, 1, &value).unwrap();

        for x in 0..16u64 {
            let share0 = eval(&mut ctx, &k0, x).unwrap();
            let share1 = eval(&mut ctx, &k1, x).unwrap();
            let expected = if x == 1 {
                value.clone()
            } else {
                Bytes::empty(16)
            };
            assert_eq!(combine(&share0, &share1), expected, "x = {}", x);
        }
    }

    #[test]
    fn test_full_domain_matches_pointwise() {
        let mut ctx = ctx();
        let value = Bytes::random(16, &mut rand::thread_rng());
        let (k0, k1) = gen(&mut ctx, 4, 9, &value).unwrap();

        let full0 = eval_full(&mut ctx, &k0).unwrap();
        let full1 = eval_full(&mut ctx, &k1).unwrap();
        for x in 0..16u64 {
            let mut chunk = full0.as_ref()[x as usize * 16..(x as usize + 1) * 16].to_vec();
            xor_into(&mut chunk, &full1.as_ref()[x as usize * 16..(x as usize + 1) * 16]);
            let share0 = eval(&mut ctx, &k0, x).unwrap();
            let share1 = eval(&mut ctx, &k1, x).unwrap();
            assert_eq!(Bytes::from(chunk), combine(&share0, &share1));
        }
    }

    #[test]
    fn test_batch_eval_matches_pointwise() {
        let mut ctx = ctx();
        let value = Bytes::random(8, &mut rand::thread_rng());
        let (k0, _) = gen(&mut ctx, 5, 21, &value).unwrap();

        let xs = [0u64, 21, 7, 31];
        let batch = batch_eval(&mut ctx, &k0, &xs).unwrap();
        for (l, &x) in xs.iter().enumerate() {
            let share = eval(&mut ctx, &k0, x).unwrap();
            assert_eq!(&batch.as_ref()[l * 8..(l + 1) * 8], share.as_ref());
        }
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut ctx = ctx();
        let value = Bytes::random(8, &mut rand::thread_rng());
        let (k0, _) = gen(&mut ctx, 6, 13, &value).unwrap();

        let parsed = Key::from_bytes(k0.as_bytes().to_vec()).unwrap();
        assert_eq!(parsed, k0);
        assert_eq!(parsed.domain_bits(), 6);
        assert_eq!(parsed.data_size(), 8);
        assert_eq!(
            eval(&mut ctx, &parsed, 13).unwrap(),
            eval(&mut ctx, &k0, 13).unwrap()
        );
    }

    #[test]
    fn test_truncated_key_rejected() {
        let mut ctx = ctx();
        let value = Bytes::random(16, &mut rand::thread_rng());
        let (k0, _) = gen(&mut ctx, 4, 1, &value).unwrap();

        let mut bytes = k0.into_bytes();
        bytes.truncate(CW_SIZE * 5); // header and levels survive, payload gone
        match Key::from_bytes(bytes) {
            Err(Error::ShortKey { .. }) => {}
            other => panic!("expected ShortKey, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_domain_too_large_rejected() {
        let mut ctx = ctx();
        let value = Bytes::random(4, &mut rand::thread_rng());
        match gen(&mut ctx, 64, 0, &value) {
            Err(Error::DomainTooLarge(64)) => {}
            other => panic!("expected DomainTooLarge, got {:?}", other.map(|_| ())),
        }
    }

    proptest! {
        #[test]
        fn test_correct_everywhere(
            domain_bits in 1u8..=8,
            idx_seed: u64,
            value in prop::collection::vec(any::<u8>(), 1..24),
        ) {
            let mut ctx = ctx();
            let idx = idx_seed % (1u64 << domain_bits);
            let value = Bytes::from(value);
            let (k0, k1) = gen(&mut ctx, domain_bits, idx, &value).unwrap();

            for x in 0..(1u64 << domain_bits) {
                let out = combine(
                    &eval(&mut ctx, &k0, x).unwrap(),
                    &eval(&mut ctx, &k1, x).unwrap(),
                );
                if x == idx {
                    prop_assert_eq!(out, value.clone());
                } else {
                    prop_assert_eq!(out, Bytes::empty(value.len()));
                }
            }
        }

        #[test]
        fn test_full_domain_consistent(
            domain_bits in 1u8..=7,
            idx_seed: u64,
            value in prop::collection::vec(any::<u8>(), 1..17),
        ) {
            let mut ctx = ctx();
            let idx = idx_seed % (1u64 << domain_bits);
            let b = value.len();
            let (k0, _) = gen(&mut ctx, domain_bits, idx, &value.into()).unwrap();

            let full = eval_full(&mut ctx, &k0).unwrap();
            for x in 0..(1u64 << domain_bits) {
                let share = eval(&mut ctx, &k0, x).unwrap();
                prop_assert_eq!(
                    &full.as_ref()[x as usize * b..(x as usize + 1) * b],
                    share.as_ref()
                );
            }
        }
    }
}
