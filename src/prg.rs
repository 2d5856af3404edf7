//! Fixed-key AES primitives: the length-doubling PRG that drives tree
//! descent, and the CTR stream that converts leaf seeds into payload shares.
use derivative::Derivative;
use openssl::symm::{encrypt, Cipher, Crypter, Mode};

use crate::block::Block;
use crate::error::Error;

/// One level of PRG expansion: two child seeds plus packed control bits.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Expansion {
    pub left: Block,
    pub right: Block,
    pub ctrl_left: u32,
    pub ctrl_right: u32,
}

/// Length-doubling PRG: AES-128-ECB under a fixed key, with the ciphertext
/// folded back into the input (Davies–Meyer style) so the expansion is
/// one-way even though the key is public.
///
/// The cipher state is mutated by each call; a context belongs to one
/// generation or evaluation at a time.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PrgContext {
    #[derivative(Debug = "ignore")]
    crypter: Crypter,
}

impl PrgContext {
    pub fn new(key: Block) -> Result<PrgContext, Error> {
        let mut crypter = Crypter::new(
            Cipher::aes_128_ecb(),
            Mode::Encrypt,
            &key.to_bytes(),
            None,
        )?;
        crypter.pad(false);
        Ok(PrgContext { crypter })
    }

    /// Expands `seed` into two child seeds carrying `width` control bits per
    /// side (`width` = 1 for the single-point tree, t for multi-point).
    ///
    /// The input is LSB-canonicalized before encryption, so seeds differing
    /// only in their low bit expand identically.
    pub(crate) fn expand(&mut self, seed: Block, width: usize) -> Result<Expansion, Error> {
        let s = seed.with_lsb_zero();

        let mut input = [0u8; 32];
        input[..16].copy_from_slice(&s.to_bytes());
        input[16..].copy_from_slice(&s.with_lsb_toggled().to_bytes());

        let mut output = [0u8; 48];
        let written = self.crypter.update(&input, &mut output)?;
        debug_assert_eq!(written, input.len());

        let left = Block::read(&output[..16]) ^ s;
        let right = (Block::read(&output[16..32]) ^ s).with_lsb_toggled();
        Ok(Expansion {
            left,
            right,
            ctrl_left: left.low_bits(width),
            ctrl_right: right.low_bits(width),
        })
    }
}

/// Expands a leaf seed into a `len`-byte payload share: AES-128-CTR keyed by
/// the seed, zero IV, over an all-zero plaintext.
pub fn convert(seed: Block, len: usize) -> Result<Vec<u8>, Error> {
    let zeros = vec![0u8; len];
    let iv = [0u8; 16];
    let mut stream = encrypt(Cipher::aes_128_ctr(), &seed.to_bytes(), Some(&iv), &zeros)?;
    stream.truncate(len);
    Ok(stream)
}
