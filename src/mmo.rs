//! Matyas–Meyer–Oseas hashing over fixed-key AES-128.
//!
//! Used as a correlation-robust hash by the verifiable variants: each output
//! lane encrypts a tweaked copy of an input block and folds the plaintext
//! back in, so inverting a lane requires breaking the compression function.
use derivative::Derivative;
use openssl::symm::{Cipher, Crypter, Mode};

use crate::block::Block;
use crate::error::Error;

/// Blocks in a proof digest.
pub(crate) const DIGEST_BLOCKS: usize = 4;

/// Fixed-key AES-128 hash context. Like [`PrgContext`](crate::PrgContext),
/// the cipher state is mutated per call and is not shareable.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct MmoHash {
    #[derivative(Debug = "ignore")]
    crypter: Crypter,
}

impl MmoHash {
    pub fn new(key: Block) -> Result<MmoHash, Error> {
        let mut crypter = Crypter::new(
            Cipher::aes_128_ecb(),
            Mode::Encrypt,
            &key.to_bytes(),
            None,
        )?;
        crypter.pad(false);
        Ok(MmoHash { crypter })
    }

    /// Compresses two blocks into four, expanding the domain with per-lane
    /// tweaks so no two lanes see the same plaintext.
    pub fn hash_2to4(&mut self, input: [Block; 2]) -> Result<[Block; DIGEST_BLOCKS], Error> {
        self.compress([
            input[0],
            input[1],
            input[0] ^ Block::from(2u64),
            input[1] ^ Block::from(3u64),
        ])
    }

    /// Compresses four blocks into four.
    pub fn hash_4to4(&mut self, input: [Block; DIGEST_BLOCKS]) -> Result<[Block; DIGEST_BLOCKS], Error> {
        self.compress(input)
    }

    fn compress(&mut self, lanes: [Block; DIGEST_BLOCKS]) -> Result<[Block; DIGEST_BLOCKS], Error> {
        let mut input = [0u8; 64];
        for (chunk, lane) in input.chunks_exact_mut(16).zip(lanes.iter()) {
            chunk.copy_from_slice(&lane.to_bytes());
        }

        let mut output = [0u8; 80];
        let written = self.crypter.update(&input, &mut output)?;
        debug_assert_eq!(written, input.len());

        let mut out = [Block::zero(); DIGEST_BLOCKS];
        for (j, lane) in lanes.iter().enumerate() {
            out[j] = Block::read(&output[16 * j..16 * (j + 1)]) ^ *lane;
        }
        Ok(out)
    }
}
