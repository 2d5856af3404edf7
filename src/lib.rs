//! Two-party function secret sharing for point and multi-point functions
//! over a binary-tree domain, with verifiable variants.
//!
//! A dealer splits a function f: {0,1}^n -> {0,1}^B that is non-zero on a
//! small set of programmed points into two short keys. Either key alone
//! looks like a share of a random function; XOR of the two parties'
//! evaluations reconstructs f(x) at any input. The verifiable variants
//! additionally let the two evaluators derive a digest that matches iff
//! their keys are an honest pair and they evaluated the same inputs.
//!
//! All tree material is built from fixed-key AES-128: an ECB-based
//! length-doubling PRG for descent, a CTR stream for leaf-to-value
//! conversion, and a Matyas–Meyer–Oseas hash for the proof layer.
pub mod bits;
mod block;
mod bytes;
pub mod dmpf;
pub mod dpf;
mod error;
mod mmo;
mod prg;
pub mod vdmpf;
pub mod vdpf;

pub use block::Block;
pub use bytes::Bytes;
pub use error::Error;
pub use mmo::MmoHash;
pub use prg::{convert, PrgContext};

pub use dmpf::{CompressedKey as CompressedDmpfKey, Key as DmpfKey};
pub use dpf::Key as DpfKey;
pub use vdmpf::Key as VdmpfKey;
pub use vdpf::{Key as VdpfKey, Proof};
