use thiserror::Error;

/// Errors surfaced by key generation, evaluation, and key parsing.
#[derive(Debug, Error)]
pub enum Error {
    /// Multi-point inputs must be strictly ascending.
    #[error("multi-point inputs must be strictly ascending")]
    InputsUnsorted,

    /// The domain size is outside the supported range, or a full-domain
    /// evaluation of it cannot be addressed.
    #[error("domain of {0} bits is outside the supported range")]
    DomainTooLarge(u8),

    /// More points than the packed 32-bit control word can carry.
    #[error("{0} points exceed the packed control-word width")]
    ControlWordTooWide(usize),

    /// A cipher or hash primitive failed; fatal, propagated as-is.
    #[error("crypto backend failure: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    /// Verifiable key generation could not sample distinguishable leaf seeds
    /// within its retry budget.
    #[error("failed to sample distinguishable leaf seeds after {0} attempts")]
    FailedSampling(usize),

    /// Key bytes are shorter than (or inconsistent with) the layout implied
    /// by their header.
    #[error("key of {actual} bytes does not match the {expected}-byte layout implied by its header")]
    ShortKey { expected: usize, actual: usize },
}
