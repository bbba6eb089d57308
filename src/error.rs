//! Typed errors for the two recoverable failure taxa this layer surfaces.
//!
//! Invariant violations are never represented here — they are `panic!`/
//! `assert!` at the call site, per the "this layer does not soften invariant
//! violations" policy.

use thiserror::Error;

/// Recoverable failures from segment allocation.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum SegError {
    /// The arena's backing address space is exhausted.
    #[error("arena out of memory")]
    OutOfMemory,
    /// The arena's configured commit limit would be exceeded.
    #[error("arena commit limit exceeded")]
    CommitLimit,
    /// A caller-supplied argument failed validation (granule alignment,
    /// zero size, non-singleton rank set, and so on).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Convenience alias used throughout the crate.
pub type SegResult<T> = Result<T, SegError>;
