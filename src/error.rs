use thiserror::Error;

/// Errors surfaced while decoding a wire notification (spec.md §4.1, §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("message too short to decode: {0} bytes")]
    TooShort(usize),
    #[error("unknown election state ordinal: {0}")]
    UnknownState(u32),
}

/// Top-level error type for the election subsystem.
///
/// Only `CurrentEpochUnavailable` ever terminates `look_for_leader`
/// abnormally (spec.md §7); everything else is handled internally (logged
/// and dropped, or retried via backoff) and never reaches a caller.
#[derive(Error, Debug)]
pub enum FleError {
    #[error("failed to decode wire message: {0}")]
    Codec(#[from] CodecError),
    #[error("could not read currentEpoch from the data tree")]
    CurrentEpochUnavailable,
    #[error("election loop halted")]
    Halted,
}

pub type FleResult<T> = Result<T, FleError>;
