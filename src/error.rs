use thiserror::Error;

use crate::hash::Fingerprint;
use crate::star::StarIndex;

/// Errors raised by catalog lookups, tree access and distance checks.
///
/// All of these are recoverable. `NotFound` and `OutOfRange` mean the entry
/// is absent, `InvalidState` means an operation was called out of order.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("no star with fingerprint {fingerprint:#018x}")]
    NotFound { fingerprint: Fingerprint },
    #[error("index {index} is out of range for length {len}")]
    OutOfRange { index: StarIndex, len: usize },
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error(
        "small-angle distance is unreliable for vectors more than 90 degrees apart \
         (dot = {dot}); use exact_distance instead"
    )]
    PrecisionWarning { dot: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;
