//! Weighted finite-state transducer runtime for morphological processing.
//!
//! This crate holds everything below the stream drivers:
//!
//! - [`alphabet`] -- symbol registry: multi-character tags, pair table
//! - [`compression`] -- variable-length integer and string codec
//! - [`header`] -- binary dictionary magic and feature flags
//! - [`transducer`] -- mutable node/arc form used by compilers and the trimmer
//! - [`trans_exe`] -- read-optimized form traversed at runtime
//! - [`state`] -- the nondeterministic traversal frontier
//! - [`buffer`] -- input ring buffer with rewind support
//! - [`chars`] -- character classification helpers

pub mod alphabet;
pub mod buffer;
pub mod chars;
pub mod compression;
pub mod header;
pub mod state;
pub mod trans_exe;
pub mod transducer;

/// Hard cap on the number of live paths in a traversal frontier.
///
/// When a step would push the frontier past this bound the current token is
/// abandoned: the driver emits a warning and passes the surface form through
/// as an unknown word.
pub const MAX_COMBINATIONS: usize = 32767;

/// Tolerance used when comparing accumulated path weights.
pub const WEIGHT_EPSILON: f64 = 1e-10;

/// Error type for dictionary parsing, loading and serialization.
#[derive(Debug, thiserror::Error)]
pub enum FstError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dictionary has feature flags unknown to this version (got {0:#x})")]
    UnknownFeatures(u64),
    #[error("truncated dictionary: {0}")]
    Truncated(&'static str),
    #[error("invalid UTF-16 data in {0}")]
    InvalidString(&'static str),
    #[error("variable-length integer overflows 64 bits")]
    VarintOverflow,
    #[error("arc refers to state {dst} but transducer has {len} states")]
    DanglingArc { dst: usize, len: usize },
}

/// Two equal weights, up to the shared tolerance.
pub fn weights_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < WEIGHT_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_comparison_tolerates_noise() {
        assert!(weights_equal(1.0, 1.0 + 1e-12));
        assert!(!weights_equal(1.0, 1.0001));
    }
}
