//! Dictionary tooling: the AT&T text compiler and the trimmer.
//!
//! Both tools speak the same container format as the runtime: an optional
//! feature-flag header, the letter set, the alphabet, then named
//! transducer sections.

pub mod att;
pub mod dictionary;
pub mod trim;

use morfo_fst::FstError;

/// Error type for dictionary compilation and trimming.
#[derive(Debug, thiserror::Error)]
pub enum CompError {
    #[error(transparent)]
    Fst(#[from] FstError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("empty input file")]
    EmptyFile,
    #[error("invalid format on line {0}")]
    InvalidFormat(usize),
    #[error("transducer contains an initial epsilon loop")]
    EpsilonLoop,
    #[error("transducer contains an epsilon transition to a final state")]
    EpsilonToFinal,
    #[error("trimming gave an empty transducer (no words of the monolingual dictionary match the bilingual dictionary)")]
    EmptyIntersection,
}
