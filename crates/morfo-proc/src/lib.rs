//! Streaming drivers for compiled dictionaries.
//!
//! [`FstProcessor`] owns a loaded dictionary (node pool, alphabet, named
//! sections) and exposes one entry point per processing mode. All modes
//! share the same skeleton: a mode-specific reader that understands the
//! stream conventions (`^…$` lexical units, `[…]` superblanks, `[[…]]`
//! wordbound blanks, backslash escapes, `<tag>` symbols), a longest-match
//! loop over the traversal engine, and mode-specific output formatting.

mod analysis;
mod bilingual;
mod generation;
mod input;
mod postgen;
mod processor;
mod sao;
mod tm;

pub use input::InputStream;
pub use processor::FstProcessor;

use morfo_fst::FstError;

/// What the generator prints for matched, unmatched and `*`/`@`-marked
/// lexical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Strip every mark; print bare surface forms.
    Clean,
    /// Keep `*` on unknown words, drop tags from `#`/`@` fallbacks.
    Unknown,
    /// Print everything, marks and tags included.
    All,
    /// Wrap output in `^source/target$` units.
    Tagged,
    /// Like `Tagged` but without `#`/`@` marks on the target side.
    TaggedNoMark,
    /// Prefer the exact-case path, falling back to lowercase.
    CarefulCase,
}

/// Error type for the stream drivers.
#[derive(Debug, thiserror::Error)]
pub enum ProcError {
    #[error("malformed input stream")]
    Stream,
    #[error("input stream is not valid UTF-8")]
    Encoding,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fst(#[from] FstError),
    #[error("unsupported transducer section '{0}'")]
    UnsupportedSection(String),
    #[error("invalid dictionary: {0}")]
    InvalidDictionary(&'static str),
}
