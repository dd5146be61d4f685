// Dictionary trimmer: cut a monolingual dictionary down to the entries the
// bilingual dictionary can translate.
//
// The bilingual sections are unioned, minimized, prefix-closed with a `.*`
// self-loop over the loopback symbols, and control-tag arcs are pushed to
// the back. Each monolingual section is then intersected with that prefix
// automaton and minimized again.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek};

use morfo_fst::alphabet::Side;
use morfo_fst::transducer::Transducer;

use crate::dictionary::Dictionary;
use crate::CompError;

/// Per-section diagnostics from a trim run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionOutcome {
    /// Section kept; counts are after minimization.
    Kept { states: usize, arcs: usize },
    /// Section was empty before trimming.
    EmptySection,
    /// Trimming removed every final state.
    NoFinalsLeft,
}

/// Trim `mono` against `bidix`. Returns the trimmed dictionary and what
/// happened to each section.
pub fn trim<R1: Read + Seek, R2: Read + Seek>(
    mono_input: &mut R1,
    bidix_input: &mut R2,
) -> Result<(Dictionary, BTreeMap<String, SectionOutcome>), CompError> {
    let mono = Dictionary::read(mono_input)?;
    let bidix = Dictionary::read(bidix_input)?;
    trim_dictionaries(mono, bidix)
}

pub fn trim_dictionaries(
    mono: Dictionary,
    bidix: Dictionary,
) -> Result<(Dictionary, BTreeMap<String, SectionOutcome>), CompError> {
    // The prefix automaton lives in a copy of the bidix alphabet extended
    // with loopback pairs for everything the monolingual analyses can emit.
    let mut prefix_alphabet = bidix.alphabet.clone();
    let mut loopback = BTreeSet::new();
    prefix_alphabet.create_loopback_symbols(&mut loopback, &mono.alphabet, Side::Right);

    let mut union: Option<Transducer> = None;
    for section in bidix.sections.values() {
        match &mut union {
            None => union = Some(section.clone()),
            Some(existing) => existing.union_with(&mut prefix_alphabet, section),
        }
    }
    let mut union = union.unwrap_or_default();
    union.minimize();

    // Prefix closure; minimizing after the self-loops is useless work on a
    // much larger automaton, so it is skipped on purpose.
    let prefix = union.append_dot_star(&loopback);
    let prefix = prefix.move_lemqs_last(&prefix_alphabet);

    let mut outcomes = BTreeMap::new();
    let mut trimmed_sections = BTreeMap::new();
    for (name, section) in &mono.sections {
        if section.is_empty() {
            outcomes.insert(name.clone(), SectionOutcome::EmptySection);
            continue;
        }
        let mut trimmed = section.intersect(&prefix, &mono.alphabet, &prefix_alphabet);
        if trimmed.has_no_finals() {
            outcomes.insert(name.clone(), SectionOutcome::NoFinalsLeft);
            continue;
        }
        trimmed.minimize();
        outcomes.insert(
            name.clone(),
            SectionOutcome::Kept {
                states: trimmed.size(),
                arcs: trimmed.number_of_transitions(),
            },
        );
        trimmed_sections.insert(name.clone(), trimmed);
    }

    if trimmed_sections.is_empty() {
        return Err(CompError::EmptyIntersection);
    }

    Ok((
        Dictionary {
            letters: mono.letters,
            alphabet: mono.alphabet,
            sections: trimmed_sections,
        },
        outcomes,
    ))
}
