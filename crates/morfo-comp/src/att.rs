// AT&T text format compiler.
//
// One arc per line, TAB separated: `src dst upper lower [weight]`; final
// states are `src` or `src weight`. `@0@` and the epsilon character mean
// epsilon, `@_SPACE_@` a literal space. A line starting with `-` separates
// several FSTs in one file; they are disjuncted under a fresh start state.
//
// Every edge is classified as WORD (its upper side is a collected letter)
// or PUNCT (its upper side is punctuation), the classification propagates
// forward along paths, and the two subgraphs are extracted into the
// `main@standard` and `final@inconditional` sections.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashSet;

use morfo_fst::alphabet::Alphabet;
use morfo_fst::chars;
use morfo_fst::transducer::Transducer;

use crate::dictionary::Dictionary;
use crate::CompError;

const UNDECIDED: u8 = 0;
const WORD: u8 = 1;
const PUNCT: u8 = 2;

#[derive(Debug, Clone)]
struct AttArc {
    to: i64,
    tag: i32,
    weight: f64,
    kind: u8,
    upper_len: usize,
    upper_first: Option<char>,
}

#[derive(Debug, Default)]
struct AttNode {
    arcs: Vec<AttArc>,
}

#[derive(Debug, Default)]
pub struct AttCompiler {
    graph: BTreeMap<i64, AttNode>,
    finals: BTreeMap<i64, f64>,
    alphabet: Alphabet,
    letters: BTreeSet<char>,
    starting_state: i64,
    default_weight: f64,
}

/// Per-section state and arc counts reported after compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionStats {
    pub name: String,
    pub states: usize,
    pub arcs: usize,
}

impl AttCompiler {
    pub fn new() -> Self {
        AttCompiler {
            alphabet: Alphabet::new(),
            ..AttCompiler::default()
        }
    }

    /// `@0@` and the epsilon letter mean epsilon; `@_SPACE_@` a space.
    fn convert_hfst(symbol: &str) -> &str {
        match symbol {
            "@0@" | "\u{03B5}" => "",
            "@_SPACE_@" => " ",
            other => other,
        }
    }

    /// The code of a symbol, collecting single letters (and their case
    /// partners) into the letter set. Combining marks count as letters so
    /// a diacritic cannot split a word.
    fn symbol_code(&mut self, symbol: &str) -> i32 {
        let mut iter = symbol.chars();
        let first = iter.next();
        let rest = iter.next();
        match (first, rest) {
            (None, _) => 0,
            (Some(c), None) => {
                if (chars::is_punct(c) || c.is_whitespace()) && !chars::is_combining(c) {
                    c as i32
                } else {
                    self.letters.insert(c);
                    let lower = chars::to_lower(c);
                    let upper = chars::to_upper(c);
                    if lower != c {
                        self.letters.insert(lower);
                    }
                    if upper != c {
                        self.letters.insert(upper);
                    }
                    c as i32
                }
            }
            (Some(_), Some(_)) => self.alphabet.include_symbol(symbol),
        }
    }

    fn node(&mut self, id: i64) -> &mut AttNode {
        self.graph.entry(id).or_default()
    }

    /// Parse the AT&T text. With `read_rl` the upper and lower columns are
    /// swapped, producing the generation direction from the same source.
    pub fn parse(&mut self, text: &str, read_rl: bool) -> Result<(), CompError> {
        let mut first_line_in_fst = true;
        let mut multiple_transducers = false;
        let mut state_id_offset: i64 = 1;
        let mut largest_seen_state_id: i64 = 0;

        for (line_number, line) in text.lines().enumerate() {
            let line_number = line_number + 1;
            let tokens: Vec<&str> = line.split('\t').collect();

            if tokens[0].is_empty() && first_line_in_fst {
                return Err(CompError::EmptyFile);
            }
            if first_line_in_fst && tokens.len() == 1 {
                return Err(CompError::InvalidFormat(line_number));
            }
            if tokens.len() == 1 && tokens[0].is_empty() {
                continue;
            }

            if tokens[0].starts_with('-') {
                if state_id_offset == 1 {
                    eprintln!("warning: multiple FSTs in input; they will be disjuncted");
                    multiple_transducers = true;
                }
                state_id_offset = largest_seen_state_id + 1;
                first_line_in_fst = true;
                continue;
            }

            let from: i64 = tokens[0]
                .parse::<i64>()
                .map_err(|_| CompError::InvalidFormat(line_number))?
                + state_id_offset;
            largest_seen_state_id = largest_seen_state_id.max(from);

            if first_line_in_fst {
                // Epsilon prelude from the shared start into this FST.
                let start = self.starting_state;
                let default_weight = self.default_weight;
                self.node(start).arcs.push(AttArc {
                    to: from,
                    tag: 0,
                    weight: default_weight,
                    kind: UNDECIDED,
                    upper_len: 0,
                    upper_first: None,
                });
                first_line_in_fst = false;
            }

            if tokens.len() <= 2 {
                let weight = if tokens.len() > 1 {
                    tokens[1]
                        .parse::<f64>()
                        .map_err(|_| CompError::InvalidFormat(line_number))?
                } else {
                    self.default_weight
                };
                self.finals.insert(from, weight);
            } else {
                if tokens.len() < 4 {
                    return Err(CompError::InvalidFormat(line_number));
                }
                let to: i64 = tokens[1]
                    .parse::<i64>()
                    .map_err(|_| CompError::InvalidFormat(line_number))?
                    + state_id_offset;
                largest_seen_state_id = largest_seen_state_id.max(to);

                let (upper_raw, lower_raw) = if read_rl {
                    (tokens[3], tokens[2])
                } else {
                    (tokens[2], tokens[3])
                };
                let upper = Self::convert_hfst(upper_raw).to_string();
                let lower = Self::convert_hfst(lower_raw).to_string();
                let upper_code = self.symbol_code(&upper);
                let lower_code = self.symbol_code(&lower);
                let tag = self.alphabet.pair(upper_code, lower_code);
                let weight = if tokens.len() > 4 {
                    tokens[4]
                        .parse::<f64>()
                        .map_err(|_| CompError::InvalidFormat(line_number))?
                } else {
                    self.default_weight
                };

                let mut arc = AttArc {
                    to,
                    tag,
                    weight,
                    kind: UNDECIDED,
                    upper_len: upper.chars().count(),
                    upper_first: upper.chars().next(),
                };
                self.classify_single_transition(&mut arc);
                self.node(from).arcs.push(arc);
                self.node(to);
            }
        }

        if self.graph.is_empty() {
            return Err(CompError::EmptyFile);
        }

        if !multiple_transducers {
            // A single FST needs no prelude; start past the epsilon arc.
            self.starting_state = 1;
        }

        self.classify_forwards();
        let mut path = HashSet::new();
        self.classify_backwards(self.starting_state, &mut path)?;
        Ok(())
    }

    fn classify_single_transition(&self, arc: &mut AttArc) {
        if arc.upper_len == 1 {
            if let Some(c) = arc.upper_first {
                if self.letters.contains(&c) {
                    arc.kind |= WORD;
                }
                if chars::is_punct(c) {
                    arc.kind |= PUNCT;
                }
            }
        }
    }

    /// Propagate classifications forward: every arc inherits the bits of
    /// any arc that can precede it.
    fn classify_forwards(&mut self) {
        let mut todo = vec![self.starting_state];
        let mut done: HashSet<i64> = HashSet::new();
        while let Some(next) = todo.pop() {
            if !done.insert(next) {
                continue;
            }
            let outgoing: Vec<(i64, u8)> = self
                .graph
                .get(&next)
                .map(|n| n.arcs.iter().map(|a| (a.to, a.kind)).collect())
                .unwrap_or_default();
            for (to, kind) in outgoing {
                if let Some(node) = self.graph.get_mut(&to) {
                    for arc in &mut node.arcs {
                        arc.kind |= kind;
                    }
                }
                if !done.contains(&to) {
                    todo.push(to);
                }
            }
        }
    }

    /// Resolve the initial epsilon prelude by recursing until a decided
    /// arc; epsilon loops and epsilon paths into finals are structural
    /// errors.
    fn classify_backwards(&mut self, state: i64, path: &mut HashSet<i64>) -> Result<u8, CompError> {
        if self.finals.contains_key(&state) {
            return Err(CompError::EpsilonToFinal);
        }
        let arcs: Vec<(usize, i64, u8)> = self
            .graph
            .get(&state)
            .map(|n| {
                n.arcs
                    .iter()
                    .enumerate()
                    .map(|(i, a)| (i, a.to, a.kind))
                    .collect()
            })
            .unwrap_or_default();

        let mut kind = UNDECIDED;
        for (index, to, arc_kind) in arcs {
            if arc_kind != UNDECIDED {
                kind |= arc_kind;
            } else if path.contains(&to) {
                return Err(CompError::EpsilonLoop);
            } else {
                path.insert(to);
                let resolved = self.classify_backwards(to, path)?;
                if let Some(node) = self.graph.get_mut(&state) {
                    node.arcs[index].kind = resolved;
                }
                kind |= resolved;
                path.remove(&to);
            }
        }
        // Still UNDECIDED means a dead-end path; extraction drops it.
        Ok(kind)
    }

    /// Extract the subgraph of arcs carrying `kind` into its own
    /// transducer.
    fn extract_transducer(&self, kind: u8) -> Transducer {
        let mut transducer = Transducer::new();
        let mut corr: BTreeMap<i64, u32> = BTreeMap::new();
        let mut visited: HashSet<i64> = HashSet::new();
        corr.insert(self.starting_state, transducer.get_initial());

        let mut todo = vec![self.starting_state];
        while let Some(state) = todo.pop() {
            if !visited.insert(state) {
                continue;
            }
            let Some(node) = self.graph.get(&state) else {
                continue;
            };
            let from_t = corr[&state];
            for arc in &node.arcs {
                if arc.kind & kind != kind {
                    continue;
                }
                match corr.get(&arc.to) {
                    Some(&to_t) => transducer.link_states(from_t, to_t, arc.tag, arc.weight),
                    None => {
                        let to_t = transducer.insert_new_single_transduction(
                            arc.tag,
                            from_t,
                            arc.weight,
                        );
                        corr.insert(arc.to, to_t);
                    }
                }
                todo.push(arc.to);
            }
        }

        for (&state, &weight) in &self.finals {
            if let Some(&mapped) = corr.get(&state) {
                transducer.set_final(mapped, weight);
            }
        }
        transducer
    }

    /// Compile the parsed graph into a dictionary: the WORD subgraph under
    /// `main@standard`, the PUNCT subgraph (when non-empty) under
    /// `final@inconditional`.
    pub fn compile(&self) -> (Dictionary, Vec<SectionStats>) {
        let word_fst = self.extract_transducer(WORD);
        let punct_fst = self.extract_transducer(PUNCT);

        let mut dictionary = Dictionary {
            letters: self.letters.iter().collect(),
            alphabet: self.alphabet.clone(),
            sections: BTreeMap::new(),
        };
        let mut stats = Vec::new();

        stats.push(SectionStats {
            name: "main@standard".to_string(),
            states: word_fst.size(),
            arcs: word_fst.number_of_transitions(),
        });
        dictionary
            .sections
            .insert("main@standard".to_string(), word_fst);

        if punct_fst.number_of_transitions() != 0 {
            stats.push(SectionStats {
                name: "final@inconditional".to_string(),
                states: punct_fst.size(),
                arcs: punct_fst.number_of_transitions(),
            });
            dictionary
                .sections
                .insert("final@inconditional".to_string(), punct_fst);
        }

        (dictionary, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAT_ATT: &str = "0\t1\tc\tc\n0\t1\ta\ta\n1\t2\ta\ta\n2\t3\tt\tt\n3\t4\t@0@\t<n>\n4";

    fn compiled(text: &str, read_rl: bool) -> (Dictionary, Vec<SectionStats>) {
        let mut compiler = AttCompiler::new();
        compiler.parse(text, read_rl).unwrap();
        compiler.compile()
    }

    #[test]
    fn compiles_word_section() {
        let (dictionary, stats) = compiled(CAT_ATT, false);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "main@standard");
        let word = &dictionary.sections["main@standard"];
        // cat + the shared branch state for 'a': initial, 3 path states,
        // the tag state.
        assert_eq!(word.size(), 5);
        assert_eq!(word.number_of_transitions(), 5);
        assert_eq!(word.get_finals().len(), 1);
    }

    #[test]
    fn letters_include_case_partners() {
        let (dictionary, _) = compiled(CAT_ATT, false);
        for c in ['a', 'A', 'c', 'C', 't', 'T'] {
            assert!(dictionary.letters.contains(c), "{c} missing");
        }
    }

    #[test]
    fn epsilon_upper_arcs_join_the_word_section() {
        let (dictionary, _) = compiled(CAT_ATT, false);
        let n_code = dictionary.alphabet.symbol_code("<n>");
        assert!(n_code < 0);
        let word = &dictionary.sections["main@standard"];
        let has_tag_arc = (0..word.size() as u32).any(|s| {
            word.arcs(s)
                .iter()
                .any(|arc| dictionary.alphabet.decode(arc.tag) == (0, n_code))
        });
        assert!(has_tag_arc);
    }

    #[test]
    fn punctuation_goes_to_its_own_section() {
        let att = "0\t1\t.\t.\n1";
        let (dictionary, stats) = compiled(att, false);
        assert_eq!(stats.len(), 2);
        let punct = &dictionary.sections["final@inconditional"];
        assert_eq!(punct.number_of_transitions(), 1);
        // Nothing was classified as a word.
        assert_eq!(dictionary.sections["main@standard"].number_of_transitions(), 0);
    }

    #[test]
    fn read_rl_swaps_the_sides() {
        let (dictionary, _) = compiled(CAT_ATT, true);
        let n_code = dictionary.alphabet.symbol_code("<n>");
        let word = &dictionary.sections["main@standard"];
        // The tag pair is now <n>:epsilon.
        let has_swapped = (0..word.size() as u32).any(|s| {
            word.arcs(s)
                .iter()
                .any(|arc| dictionary.alphabet.decode(arc.tag) == (n_code, 0))
        });
        assert!(has_swapped);
    }

    #[test]
    fn multiple_fsts_are_disjuncted() {
        let att = "0\t1\ta\ta\n1\n---\n0\t1\tb\tb\n1";
        let (dictionary, _) = compiled(att, false);
        let word = &dictionary.sections["main@standard"];
        // Both 'a' and 'b' are accepted from the shared start.
        let initial_arcs = word.arcs(word.get_initial());
        assert_eq!(initial_arcs.len(), 2);
        assert_eq!(word.get_finals().len(), 2);
    }

    #[test]
    fn weights_survive_compilation() {
        let att = "0\t1\ta\ta\t1.5\n1\t0.25";
        let (dictionary, _) = compiled(att, false);
        let word = &dictionary.sections["main@standard"];
        assert_eq!(word.arcs(word.get_initial())[0].weight, 1.5);
        assert_eq!(*word.get_finals().values().next().unwrap(), 0.25);
    }

    #[test]
    fn empty_input_is_fatal() {
        let mut compiler = AttCompiler::new();
        assert!(matches!(compiler.parse("", false), Err(CompError::EmptyFile)));
    }

    #[test]
    fn single_column_first_line_is_fatal() {
        let mut compiler = AttCompiler::new();
        assert!(matches!(
            compiler.parse("0 1 a a", false),
            Err(CompError::InvalidFormat(1))
        ));
    }

    #[test]
    fn epsilon_to_final_is_fatal() {
        // The prelude reaches a state that is final through epsilon only.
        let att = "0\t1\t@0@\t@0@\n0\n1\t2\ta\ta\n2";
        let mut compiler = AttCompiler::new();
        assert!(matches!(
            compiler.parse(att, false),
            Err(CompError::EpsilonToFinal)
        ));
    }

    #[test]
    fn initial_epsilon_loop_is_fatal() {
        let att = "0\t1\t@0@\t@0@\n1\t0\t@0@\t@0@\n2\t3\ta\ta\n3";
        let mut compiler = AttCompiler::new();
        assert!(matches!(
            compiler.parse(att, false),
            Err(CompError::EpsilonLoop)
        ));
    }

    #[test]
    fn space_symbol_is_literal_space() {
        let att = "0\t1\ta\ta\n1\t2\t@_SPACE_@\t@_SPACE_@\n2\t3\tb\tb\n3";
        let (dictionary, _) = compiled(att, false);
        let word = &dictionary.sections["main@standard"];
        let has_space = (0..word.size() as u32).any(|s| {
            word.arcs(s)
                .iter()
                .any(|arc| dictionary.alphabet.decode(arc.tag) == (' ' as i32, ' ' as i32))
        });
        assert!(has_space);
    }
}
