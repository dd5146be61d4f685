// Nondeterministic traversal frontier.
//
// A frontier entry is one live path through the transducer: the node it
// sits on, the weight accumulated along the way, and every output symbol
// emitted so far. Stepping consumes one input symbol across all entries,
// then unfolds the epsilon closure of whatever survives. Two entries that
// agree on node and emission collapse into one, keeping the lighter weight.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::alphabet::Alphabet;
use crate::chars;
use crate::trans_exe::NodePool;
use crate::{weights_equal, MAX_COMBINATIONS};

/// Final-state set: node index to final weight.
pub type Finals = HashMap<u32, f64>;

type Emission = SmallVec<[i32; 8]>;

#[derive(Debug, Clone)]
struct Path {
    node: u32,
    weight: f64,
    seq: Emission,
}

#[derive(Debug, Clone, Default)]
pub struct State {
    frontier: Vec<Path>,
    overflowed: bool,
}

impl State {
    /// Reset to a single path at `node` and unfold its epsilon closure.
    pub fn init(&mut self, pool: &NodePool, node: u32) {
        self.frontier.clear();
        self.overflowed = false;
        self.frontier.push(Path {
            node,
            weight: 0.0,
            seq: Emission::new(),
        });
        self.epsilon_closure(pool);
        self.dedup();
    }

    pub fn size(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// True once a step has blown past [`MAX_COMBINATIONS`]; cleared by
    /// [`init`](Self::init).
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// True iff some live path sits on a node of `finals`.
    pub fn is_final(&self, finals: &Finals) -> bool {
        self.frontier
            .iter()
            .any(|path| finals.contains_key(&path.node))
    }

    fn extend(next: &mut Vec<Path>, path: &Path, output: i32, dest: u32, weight: f64) {
        let mut seq = path.seq.clone();
        seq.push(output);
        next.push(Path {
            node: dest,
            weight: path.weight + weight,
            seq,
        });
    }

    /// Follow arcs matching any of `inputs` from every live path.
    /// Symbol 0 never matches: end-of-stream consumes nothing.
    fn apply(&mut self, pool: &NodePool, inputs: &[i32]) {
        let mut next = Vec::new();
        for path in &self.frontier {
            for &input in inputs {
                if input == 0 {
                    continue;
                }
                if let Some(arcs) = pool.node(path.node).arcs_for(input) {
                    for arc in arcs {
                        Self::extend(&mut next, path, arc.output, arc.dest, arc.weight);
                    }
                }
            }
        }
        self.frontier = next;
    }

    /// Unfold epsilon arcs transitively, keeping the originating entries.
    fn epsilon_closure(&mut self, pool: &NodePool) {
        let mut index = 0;
        while index < self.frontier.len() {
            if self.frontier.len() > MAX_COMBINATIONS {
                break;
            }
            let path = self.frontier[index].clone();
            if let Some(arcs) = pool.node(path.node).arcs_for(0) {
                let mut added = Vec::new();
                for arc in arcs {
                    Self::extend(&mut added, &path, arc.output, arc.dest, arc.weight);
                }
                self.frontier.extend(added);
            }
            index += 1;
        }
    }

    /// Collapse duplicate (node, emission) entries, keeping the lighter
    /// weight and first-seen order.
    fn dedup(&mut self) {
        let mut kept: Vec<Path> = Vec::with_capacity(self.frontier.len());
        let mut index: HashMap<(u32, Emission), usize> = HashMap::new();
        for path in self.frontier.drain(..) {
            let key = (path.node, path.seq.clone());
            match index.get(&key) {
                Some(&at) => {
                    if path.weight < kept[at].weight {
                        kept[at].weight = path.weight;
                    }
                }
                None => {
                    index.insert(key, kept.len());
                    kept.push(path);
                }
            }
        }
        self.frontier = kept;
    }

    fn finish_step(&mut self, pool: &NodePool) {
        self.epsilon_closure(pool);
        self.dedup();
        if self.frontier.len() > MAX_COMBINATIONS {
            self.frontier.clear();
            self.overflowed = true;
        }
    }

    /// Consume one input symbol.
    pub fn step(&mut self, pool: &NodePool, input: i32) {
        self.apply(pool, &[input]);
        self.finish_step(pool);
    }

    /// Consume one input symbol, also accepting `alt` arcs. Used for case
    /// folding with `alt` the lowercased symbol.
    pub fn step_fallback(&mut self, pool: &NodePool, input: i32, alt: i32) {
        self.apply(pool, &[input, alt]);
        self.finish_step(pool);
    }

    /// Consume one input symbol, accepting any code of `alts` as
    /// equivalent. Drives diacritic restoration.
    pub fn step_alternates(&mut self, pool: &NodePool, input: i32, alts: &HashSet<i32>) {
        let mut inputs: Vec<i32> = Vec::with_capacity(alts.len() + 1);
        inputs.push(input);
        for &alt in alts {
            if alt != input {
                inputs.push(alt);
            }
        }
        // Alternate order must not influence anything observable; it only
        // affects transient frontier order, which dedup keys ignore, but
        // keep it sorted so repeated runs build identical frontiers.
        inputs[1..].sort_unstable();
        self.apply(pool, &inputs);
        self.finish_step(pool);
    }

    /// Exact-case-preferring step: per path, `input` arcs are followed and
    /// `alt` arcs are used only when no `input` arc fires for that path.
    pub fn step_careful(&mut self, pool: &NodePool, input: i32, alt: i32) {
        let mut next = Vec::new();
        for path in &self.frontier {
            let node = pool.node(path.node);
            let arcs = match node.arcs_for(input) {
                Some(arcs) if input != 0 => Some(arcs),
                _ => node.arcs_for(alt).filter(|_| alt != 0),
            };
            if let Some(arcs) = arcs {
                for arc in arcs {
                    Self::extend(&mut next, path, arc.output, arc.dest, arc.weight);
                }
            }
        }
        self.frontier = next;
        self.finish_step(pool);
    }

    /// Case-folding convenience wrapper over [`step`](Self::step) and
    /// [`step_fallback`](Self::step_fallback).
    pub fn step_case(&mut self, pool: &NodePool, c: char, case_sensitive: bool) {
        if case_sensitive || !chars::is_upper(c) {
            self.step(pool, c as i32);
        } else {
            self.step_fallback(pool, c as i32, chars::to_lower(c) as i32);
        }
    }

    /// Does the tail of `seq`, after its last `separator`, contain
    /// `required`?
    fn last_part_has_symbol(seq: &[i32], required: i32, separator: i32) -> bool {
        for &symbol in seq.iter().rev() {
            if symbol == required {
                return true;
            }
            if symbol == separator {
                return false;
            }
        }
        false
    }

    /// Compound-splitting hook: every currently-final path is copied,
    /// restarted at the entries of `restart_state` (the closed initial
    /// state), with `separator` pushed onto the copy's emission.
    ///
    /// With a nonzero `required` symbol, only paths whose last compound
    /// element carries it are restarted.
    pub fn restart_finals(
        &mut self,
        finals: &Finals,
        required: i32,
        restart_state: &State,
        separator: i32,
    ) {
        let live = self.frontier.len();
        for index in 0..live {
            let path = &self.frontier[index];
            if !finals.contains_key(&path.node) {
                continue;
            }
            if required != 0 && !Self::last_part_has_symbol(&path.seq, required, separator) {
                continue;
            }
            let weight = self.frontier[index].weight;
            let mut seq = self.frontier[index].seq.clone();
            seq.push(separator);
            for base in &restart_state.frontier {
                self.frontier.push(Path {
                    node: base.node,
                    weight,
                    seq: seq.clone(),
                });
            }
        }
        self.dedup();
    }

    /// Token-end compound filter: keep paths whose last element carries
    /// `required`, drop paths over the element budget, and of the
    /// survivors keep only the ones with the fewest separators.
    pub fn prune_compounds(&mut self, required: i32, separator: i32, max_elements: usize) {
        let mut counts: Vec<Option<usize>> = Vec::with_capacity(self.frontier.len());
        let mut min_count = max_elements;
        for path in &self.frontier {
            if required != 0 && !Self::last_part_has_symbol(&path.seq, required, separator) {
                counts.push(None);
                continue;
            }
            let count = path.seq.iter().filter(|&&s| s == separator).count();
            if count < min_count {
                min_count = count;
            }
            counts.push(Some(count));
        }
        let mut index = 0;
        self.frontier.retain(|_| {
            let keep = matches!(counts[index], Some(count) if count <= min_count);
            index += 1;
            keep
        });
    }

    /// Drop every path whose emission passed through `symbol`.
    pub fn prune_states_with_forbidden_symbol(&mut self, symbol: i32) {
        if symbol == 0 {
            return;
        }
        self.frontier
            .retain(|path| !path.seq.contains(&symbol));
    }

    fn render(
        seq: &[i32],
        alphabet: &Alphabet,
        escaped: &HashSet<char>,
        uppercase: bool,
    ) -> String {
        let mut text = String::new();
        for &symbol in seq {
            if symbol > 0 {
                if let Some(c) = char::from_u32(symbol as u32) {
                    if escaped.contains(&c) {
                        text.push('\\');
                    }
                    text.push(if uppercase { chars::to_upper(c) } else { c });
                }
            } else {
                alphabet.get_symbol(&mut text, symbol);
            }
        }
        text
    }

    fn apply_first_upper(text: String, first_char: usize) -> String {
        let mut out: Vec<char> = text.chars().collect();
        let mut at = first_char;
        if out.get(at) == Some(&'~') {
            at += 1;
        }
        if let Some(c) = out.get(at).copied() {
            out[at] = chars::to_upper(c);
        }
        out.into_iter().collect()
    }

    /// Collect the final paths: (total weight, rendered emission), ordered
    /// by weight, duplicates collapsed onto their lightest weight.
    fn collect_finals(
        &self,
        finals: &Finals,
        alphabet: &Alphabet,
        escaped: &HashSet<char>,
        uppercase: bool,
        firstupper: bool,
        first_char: usize,
    ) -> Vec<(f64, String)> {
        let mut results: Vec<(f64, String)> = Vec::new();
        let mut by_text: HashMap<String, usize> = HashMap::new();
        for path in &self.frontier {
            let Some(&final_weight) = finals.get(&path.node) else {
                continue;
            };
            let mut text = Self::render(&path.seq, alphabet, escaped, uppercase);
            if firstupper && !uppercase {
                text = Self::apply_first_upper(text, first_char);
            }
            let total = path.weight + final_weight;
            match by_text.get(&text) {
                Some(&at) => {
                    if total < results[at].0 {
                        results[at].0 = total;
                    }
                }
                None => {
                    by_text.insert(text.clone(), results.len());
                    results.push((total, text));
                }
            }
        }
        results.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    /// Render the finished match: `/analysis` segments ordered by weight,
    /// capped by analysis count and weight-class count, with optional
    /// `<W:…>` weight tags.
    #[allow(clippy::too_many_arguments)]
    pub fn filter_finals(
        &self,
        finals: &Finals,
        alphabet: &Alphabet,
        escaped: &HashSet<char>,
        display_weights: bool,
        max_analyses: usize,
        max_weight_classes: usize,
        uppercase: bool,
        firstupper: bool,
        first_char: usize,
    ) -> String {
        let results =
            self.collect_finals(finals, alphabet, escaped, uppercase, firstupper, first_char);
        let mut out = String::new();
        let mut emitted = 0;
        let mut classes = 0;
        let mut class_weight = f64::NEG_INFINITY;
        for (weight, text) in results {
            if !weights_equal(weight, class_weight) {
                classes += 1;
                class_weight = weight;
                if classes > max_weight_classes {
                    break;
                }
            }
            if emitted >= max_analyses {
                break;
            }
            out.push('/');
            out.push_str(&text);
            if display_weights {
                out.push_str(&format!("<W:{weight:.6}>"));
            }
            emitted += 1;
        }
        out
    }

    /// Translation-memory variant: deferred blanks replace spaces and the
    /// collected digit runs replace `<n>` placeholders, in reading order.
    pub fn filter_finals_tm(
        &self,
        finals: &Finals,
        alphabet: &Alphabet,
        escaped: &HashSet<char>,
        blankqueue: &mut VecDeque<String>,
        numbers: &[String],
    ) -> String {
        let number_code = alphabet.symbol_code("<n>");
        let blanks: Vec<String> = blankqueue.iter().cloned().collect();
        let mut out = String::new();
        let mut max_blanks_used = 0;
        for path in &self.frontier {
            if !finals.contains_key(&path.node) {
                continue;
            }
            out.push('/');
            let mut number_at = 0;
            let mut blank_at = 0;
            for &symbol in &path.seq {
                if number_code != 0 && symbol == number_code {
                    if let Some(digits) = numbers.get(number_at) {
                        out.push_str(digits);
                    } else {
                        alphabet.get_symbol(&mut out, symbol);
                    }
                    number_at += 1;
                } else if symbol == ' ' as i32 && blank_at < blanks.len() {
                    out.push_str(&blanks[blank_at]);
                    blank_at += 1;
                } else if symbol > 0 {
                    if let Some(c) = char::from_u32(symbol as u32) {
                        if escaped.contains(&c) {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                } else {
                    alphabet.get_symbol(&mut out, symbol);
                }
            }
            max_blanks_used = max_blanks_used.max(blank_at);
        }
        for _ in 0..max_blanks_used {
            blankqueue.pop_front();
        }
        out
    }

    /// Dictionary-lookup variant with tagged output, used by the SAO mode.
    pub fn filter_finals_sao(
        &self,
        finals: &Finals,
        alphabet: &Alphabet,
        escaped: &HashSet<char>,
        uppercase: bool,
        firstupper: bool,
    ) -> String {
        let results = self.collect_finals(finals, alphabet, escaped, uppercase, firstupper, 0);
        let mut out = String::new();
        for (_, text) in results {
            out.push('/');
            out.push_str(&text);
        }
        out
    }
}
