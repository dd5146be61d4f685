// Mutable transducer form used at compilation and trimming time.
//
// States are an index-addressed arena: state 0 is created by `new()` and is
// the initial state unless moved. Arcs are stored per state in insertion
// order, which keeps serialization and all construction algorithms
// deterministic. Nondeterminism is unrestricted: a state may carry any
// number of arcs with the same edge tag.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::{Read, Write};

use hashbrown::{HashMap, HashSet};

use crate::alphabet::{Alphabet, Side};
use crate::compression;
use crate::{weights_equal, FstError};

/// One outgoing arc: edge tag, destination state, weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arc {
    pub tag: i32,
    pub dest: u32,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct Transducer {
    initial: u32,
    finals: BTreeMap<u32, f64>,
    states: Vec<Vec<Arc>>,
}

impl Default for Transducer {
    fn default() -> Self {
        Transducer::new()
    }
}

impl Transducer {
    /// A transducer with a single, non-final initial state.
    pub fn new() -> Self {
        Transducer {
            initial: 0,
            finals: BTreeMap::new(),
            states: vec![Vec::new()],
        }
    }

    pub fn get_initial(&self) -> u32 {
        self.initial
    }

    pub fn get_finals(&self) -> &BTreeMap<u32, f64> {
        &self.finals
    }

    /// Number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// Total number of arcs.
    pub fn number_of_transitions(&self) -> usize {
        self.states.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_transitions() == 0
    }

    pub fn has_no_finals(&self) -> bool {
        self.finals.is_empty()
    }

    pub fn arcs(&self, state: u32) -> &[Arc] {
        &self.states[state as usize]
    }

    /// Drop every state and arc, leaving a fresh single-state transducer.
    pub fn clear(&mut self) {
        *self = Transducer::new();
    }

    /// Create a new state reached from `from` by one arc.
    pub fn insert_new_single_transduction(&mut self, tag: i32, from: u32, weight: f64) -> u32 {
        let dest = self.states.len() as u32;
        self.states.push(Vec::new());
        self.states[from as usize].push(Arc { tag, dest, weight });
        dest
    }

    /// Add an arc between two existing states. Duplicates are tolerated.
    pub fn link_states(&mut self, from: u32, to: u32, tag: i32, weight: f64) {
        debug_assert!((to as usize) < self.states.len());
        self.states[from as usize].push(Arc { tag, dest: to, weight });
    }

    /// Mark a state final. On collision the lighter weight wins.
    pub fn set_final(&mut self, state: u32, weight: f64) {
        self.finals
            .entry(state)
            .and_modify(|w| {
                if weight < *w {
                    *w = weight;
                }
            })
            .or_insert(weight);
    }

    pub fn is_final(&self, state: u32) -> bool {
        self.finals.contains_key(&state)
    }

    /// Disjoint union: copy `other` in with shifted state indices and add an
    /// epsilon arc from this initial to the copy's initial.
    pub fn union_with(&mut self, alphabet: &mut Alphabet, other: &Transducer) {
        let offset = self.states.len() as u32;
        for arcs in &other.states {
            let shifted = arcs
                .iter()
                .map(|arc| Arc { tag: arc.tag, dest: arc.dest + offset, weight: arc.weight })
                .collect();
            self.states.push(shifted);
        }
        for (&state, &weight) in &other.finals {
            self.set_final(state + offset, weight);
        }
        let epsilon = alphabet.pair(0, 0);
        self.link_states(self.initial, other.initial + offset, epsilon, 0.0);
    }

    /// States reachable from the initial state.
    fn accessible(&self) -> HashSet<u32> {
        let mut seen = HashSet::new();
        let mut todo = vec![self.initial];
        while let Some(state) = todo.pop() {
            if !seen.insert(state) {
                continue;
            }
            for arc in &self.states[state as usize] {
                if !seen.contains(&arc.dest) {
                    todo.push(arc.dest);
                }
            }
        }
        seen
    }

    /// States from which some final state is reachable.
    fn coaccessible(&self) -> HashSet<u32> {
        let mut reverse: Vec<Vec<u32>> = vec![Vec::new(); self.states.len()];
        for (src, arcs) in self.states.iter().enumerate() {
            for arc in arcs {
                reverse[arc.dest as usize].push(src as u32);
            }
        }
        let mut seen = HashSet::new();
        let mut todo: Vec<u32> = self.finals.keys().copied().collect();
        while let Some(state) = todo.pop() {
            if !seen.insert(state) {
                continue;
            }
            for &src in &reverse[state as usize] {
                if !seen.contains(&src) {
                    todo.push(src);
                }
            }
        }
        seen
    }

    /// Minimize by partition refinement over weighted arcs.
    ///
    /// Dead states (unreachable or leading nowhere) are discarded first.
    /// Two states end up merged when they agree on finality, final weight,
    /// and on the multiset of (tag, weight, destination-class) signatures,
    /// refined to a fixpoint. Weights take part in the signature, so paths
    /// that differ only in weight are never conflated.
    pub fn minimize(&mut self) {
        let accessible = self.accessible();
        let coaccessible = self.coaccessible();
        let alive: Vec<u32> = (0..self.states.len() as u32)
            .filter(|s| accessible.contains(s) && coaccessible.contains(s))
            .collect();
        // An initial state that cannot reach a final state means the whole
        // language is empty.
        if !alive.contains(&self.initial) {
            self.clear();
            return;
        }

        // Initial partition: non-final vs. final-weight classes.
        let mut class_of: HashMap<u32, usize> = HashMap::new();
        {
            let mut weight_classes: Vec<f64> = Vec::new();
            for &state in &alive {
                let class = match self.finals.get(&state) {
                    None => 0,
                    Some(&w) => {
                        let found = weight_classes.iter().position(|&c| weights_equal(c, w));
                        match found {
                            Some(i) => i + 1,
                            None => {
                                weight_classes.push(w);
                                weight_classes.len()
                            }
                        }
                    }
                };
                class_of.insert(state, class);
            }
        }

        // Refine until the class count stops growing. Classes only ever
        // split, so a stable count is the fixpoint.
        let mut class_count = class_of.values().collect::<HashSet<_>>().len();
        loop {
            let mut next_ids: BTreeMap<(usize, Vec<(i32, u64, usize)>), usize> = BTreeMap::new();
            let mut next_of: HashMap<u32, usize> = HashMap::new();
            for &state in &alive {
                let mut signature: Vec<(i32, u64, usize)> = self.states[state as usize]
                    .iter()
                    .filter(|arc| class_of.contains_key(&arc.dest))
                    .map(|arc| (arc.tag, arc.weight.to_bits(), class_of[&arc.dest]))
                    .collect();
                signature.sort_unstable();
                signature.dedup();
                let key = (class_of[&state], signature);
                let next = next_ids.len();
                let id = *next_ids.entry(key).or_insert(next);
                next_of.insert(state, id);
            }
            let next_count = next_ids.len();
            class_of = next_of;
            if next_count == class_count {
                break;
            }
            class_count = next_count;
        }

        // Rebuild with one state per class, the initial's class first.
        let mut renumber: HashMap<usize, u32> = HashMap::new();
        renumber.insert(class_of[&self.initial], 0);
        for &state in &alive {
            let class = class_of[&state];
            let next = renumber.len() as u32;
            renumber.entry(class).or_insert(next);
        }

        let mut states: Vec<Vec<Arc>> = vec![Vec::new(); renumber.len()];
        let mut finals: BTreeMap<u32, f64> = BTreeMap::new();
        let mut done: HashSet<usize> = HashSet::new();
        for &state in &alive {
            let class = class_of[&state];
            if !done.insert(class) {
                continue;
            }
            let new_src = renumber[&class];
            let mut seen_arcs: HashSet<(i32, u32, u64)> = HashSet::new();
            for arc in &self.states[state as usize] {
                if let Some(dest_class) = class_of.get(&arc.dest) {
                    let new_dest = renumber[dest_class];
                    if seen_arcs.insert((arc.tag, new_dest, arc.weight.to_bits())) {
                        states[new_src as usize].push(Arc {
                            tag: arc.tag,
                            dest: new_dest,
                            weight: arc.weight,
                        });
                    }
                }
            }
            if let Some(&w) = self.finals.get(&state) {
                finals.insert(new_src, w);
            }
        }

        self.initial = 0;
        self.states = states;
        self.finals = finals;
    }

    /// Copy of this transducer with a self-loop for every tag in
    /// `loopback_tags` added on every final state.
    ///
    /// Existing arcs and finality are untouched; the result accepts every
    /// previous string followed by anything over the loopback set.
    pub fn append_dot_star(&self, loopback_tags: &BTreeSet<i32>) -> Transducer {
        let mut result = self.clone();
        for (&state, _) in &self.finals {
            for &tag in loopback_tags {
                result.link_states(state, state, tag, 0.0);
            }
        }
        result
    }

    /// Copy with control-tag arcs (`<@…>`-class symbols on the left side)
    /// moved after all other arcs of their state, so a product construction
    /// tries lexical material before control material.
    pub fn move_lemqs_last(&self, alphabet: &Alphabet) -> Transducer {
        let is_lemq = |tag: i32| {
            let upper = alphabet.project(tag, Side::Left);
            alphabet
                .symbol_text(upper)
                .map(|text| text.starts_with("<@"))
                .unwrap_or(false)
        };
        let mut result = self.clone();
        for arcs in &mut result.states {
            let (mut plain, lemqs): (Vec<Arc>, Vec<Arc>) =
                arcs.iter().partition(|arc| !is_lemq(arc.tag));
            plain.extend(lemqs);
            *arcs = plain;
        }
        result
    }

    /// Product of `self` with `prefix`, keeping only the paths of `self`
    /// whose right projection is accepted by the left projection of
    /// `prefix`. Unreachable product states are never materialized.
    ///
    /// The two operands carry their own alphabets; tags are matched by
    /// name, characters by code point. Weights come from `self` alone.
    pub fn intersect(
        &self,
        prefix: &Transducer,
        own_alphabet: &Alphabet,
        prefix_alphabet: &Alphabet,
    ) -> Transducer {
        // Translate our lower-side symbols into the prefix alphabet once.
        let translate = |code: i32| -> Option<i32> {
            if code >= 0 {
                return Some(code);
            }
            let text = own_alphabet.symbol_text(code)?;
            match prefix_alphabet.symbol_code(text) {
                0 => None,
                found => Some(found),
            }
        };

        let mut result = Transducer::new();
        let mut mapping: BTreeMap<(u32, u32), u32> = BTreeMap::new();
        let mut todo: VecDeque<(u32, u32)> = VecDeque::new();
        let start = (self.initial, prefix.initial);
        mapping.insert(start, result.initial);
        todo.push_back(start);

        while let Some((own_state, prefix_state)) = todo.pop_front() {
            let product_src = mapping[&(own_state, prefix_state)];

            let mut push = |result: &mut Transducer,
                            mapping: &mut BTreeMap<(u32, u32), u32>,
                            todo: &mut VecDeque<(u32, u32)>,
                            target: (u32, u32),
                            tag: i32,
                            weight: f64| {
                if let Some(&existing) = mapping.get(&target) {
                    result.link_states(product_src, existing, tag, weight);
                } else {
                    let created =
                        result.insert_new_single_transduction(tag, product_src, weight);
                    mapping.insert(target, created);
                    todo.push_back(target);
                }
            };

            // Epsilon moves of the prefix automaton advance it alone.
            for prefix_arc in prefix.arcs(prefix_state) {
                let left = prefix_alphabet.project(prefix_arc.tag, Side::Left);
                if left == 0 {
                    push(
                        &mut result,
                        &mut mapping,
                        &mut todo,
                        (own_state, prefix_arc.dest),
                        0,
                        0.0,
                    );
                }
            }

            for own_arc in self.arcs(own_state) {
                let lower = own_alphabet.project(own_arc.tag, Side::Right);
                if lower == 0 {
                    // Nothing for the prefix side to consume.
                    push(
                        &mut result,
                        &mut mapping,
                        &mut todo,
                        (own_arc.dest, prefix_state),
                        own_arc.tag,
                        own_arc.weight,
                    );
                    continue;
                }
                let Some(wanted) = translate(lower) else {
                    continue;
                };
                for prefix_arc in prefix.arcs(prefix_state) {
                    let left = prefix_alphabet.project(prefix_arc.tag, Side::Left);
                    if left == wanted {
                        push(
                            &mut result,
                            &mut mapping,
                            &mut todo,
                            (own_arc.dest, prefix_arc.dest),
                            own_arc.tag,
                            own_arc.weight,
                        );
                    }
                }
            }
        }

        for ((own_state, prefix_state), &product_state) in &mapping {
            if let Some(&weight) = self.finals.get(own_state) {
                if prefix.is_final(*prefix_state) {
                    result.set_final(product_state, weight);
                }
            }
        }

        result
    }

    /// Serialize one transducer section (name excluded; the container
    /// writes names).
    pub fn write<W: Write>(&self, output: &mut W, weighted: bool) -> Result<(), FstError> {
        compression::write_vlen(u64::from(self.initial), output)?;
        compression::write_vlen(self.finals.len() as u64, output)?;
        for (&state, &weight) in &self.finals {
            compression::write_vlen(u64::from(state), output)?;
            if weighted {
                compression::write_double(weight, output)?;
            }
        }
        compression::write_vlen(self.states.len() as u64, output)?;
        for arcs in &self.states {
            compression::write_vlen(arcs.len() as u64, output)?;
            for arc in arcs {
                compression::write_vlen(arc.tag as u64, output)?;
                compression::write_vlen(u64::from(arc.dest), output)?;
                if weighted {
                    compression::write_double(arc.weight, output)?;
                }
            }
        }
        Ok(())
    }

    /// Deserialize a transducer section written by [`write`](Self::write).
    pub fn read<R: Read>(input: &mut R, weighted: bool) -> Result<Self, FstError> {
        let initial = compression::read_vlen(input)? as u32;
        let final_count = compression::read_vlen(input)? as usize;
        let mut finals = BTreeMap::new();
        for _ in 0..final_count {
            let state = compression::read_vlen(input)? as u32;
            let weight = if weighted {
                compression::read_double(input)?
            } else {
                0.0
            };
            finals.insert(state, weight);
        }
        let state_count = compression::read_vlen(input)? as usize;
        let mut states = Vec::with_capacity(state_count);
        for _ in 0..state_count {
            let arc_count = compression::read_vlen(input)? as usize;
            let mut arcs = Vec::with_capacity(arc_count);
            for _ in 0..arc_count {
                let tag = compression::read_vlen(input)? as i32;
                let dest = compression::read_vlen(input)? as u32;
                let weight = if weighted {
                    compression::read_double(input)?
                } else {
                    0.0
                };
                arcs.push(Arc { tag, dest, weight });
            }
            states.push(arcs);
        }
        for arcs in &states {
            for arc in arcs {
                if arc.dest as usize >= state_count {
                    return Err(FstError::DanglingArc {
                        dst: arc.dest as usize,
                        len: state_count,
                    });
                }
            }
        }
        if initial as usize >= state_count {
            return Err(FstError::Truncated("initial state out of range"));
        }
        for &state in finals.keys() {
            if state as usize >= state_count {
                return Err(FstError::Truncated("final state out of range"));
            }
        }
        Ok(Transducer {
            initial,
            finals,
            states,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Chain the tags along a fresh path from the initial state and mark
    /// the last state final.
    fn add_path(t: &mut Transducer, tags: &[i32], weight: f64) {
        let mut state = t.get_initial();
        for &tag in tags {
            state = t.insert_new_single_transduction(tag, state, 0.0);
        }
        t.set_final(state, weight);
    }

    /// All accepted tag sequences with their total weights, for small
    /// acyclic transducers.
    fn language(t: &Transducer) -> BTreeSet<(Vec<i32>, u64)> {
        let mut out = BTreeSet::new();
        let mut todo = vec![(t.get_initial(), Vec::new(), 0.0f64)];
        while let Some((state, path, weight)) = todo.pop() {
            if path.len() > 32 {
                continue;
            }
            if let Some(&fw) = t.get_finals().get(&state) {
                out.insert((path.clone(), (weight + fw).to_bits()));
            }
            for arc in t.arcs(state) {
                let mut next = path.clone();
                next.push(arc.tag);
                todo.push((arc.dest, next, weight + arc.weight));
            }
        }
        out
    }

    #[test]
    fn insert_and_link() {
        let mut t = Transducer::new();
        let s1 = t.insert_new_single_transduction(7, 0, 0.5);
        assert_eq!(s1, 1);
        t.link_states(0, 1, 9, 0.25);
        assert_eq!(t.size(), 2);
        assert_eq!(t.number_of_transitions(), 2);
        assert_eq!(t.arcs(0)[1].tag, 9);
    }

    #[test]
    fn set_final_keeps_minimum_weight() {
        let mut t = Transducer::new();
        t.set_final(0, 2.0);
        t.set_final(0, 1.0);
        t.set_final(0, 3.0);
        assert_eq!(t.get_finals()[&0], 1.0);
    }

    #[test]
    fn union_accepts_both_languages() {
        let mut alphabet = Alphabet::new();
        let mut a = Transducer::new();
        add_path(&mut a, &[1, 2], 0.0);
        let mut b = Transducer::new();
        add_path(&mut b, &[3], 0.0);

        a.union_with(&mut alphabet, &b);

        // Path of b is reachable through the epsilon arc.
        let langs = language(&a);
        assert!(langs.contains(&(vec![1, 2], 0.0f64.to_bits())));
        assert!(langs.contains(&(vec![0, 3], 0.0f64.to_bits())));
    }

    #[test]
    fn minimize_merges_equivalent_suffixes() {
        // Two paths sharing the suffix [5]: "15" and "25".
        let mut t = Transducer::new();
        let p1 = t.insert_new_single_transduction(1, 0, 0.0);
        let p2 = t.insert_new_single_transduction(2, 0, 0.0);
        let e1 = t.insert_new_single_transduction(5, p1, 0.0);
        let e2 = t.insert_new_single_transduction(5, p2, 0.0);
        t.set_final(e1, 0.0);
        t.set_final(e2, 0.0);

        let before = language(&t);
        t.minimize();
        assert_eq!(language(&t), before);
        // e1/e2 merge, p1/p2 merge: initial + mid + final.
        assert_eq!(t.size(), 3);
    }

    #[test]
    fn minimize_respects_weights() {
        // Same shape as above but different weights on the suffix arcs:
        // the mid states must not merge.
        let mut t = Transducer::new();
        let p1 = t.insert_new_single_transduction(1, 0, 0.0);
        let p2 = t.insert_new_single_transduction(2, 0, 0.0);
        let e1 = t.states.len() as u32;
        t.states.push(Vec::new());
        t.link_states(p1, e1, 5, 1.0);
        let e2 = t.states.len() as u32;
        t.states.push(Vec::new());
        t.link_states(p2, e2, 5, 2.0);
        t.set_final(e1, 0.0);
        t.set_final(e2, 0.0);

        let before = language(&t);
        t.minimize();
        assert_eq!(language(&t), before);
        assert_eq!(t.size(), 4);
    }

    #[test]
    fn minimize_drops_dead_states() {
        let mut t = Transducer::new();
        add_path(&mut t, &[1], 0.0);
        // A dangling branch that never reaches a final state.
        let dead = t.insert_new_single_transduction(9, 0, 0.0);
        t.insert_new_single_transduction(9, dead, 0.0);

        t.minimize();
        assert_eq!(language(&t), BTreeSet::from([(vec![1], 0.0f64.to_bits())]));
        assert_eq!(t.size(), 2);
    }

    #[test]
    fn minimize_of_finalless_transducer_clears() {
        let mut t = Transducer::new();
        t.insert_new_single_transduction(1, 0, 0.0);
        t.minimize();
        assert!(t.has_no_finals());
        assert!(t.is_empty());
    }

    #[test]
    fn append_dot_star_loops_on_finals() {
        let mut t = Transducer::new();
        add_path(&mut t, &[1], 0.0);
        let loops = BTreeSet::from([7, 8]);
        let starred = t.append_dot_star(&loops);

        let final_state = *starred.get_finals().keys().next().unwrap();
        let self_loops: Vec<i32> = starred
            .arcs(final_state)
            .iter()
            .filter(|arc| arc.dest == final_state)
            .map(|arc| arc.tag)
            .collect();
        assert_eq!(self_loops, vec![7, 8]);
        // The original is untouched.
        assert_eq!(t.number_of_transitions(), 1);
    }

    #[test]
    fn move_lemqs_last_reorders_arcs() {
        let mut alphabet = Alphabet::new();
        let lemq = alphabet.include_symbol("<@adj>");
        let n = alphabet.include_symbol("<n>");
        let lemq_tag = alphabet.pair(lemq, lemq);
        let n_tag = alphabet.pair(n, n);
        let c_tag = alphabet.pair('c' as i32, 'c' as i32);

        let mut t = Transducer::new();
        let end = t.insert_new_single_transduction(lemq_tag, 0, 0.0);
        t.link_states(0, end, c_tag, 0.0);
        t.link_states(0, end, n_tag, 0.0);
        t.set_final(end, 0.0);

        let moved = t.move_lemqs_last(&alphabet);
        let tags: Vec<i32> = moved.arcs(0).iter().map(|arc| arc.tag).collect();
        assert_eq!(tags, vec![c_tag, n_tag, lemq_tag]);
    }

    #[test]
    fn serialization_roundtrip() {
        let mut t = Transducer::new();
        add_path(&mut t, &[1, 2, 3], 1.5);
        add_path(&mut t, &[4], 0.25);

        for weighted in [true, false] {
            let mut buf = Vec::new();
            t.write(&mut buf, weighted).unwrap();
            let back = Transducer::read(&mut Cursor::new(buf), weighted).unwrap();
            assert_eq!(back.size(), t.size());
            assert_eq!(back.number_of_transitions(), t.number_of_transitions());
            if weighted {
                assert_eq!(language(&back), language(&t));
            }
        }
    }

    #[test]
    fn read_rejects_dangling_arcs() {
        let mut broken = Transducer::new();
        broken.link_states(0, 0, 1, 0.0);
        broken.states[0][0].dest = 5;
        let mut buf = Vec::new();
        broken.write(&mut buf, true).unwrap();
        assert!(matches!(
            Transducer::read(&mut Cursor::new(buf), true),
            Err(FstError::DanglingArc { .. })
        ));
    }

    #[test]
    fn intersect_keeps_only_covered_paths() {
        // Monolingual side: two "words", lower projections [10, n] and
        // [11, n]. Prefix side accepts only 10 followed by anything.
        let mut mono_alphabet = Alphabet::new();
        let n = mono_alphabet.include_symbol("<n>");
        let t10 = mono_alphabet.pair(10, 10);
        let t11 = mono_alphabet.pair(11, 11);
        let tn = mono_alphabet.pair(0, n);

        let mut mono = Transducer::new();
        add_path(&mut mono, &[t10, tn], 0.0);
        add_path(&mut mono, &[t11, tn], 0.0);

        let mut prefix_alphabet = Alphabet::new();
        let pn = prefix_alphabet.include_symbol("<n>");
        let p10 = prefix_alphabet.pair(10, 10);
        let mut prefix = Transducer::new();
        add_path(&mut prefix, &[p10], 0.0);
        let mut loopback = BTreeSet::new();
        loopback.insert(prefix_alphabet.pair(pn, pn));
        loopback.insert(p10);
        let prefix = prefix.append_dot_star(&loopback);

        let mut trimmed = mono.intersect(&prefix, &mono_alphabet, &prefix_alphabet);
        trimmed.minimize();

        let langs = language(&trimmed);
        assert!(langs.contains(&(vec![t10, tn], 0.0f64.to_bits())));
        assert!(!langs.iter().any(|(path, _)| path.first() == Some(&t11)));
    }

    #[test]
    fn intersect_with_disjoint_prefix_is_empty() {
        let mut mono_alphabet = Alphabet::new();
        let t10 = mono_alphabet.pair(10, 10);
        let mut mono = Transducer::new();
        add_path(&mut mono, &[t10], 0.0);

        let mut prefix_alphabet = Alphabet::new();
        let p99 = prefix_alphabet.pair(99, 99);
        let mut prefix = Transducer::new();
        add_path(&mut prefix, &[p99], 0.0);

        let mut trimmed = mono.intersect(&prefix, &mono_alphabet, &prefix_alphabet);
        trimmed.minimize();
        assert!(trimmed.has_no_finals());
    }
}
