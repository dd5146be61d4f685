// Read-optimized transducer form.
//
// A dictionary file holds several named transducer sections. At load time
// every section's states land in one shared node pool so that a node index
// identifies a state globally, across sections; the stream drivers rely on
// this to mix finals from different sections in a single frontier. Arcs are
// regrouped by their upper (input) symbol for constant-time dispatch during
// traversal.

use std::io::Read;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::alphabet::Alphabet;
use crate::compression;
use crate::FstError;

/// An arc as seen by the traversal engine: decoded output side,
/// destination node in the pool, weight.
#[derive(Debug, Clone, Copy)]
pub struct ExeArc {
    pub output: i32,
    pub dest: u32,
    pub weight: f64,
}

/// One pool node: arcs grouped by input symbol. Key 0 holds the epsilon
/// arcs, expanded by the engine's closure pass.
#[derive(Debug, Default)]
pub struct ExeNode {
    arcs: HashMap<i32, SmallVec<[ExeArc; 1]>>,
}

impl ExeNode {
    pub fn arcs_for(&self, input: i32) -> Option<&[ExeArc]> {
        self.arcs.get(&input).map(|v| &v[..])
    }

    pub fn add_arc(&mut self, input: i32, arc: ExeArc) {
        self.arcs.entry(input).or_default().push(arc);
    }
}

/// Shared storage for every loaded section plus driver-created root nodes.
#[derive(Debug, Default)]
pub struct NodePool {
    nodes: Vec<ExeNode>,
}

impl NodePool {
    pub fn new() -> Self {
        NodePool::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: u32) -> &ExeNode {
        &self.nodes[index as usize]
    }

    pub fn node_mut(&mut self, index: u32) -> &mut ExeNode {
        &mut self.nodes[index as usize]
    }

    /// Append an empty node and return its global index.
    pub fn add_node(&mut self) -> u32 {
        self.nodes.push(ExeNode::default());
        (self.nodes.len() - 1) as u32
    }
}

/// One loaded transducer section: its initial node and finals, all indices
/// global to the pool it was loaded into.
#[derive(Debug)]
pub struct TransExe {
    initial: u32,
    finals: Vec<(u32, f64)>,
}

impl TransExe {
    pub fn get_initial(&self) -> u32 {
        self.initial
    }

    pub fn get_finals(&self) -> &[(u32, f64)] {
        &self.finals
    }

    /// Read one serialized section into `pool`, decoding edge tags through
    /// `alphabet` so the hot form dispatches on raw input symbols.
    pub fn read<R: Read>(
        input: &mut R,
        alphabet: &Alphabet,
        weighted: bool,
        pool: &mut NodePool,
    ) -> Result<Self, FstError> {
        let base = pool.len() as u32;
        let initial = compression::read_vlen(input)? as u32;

        let final_count = compression::read_vlen(input)? as usize;
        let mut finals = Vec::with_capacity(final_count);
        for _ in 0..final_count {
            let state = compression::read_vlen(input)? as u32;
            let weight = if weighted {
                compression::read_double(input)?
            } else {
                0.0
            };
            finals.push((base + state, weight));
        }

        let state_count = compression::read_vlen(input)? as usize;
        for _ in 0..state_count {
            pool.add_node();
        }
        for index in 0..state_count {
            let arc_count = compression::read_vlen(input)? as usize;
            for _ in 0..arc_count {
                let tag = compression::read_vlen(input)? as i32;
                let dest = compression::read_vlen(input)? as u32;
                let weight = if weighted {
                    compression::read_double(input)?
                } else {
                    0.0
                };
                if dest as usize >= state_count {
                    return Err(FstError::DanglingArc {
                        dst: dest as usize,
                        len: state_count,
                    });
                }
                if tag as usize >= alphabet.pair_count() {
                    return Err(FstError::Truncated("arc tag outside the pair table"));
                }
                let (upper, lower) = alphabet.decode(tag);
                pool.node_mut(base + index as u32).add_arc(
                    upper,
                    ExeArc {
                        output: lower,
                        dest: base + dest,
                        weight,
                    },
                );
            }
        }

        if initial as usize >= state_count {
            return Err(FstError::Truncated("initial state out of range"));
        }
        for &(state, _) in &finals {
            if (state - base) as usize >= state_count {
                return Err(FstError::Truncated("final state out of range"));
            }
        }

        Ok(TransExe {
            initial: base + initial,
            finals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transducer::Transducer;
    use std::io::Cursor;

    fn cat_alphabet() -> (Alphabet, Vec<i32>) {
        let mut alphabet = Alphabet::new();
        let tc = alphabet.pair('c' as i32, 'c' as i32);
        let ta = alphabet.pair('a' as i32, 'a' as i32);
        let tt = alphabet.pair('t' as i32, 't' as i32);
        let n = alphabet.include_symbol("<n>");
        let tn = alphabet.pair(0, n);
        (alphabet, vec![tc, ta, tt, tn])
    }

    fn cat_transducer(tags: &[i32]) -> Transducer {
        let mut t = Transducer::new();
        let mut state = t.get_initial();
        for &tag in tags {
            state = t.insert_new_single_transduction(tag, state, 0.0);
        }
        t.set_final(state, 0.5);
        t
    }

    #[test]
    fn load_regroups_arcs_by_input_symbol() {
        let (alphabet, tags) = cat_alphabet();
        let cold = cat_transducer(&tags);
        let mut buf = Vec::new();
        cold.write(&mut buf, true).unwrap();

        let mut pool = NodePool::new();
        let exe = TransExe::read(&mut Cursor::new(buf), &alphabet, true, &mut pool).unwrap();

        assert_eq!(pool.len(), 5);
        let first = pool.node(exe.get_initial());
        let arcs = first.arcs_for('c' as i32).unwrap();
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].output, 'c' as i32);

        // The epsilon arc sits under key 0 with the tag's lower side.
        let pre_final = pool.node(arcs[0].dest + 2);
        let eps = pre_final.arcs_for(0).unwrap();
        assert!(eps[0].output < 0);

        assert_eq!(exe.get_finals().len(), 1);
        assert_eq!(exe.get_finals()[0].1, 0.5);
    }

    #[test]
    fn second_section_is_offset_into_the_pool() {
        let (alphabet, tags) = cat_alphabet();
        let cold = cat_transducer(&tags[..1]);
        let mut buf = Vec::new();
        cold.write(&mut buf, true).unwrap();

        let mut pool = NodePool::new();
        let first =
            TransExe::read(&mut Cursor::new(buf.clone()), &alphabet, true, &mut pool).unwrap();
        let second = TransExe::read(&mut Cursor::new(buf), &alphabet, true, &mut pool).unwrap();

        assert_eq!(first.get_initial(), 0);
        assert_eq!(second.get_initial(), 2);
        assert_eq!(pool.len(), 4);
        assert_ne!(first.get_finals()[0].0, second.get_finals()[0].0);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let (alphabet, tags) = cat_alphabet();
        let mut cold = cat_transducer(&tags[..1]);
        // Forge a tag index beyond the pair table.
        cold.link_states(0, 0, 999, 0.0);
        let mut buf = Vec::new();
        cold.write(&mut buf, true).unwrap();

        let mut pool = NodePool::new();
        assert!(TransExe::read(&mut Cursor::new(buf), &alphabet, true, &mut pool).is_err());
    }
}
