// Symbol registry shared by a dictionary's transducers.
//
// Two registers live here. Multi-character symbols ("tags" such as `<n>`)
// get negative codes: the symbol at index i is addressed as -(i+1), so any
// negative code is a tag and any non-negative code is a raw character
// (0 is epsilon). Ordered pairs of codes get dense "edge tag" identifiers
// which are what the transducers store on their arcs.
//
// Codes are append-only: once issued they are never renumbered, which is
// what makes the serialized form stable.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use hashbrown::HashMap;

use crate::compression;
use crate::FstError;

/// Which side of a symbol pair to project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Default)]
pub struct Alphabet {
    /// Multi-character symbol strings; code of `symbols[i]` is `-(i+1)`.
    symbols: Vec<String>,
    symbol_codes: HashMap<String, i32>,
    /// Pair table; the edge tag of `pairs[i]` is `i`.
    pairs: Vec<(i32, i32)>,
    pair_codes: HashMap<(i32, i32), i32>,
    /// Display overrides installed with [`set_symbol`](Self::set_symbol).
    output_overrides: HashMap<i32, String>,
}

impl Alphabet {
    /// An alphabet with the epsilon pair pre-registered as edge tag 0.
    pub fn new() -> Self {
        let mut alphabet = Alphabet::default();
        alphabet.pair(0, 0);
        alphabet
    }

    /// Register a multi-character symbol. Idempotent; returns its code.
    pub fn include_symbol(&mut self, symbol: &str) -> i32 {
        if let Some(&code) = self.symbol_codes.get(symbol) {
            return code;
        }
        let code = -(self.symbols.len() as i32 + 1);
        self.symbols.push(symbol.to_string());
        self.symbol_codes.insert(symbol.to_string(), code);
        code
    }

    /// Code of a multi-character symbol, or 0 when it is not registered.
    pub fn symbol_code(&self, symbol: &str) -> i32 {
        self.symbol_codes.get(symbol).copied().unwrap_or(0)
    }

    /// Edge tag for an ordered pair of symbol codes, registering it if new.
    pub fn pair(&mut self, upper: i32, lower: i32) -> i32 {
        if let Some(&tag) = self.pair_codes.get(&(upper, lower)) {
            return tag;
        }
        let tag = self.pairs.len() as i32;
        self.pairs.push((upper, lower));
        self.pair_codes.insert((upper, lower), tag);
        tag
    }

    /// Both sides of an edge tag.
    pub fn decode(&self, tag: i32) -> (i32, i32) {
        self.pairs[tag as usize]
    }

    /// One side of an edge tag.
    pub fn project(&self, tag: i32, side: Side) -> i32 {
        let (upper, lower) = self.decode(tag);
        match side {
            Side::Left => upper,
            Side::Right => lower,
        }
    }

    /// True iff the code denotes a multi-character symbol.
    pub fn is_tag(&self, code: i32) -> bool {
        code < 0
    }

    /// Number of registered edge tags.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Number of registered multi-character symbols.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// The text of a multi-character symbol code.
    pub fn symbol_text(&self, code: i32) -> Option<&str> {
        if code >= 0 {
            return None;
        }
        self.symbols.get((-code - 1) as usize).map(String::as_str)
    }

    /// Override the display text of a symbol (an empty string hides it).
    pub fn set_symbol(&mut self, code: i32, text: &str) {
        self.output_overrides.insert(code, text.to_string());
    }

    /// Append the display form of a symbol code to `buffer`.
    ///
    /// Epsilon appends nothing; a tag appends its bracketed text; anything
    /// else appends the character itself.
    pub fn get_symbol(&self, buffer: &mut String, code: i32) {
        if code == 0 {
            return;
        }
        if let Some(text) = self.output_overrides.get(&code) {
            buffer.push_str(text);
            return;
        }
        if code < 0 {
            if let Some(text) = self.symbol_text(code) {
                buffer.push_str(text);
            }
            return;
        }
        if let Some(c) = char::from_u32(code as u32) {
            buffer.push(c);
        }
    }

    /// Collect `x:x` edge tags (coded in `self`) for every symbol appearing
    /// on `side` of the pairs of `basis`.
    ///
    /// Tags are carried over by name since their codes differ between
    /// alphabets; plain characters share the code point. The result feeds
    /// the `.*` self-loops of the trimmer's prefix automaton.
    pub fn create_loopback_symbols(
        &mut self,
        symbols: &mut BTreeSet<i32>,
        basis: &Alphabet,
        side: Side,
    ) {
        for index in 0..basis.pairs.len() {
            let code = basis.project(index as i32, side);
            if code == 0 {
                continue;
            }
            if basis.is_tag(code) {
                if let Some(text) = basis.symbol_text(code) {
                    let own = self.include_symbol(text);
                    symbols.insert(self.pair(own, own));
                }
            } else {
                symbols.insert(self.pair(code, code));
            }
        }
    }

    /// Serialize: multi-character symbols, then the pair table.
    pub fn write<W: Write>(&self, output: &mut W) -> Result<(), FstError> {
        compression::write_vlen(self.symbols.len() as u64, output)?;
        for symbol in &self.symbols {
            compression::write_string(symbol, output)?;
        }
        compression::write_vlen(self.pairs.len() as u64, output)?;
        for &(upper, lower) in &self.pairs {
            compression::write_signed(i64::from(upper), output)?;
            compression::write_signed(i64::from(lower), output)?;
        }
        Ok(())
    }

    /// Deserialize an alphabet written by [`write`](Self::write).
    pub fn read<R: Read>(input: &mut R) -> Result<Self, FstError> {
        let mut alphabet = Alphabet::default();
        let symbol_count = compression::read_vlen(input)? as usize;
        for _ in 0..symbol_count {
            let symbol = compression::read_string(input, "alphabet symbol")?;
            alphabet.include_symbol(&symbol);
        }
        let pair_count = compression::read_vlen(input)? as usize;
        for _ in 0..pair_count {
            let upper = compression::read_signed(input)? as i32;
            let lower = compression::read_signed(input)? as i32;
            alphabet.pair(upper, lower);
        }
        Ok(alphabet)
    }
}
