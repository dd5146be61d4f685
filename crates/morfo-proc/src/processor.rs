// Dictionary container and the machinery every mode shares: loading,
// final-state classification, stream readers, blank queues and printers.

use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, Read, Seek, Write};

use hashbrown::{HashMap, HashSet};

use morfo_fst::alphabet::Alphabet;
use morfo_fst::buffer::InputBuffer;
use morfo_fst::chars;
use morfo_fst::compression;
use morfo_fst::header;
use morfo_fst::state::{Finals, State};
use morfo_fst::trans_exe::{ExeArc, NodePool, TransExe};

use crate::input::InputStream;
use crate::ProcError;

/// Names tried, in order, for the compound-only-left control symbol.
const COMPOUND_ONLY_L_NAMES: [&str; 5] = [
    "<:co:only-L>",
    "<:compound:only-L>",
    "<@co:only-L>",
    "<@compound:only-L>",
    "<compound-only-L>",
];

/// Names tried, in order, for the compound-right control symbol.
const COMPOUND_R_NAMES: [&str; 5] = [
    "<:co:R>",
    "<:compound:R>",
    "<@co:R>",
    "<@compound:R>",
    "<compound-R>",
];

pub struct FstProcessor {
    pub(crate) pool: NodePool,
    pub(crate) transducers: BTreeMap<String, TransExe>,
    pub(crate) initial_state: State,
    pub(crate) default_weight: f64,

    pub(crate) inconditional: Finals,
    pub(crate) standard: Finals,
    pub(crate) postblank: Finals,
    pub(crate) preblank: Finals,
    pub(crate) all_finals: Finals,

    pub(crate) blankqueue: VecDeque<String>,
    pub(crate) wblankqueue: VecDeque<String>,

    pub(crate) alphabetic_chars: HashSet<char>,
    pub(crate) escaped_chars: HashSet<char>,
    pub(crate) ignored_chars: HashSet<char>,
    pub(crate) rcx_map: HashMap<char, HashSet<i32>>,

    pub(crate) alphabet: Alphabet,
    pub(crate) input_buffer: InputBuffer,

    pub(crate) out_of_word: bool,
    pub(crate) is_wblank: bool,
    pub(crate) collect_wblanks: bool,
    pub(crate) need_end_wblank: bool,
    pub(crate) is_last_blank_tm: bool,
    pub(crate) numbers: Vec<String>,

    pub(crate) case_sensitive: bool,
    pub(crate) dictionary_case: bool,
    pub(crate) null_flush: bool,
    pub(crate) null_flush_generation: bool,
    pub(crate) use_ignored_chars: bool,
    pub(crate) use_default_ignored_chars: bool,
    pub(crate) use_restore_chars: bool,
    pub(crate) display_weights: bool,
    pub(crate) do_decomposition: bool,
    pub(crate) show_control_symbols: bool,
    pub(crate) biltrans_surface_forms: bool,
    pub(crate) compat_trim_short: bool,

    pub(crate) compound_only_l_symbol: i32,
    pub(crate) compound_r_symbol: i32,
    pub(crate) compound_max_elements: usize,

    pub(crate) max_analyses: usize,
    pub(crate) max_weight_classes: usize,
}

impl Default for FstProcessor {
    fn default() -> Self {
        FstProcessor::new()
    }
}

impl FstProcessor {
    pub fn new() -> Self {
        let escaped_chars: HashSet<char> =
            ['[', ']', '{', '}', '^', '$', '/', '\\', '@', '<', '>']
                .into_iter()
                .collect();
        // Soft hyphen.
        let ignored_chars: HashSet<char> = ['\u{00AD}'].into_iter().collect();

        FstProcessor {
            pool: NodePool::new(),
            transducers: BTreeMap::new(),
            initial_state: State::default(),
            default_weight: 0.0,
            inconditional: Finals::default(),
            standard: Finals::default(),
            postblank: Finals::default(),
            preblank: Finals::default(),
            all_finals: Finals::default(),
            blankqueue: VecDeque::new(),
            wblankqueue: VecDeque::new(),
            alphabetic_chars: HashSet::new(),
            escaped_chars,
            ignored_chars,
            rcx_map: HashMap::new(),
            alphabet: Alphabet::new(),
            input_buffer: InputBuffer::default(),
            out_of_word: false,
            is_wblank: false,
            collect_wblanks: false,
            need_end_wblank: false,
            is_last_blank_tm: false,
            numbers: Vec::new(),
            case_sensitive: false,
            dictionary_case: false,
            null_flush: false,
            null_flush_generation: false,
            use_ignored_chars: false,
            use_default_ignored_chars: true,
            use_restore_chars: false,
            display_weights: false,
            do_decomposition: false,
            show_control_symbols: false,
            biltrans_surface_forms: false,
            compat_trim_short: false,
            compound_only_l_symbol: 0,
            compound_r_symbol: 0,
            compound_max_elements: 4,
            max_analyses: usize::MAX,
            max_weight_classes: usize::MAX,
        }
    }

    // ----- configuration ---------------------------------------------------

    pub fn set_case_sensitive_mode(&mut self, value: bool) {
        self.case_sensitive = value;
    }

    pub fn set_dictionary_case_mode(&mut self, value: bool) {
        self.dictionary_case = value;
    }

    pub fn set_null_flush(&mut self, value: bool) {
        self.null_flush = value;
    }

    pub fn get_null_flush(&self) -> bool {
        self.null_flush
    }

    pub fn set_ignored_chars(&mut self, value: bool) {
        self.use_ignored_chars = value;
    }

    pub fn set_use_default_ignored_chars(&mut self, value: bool) {
        self.use_default_ignored_chars = value;
    }

    pub fn set_restore_chars(&mut self, value: bool) {
        self.use_restore_chars = value;
    }

    pub fn set_display_weights_mode(&mut self, value: bool) {
        self.display_weights = value;
    }

    pub fn set_max_analyses_value(&mut self, value: usize) {
        self.max_analyses = value;
    }

    pub fn set_max_weight_classes_value(&mut self, value: usize) {
        self.max_weight_classes = value;
    }

    pub fn set_biltrans_surface_forms(&mut self, value: bool) {
        self.biltrans_surface_forms = value;
    }

    pub fn set_show_control_symbols(&mut self, value: bool) {
        self.show_control_symbols = value;
    }

    /// Keep the legacy guard that discards very short `biltrans_full`
    /// results. Off by default; the guard looks like a defect and is only
    /// here for byte-compatible comparisons against old pipelines.
    pub fn set_compat_trim_short(&mut self, value: bool) {
        self.compat_trim_short = value;
    }

    pub fn get_decompounding_mode(&self) -> bool {
        self.do_decomposition
    }

    /// Add a character the readers should skip over.
    pub fn add_ignored_char(&mut self, c: char) {
        self.ignored_chars.insert(c);
    }

    /// Register a diacritic-restoration candidate set: when `from` is read,
    /// every character of `to` is also tried against the dictionary.
    pub fn add_restore_chars(&mut self, from: char, to: &[char]) {
        let entry = self.rcx_map.entry(from).or_default();
        for &c in to {
            entry.insert(c as i32);
        }
    }

    // ----- loading and initialisation --------------------------------------

    /// Read a compiled dictionary: letters, alphabet, then every named
    /// transducer section into the shared node pool.
    pub fn load<R: Read + Seek>(&mut self, input: &mut R) -> Result<(), ProcError> {
        let features = header::read_header(input)?;
        let weighted = features.weighted();

        let letters = compression::read_string(input, "letter section")?;
        for c in letters.chars() {
            self.alphabetic_chars.insert(c);
        }

        self.alphabet = Alphabet::read(input)?;

        let section_count = compression::read_vlen(input)? as usize;
        for _ in 0..section_count {
            let name = compression::read_string(input, "section name")?;
            let exe = TransExe::read(input, &self.alphabet, weighted, &mut self.pool)?;
            self.transducers.insert(name, exe);
        }
        Ok(())
    }

    /// Create the shared root node with an epsilon arc into every section
    /// and reset the initial frontier to its closure.
    fn calc_initial(&mut self) {
        let root = self.pool.add_node();
        for exe in self.transducers.values() {
            self.pool.node_mut(root).add_arc(
                0,
                ExeArc {
                    output: 0,
                    dest: exe.get_initial(),
                    weight: self.default_weight,
                },
            );
        }
        self.initial_state.init(&self.pool, root);
    }

    /// Sort every section's finals into the named finality sets.
    fn classify_finals(&mut self) -> Result<(), ProcError> {
        for (name, exe) in &self.transducers {
            let target = if name.ends_with("@inconditional") {
                &mut self.inconditional
            } else if name.ends_with("@standard") {
                &mut self.standard
            } else if name.ends_with("@postblank") {
                &mut self.postblank
            } else if name.ends_with("@preblank") {
                &mut self.preblank
            } else {
                return Err(ProcError::UnsupportedSection(name.clone()));
            };
            for &(node, weight) in exe.get_finals() {
                target.insert(node, weight);
            }
        }
        Ok(())
    }

    fn merge_all_finals(&mut self) {
        self.all_finals = self.standard.clone();
        for source in [&self.inconditional, &self.postblank, &self.preblank] {
            for (&node, &weight) in source {
                self.all_finals.insert(node, weight);
            }
        }
    }

    pub fn init_analysis(&mut self) -> Result<(), ProcError> {
        self.calc_initial();
        self.classify_finals()?;
        self.merge_all_finals();
        Ok(())
    }

    /// All finals count, whatever their section, and case is taken as-is.
    pub fn init_generation(&mut self) {
        self.use_ignored_chars = false;
        self.calc_initial();
        for exe in self.transducers.values() {
            for &(node, weight) in exe.get_finals() {
                self.all_finals.insert(node, weight);
            }
        }
    }

    pub fn init_postgeneration(&mut self) {
        self.init_generation();
    }

    pub fn init_biltrans(&mut self) {
        self.init_generation();
    }

    pub fn init_tm_analysis(&mut self) {
        self.calc_initial();
        for exe in self.transducers.values() {
            for &(node, weight) in exe.get_finals() {
                self.all_finals.insert(node, weight);
            }
        }
    }

    pub fn init_sao(&mut self) -> Result<(), ProcError> {
        self.init_analysis()
    }

    pub fn init_decomposition(&mut self) -> Result<(), ProcError> {
        self.do_decomposition = true;
        self.init_analysis()?;
        self.init_decomposition_symbols();
        Ok(())
    }

    fn lookup_symbol_chain(&self, names: &[&str]) -> i32 {
        for name in names {
            let code = self.alphabet.symbol_code(name);
            if code != 0 {
                return code;
            }
        }
        0
    }

    fn init_decomposition_symbols(&mut self) {
        self.compound_only_l_symbol = self.lookup_symbol_chain(&COMPOUND_ONLY_L_NAMES);
        if self.compound_only_l_symbol == 0 {
            eprintln!("warning: decomposition symbol <:compound:only-L> not found");
        } else if !self.show_control_symbols {
            self.alphabet.set_symbol(self.compound_only_l_symbol, "");
        }

        self.compound_r_symbol = self.lookup_symbol_chain(&COMPOUND_R_NAMES);
        if self.compound_r_symbol == 0 {
            eprintln!("warning: decomposition symbol <:compound:R> not found");
        } else if !self.show_control_symbols {
            self.alphabet.set_symbol(self.compound_r_symbol, "");
        }
    }

    /// Sanity checks on a freshly initialised dictionary.
    pub fn valid(&self) -> Result<(), ProcError> {
        if self.initial_state.is_final(&self.all_finals) {
            return Err(ProcError::InvalidDictionary(
                "the left side of an entry is empty",
            ));
        }
        let mut probe = self.initial_state.clone();
        probe.step(&self.pool, ' ' as i32);
        if !probe.is_empty() {
            return Err(ProcError::InvalidDictionary(
                "an entry begins with whitespace",
            ));
        }
        Ok(())
    }

    // ----- character classification ----------------------------------------

    pub(crate) fn to_char(val: i32) -> Option<char> {
        if val <= 0 {
            None
        } else {
            char::from_u32(val as u32)
        }
    }

    pub(crate) fn is_alphabetic(&self, val: i32) -> bool {
        match Self::to_char(val) {
            Some(c) => c.is_alphanumeric() || self.alphabetic_chars.contains(&c),
            None => false,
        }
    }

    pub(crate) fn is_escaped(&self, val: i32) -> bool {
        Self::to_char(val)
            .map(|c| self.escaped_chars.contains(&c))
            .unwrap_or(false)
    }

    pub(crate) fn is_space(val: i32) -> bool {
        Self::to_char(val).map(char::is_whitespace).unwrap_or(false)
    }

    pub(crate) fn is_upper_val(val: i32) -> bool {
        Self::to_char(val).map(chars::is_upper).unwrap_or(false)
    }

    pub(crate) fn lower_val(val: i32) -> i32 {
        Self::to_char(val)
            .map(|c| chars::to_lower(c) as i32)
            .unwrap_or(val)
    }

    /// Character-count index of the last non-alphabetic character, 0 when
    /// every character is alphabetic.
    pub(crate) fn last_blank(&self, text: &str) -> usize {
        let collected: Vec<char> = text.chars().collect();
        for (index, &c) in collected.iter().enumerate().rev() {
            if !(c.is_alphanumeric() || self.alphabetic_chars.contains(&c)) {
                return index;
            }
        }
        0
    }

    /// Character-count index of the first non-alphabetic character.
    pub(crate) fn first_not_alpha(&self, text: &str) -> Option<usize> {
        for (index, c) in text.chars().enumerate() {
            if !(c.is_alphanumeric() || self.alphabetic_chars.contains(&c)) {
                return Some(index);
            }
        }
        None
    }

    /// The text with `n` characters removed from the end.
    pub(crate) fn chop_chars(text: &str, n_from_end: usize) -> &str {
        if n_from_end == 0 {
            return text;
        }
        let total = text.chars().count();
        let keep = total.saturating_sub(n_from_end);
        match text.char_indices().nth(keep) {
            Some((at, _)) => &text[..at],
            None => text,
        }
    }

    /// Everything before the first unescaped `<`.
    pub(crate) fn remove_tags(text: &str) -> &str {
        let mut previous = '\0';
        for (at, c) in text.char_indices() {
            if c == '<' && at > 0 && previous != '\\' {
                return &text[..at];
            }
            previous = c;
        }
        text
    }

    // ----- low-level stream reading ----------------------------------------

    pub(crate) fn read_escaped<R: BufRead>(
        &mut self,
        input: &mut InputStream<R>,
    ) -> Result<char, ProcError> {
        input.get()?.ok_or(ProcError::Stream)
    }

    /// Read a `delim1 … delim2` block verbatim, `delim1` already consumed.
    pub(crate) fn read_full_block<R: BufRead>(
        &mut self,
        input: &mut InputStream<R>,
        delim1: char,
        delim2: char,
    ) -> Result<String, ProcError> {
        let mut result = String::new();
        result.push(delim1);
        let mut current = delim1;
        while current != delim2 {
            let Some(c) = input.get()? else {
                return Err(ProcError::Stream);
            };
            current = c;
            result.push(c);
            if c == '\\' {
                result.push(self.read_escaped(input)?);
                current = '\\';
            }
        }
        Ok(result)
    }

    /// Read a wordbound blank: `[[` already consumed, runs through `]]`.
    pub(crate) fn read_wblank<R: BufRead>(
        &mut self,
        input: &mut InputStream<R>,
    ) -> Result<String, ProcError> {
        let mut result = String::from("[[");
        loop {
            let Some(c) = input.get()? else {
                return Err(ProcError::Stream);
            };
            result.push(c);
            if c == '\\' {
                result.push(self.read_escaped(input)?);
            } else if c == ']' {
                let Some(next) = input.get()? else {
                    return Err(ProcError::Stream);
                };
                result.push(next);
                if next == ']' {
                    return Ok(result);
                }
            }
        }
    }

    // ----- blank and wordbound-blank queues --------------------------------

    pub(crate) fn flush_blanks<W: Write>(&mut self, output: &mut W) -> Result<(), ProcError> {
        while let Some(blank) = self.blankqueue.pop_front() {
            output.write_all(blank.as_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn flush_wblanks<W: Write>(&mut self, output: &mut W) -> Result<(), ProcError> {
        while let Some(blank) = self.wblankqueue.pop_front() {
            output.write_all(blank.as_bytes())?;
        }
        Ok(())
    }

    /// Merge the queued wordbound blanks into one opening blank, interior
    /// contents joined with `"; "`. A trailing unterminated blank stays
    /// queued. Sets the flag that a closing `[[/]]` is owed.
    pub(crate) fn combine_wblanks(&mut self) -> String {
        let mut combined = String::new();
        let mut last_wblank = String::new();

        while let Some(front) = self.wblankqueue.pop_front() {
            if front == "[[/]]" {
                if combined.is_empty() {
                    combined.push_str("[[");
                } else if combined.len() > 2 {
                    combined.push_str("; ");
                }
                // Interior without the [[ ]] brackets.
                if last_wblank.len() >= 4 {
                    combined.push_str(&last_wblank[2..last_wblank.len() - 2]);
                }
                last_wblank.clear();
            } else {
                last_wblank = front;
            }
        }

        if !last_wblank.is_empty() {
            self.wblankqueue.push_back(last_wblank);
        }
        if !combined.is_empty() {
            combined.push_str("]]");
            self.need_end_wblank = true;
        }
        combined
    }

    /// Print one queued blank if any, otherwise the given space character.
    pub(crate) fn print_space<W: Write>(
        &mut self,
        val: char,
        output: &mut W,
    ) -> Result<(), ProcError> {
        if self.blankqueue.is_empty() {
            write_char(output, val)?;
        } else {
            self.flush_blanks(output)?;
        }
        Ok(())
    }

    // ----- printers --------------------------------------------------------

    pub(crate) fn write_escaped<W: Write>(
        &self,
        text: &str,
        output: &mut W,
    ) -> Result<(), ProcError> {
        for c in text.chars() {
            if self.escaped_chars.contains(&c) {
                write_char(output, '\\')?;
            }
            write_char(output, c)?;
        }
        Ok(())
    }

    /// Escaping writer that accounts for spaces covered by queued blanks:
    /// a space inside the surface form consumes a queued plain blank
    /// immediately, any fancier blank is owed after the lexical unit.
    pub(crate) fn write_escaped_pop_blanks<W: Write>(
        &mut self,
        text: &str,
        output: &mut W,
    ) -> Result<usize, ProcError> {
        let mut postpop = 0;
        for c in text.chars() {
            if self.escaped_chars.contains(&c) {
                write_char(output, '\\')?;
            }
            write_char(output, c)?;
            if c == ' ' {
                match self.blankqueue.front() {
                    Some(front) if front == " " => {
                        self.blankqueue.pop_front();
                    }
                    Some(_) => postpop += 1,
                    None => {}
                }
            }
        }
        Ok(postpop)
    }

    /// Escape up to the first tag, then pass the tags through untouched.
    pub(crate) fn write_escaped_with_tags<W: Write>(
        &self,
        text: &str,
        output: &mut W,
    ) -> Result<(), ProcError> {
        let mut previous = '\0';
        for (at, c) in text.char_indices() {
            if c == '<' && at > 0 && previous != '\\' {
                output.write_all(text[at..].as_bytes())?;
                return Ok(());
            }
            if self.escaped_chars.contains(&c) {
                write_char(output, '\\')?;
            }
            write_char(output, c)?;
            previous = c;
        }
        Ok(())
    }

    pub(crate) fn print_word<W: Write>(
        &self,
        sf: &str,
        lf: &str,
        output: &mut W,
    ) -> Result<(), ProcError> {
        write_char(output, '^')?;
        self.write_escaped(sf, output)?;
        output.write_all(lf.as_bytes())?;
        write_char(output, '$')?;
        Ok(())
    }

    pub(crate) fn print_word_pop_blank<W: Write>(
        &mut self,
        sf: &str,
        lf: &str,
        output: &mut W,
    ) -> Result<(), ProcError> {
        write_char(output, '^')?;
        let postpop = self.write_escaped_pop_blanks(sf, output)?;
        output.write_all(lf.as_bytes())?;
        write_char(output, '$')?;
        for _ in 0..postpop {
            if let Some(blank) = self.blankqueue.pop_front() {
                output.write_all(blank.as_bytes())?;
            }
        }
        Ok(())
    }

    pub(crate) fn print_word_bilingual<W: Write>(
        &self,
        sf: &str,
        lf: &str,
        output: &mut W,
    ) -> Result<(), ProcError> {
        write_char(output, '^')?;
        output.write_all(sf.as_bytes())?;
        output.write_all(lf.as_bytes())?;
        write_char(output, '$')?;
        Ok(())
    }

    pub(crate) fn print_unknown_word<W: Write>(
        &self,
        sf: &str,
        output: &mut W,
    ) -> Result<(), ProcError> {
        write_char(output, '^')?;
        self.write_escaped(sf, output)?;
        output.write_all(b"/*")?;
        self.write_escaped(sf, output)?;
        write_char(output, '$')?;
        Ok(())
    }
}

/// Write one character to a byte sink.
pub(crate) fn write_char<W: Write>(output: &mut W, c: char) -> std::io::Result<()> {
    let mut bytes = [0u8; 4];
    output.write_all(c.encode_utf8(&mut bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_escaped_set_matches_stream_conventions() {
        let proc = FstProcessor::new();
        for c in ['[', ']', '^', '$', '/', '\\', '@', '<', '>', '{', '}'] {
            assert!(proc.is_escaped(c as i32));
        }
        assert!(!proc.is_escaped('a' as i32));
    }

    #[test]
    fn soft_hyphen_is_ignored_by_default() {
        let proc = FstProcessor::new();
        assert!(proc.ignored_chars.contains(&'\u{00AD}'));
        assert!(proc.use_default_ignored_chars);
    }

    #[test]
    fn remove_tags_cuts_at_first_tag() {
        assert_eq!(FstProcessor::remove_tags("cat<n><pl>"), "cat");
        assert_eq!(FstProcessor::remove_tags("dog"), "dog");
        // An escaped < is literal text.
        assert_eq!(FstProcessor::remove_tags("a\\<b<n>"), "a\\<b");
    }

    #[test]
    fn chop_chars_counts_characters_not_bytes() {
        assert_eq!(FstProcessor::chop_chars("k\u{00e4}velee", 3), "k\u{00e4}ve");
        assert_eq!(FstProcessor::chop_chars("abc", 0), "abc");
        assert_eq!(FstProcessor::chop_chars("abc", 5), "");
    }

    #[test]
    fn combine_wblanks_joins_interiors() {
        let mut proc = FstProcessor::new();
        proc.wblankqueue.push_back("[[t:a]]".to_string());
        proc.wblankqueue.push_back("[[/]]".to_string());
        proc.wblankqueue.push_back("[[t:b]]".to_string());
        proc.wblankqueue.push_back("[[/]]".to_string());
        let combined = proc.combine_wblanks();
        assert_eq!(combined, "[[t:a; t:b]]");
        assert!(proc.need_end_wblank);
        assert!(proc.wblankqueue.is_empty());
    }

    #[test]
    fn combine_wblanks_keeps_unterminated_tail() {
        let mut proc = FstProcessor::new();
        proc.wblankqueue.push_back("[[t:a]]".to_string());
        proc.wblankqueue.push_back("[[/]]".to_string());
        proc.wblankqueue.push_back("[[t:c]]".to_string());
        let combined = proc.combine_wblanks();
        assert_eq!(combined, "[[t:a]]");
        assert_eq!(proc.wblankqueue.len(), 1);
    }

    #[test]
    fn write_escaped_with_tags_passes_tags_raw() {
        let proc = FstProcessor::new();
        let mut out = Vec::new();
        proc.write_escaped_with_tags("a/b<n><pl>", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\\/b<n><pl>");
    }

    #[test]
    fn print_word_pop_blank_settles_space_debt() {
        let mut proc = FstProcessor::new();
        proc.blankqueue.push_back("[b]".to_string());
        let mut out = Vec::new();
        proc.print_word_pop_blank("a b", "/a b<n>", &mut out).unwrap();
        // The fancy blank is emitted after the unit, not inside it.
        assert_eq!(String::from_utf8(out).unwrap(), "^a b/a b<n>$[b]");
    }

    #[test]
    fn restore_chars_registration() {
        let mut proc = FstProcessor::new();
        proc.add_restore_chars('a', &['\u{00e1}', '\u{00e0}']);
        let set = proc.rcx_map.get(&'a').unwrap();
        assert!(set.contains(&('\u{00e1}' as i32)));
        assert_eq!(set.len(), 2);
    }
}
