// Bilingual transfer: `^analysis$` units looked up in a bidix, with the
// trailing-tag queue mechanism. Tags past the match point of the source
// side are not consumed; they accumulate in a queue appended to every
// target-language analysis on output.

use std::io::{BufRead, Write};

use morfo_fst::chars;
use morfo_fst::state::State;

use crate::input::InputStream;
use crate::processor::{write_char, FstProcessor};
use crate::{GenerationMode, ProcError};

/// Bilingual reader result: the raw text of an unknown tag (empty
/// otherwise) and the symbol code, `None` at end of stream.
type BilingualToken = (String, Option<i32>);

impl FstProcessor {
    pub(crate) fn read_bilingual<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<BilingualToken, ProcError> {
        loop {
            let Some(mut val) = input.get()? else {
                return Ok((String::new(), None));
            };

            if self.out_of_word {
                if val == '^' {
                    match input.get()? {
                        Some(next) => val = next,
                        None => return Ok((String::new(), None)),
                    }
                } else if val == '\\' {
                    write_char(output, val)?;
                    let Some(next) = input.get()? else {
                        return Ok((String::new(), None));
                    };
                    write_char(output, next)?;
                    self.skip_until(input, output, '^')?;
                    match input.get()? {
                        Some(next) => val = next,
                        None => return Ok((String::new(), None)),
                    }
                } else {
                    write_char(output, val)?;
                    self.skip_until(input, output, '^')?;
                    match input.get()? {
                        Some(next) => val = next,
                        None => return Ok((String::new(), None)),
                    }
                }
                self.out_of_word = false;
            }

            match val {
                '\\' => {
                    let next = input.get()?.ok_or(ProcError::Stream)?;
                    return Ok((String::new(), Some(next as i32)));
                }
                '$' => {
                    self.out_of_word = true;
                    return Ok((String::new(), Some('$' as i32)));
                }
                '<' => {
                    let block = self.read_full_block(input, '<', '>')?;
                    let code = self.alphabet.symbol_code(&block);
                    // An unknown tag travels as text so the caller can pass
                    // it through or queue it.
                    let symbol = if code == 0 { block } else { String::new() };
                    return Ok((symbol, Some(code)));
                }
                '[' => {
                    let next = input.get()?.ok_or(ProcError::Stream)?;
                    if next == '[' {
                        let wblank = self.read_wblank(input)?;
                        output.write_all(wblank.as_bytes())?;
                    } else {
                        input.unget(next);
                        let blank = self.read_full_block(input, '[', ']')?;
                        output.write_all(blank.as_bytes())?;
                    }
                }
                _ => return Ok((String::new(), Some(val as i32))),
            }
        }
    }

    /// Interleave `queue` into each analysis of `lexforms` (before every
    /// `/` separator and at the end).
    pub(crate) fn compose(lexforms: &str, queue: &str) -> String {
        let chars: Vec<char> = lexforms.chars().collect();
        let mut result = String::new();
        let mut index = 1;
        while index < chars.len() {
            let c = chars[index];
            if c == '\\' {
                result.push('\\');
                index += 1;
                if index < chars.len() {
                    result.push(chars[index]);
                }
            } else if c == '/' {
                result.push_str(queue);
                result.push(c);
            } else {
                result.push(c);
            }
            index += 1;
        }
        format!("/{result}{queue}")
    }

    /// Bilingual entry point; honors null-flush mode.
    pub fn bilingual<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
        mode: GenerationMode,
    ) -> Result<(), ProcError> {
        if self.null_flush {
            self.null_flush_generation = true;
        }
        self.bilingual_inner(input, output, mode)?;
        output.flush()?;
        Ok(())
    }

    fn bilingual_inner<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
        mode: GenerationMode,
    ) -> Result<(), ProcError> {
        let mut current_state = self.initial_state.clone();
        let mut sf = String::new(); // source-language analysis
        let mut queue = String::new(); // trailing target tags
        let mut result = String::new(); // bidix lookup result
        let mut seentags = false;
        let mut seensurface = false;
        let mut surface = String::new();

        self.out_of_word = false;
        self.skip_until(input, output, '^')?;

        loop {
            let (mut symbol, mut maybe_val) = self.read_bilingual(input, output)?;

            if self.biltrans_surface_forms && !seensurface && !self.out_of_word {
                while let Some(val) = maybe_val {
                    if val == '/' as i32 {
                        break;
                    }
                    surface.push_str(&symbol);
                    self.alphabet.get_symbol(&mut surface, val);
                    let token = self.read_bilingual(input, output)?;
                    symbol = token.0;
                    maybe_val = token.1;
                }
                seensurface = true;
                let token = self.read_bilingual(input, output)?;
                symbol = token.0;
                maybe_val = token.1;
            }

            let Some(val) = maybe_val else {
                break;
            };

            if val == '$' as i32 && self.out_of_word {
                if !seentags {
                    // Without tags only a complete match counts.
                    let (uppercase, firstupper) = Self::bilingual_case(&sf);
                    result = current_state.filter_finals(
                        &self.all_finals,
                        &self.alphabet,
                        &self.escaped_chars,
                        self.display_weights,
                        self.max_analyses,
                        self.max_weight_classes,
                        uppercase,
                        firstupper,
                        0,
                    );
                }

                if sf.starts_with('*') {
                    if mode == GenerationMode::Clean {
                        let bare: String = sf.chars().skip(1).collect();
                        self.print_word_bilingual(&sf, &format!("/{bare}"), output)?;
                    } else {
                        self.print_word_bilingual(&sf, &format!("/{sf}"), output)?;
                    }
                } else if !result.is_empty() {
                    let composed = Self::compose(&result, &queue);
                    self.print_word_bilingual(&sf, &composed, output)?;
                } else if self.biltrans_surface_forms {
                    self.print_word_bilingual(&surface, &format!("/@{surface}"), output)?;
                } else {
                    self.print_word_bilingual(&sf, &format!("/@{sf}"), output)?;
                }

                seensurface = false;
                surface.clear();
                queue.clear();
                result.clear();
                current_state = self.initial_state.clone();
                sf.clear();
                seentags = false;
            } else if Self::is_space(val) && sf.is_empty() {
                // Leading whitespace inside a unit carries nothing.
            } else if !sf.is_empty() && sf.starts_with('*') {
                if self.is_escaped(val) {
                    sf.push('\\');
                }
                self.alphabet.get_symbol(&mut sf, val);
                if val == 0 {
                    sf.push_str(&symbol);
                }
            } else {
                if self.is_escaped(val) {
                    sf.push('\\');
                }
                self.alphabet.get_symbol(&mut sf, val);
                if val == 0 {
                    sf.push_str(&symbol);
                }
                if self.alphabet.is_tag(val) || val == 0 {
                    seentags = true;
                }
                if !current_state.is_empty() {
                    if !self.alphabet.is_tag(val)
                        && Self::is_upper_val(val)
                        && !self.case_sensitive
                    {
                        current_state.step_fallback(&self.pool, val, Self::lower_val(val));
                    } else {
                        current_state.step(&self.pool, val);
                    }
                }
                if current_state.is_final(&self.all_finals) {
                    let (uppercase, firstupper) = Self::bilingual_case(&sf);
                    // The intervening tags were consumed after all.
                    queue.clear();
                    result = current_state.filter_finals(
                        &self.all_finals,
                        &self.alphabet,
                        &self.escaped_chars,
                        self.display_weights,
                        self.max_analyses,
                        self.max_weight_classes,
                        uppercase,
                        firstupper,
                        0,
                    );
                } else if !result.is_empty() {
                    // A result exists but the analysis continues: queue
                    // known and unknown tags for the target side, give up
                    // on a plain character.
                    if self.alphabet.is_tag(val) {
                        self.alphabet.get_symbol(&mut queue, val);
                    } else if val == 0 {
                        queue.push_str(&symbol);
                    } else if current_state.is_empty() {
                        result.clear();
                    }
                }
            }
        }
        Ok(())
    }

    fn bilingual_case(sf: &str) -> (bool, bool) {
        let mut iter = sf.chars();
        let first = iter.next();
        let second = iter.next();
        let firstupper = first.map(chars::is_upper).unwrap_or(false);
        let uppercase = second.map(chars::is_upper).unwrap_or(false);
        (uppercase, firstupper)
    }

    /// Look up one `^analysis$` unit (or bare analysis when `with_delim`
    /// is false) in the bidix. Unmatched units come back `@`-marked;
    /// `*`-marked units pass through untouched.
    pub fn biltrans(&self, input_word: &str, with_delim: bool) -> String {
        let word: Vec<char> = input_word.chars().collect();
        let (start, end) = Self::delim_points(&word, with_delim);
        if word.get(start) == Some(&'*') {
            return input_word.to_string();
        }

        let mut lookup = BiltransLookup::new(self, &word, start, end);
        let mut seentags = false;
        while lookup.advance(self, &mut seentags) {
            if let Some(failed) = lookup.not_present(input_word, with_delim) {
                return failed;
            }
        }
        lookup.finish(with_delim)
    }

    /// Like [`biltrans`](Self::biltrans) but also reports how many queued
    /// tag characters were appended unmatched.
    pub fn biltrans_with_queue(&self, input_word: &str, with_delim: bool) -> (String, usize) {
        let word: Vec<char> = input_word.chars().collect();
        let (start, end) = Self::delim_points(&word, with_delim);
        if word.get(start) == Some(&'*') {
            return (input_word.to_string(), 0);
        }

        let mut lookup = BiltransLookup::new(self, &word, start, end);
        let mut seentags = false;
        while lookup.advance(self, &mut seentags) {
            if let Some(failed) = lookup.not_present(input_word, with_delim) {
                return (failed, 0);
            }
        }

        // With no tags at all, only a complete match counts.
        if !seentags && !lookup.state.is_final(&self.all_finals) {
            return (Self::mark_not_present(input_word, with_delim), 0);
        }

        let queue_len = lookup.queue.chars().count();
        (lookup.finish(with_delim), queue_len)
    }

    /// Like [`biltrans`](Self::biltrans) but the queue mechanism is
    /// disabled: a partial match past the match point fails the unit.
    pub fn biltrans_without_queue(&self, input_word: &str, with_delim: bool) -> String {
        let word: Vec<char> = input_word.chars().collect();
        let (start, end) = Self::delim_points(&word, with_delim);
        if word.get(start) == Some(&'*') {
            return input_word.to_string();
        }

        let mut lookup = BiltransLookup::new(self, &word, start, end);
        let mut seentags = false;
        while lookup.advance(self, &mut seentags) {
            if lookup.dead && lookup.last_symbol.is_empty() {
                return Self::mark_not_present(input_word, with_delim);
            }
        }
        lookup.queue.clear();
        lookup.finish(with_delim)
    }

    /// Full-unit variant. The legacy build discarded results of very short
    /// units here; that guard only runs under `compat_trim_short`.
    pub fn biltrans_full(&self, input_word: &str, with_delim: bool) -> String {
        let word: Vec<char> = input_word.chars().collect();
        let (start, end) = Self::delim_points(&word, with_delim);
        if word.get(start) == Some(&'*') {
            return input_word.to_string();
        }

        let mut lookup = BiltransLookup::new(self, &word, start, end);
        let mut seentags = false;
        while lookup.advance(self, &mut seentags) {
            if let Some(failed) = lookup.not_present(input_word, with_delim) {
                return failed;
            }
        }

        if self.compat_trim_short && start + 3 < end {
            return "^$".to_string();
        }
        lookup.finish(with_delim)
    }

    fn delim_points(word: &[char], with_delim: bool) -> (usize, usize) {
        if with_delim {
            (1, word.len().saturating_sub(2))
        } else {
            (0, word.len().saturating_sub(1))
        }
    }

    pub(crate) fn mark_not_present(input_word: &str, with_delim: bool) -> String {
        if with_delim {
            let tail: String = input_word.chars().skip(1).collect();
            format!("^@{tail}")
        } else {
            format!("@{input_word}")
        }
    }
}

/// Shared stepping machinery of the `biltrans*` family.
struct BiltransLookup<'a> {
    word: &'a [char],
    index: usize,
    end: usize,
    mark: bool,
    uppercase: bool,
    firstupper: bool,
    state: State,
    result: String,
    queue: String,
    last_symbol: String,
    dead: bool,
}

impl<'a> BiltransLookup<'a> {
    fn new(proc: &FstProcessor, word: &'a [char], mut start: usize, end: usize) -> Self {
        let mut mark = false;
        if word.get(start) == Some(&'=') {
            start += 1;
            mark = true;
        }
        let firstupper = word.get(start).copied().map(chars::is_upper).unwrap_or(false);
        let uppercase = firstupper
            && word
                .get(start + 1)
                .copied()
                .map(chars::is_upper)
                .unwrap_or(false);
        BiltransLookup {
            word,
            index: start,
            end,
            mark,
            uppercase,
            firstupper,
            state: proc.initial_state.clone(),
            result: String::new(),
            queue: String::new(),
            last_symbol: String::new(),
            dead: false,
        }
    }

    /// Consume the next symbol of the unit. Returns false past the end.
    fn advance(&mut self, proc: &FstProcessor, seentags: &mut bool) -> bool {
        if self.index >= self.word.len() || self.index > self.end {
            return false;
        }
        let val: i32;
        self.last_symbol.clear();
        match self.word[self.index] {
            '\\' => {
                self.index += 1;
                val = self.word.get(self.index).copied().map(|c| c as i32).unwrap_or(0);
            }
            '<' => {
                let mut symbol = String::from('<');
                let mut j = self.index + 1;
                while j <= self.end {
                    symbol.push(self.word[j]);
                    if self.word[j] == '>' {
                        self.index = j;
                        break;
                    }
                    j += 1;
                }
                *seentags = true;
                val = proc.alphabet.symbol_code(&symbol);
                self.last_symbol = symbol;
            }
            c => val = c as i32,
        }
        self.index += 1;

        if !self.state.is_empty() {
            if !proc.alphabet.is_tag(val)
                && FstProcessor::is_upper_val(val)
                && !proc.case_sensitive
            {
                self.state
                    .step_fallback(&proc.pool, val, FstProcessor::lower_val(val));
            } else {
                self.state.step(&proc.pool, val);
            }
        }

        if self.state.is_final(&proc.all_finals) {
            self.result = self.state.filter_finals(
                &proc.all_finals,
                &proc.alphabet,
                &proc.escaped_chars,
                proc.display_weights,
                proc.max_analyses,
                proc.max_weight_classes,
                self.uppercase,
                self.firstupper,
                0,
            );
        }

        self.dead = self.state.is_empty();
        if self.dead && !self.last_symbol.is_empty() && !self.result.is_empty() {
            self.queue.push_str(&self.last_symbol);
        }
        true
    }

    /// After a dead step with nothing recoverable, the word is absent.
    fn not_present(&self, input_word: &str, with_delim: bool) -> Option<String> {
        if self.dead && (self.last_symbol.is_empty() || self.result.is_empty()) {
            Some(FstProcessor::mark_not_present(input_word, with_delim))
        } else {
            None
        }
    }

    /// Assemble the final text: delimiters, `=` mark, queued tags.
    fn finish(self, with_delim: bool) -> String {
        let body: String = self.result.chars().skip(1).collect();
        let mut assembled = if with_delim {
            if self.mark {
                format!("^={body}")
            } else {
                format!("^{body}")
            }
        } else if self.mark {
            format!("={body}")
        } else {
            body
        };

        if !self.queue.is_empty() {
            let with_queue = {
                let chars: Vec<char> = assembled.chars().collect();
                let mut out = String::new();
                let mut index = 0;
                while index < chars.len() {
                    match chars[index] {
                        '\\' => {
                            out.push('\\');
                            index += 1;
                            if index < chars.len() {
                                out.push(chars[index]);
                            }
                        }
                        '/' => {
                            out.push_str(&self.queue);
                            out.push('/');
                        }
                        c => out.push(c),
                    }
                    index += 1;
                }
                out.push_str(&self.queue);
                out
            };
            assembled = with_queue;
        }

        if with_delim {
            assembled.push('$');
        }
        assembled
    }
}
