// Analysis mode: surface text in, `^surface/analysis$` lexical units out.

use std::io::{BufRead, Write};

use morfo_fst::state::State;
use morfo_fst::MAX_COMBINATIONS;

use crate::input::InputStream;
use crate::processor::{write_char, FstProcessor};
use crate::ProcError;

impl FstProcessor {
    /// Analysis-mode reader. Translates `<tag>` blocks to symbol codes,
    /// queues blanks and wordbound blanks (returning a plain space in their
    /// stead), resolves escapes, and records everything in the input buffer
    /// so the driver can rewind. Returns 0 at end of stream.
    pub(crate) fn read_analysis<R: BufRead>(
        &mut self,
        input: &mut InputStream<R>,
    ) -> Result<i32, ProcError> {
        if !self.input_buffer.is_empty() {
            return Ok(self.input_buffer.next());
        }

        let Some(mut val) = input.get()? else {
            self.input_buffer.add(0);
            return Ok(0);
        };

        if (self.use_ignored_chars || self.use_default_ignored_chars)
            && self.ignored_chars.contains(&val)
        {
            self.input_buffer.add(val as i32);
            match input.get()? {
                Some(next) => val = next,
                None => {
                    self.input_buffer.add(0);
                    return Ok(0);
                }
            }
        }

        if self.escaped_chars.contains(&val) {
            match val {
                '<' => {
                    let block = self.read_full_block(input, '<', '>')?;
                    let code = self.alphabet.symbol_code(&block);
                    self.input_buffer.add(code);
                    return Ok(code);
                }
                '[' => {
                    let next = input.get()?.ok_or(ProcError::Stream)?;
                    if next == '[' {
                        let wblank = self.read_wblank(input)?;
                        self.blankqueue.push_back(wblank);
                    } else {
                        input.unget(next);
                        let blank = self.read_full_block(input, '[', ']')?;
                        self.blankqueue.push_back(blank);
                    }
                    self.input_buffer.add(' ' as i32);
                    return Ok(' ' as i32);
                }
                '\\' => {
                    let escaped = self.read_escaped(input)?;
                    self.input_buffer.add(escaped as i32);
                    return Ok(escaped as i32);
                }
                _ => return Err(ProcError::Stream),
            }
        }

        if val == ' ' {
            self.blankqueue.push_back(" ".to_string());
        }

        self.input_buffer.add(val as i32);
        Ok(val as i32)
    }

    fn step_analysis(&mut self, state: &mut State, val: i32) {
        if self.use_restore_chars {
            if let Some(c) = Self::to_char(val) {
                if let Some(candidates) = self.rcx_map.get(&c) {
                    let mut alternates = candidates.clone();
                    if Self::is_upper_val(val) && !self.case_sensitive {
                        let lowered = Self::lower_val(val);
                        alternates.insert(lowered);
                        if let Some(more) = Self::to_char(lowered)
                            .and_then(|lc| self.rcx_map.get(&lc))
                        {
                            alternates.extend(more.iter().copied());
                        }
                    }
                    state.step_alternates(&self.pool, val, &alternates);
                    return;
                }
            }
        }
        if !Self::is_upper_val(val) || self.case_sensitive {
            state.step(&self.pool, val);
        } else {
            state.step_fallback(&self.pool, val, Self::lower_val(val));
        }
    }

    fn detect_case(&self, sf: &str) -> (bool, bool) {
        if self.dictionary_case {
            return (false, false);
        }
        let firstupper = sf.chars().next().map(Self::char_is_upper).unwrap_or(false);
        let uppercase =
            firstupper && sf.chars().last().map(Self::char_is_upper).unwrap_or(false);
        (uppercase, firstupper)
    }

    fn char_is_upper(c: char) -> bool {
        morfo_fst::chars::is_upper(c)
    }

    /// Analysis entry point; honors null-flush mode.
    pub fn analysis<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        if self.null_flush {
            while input.peek()?.is_some() {
                self.analysis_inner(input, output)?;
                output.write_all(&[0])?;
                output.flush()?;
            }
            return Ok(());
        }
        self.analysis_inner(input, output)
    }

    fn analysis_inner<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        let mut last_incond = false;
        let mut last_postblank = false;
        let mut last_preblank = false;
        let mut current_state = self.initial_state.clone();
        let mut lf = String::new();
        let mut sf = String::new();
        let mut last: u64 = 0;

        loop {
            let mut val = self.read_analysis(input)?;

            // Remember the latest viable commit point, together with which
            // finality subset it came from. A standard final is only a
            // commit point once the next symbol leaves the word.
            if current_state.is_final(&self.all_finals) {
                #[derive(Clone, Copy)]
                enum Commit {
                    Incond,
                    Postblank,
                    Preblank,
                    Plain,
                }
                let kind = if current_state.is_final(&self.inconditional) {
                    Some(Commit::Incond)
                } else if current_state.is_final(&self.postblank) {
                    Some(Commit::Postblank)
                } else if current_state.is_final(&self.preblank) {
                    Some(Commit::Preblank)
                } else if !self.is_alphabetic(val) {
                    Some(Commit::Plain)
                } else {
                    None
                };
                if let Some(kind) = kind {
                    let (uppercase, firstupper) = self.detect_case(&sf);
                    if self.do_decomposition && self.compound_only_l_symbol != 0 {
                        current_state
                            .prune_states_with_forbidden_symbol(self.compound_only_l_symbol);
                    }
                    lf = current_state.filter_finals(
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
                    last = self.input_buffer.get_pos();
                    last_incond = matches!(kind, Commit::Incond);
                    last_postblank = matches!(kind, Commit::Postblank);
                    last_preblank = matches!(kind, Commit::Preblank);
                }
            } else if sf.is_empty() && Self::is_space(val) {
                lf = "/*".to_string();
                last_incond = false;
                last_postblank = false;
                last_preblank = false;
                last = self.input_buffer.get_pos();
            }

            self.step_analysis(&mut current_state, val);
            if current_state.overflowed() {
                eprintln!(
                    "warning: frontier exceeded {MAX_COMBINATIONS} live paths; giving up on current token"
                );
            }

            if !current_state.is_empty() {
                if val != 0 {
                    self.alphabet.get_symbol(&mut sf, val);
                }
            } else {
                if !self.is_alphabetic(val) && sf.is_empty() {
                    if Self::is_space(val) {
                        if let Some(blank) = self.blankqueue.pop_front() {
                            output.write_all(blank.as_bytes())?;
                        } else if let Some(c) = Self::to_char(val) {
                            write_char(output, c)?;
                        }
                    } else {
                        if self.is_escaped(val) {
                            write_char(output, '\\')?;
                        }
                        if let Some(c) = Self::to_char(val) {
                            write_char(output, c)?;
                        }
                    }
                } else if last_postblank {
                    let diff = self.input_buffer.diff_prev_pos(last) as usize;
                    let surface = Self::chop_chars(&sf, diff).to_string();
                    self.print_word_pop_blank(&surface, &lf, output)?;
                    write_char(output, ' ')?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                } else if last_preblank {
                    let diff = self.input_buffer.diff_prev_pos(last) as usize;
                    let surface = Self::chop_chars(&sf, diff).to_string();
                    write_char(output, ' ')?;
                    self.print_word_pop_blank(&surface, &lf, output)?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                } else if last_incond {
                    let diff = self.input_buffer.diff_prev_pos(last) as usize;
                    let surface = Self::chop_chars(&sf, diff).to_string();
                    self.print_word_pop_blank(&surface, &lf, output)?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                } else if self.is_alphabetic(val)
                    && (sf
                        .chars()
                        .count()
                        .saturating_sub(self.input_buffer.diff_prev_pos(last) as usize)
                        > self.last_blank(&sf)
                        || lf.is_empty())
                {
                    // No viable match: greedily take the whole alphabetic
                    // run and emit it as unknown (or try compounding).
                    loop {
                        self.alphabet.get_symbol(&mut sf, val);
                        val = self.read_analysis(input)?;
                        if val == 0 || !self.is_alphabetic(val) {
                            break;
                        }
                    }
                    self.emit_longest_unknown(&sf, output)?;
                } else if lf.is_empty() {
                    self.emit_longest_unknown(&sf, output)?;
                } else {
                    let diff = self.input_buffer.diff_prev_pos(last) as usize;
                    let surface = Self::chop_chars(&sf, diff).to_string();
                    self.print_word_pop_blank(&surface, &lf, output)?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                }

                if val == 0 {
                    // End of segment: nothing buffered may leak into the
                    // next null-flush segment.
                    self.input_buffer.drain();
                }

                current_state = self.initial_state.clone();
                lf.clear();
                sf.clear();
                last_incond = false;
                last_postblank = false;
                last_preblank = false;
            }

            if val == 0 {
                break;
            }
        }

        self.flush_blanks(output)
    }

    /// Unknown-word tail: split the collected surface at its first
    /// non-alphabetic character, rewind past the rest, and emit the word as
    /// unknown or as a compound analysis.
    fn emit_longest_unknown<W: Write>(
        &mut self,
        sf: &str,
        output: &mut W,
    ) -> Result<(), ProcError> {
        let size = sf.chars().count();
        let limit = self.first_not_alpha(sf).unwrap_or(size);
        if limit == 0 {
            self.input_buffer.back(size as u64);
            let first: String = sf.chars().take(1).collect();
            self.write_escaped(&first, output)?;
            return Ok(());
        }
        self.input_buffer.back(1 + (size - limit) as u64);
        let unknown: String = sf.chars().take(limit).collect();
        if self.do_decomposition {
            let (uppercase, firstupper) = self.detect_case(sf);
            let compound = self.compound_analysis(&unknown, uppercase, firstupper);
            if !compound.is_empty() {
                self.print_word(&unknown, &compound, output)?;
                return Ok(());
            }
        }
        self.print_unknown_word(&unknown, output)
    }

    /// Try to read an unknown word as a compound: between characters, any
    /// prefix that is a complete entry may restart at the initial state,
    /// the pieces joined with `+`. The element markers are enforced at the
    /// end.
    pub(crate) fn compound_analysis(
        &mut self,
        input_word: &str,
        uppercase: bool,
        firstupper: bool,
    ) -> String {
        let mut current_state = self.initial_state.clone();
        let word: Vec<char> = input_word.chars().collect();

        for (index, &c) in word.iter().enumerate() {
            current_state.step_case(&self.pool, c, self.case_sensitive);

            if current_state.overflowed() {
                eprintln!(
                    "warning: compound analysis gave up on '{input_word}' at character {index} '{c}'"
                );
                return String::new();
            }

            if index + 1 < word.len() {
                current_state.restart_finals(
                    &self.all_finals,
                    self.compound_only_l_symbol,
                    &self.initial_state,
                    '+' as i32,
                );
            }

            if current_state.is_empty() {
                return String::new();
            }
        }

        current_state.prune_compounds(
            self.compound_r_symbol,
            '+' as i32,
            self.compound_max_elements,
        );
        current_state.filter_finals(
            &self.all_finals,
            &self.alphabet,
            &self.escaped_chars,
            self.display_weights,
            self.max_analyses,
            self.max_weight_classes,
            uppercase,
            firstupper,
            0,
        )
    }

    /// Detect case like the analysis loop does, for callers outside it.
    pub(crate) fn case_of(sf: &str) -> (bool, bool) {
        let mut iter = sf.chars();
        let first = iter.next();
        let firstupper = first.map(Self::char_is_upper).unwrap_or(false);
        let uppercase = firstupper
            && sf.chars().last().map(Self::char_is_upper).unwrap_or(false);
        (uppercase, firstupper)
    }
}
