// Postgeneration family: rewrite `~`-triggered segments with the
// postgenerator transducer, everything else passing through. The wordbound
// blank bookkeeping is what sets postgeneration apart from the simpler
// intergeneration; transliteration shares the reader but commits on any
// punctuation or space boundary instead of `~` triggers.

use std::io::{BufRead, Write};

use morfo_fst::chars;

use crate::input::InputStream;
use crate::processor::{write_char, FstProcessor};
use crate::ProcError;

impl FstProcessor {
    /// Read a wordbound-blank block during skip mode. Returns `true` when
    /// the word it wraps starts a postgeneration trigger (`~`), in which
    /// case the blank is queued instead of printed.
    pub(crate) fn wblank_post_gen<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<bool, ProcError> {
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
                if next != ']' {
                    continue;
                }
                let tail: Vec<char> = result.chars().rev().take(5).collect();
                // A closing [[/]] ends the whole block.
                if tail.len() == 5 && tail[4] == '[' && tail[3] == '[' && tail[2] == '/' {
                    output.write_all(result.as_bytes())?;
                    return Ok(false);
                }
                let Some(after) = input.get()? else {
                    return Err(ProcError::Stream);
                };
                if after == '~' {
                    self.wblankqueue.push_back(result);
                    return Ok(true);
                }
                result.push(after);
            }
        }
    }

    /// Postgeneration-mode reader. Unlike analysis, unescaped characters
    /// are all literal; only `<`, `[` and `\` have structure.
    pub(crate) fn read_postgeneration<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<i32, ProcError> {
        if !self.input_buffer.is_empty() {
            return Ok(self.input_buffer.next());
        }

        self.is_wblank = false;
        let Some(val) = input.get()? else {
            return Ok(0);
        };

        match val {
            '<' => {
                let block = self.read_full_block(input, '<', '>')?;
                let code = self.alphabet.symbol_code(&block);
                self.input_buffer.add(code);
                Ok(code)
            }
            '[' => {
                let next = input.get()?.ok_or(ProcError::Stream)?;
                if next == '[' {
                    if self.collect_wblanks {
                        let wblank = self.read_wblank(input)?;
                        self.wblankqueue.push_back(wblank);
                        self.is_wblank = true;
                        Ok(' ' as i32)
                    } else if self.wblank_post_gen(input, output)? {
                        Ok('~' as i32)
                    } else {
                        self.is_wblank = true;
                        Ok(' ' as i32)
                    }
                } else {
                    input.unget(next);
                    let blank = self.read_full_block(input, '[', ']')?;
                    self.blankqueue.push_back(blank);
                    self.input_buffer.add(' ' as i32);
                    Ok(' ' as i32)
                }
            }
            '\\' => {
                let escaped = self.read_escaped(input)?;
                self.input_buffer.add(escaped as i32);
                Ok(escaped as i32)
            }
            _ => {
                self.input_buffer.add(val as i32);
                Ok(val as i32)
            }
        }
    }

    /// Postgeneration entry point; honors null-flush mode.
    pub fn postgeneration<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        if self.null_flush {
            while input.peek()?.is_some() {
                self.postgeneration_inner(input, output)?;
                output.write_all(&[0])?;
                output.flush()?;
            }
            return Ok(());
        }
        self.postgeneration_inner(input, output)
    }

    fn postgeneration_inner<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        let mut skip_mode = true;
        self.collect_wblanks = false;
        self.need_end_wblank = false;
        let mut current_state = self.initial_state.clone();
        let mut lf = String::new();
        let mut sf = String::new();
        let mut last: u64 = 0;
        let empty_escapes = hashbrown::HashSet::new();

        loop {
            let val = self.read_postgeneration(input, output)?;
            if val == 0 {
                break;
            }

            if val == '~' as i32 {
                skip_mode = false;
                self.collect_wblanks = true;
            }

            if self.is_wblank && skip_mode {
                // A lone wordbound blank outside any trigger: ignore.
            } else if skip_mode {
                if Self::is_space(val) {
                    if self.need_end_wblank {
                        output.write_all(b"[[/]]")?;
                        self.need_end_wblank = false;
                    }
                    if let Some(c) = Self::to_char(val) {
                        self.print_space(c, output)?;
                    }
                } else {
                    if !self.need_end_wblank {
                        self.flush_wblanks(output)?;
                    }
                    if self.is_escaped(val) {
                        write_char(output, '\\')?;
                    }
                    if let Some(c) = Self::to_char(val) {
                        write_char(output, c)?;
                    }
                    if self.need_end_wblank {
                        output.write_all(b"[[/]]")?;
                        self.need_end_wblank = false;
                    }
                }
            } else {
                if self.is_wblank {
                    continue;
                }

                if current_state.is_final(&self.all_finals) {
                    let (uppercase, firstupper) = Self::trigger_case(&sf);
                    lf = current_state.filter_finals(
                        &self.all_finals,
                        &self.alphabet,
                        &empty_escapes,
                        self.display_weights,
                        self.max_analyses,
                        self.max_weight_classes,
                        uppercase,
                        firstupper,
                        0,
                    );
                    lf = Self::recase_next_word(&sf, lf);
                    last = self.input_buffer.get_pos();
                }

                if !Self::is_upper_val(val) || self.case_sensitive {
                    current_state.step(&self.pool, val);
                } else {
                    current_state.step_fallback(&self.pool, val, Self::lower_val(val));
                }

                if !current_state.is_empty() {
                    self.alphabet.get_symbol(&mut sf, val);
                } else {
                    let combined = self.combine_wblanks();
                    output.write_all(combined.as_bytes())?;

                    if lf.is_empty() {
                        self.emit_failed_trigger(&sf, output)?;
                    } else {
                        let chars: Vec<char> = lf.chars().collect();
                        // Between the '/' and the trailing context char.
                        let body: String =
                            chars[1..chars.len().saturating_sub(2)].iter().collect();
                        output.write_all(body.as_bytes())?;
                        self.input_buffer.set_pos(last);
                        self.input_buffer.back(2);
                        if let Some(&context) = chars.get(chars.len().wrapping_sub(2)) {
                            if context.is_whitespace() {
                                self.print_space(context, output)?;
                            } else {
                                if self.escaped_chars.contains(&context) {
                                    write_char(output, '\\')?;
                                }
                                write_char(output, context)?;
                            }
                        }
                    }

                    current_state = self.initial_state.clone();
                    lf.clear();
                    sf.clear();
                    skip_mode = true;
                    self.collect_wblanks = false;
                }
            }
        }

        self.flush_blanks(output)
    }

    /// Case flags of a `~`-led segment: the character after the tilde and
    /// the one after that.
    fn trigger_case(sf: &str) -> (bool, bool) {
        let mut iter = sf.chars();
        let _tilde = iter.next();
        let first = iter.next();
        let second = iter.next();
        let firstupper = first.map(chars::is_upper).unwrap_or(false);
        let uppercase = firstupper && second.map(chars::is_upper).unwrap_or(false);
        (uppercase, firstupper)
    }

    /// Carry the casing of the trailing word of `sf` (the start of the next
    /// word, already consumed as context) onto the tail of `lf`.
    fn recase_next_word(sf: &str, lf: String) -> String {
        let sf_chars: Vec<char> = sf.chars().collect();
        let mut carried: Vec<char> = Vec::new();
        for &c in sf_chars.iter().rev() {
            if c.is_alphabetic() {
                carried.insert(0, c);
            } else {
                break;
            }
        }
        if carried.is_empty() {
            return lf;
        }
        let next_firstupper = chars::is_upper(carried[0]);
        let next_uppercase = carried.len() > 1 && chars::is_upper(carried[1]);

        let mut out: Vec<char> = lf.chars().collect();
        for index in (0..out.len()).rev() {
            if out[index].is_alphabetic() {
                out[index] = if next_uppercase {
                    chars::to_upper(out[index])
                } else {
                    chars::to_lower(out[index])
                };
            } else {
                if next_firstupper && index + 1 < out.len() {
                    out[index + 1] = chars::to_upper(out[index + 1]);
                } else if index + 1 < out.len() {
                    out[index + 1] = chars::to_lower(out[index + 1]);
                }
                break;
            }
        }
        out.into_iter().collect()
    }

    /// No postgeneration rule matched: print the segment up to the next
    /// `~` (or all of it), rewinding whatever follows.
    fn emit_failed_trigger<W: Write>(&mut self, sf: &str, output: &mut W) -> Result<(), ProcError> {
        let chars: Vec<char> = sf.chars().collect();
        let mut mark = chars.len();
        let mut space_index = chars.len();
        for (index, &c) in chars.iter().enumerate().skip(1) {
            if c == '~' {
                mark = index;
                break;
            } else if c == ' ' {
                space_index = index;
            }
        }

        if space_index != chars.len() {
            let head: String = chars[1..space_index].iter().collect();
            output.write_all(head.as_bytes())?;
            if self.need_end_wblank {
                output.write_all(b"[[/]]")?;
                self.need_end_wblank = false;
                write_char(output, chars[space_index])?;
                self.flush_wblanks(output)?;
            } else {
                write_char(output, chars[space_index])?;
            }
            let tail: String = chars[space_index + 1..mark].iter().collect();
            output.write_all(tail.as_bytes())?;
        } else {
            self.flush_wblanks(output)?;
            let body: String = chars[1..mark].iter().collect();
            output.write_all(body.as_bytes())?;
        }

        if mark == chars.len() {
            self.input_buffer.back(1);
        } else {
            self.input_buffer.back((chars.len() - mark) as u64);
        }
        Ok(())
    }

    /// Intergeneration: like postgeneration but without the wordbound-blank
    /// machinery, and unmatched segments keep their `~`-free text.
    pub fn intergeneration<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        if self.null_flush {
            while input.peek()?.is_some() {
                self.intergeneration_inner(input, output)?;
                output.write_all(&[0])?;
                output.flush()?;
            }
            return Ok(());
        }
        self.intergeneration_inner(input, output)
    }

    fn intergeneration_inner<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        let mut skip_mode = true;
        let mut current_state = self.initial_state.clone();
        let mut target = String::new();
        let mut source = String::new();
        let mut last: u64 = 0;
        let empty_escapes = hashbrown::HashSet::new();

        loop {
            let val = self.read_postgeneration(input, output)?;

            if val == '~' as i32 {
                skip_mode = false;
            }

            if skip_mode {
                if Self::is_space(val) {
                    if let Some(c) = Self::to_char(val) {
                        self.print_space(c, output)?;
                    }
                } else if val != 0 {
                    if self.is_escaped(val) {
                        write_char(output, '\\')?;
                    }
                    if let Some(c) = Self::to_char(val) {
                        write_char(output, c)?;
                    }
                }
            } else {
                if current_state.is_final(&self.all_finals) {
                    let (uppercase, firstupper) = Self::trigger_case(&source);
                    target = current_state.filter_finals(
                        &self.all_finals,
                        &self.alphabet,
                        &empty_escapes,
                        self.display_weights,
                        self.max_analyses,
                        self.max_weight_classes,
                        uppercase,
                        firstupper,
                        0,
                    );
                    last = self.input_buffer.get_pos();
                }

                if val != 0 {
                    if !Self::is_upper_val(val) || self.case_sensitive {
                        current_state.step(&self.pool, val);
                    } else {
                        current_state.step_fallback(&self.pool, val, Self::lower_val(val));
                    }
                }

                if val != 0 && !current_state.is_empty() {
                    self.alphabet.get_symbol(&mut source, val);
                } else {
                    if target.is_empty() {
                        if val == 0 {
                            output.write_all(source.as_bytes())?;
                        } else {
                            let chars: Vec<char> = source.chars().collect();
                            if let Some(&first) = chars.first() {
                                write_char(output, first)?;
                            }
                            let mut mark = 1;
                            while mark < chars.len() && chars[mark] != '~' {
                                write_char(output, chars[mark])?;
                                mark += 1;
                            }
                            if mark != chars.len() {
                                self.input_buffer.back((chars.len() - mark) as u64);
                            }
                            if val == '~' as i32 {
                                self.input_buffer.back(1);
                            } else {
                                if let Some(c) = Self::to_char(val) {
                                    write_char(output, c)?;
                                }
                            }
                        }
                    } else {
                        for c in target.chars().skip(1) {
                            if c.is_whitespace() {
                                self.print_space(c, output)?;
                            } else {
                                if self.escaped_chars.contains(&c) {
                                    write_char(output, '\\')?;
                                }
                                write_char(output, c)?;
                            }
                        }
                        if val != 0 {
                            self.input_buffer.set_pos(last);
                            self.input_buffer.back(1);
                        }
                    }

                    current_state = self.initial_state.clone();
                    target.clear();
                    source.clear();
                    skip_mode = true;
                }
            }

            if val == 0 {
                break;
            }
        }

        self.flush_blanks(output)
    }

    /// Transliteration: no unit delimiters at all; the transducer rewrites
    /// maximal spans, committing at punctuation and whitespace.
    pub fn transliteration<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        if self.null_flush {
            while input.peek()?.is_some() {
                self.transliteration_inner(input, output)?;
                output.write_all(&[0])?;
                output.flush()?;
            }
            return Ok(());
        }
        self.transliteration_inner(input, output)
    }

    fn transliteration_inner<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        let mut current_state = self.initial_state.clone();
        let mut lf = String::new();
        let mut sf = String::new();
        let mut last: u64 = 0;

        loop {
            let val = self.read_postgeneration(input, output)?;
            if val == 0 {
                break;
            }

            let is_boundary = Self::to_char(val)
                .map(|c| chars::is_punct(c) || c.is_whitespace())
                .unwrap_or(false);

            if is_boundary {
                let (uppercase, firstupper) = Self::case_of(&sf);
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
                if !lf.is_empty() {
                    let body: String = lf.chars().skip(1).collect();
                    output.write_all(body.as_bytes())?;
                    current_state = self.initial_state.clone();
                    lf.clear();
                    sf.clear();
                }
                if Self::is_space(val) {
                    if let Some(c) = Self::to_char(val) {
                        self.print_space(c, output)?;
                    }
                } else {
                    if self.is_escaped(val) {
                        write_char(output, '\\')?;
                    }
                    if let Some(c) = Self::to_char(val) {
                        write_char(output, c)?;
                    }
                }
            } else {
                if current_state.is_final(&self.all_finals) {
                    let (uppercase, firstupper) = Self::case_of(&sf);
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
                }

                current_state.step(&self.pool, val);
                if !current_state.is_empty() {
                    self.alphabet.get_symbol(&mut sf, val);
                } else {
                    if !lf.is_empty() {
                        let body: String = lf.chars().skip(1).collect();
                        output.write_all(body.as_bytes())?;
                        self.input_buffer.set_pos(last);
                        self.input_buffer.back(1);
                    } else {
                        if Self::is_space(val) {
                            if let Some(c) = Self::to_char(val) {
                                self.print_space(c, output)?;
                            }
                        } else {
                            if self.is_escaped(val) {
                                write_char(output, '\\')?;
                            }
                            if let Some(c) = Self::to_char(val) {
                                write_char(output, c)?;
                            }
                        }
                    }
                    current_state = self.initial_state.clone();
                    lf.clear();
                    sf.clear();
                }
            }
        }

        self.flush_blanks(output)
    }
}
