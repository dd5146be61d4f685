// Translation-memory analysis: digit runs collapse into `<n>` placeholders
// and blanks are deferred, both re-injected into the output so a TM index
// can key on the abstracted segment while keeping the original text.

use std::io::{BufRead, Write};

use morfo_fst::chars;

use crate::input::InputStream;
use crate::processor::{write_char, FstProcessor};
use crate::ProcError;

impl FstProcessor {
    pub(crate) fn read_tm_analysis<R: BufRead>(
        &mut self,
        input: &mut InputStream<R>,
    ) -> Result<i32, ProcError> {
        self.is_last_blank_tm = false;
        if !self.input_buffer.is_empty() {
            return Ok(self.input_buffer.next());
        }

        let Some(val) = input.get()? else {
            return Ok(0);
        };

        if self.escaped_chars.contains(&val) || val.is_ascii_digit() {
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
                    self.is_last_blank_tm = true;
                    return Ok(' ' as i32);
                }
                '\\' => {
                    let escaped = self.read_escaped(input)?;
                    self.input_buffer.add(escaped as i32);
                    return Ok(escaped as i32);
                }
                '0'..='9' => {
                    let mut digits = String::new();
                    digits.push(val);
                    loop {
                        match input.get()? {
                            Some(c) if c.is_ascii_digit() => digits.push(c),
                            Some(c) => {
                                input.unget(c);
                                break;
                            }
                            None => break,
                        }
                    }
                    let code = self.alphabet.symbol_code("<n>");
                    if code == 0 {
                        // Dictionary without the placeholder symbol: treat
                        // the first digit literally and replay the rest.
                        for c in digits.chars().rev().take(digits.len() - 1) {
                            input.unget(c);
                        }
                        self.input_buffer.add(val as i32);
                        return Ok(val as i32);
                    }
                    self.input_buffer.add(code);
                    self.numbers.push(digits);
                    return Ok(code);
                }
                _ => return Err(ProcError::Stream),
            }
        }

        self.input_buffer.add(val as i32);
        Ok(val as i32)
    }

    pub fn tm_analysis<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        let number_code = self.alphabet.symbol_code("<n>");
        let mut current_state = self.initial_state.clone();
        let mut lf = String::new();
        let mut sf = String::new();
        let mut last: u64 = 0;

        loop {
            let mut val = self.read_tm_analysis(input)?;
            if val == 0 {
                break;
            }
            let is_punct_val = Self::to_char(val).map(chars::is_punct).unwrap_or(false);

            if current_state.is_final(&self.all_finals) {
                if is_punct_val {
                    let rendered = current_state.filter_finals_tm(
                        &self.all_finals,
                        &self.alphabet,
                        &self.escaped_chars,
                        &mut self.blankqueue,
                        &self.numbers,
                    );
                    lf = rendered.chars().skip(1).collect();
                    last = self.input_buffer.get_pos();
                    self.numbers.clear();
                }
            } else if sf.is_empty() && Self::is_space(val) {
                last = self.input_buffer.get_pos();
            }

            if !Self::is_upper_val(val) {
                current_state.step(&self.pool, val);
            } else {
                current_state.step_fallback(&self.pool, val, Self::lower_val(val));
            }

            if !current_state.is_empty() {
                self.append_tm_symbol(&mut sf, val, number_code);
            } else {
                let is_space_val = Self::is_space(val);
                if (is_space_val || is_punct_val) && sf.is_empty() {
                    if is_space_val {
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
                } else if !is_space_val && !is_punct_val
                    && (sf
                        .chars()
                        .count()
                        .saturating_sub(self.input_buffer.diff_prev_pos(last) as usize)
                        > self.last_blank(&sf)
                        || lf.is_empty())
                {
                    // Unmatched run: collect it whole and echo it.
                    loop {
                        self.append_tm_symbol(&mut sf, val, number_code);
                        val = self.read_tm_analysis(input)?;
                        if val == 0 {
                            output.write_all(sf.as_bytes())?;
                            return Ok(());
                        }
                        let boundary = Self::is_space(val)
                            || Self::to_char(val).map(chars::is_punct).unwrap_or(false);
                        if boundary {
                            break;
                        }
                    }
                    self.input_buffer.back(1);
                    output.write_all(sf.as_bytes())?;
                    self.discard_covered_blanks();
                } else if lf.is_empty() {
                    self.input_buffer.back(1);
                    output.write_all(sf.as_bytes())?;
                    self.discard_covered_blanks();
                } else {
                    write_char(output, '[')?;
                    output.write_all(lf.as_bytes())?;
                    write_char(output, ']')?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                }

                current_state = self.initial_state.clone();
                lf.clear();
                sf.clear();
            }
        }

        self.flush_blanks(output)
    }

    fn append_tm_symbol(&mut self, sf: &mut String, val: i32, number_code: i32) {
        if number_code != 0 && val == number_code {
            if let Some(digits) = self.numbers.last() {
                sf.push_str(digits);
                return;
            }
        }
        if self.is_last_blank_tm && val == ' ' as i32 {
            if let Some(blank) = self.blankqueue.back() {
                sf.push_str(blank);
                return;
            }
        }
        self.alphabet.get_symbol(sf, val);
    }

    /// Blanks already copied into an echoed surface run are dropped; only
    /// a just-read trailing blank survives for the next token.
    fn discard_covered_blanks(&mut self) {
        while self.blankqueue.len() > if self.is_last_blank_tm { 1 } else { 0 } {
            self.blankqueue.pop_front();
        }
    }
}
