// SAO mode: dictionary lookup over text with embedded CDATA blocks, for
// XML-tagged corpora. Unknown runs come out wrapped in `<d>…</d>`.

use std::io::{BufRead, Write};

use crate::input::InputStream;
use crate::processor::{write_char, FstProcessor};
use crate::ProcError;

impl FstProcessor {
    pub(crate) fn read_sao<R: BufRead>(
        &mut self,
        input: &mut InputStream<R>,
    ) -> Result<i32, ProcError> {
        if !self.input_buffer.is_empty() {
            return Ok(self.input_buffer.next());
        }

        let Some(val) = input.get()? else {
            return Ok(0);
        };

        if self.escaped_chars.contains(&val) {
            if val == '<' {
                let mut block = self.read_full_block(input, '<', '>')?;
                if block.starts_with("<![CDATA[") {
                    while !block.ends_with("]]>") {
                        let more = self.read_full_block(input, '<', '>')?;
                        block.push_str(&more[1..]);
                    }
                    self.blankqueue.push_back(block);
                    self.input_buffer.add(' ' as i32);
                    return Ok(' ' as i32);
                }
                return Err(ProcError::Stream);
            } else if val == '\\' {
                let escaped = self.read_escaped(input)?;
                if self.escaped_chars.contains(&escaped) {
                    self.input_buffer.add(escaped as i32);
                    return Ok(escaped as i32);
                }
                return Err(ProcError::Stream);
            }
            return Err(ProcError::Stream);
        }

        self.input_buffer.add(val as i32);
        Ok(val as i32)
    }

    fn print_sao_word<W: Write>(&self, lf: &str, output: &mut W) -> Result<(), ProcError> {
        for c in lf.chars().skip(1) {
            if c == '/' {
                break;
            }
            write_char(output, c)?;
        }
        Ok(())
    }

    pub fn sao<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<(), ProcError> {
        let mut last_incond = false;
        let mut last_postblank = false;
        let mut current_state = self.initial_state.clone();
        let mut lf = String::new();
        let mut sf = String::new();
        let mut last: u64 = 0;

        // SAO streams only escape the XML-active characters.
        self.escaped_chars.clear();
        self.escaped_chars.insert('\\');
        self.escaped_chars.insert('<');
        self.escaped_chars.insert('>');

        loop {
            let mut val = self.read_sao(input)?;
            if val == 0 {
                break;
            }

            if current_state.is_final(&self.all_finals) {
                let commit = if current_state.is_final(&self.inconditional) {
                    last_incond = true;
                    true
                } else if current_state.is_final(&self.postblank) {
                    last_postblank = true;
                    true
                } else if !self.is_alphabetic(val) {
                    last_incond = false;
                    last_postblank = false;
                    true
                } else {
                    false
                };
                if commit {
                    let (uppercase, firstupper) = Self::case_of(&sf);
                    lf = current_state.filter_finals_sao(
                        &self.all_finals,
                        &self.alphabet,
                        &self.escaped_chars,
                        uppercase,
                        firstupper,
                    );
                    last = self.input_buffer.get_pos();
                }
            } else if sf.is_empty() && Self::is_space(val) {
                lf = "/*".to_string();
                last_incond = false;
                last_postblank = false;
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
                if !self.is_alphabetic(val) && sf.is_empty() {
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
                } else if last_incond {
                    self.print_sao_word(&lf, output)?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                } else if last_postblank {
                    self.print_sao_word(&lf, output)?;
                    write_char(output, ' ')?;
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
                    loop {
                        self.alphabet.get_symbol(&mut sf, val);
                        val = self.read_sao(input)?;
                        if val == 0 || !self.is_alphabetic(val) {
                            break;
                        }
                    }
                    self.emit_sao_unknown(&sf, output)?;
                } else if lf.is_empty() {
                    self.emit_sao_unknown(&sf, output)?;
                } else {
                    self.print_sao_word(&lf, output)?;
                    self.input_buffer.set_pos(last);
                    self.input_buffer.back(1);
                }

                if val == 0 {
                    self.input_buffer.drain();
                }
                current_state = self.initial_state.clone();
                lf.clear();
                sf.clear();
                last_incond = false;
                last_postblank = false;
            }

            if val == 0 {
                break;
            }
        }

        self.flush_blanks(output)
    }

    fn emit_sao_unknown<W: Write>(&mut self, sf: &str, output: &mut W) -> Result<(), ProcError> {
        let size = sf.chars().count();
        let limit = self.first_not_alpha(sf).unwrap_or(size);
        self.input_buffer.back(1 + (size - limit) as u64);
        write!(output, "<d>{sf}</d>")?;
        Ok(())
    }
}
