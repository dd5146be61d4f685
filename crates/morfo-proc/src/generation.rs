// Generation mode: `^lexform$` units in, inflected surface forms out.
//
// Content between units passes straight through. A unit whose lexical form
// starts with `*` or `%` was never analysed and is echoed per mode; `@`
// marks a form an earlier stage already failed to translate; anything else
// is run through the transducer and, when no path survives, reported with
// `#` according to the mode.

use std::io::{BufRead, Write};

use crate::input::InputStream;
use crate::processor::{write_char, FstProcessor};
use crate::{GenerationMode, ProcError};

impl FstProcessor {
    /// Copy input to output until `target` (exclusive), resolving escapes
    /// and honoring null-flush on NUL.
    pub(crate) fn skip_until<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
        target: char,
    ) -> Result<(), ProcError> {
        loop {
            let Some(val) = input.get()? else {
                return Ok(());
            };
            match val {
                '\\' => {
                    let Some(next) = input.get()? else {
                        return Ok(());
                    };
                    write_char(output, '\\')?;
                    write_char(output, next)?;
                }
                '\0' => {
                    write_char(output, val)?;
                    if self.null_flush_generation {
                        output.flush()?;
                    }
                }
                _ if val == target => return Ok(()),
                _ => write_char(output, val)?,
            }
        }
    }

    /// Generation-mode reader. Outside a unit everything is copied through
    /// until the next `^`; inside, escapes resolve to their literal
    /// character, tags resolve to symbol codes, and blanks print
    /// immediately. Returns `None` at end of stream.
    pub(crate) fn read_generation<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
    ) -> Result<Option<i32>, ProcError> {
        loop {
            let Some(mut val) = input.get()? else {
                return Ok(None);
            };

            if self.out_of_word {
                if val == '^' {
                    match input.get()? {
                        Some(next) => val = next,
                        None => return Ok(None),
                    }
                } else if val == '\\' {
                    write_char(output, val)?;
                    let Some(next) = input.get()? else {
                        return Ok(None);
                    };
                    write_char(output, next)?;
                    self.skip_until(input, output, '^')?;
                    match input.get()? {
                        Some(next) => val = next,
                        None => return Ok(None),
                    }
                } else {
                    write_char(output, val)?;
                    self.skip_until(input, output, '^')?;
                    match input.get()? {
                        Some(next) => val = next,
                        None => return Ok(None),
                    }
                }
                self.out_of_word = false;
            }

            match val {
                '\\' => {
                    let next = input.get()?.ok_or(ProcError::Stream)?;
                    return Ok(Some(next as i32));
                }
                '$' => {
                    self.out_of_word = true;
                    return Ok(Some('$' as i32));
                }
                '<' => {
                    let block = self.read_full_block(input, '<', '>')?;
                    return Ok(Some(self.alphabet.symbol_code(&block)));
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
                    // Blanks print immediately; keep reading.
                }
                _ => return Ok(Some(val as i32)),
            }
        }
    }

    /// Generation entry point; honors null-flush mode.
    pub fn generation<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
        mode: GenerationMode,
    ) -> Result<(), ProcError> {
        if self.null_flush {
            // Segmentation happens inline: every NUL between units is
            // copied through with a flush by the reader.
            self.null_flush_generation = true;
        }
        self.generation_inner(input, output, mode)?;
        output.flush()?;
        Ok(())
    }

    fn generation_inner<R: BufRead, W: Write>(
        &mut self,
        input: &mut InputStream<R>,
        output: &mut W,
        mode: GenerationMode,
    ) -> Result<(), ProcError> {
        let mut current_state = self.initial_state.clone();
        let mut sf = String::new();

        self.out_of_word = false;
        self.skip_until(input, output, '^')?;

        while let Some(mut val) = self.read_generation(input, output)? {
            if sf.is_empty() && val == '=' as i32 {
                write_char(output, '=')?;
                match self.read_generation(input, output)? {
                    Some(next) => val = next,
                    None => break,
                }
            }

            if val == '$' as i32 && self.out_of_word {
                self.emit_generated_unit(&current_state, &sf, mode, output)?;
                current_state = self.initial_state.clone();
                sf.clear();
            } else if Self::is_space(val) && sf.is_empty() {
                // Leading whitespace inside a unit carries nothing.
            } else if !sf.is_empty() && (sf.starts_with('*') || sf.starts_with('%')) {
                self.alphabet.get_symbol(&mut sf, val);
            } else {
                self.alphabet.get_symbol(&mut sf, val);
                if !current_state.is_empty() {
                    if !self.alphabet.is_tag(val)
                        && Self::is_upper_val(val)
                        && !self.case_sensitive
                    {
                        if mode == GenerationMode::CarefulCase {
                            current_state.step_careful(&self.pool, val, Self::lower_val(val));
                        } else {
                            current_state.step_fallback(&self.pool, val, Self::lower_val(val));
                        }
                    } else {
                        current_state.step(&self.pool, val);
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_generated_unit<W: Write>(
        &mut self,
        current_state: &morfo_fst::state::State,
        sf: &str,
        mode: GenerationMode,
        output: &mut W,
    ) -> Result<(), ProcError> {
        use GenerationMode::*;

        if sf.starts_with('*') || sf.starts_with('%') {
            match mode {
                Clean => {
                    let bare: String = sf.chars().skip(1).collect();
                    self.write_escaped(&bare, output)?;
                }
                TaggedNoMark => {
                    let bare: String = sf.chars().skip(1).collect();
                    write_char(output, '^')?;
                    self.write_escaped(Self::remove_tags(&bare), output)?;
                    write_char(output, '/')?;
                    self.write_escaped_with_tags(sf, output)?;
                    write_char(output, '$')?;
                }
                _ => self.write_escaped(sf, output)?,
            }
        } else if sf.starts_with('@') {
            match mode {
                All => self.write_escaped(sf, output)?,
                Clean => {
                    let bare: String = sf.chars().skip(1).collect();
                    self.write_escaped(Self::remove_tags(&bare), output)?;
                }
                Unknown | Tagged | CarefulCase => {
                    self.write_escaped(Self::remove_tags(sf), output)?;
                }
                TaggedNoMark => {
                    let bare: String = sf.chars().skip(1).collect();
                    write_char(output, '^')?;
                    self.write_escaped(Self::remove_tags(&bare), output)?;
                    write_char(output, '/')?;
                    self.write_escaped_with_tags(sf, output)?;
                    write_char(output, '$')?;
                }
            }
        } else if current_state.is_final(&self.all_finals) {
            let (uppercase, firstupper) = if self.dictionary_case {
                (false, false)
            } else {
                let mut chars = sf.chars();
                let first = chars.next();
                let second = chars.next();
                (
                    second.map(morfo_fst::chars::is_upper).unwrap_or(false),
                    first.map(morfo_fst::chars::is_upper).unwrap_or(false),
                )
            };

            if matches!(mode, Tagged | TaggedNoMark) {
                write_char(output, '^')?;
            }
            let generated = current_state.filter_finals(
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
            // Strip the leading '/'.
            let generated: String = generated.chars().skip(1).collect();
            output.write_all(generated.as_bytes())?;
            if matches!(mode, Tagged | TaggedNoMark) {
                write_char(output, '/')?;
                self.write_escaped_with_tags(sf, output)?;
                write_char(output, '$')?;
            }
        } else {
            match mode {
                All => {
                    write_char(output, '#')?;
                    self.write_escaped(sf, output)?;
                }
                Clean => self.write_escaped(Self::remove_tags(sf), output)?,
                Unknown | CarefulCase => {
                    if !sf.is_empty() {
                        write_char(output, '#')?;
                        self.write_escaped(Self::remove_tags(sf), output)?;
                    }
                }
                Tagged => {
                    write_char(output, '#')?;
                    self.write_escaped(Self::remove_tags(sf), output)?;
                }
                TaggedNoMark => {
                    write_char(output, '^')?;
                    self.write_escaped(Self::remove_tags(sf), output)?;
                    write_char(output, '/')?;
                    write_char(output, '#')?;
                    self.write_escaped_with_tags(sf, output)?;
                    write_char(output, '$')?;
                }
            }
        }
        Ok(())
    }
}
