// Reading and writing the dictionary container format with cold
// transducers, shared by the compiler and the trimmer.

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use morfo_fst::alphabet::Alphabet;
use morfo_fst::compression;
use morfo_fst::header::{self, Features, FEATURE_WEIGHTS};
use morfo_fst::transducer::Transducer;

use crate::CompError;

/// A dictionary in its compile-time form.
#[derive(Debug, Default)]
pub struct Dictionary {
    pub letters: String,
    pub alphabet: Alphabet,
    pub sections: BTreeMap<String, Transducer>,
}

impl Dictionary {
    /// Read a compiled dictionary back into its cold form.
    pub fn read<R: Read + Seek>(input: &mut R) -> Result<Self, CompError> {
        let features = header::read_header(input)?;
        let weighted = features.weighted();

        let letters = compression::read_string(input, "letter section")?;
        let alphabet = Alphabet::read(input)?;

        let mut sections = BTreeMap::new();
        let count = compression::read_vlen(input)? as usize;
        for _ in 0..count {
            let name = compression::read_string(input, "section name")?;
            let transducer = Transducer::read(input, weighted)?;
            sections.insert(name, transducer);
        }

        Ok(Dictionary {
            letters,
            alphabet,
            sections,
        })
    }

    /// Write the dictionary with the current feature flags (weights are
    /// always stored).
    pub fn write<W: Write>(&self, output: &mut W) -> Result<(), CompError> {
        header::write_header(Features(FEATURE_WEIGHTS), output)?;
        compression::write_string(&self.letters, output)?;
        self.alphabet.write(output)?;

        let non_empty: Vec<(&String, &Transducer)> = self
            .sections
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .collect();
        compression::write_vlen(non_empty.len() as u64, output)?;
        for (name, transducer) in non_empty {
            compression::write_string(name, output)?;
            transducer.write(output, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn container_roundtrip() {
        let mut dictionary = Dictionary {
            letters: "act".to_string(),
            alphabet: Alphabet::new(),
            sections: BTreeMap::new(),
        };
        let tag = dictionary.alphabet.pair('a' as i32, 'a' as i32);
        let mut section = Transducer::new();
        let end = section.insert_new_single_transduction(tag, 0, 0.25);
        section.set_final(end, 0.75);
        dictionary.sections.insert("main@standard".to_string(), section);

        let mut buf = Vec::new();
        dictionary.write(&mut buf).unwrap();
        let back = Dictionary::read(&mut Cursor::new(buf)).unwrap();

        assert_eq!(back.letters, "act");
        assert_eq!(back.sections.len(), 1);
        let section = &back.sections["main@standard"];
        assert_eq!(section.size(), 2);
        assert_eq!(section.get_finals()[&1], 0.75);
        assert_eq!(section.arcs(0)[0].weight, 0.25);
    }

    #[test]
    fn empty_sections_are_not_written() {
        let mut dictionary = Dictionary::default();
        dictionary.sections.insert("dead@standard".to_string(), Transducer::new());

        let mut buf = Vec::new();
        dictionary.write(&mut buf).unwrap();
        let back = Dictionary::read(&mut Cursor::new(buf)).unwrap();
        assert!(back.sections.is_empty());
    }
}
