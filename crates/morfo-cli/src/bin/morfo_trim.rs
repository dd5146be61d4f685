// morfo-trim: trim a monolingual dictionary against a bilingual one.
//
// Usage:
//   morfo-trim analyser.bin bidix.bin trimmed.bin
//
// Entries of the analyser with no translation in the bidix are removed;
// the output keeps the analyser's alphabet and letter set.

use std::fs::File;
use std::io::BufWriter;

use morfo_comp::trim::{trim, SectionOutcome};

fn usage() {
    println!("morfo-trim: trim a transducer to another transducer.");
    println!();
    println!("Usage: morfo-trim analyser.bin bidix.bin trimmed.bin");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if morfo_cli::wants_help(&args) {
        usage();
        return;
    }
    let (_, positional) = morfo_cli::split_flags(&args);
    if positional.len() != 3 {
        usage();
        std::process::exit(1);
    }

    let mut mono = morfo_cli::open_dictionary(&positional[0]);
    let mut bidix = morfo_cli::open_dictionary(&positional[1]);

    let (trimmed, outcomes) = match trim(&mut mono, &mut bidix) {
        Ok(result) => result,
        Err(e) => morfo_cli::fatal(&format!(
            "{e}\nhint: are these dictionaries for the same language pair?"
        )),
    };

    for (name, outcome) in &outcomes {
        match outcome {
            SectionOutcome::Kept { states, arcs } => println!("{name} {states} {arcs}"),
            SectionOutcome::EmptySection => {
                eprintln!("warning: section '{name}' was empty; skipping it")
            }
            SectionOutcome::NoFinalsLeft => {
                eprintln!("warning: section '{name}' has no final state after trimming; skipping it")
            }
        }
    }

    let output = match File::create(&positional[2]) {
        Ok(file) => file,
        Err(e) => morfo_cli::fatal(&format!("cannot open '{}' for writing: {e}", positional[2])),
    };
    let mut output = BufWriter::new(output);
    if let Err(e) = trimmed.write(&mut output) {
        morfo_cli::fatal(&e.to_string());
    }
}
