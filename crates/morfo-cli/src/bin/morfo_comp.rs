// morfo-comp: compile an AT&T text transducer into a binary dictionary.
//
// Usage:
//   morfo-comp lr|rl input.att output.bin
//
// `lr` compiles the analysis direction, `rl` swaps the tape sides to
// produce the generation direction from the same source.

use std::fs::File;
use std::io::{BufWriter, Read};

use morfo_comp::att::AttCompiler;

fn usage() {
    println!("morfo-comp: compile an AT&T transducer to a binary dictionary.");
    println!();
    println!("Usage: morfo-comp lr|rl input.att output.bin");
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

    let read_rl = match positional[0].as_str() {
        "lr" => false,
        "rl" => true,
        other => morfo_cli::fatal(&format!("direction must be lr or rl, got '{other}'")),
    };

    let mut text = String::new();
    let mut input = morfo_cli::open_dictionary(&positional[1]);
    if let Err(e) = input.read_to_string(&mut text) {
        morfo_cli::fatal(&format!("cannot read '{}': {e}", positional[1]));
    }

    let mut compiler = AttCompiler::new();
    if let Err(e) = compiler.parse(&text, read_rl) {
        morfo_cli::fatal(&format!("{}: {e}", positional[1]));
    }
    let (dictionary, stats) = compiler.compile();

    let output = match File::create(&positional[2]) {
        Ok(file) => file,
        Err(e) => morfo_cli::fatal(&format!("cannot open '{}' for writing: {e}", positional[2])),
    };
    let mut output = BufWriter::new(output);
    if let Err(e) = dictionary.write(&mut output) {
        morfo_cli::fatal(&e.to_string());
    }

    for section in stats {
        println!("{} {} {}", section.name, section.states, section.arcs);
    }
}
