// morfo-proc: run a compiled dictionary over a text stream.
//
// Usage:
//   morfo-proc [options] dictionary.bin [input [output]]
//
// Modes (default is analysis):
//   -a            morphological analysis
//   -g            generation
//   -b            bilingual lookup
//   -p            postgeneration
//   -x            intergeneration
//   -t            transliteration
//   -m            translation-memory analysis
//   -s            SAO tagging
//
// Options:
//   -z            null-flush: treat NUL as a segment boundary
//   -w            show weights as <W:…> tags
//   -n=N          keep at most N analyses
//   -N=K          keep at most K weight classes
//   -c            case-sensitive matching
//   -e            careful case in generation (exact case preferred)
//   -d            try compound decomposition for unknown words
//   --clean, --all, --tagged, --tagged-nm   generation flavor
//   --dictionary-case   use the dictionary's casing, ignore surface case
//   --surface-forms     bilingual input carries surface/ prefixes
//   --show-controls     keep compound control symbols in output
//   --compat-trim-short legacy biltrans-full guard
//   -h, --help    this help

use std::io::BufReader;

use morfo_proc::{FstProcessor, GenerationMode, InputStream};

fn usage() {
    println!("morfo-proc: process text with a compiled dictionary.");
    println!();
    println!("Usage: morfo-proc [options] dictionary.bin [input [output]]");
    println!();
    println!("Modes: -a analysis (default), -g generation, -b bilingual,");
    println!("       -p postgeneration, -x intergeneration, -t transliteration,");
    println!("       -m TM analysis, -s SAO");
    println!();
    println!("Options: -z null-flush, -w weights, -n=N max analyses,");
    println!("         -N=K max weight classes, -c case-sensitive,");
    println!("         -e careful case, -d decomposition,");
    println!("         --clean/--all/--tagged/--tagged-nm generation flavor,");
    println!("         --dictionary-case, --surface-forms, --show-controls");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if morfo_cli::wants_help(&args) {
        usage();
        return;
    }

    let (flags, positional) = morfo_cli::split_flags(&args);
    if positional.is_empty() {
        usage();
        std::process::exit(1);
    }

    let mut processor = FstProcessor::new();
    processor.set_null_flush(morfo_cli::has_flag(&flags, &["-z", "--null-flush"]));
    processor.set_display_weights_mode(morfo_cli::has_flag(&flags, &["-w", "--weights"]));
    processor.set_case_sensitive_mode(morfo_cli::has_flag(&flags, &["-c", "--case-sensitive"]));
    processor.set_dictionary_case_mode(morfo_cli::has_flag(&flags, &["--dictionary-case"]));
    processor.set_biltrans_surface_forms(morfo_cli::has_flag(&flags, &["--surface-forms"]));
    processor.set_show_control_symbols(morfo_cli::has_flag(&flags, &["--show-controls"]));
    processor.set_compat_trim_short(morfo_cli::has_flag(&flags, &["--compat-trim-short"]));

    if let Some(value) = morfo_cli::flag_value(&flags, &["-n", "--max-analyses"]) {
        match value.parse::<usize>() {
            Ok(n) if n > 0 => processor.set_max_analyses_value(n),
            _ => morfo_cli::fatal("-n takes a positive number"),
        }
    }
    if let Some(value) = morfo_cli::flag_value(&flags, &["-N", "--max-weight-classes"]) {
        match value.parse::<usize>() {
            Ok(n) if n > 0 => processor.set_max_weight_classes_value(n),
            _ => morfo_cli::fatal("-N takes a positive number"),
        }
    }

    let mut dictionary = morfo_cli::open_dictionary(&positional[0]);
    if let Err(e) = processor.load(&mut dictionary) {
        morfo_cli::fatal(&format!("cannot load '{}': {e}", positional[0]));
    }

    let decompose = morfo_cli::has_flag(&flags, &["-d", "--decompose"]);
    let careful = morfo_cli::has_flag(&flags, &["-e", "--careful-case"]);

    let generation_mode = if morfo_cli::has_flag(&flags, &["--clean"]) {
        GenerationMode::Clean
    } else if morfo_cli::has_flag(&flags, &["--all"]) {
        GenerationMode::All
    } else if morfo_cli::has_flag(&flags, &["--tagged"]) {
        GenerationMode::Tagged
    } else if morfo_cli::has_flag(&flags, &["--tagged-nm"]) {
        GenerationMode::TaggedNoMark
    } else if careful {
        GenerationMode::CarefulCase
    } else {
        GenerationMode::Unknown
    };

    let input = morfo_cli::open_input(positional.get(1).map(String::as_str));
    let mut input = InputStream::new(BufReader::new(input));
    let mut output = morfo_cli::open_output(positional.get(2).map(String::as_str));

    let result = if morfo_cli::has_flag(&flags, &["-g", "--generation"]) {
        processor.init_generation();
        processor.generation(&mut input, &mut output, generation_mode)
    } else if morfo_cli::has_flag(&flags, &["-b", "--bilingual"]) {
        processor.init_biltrans();
        processor.bilingual(&mut input, &mut output, generation_mode)
    } else if morfo_cli::has_flag(&flags, &["-p", "--postgeneration"]) {
        processor.init_postgeneration();
        processor.postgeneration(&mut input, &mut output)
    } else if morfo_cli::has_flag(&flags, &["-x", "--intergeneration"]) {
        processor.init_postgeneration();
        processor.intergeneration(&mut input, &mut output)
    } else if morfo_cli::has_flag(&flags, &["-t", "--transliteration"]) {
        processor.init_postgeneration();
        processor.transliteration(&mut input, &mut output)
    } else if morfo_cli::has_flag(&flags, &["-m", "--tm-analysis"]) {
        processor.init_tm_analysis();
        processor.tm_analysis(&mut input, &mut output)
    } else if morfo_cli::has_flag(&flags, &["-s", "--sao"]) {
        let init = processor.init_sao();
        init.and_then(|_| {
            processor.valid()?;
            processor.sao(&mut input, &mut output)
        })
    } else {
        let init = if decompose {
            processor.init_decomposition()
        } else {
            processor.init_analysis()
        };
        init.and_then(|_| {
            processor.valid()?;
            processor.analysis(&mut input, &mut output)
        })
    };

    if let Err(e) = result {
        morfo_cli::fatal(&e.to_string());
    }
    if let Err(e) = std::io::Write::flush(&mut output) {
        morfo_cli::fatal(&e.to_string());
    }
}
