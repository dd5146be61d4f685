// End-to-end pipeline: AT&T text through the compiler into a binary
// dictionary, loaded back and run over text streams in every mode.

use std::io::{BufReader, Cursor};

use morfo_comp::att::AttCompiler;
use morfo_comp::trim::trim;
use morfo_proc::{FstProcessor, GenerationMode, InputStream};

/// cat -> cat<n>, with a shared a/c first arc as in the reference
/// dictionaries.
const CAT_ATT: &str = "0\t1\tc\tc\n0\t1\ta\ta\n1\t2\ta\ta\n2\t3\tt\tt\n3\t4\t@0@\t<n>\n4";

/// cat and dog analysers in one file.
const CAT_DOG_ATT: &str = concat!(
    "0\t1\tc\tc\n1\t2\ta\ta\n2\t3\tt\tt\n3\t4\t@0@\t<n>\n4\n",
    "---\n",
    "0\t1\td\td\n1\t2\to\to\n2\t3\tg\tg\n3\t4\t@0@\t<n>\n4",
);

/// Bilingual dictionary: cat<n> -> gato<n>.
const BIDIX_ATT: &str =
    "0\t1\tc\tg\n1\t2\ta\ta\n2\t3\tt\tt\n3\t4\t@0@\to\n4\t5\t<n>\t<n>\n5";

fn compile(att: &str, read_rl: bool) -> Vec<u8> {
    let mut compiler = AttCompiler::new();
    compiler.parse(att, read_rl).unwrap();
    let (dictionary, _) = compiler.compile();
    let mut buf = Vec::new();
    dictionary.write(&mut buf).unwrap();
    buf
}

fn loaded(bytes: &[u8]) -> FstProcessor {
    let mut processor = FstProcessor::new();
    processor.load(&mut Cursor::new(bytes.to_vec())).unwrap();
    processor
}

fn analyze_with(processor: &mut FstProcessor, text: &str) -> String {
    let mut input = InputStream::new(BufReader::new(text.as_bytes()));
    let mut output = Vec::new();
    processor.analysis(&mut input, &mut output).unwrap();
    String::from_utf8(output).unwrap()
}

fn analyze(att: &str, text: &str) -> String {
    let mut processor = loaded(&compile(att, false));
    processor.init_analysis().unwrap();
    processor.valid().unwrap();
    analyze_with(&mut processor, text)
}

fn generate(att: &str, text: &str, mode: GenerationMode) -> String {
    let mut processor = loaded(&compile(att, true));
    processor.init_generation();
    let mut input = InputStream::new(BufReader::new(text.as_bytes()));
    let mut output = Vec::new();
    processor.generation(&mut input, &mut output, mode).unwrap();
    String::from_utf8(output).unwrap()
}

#[test]
fn single_word_analysis() {
    assert_eq!(analyze(CAT_ATT, "cat"), "^cat/cat<n>$");
}

#[test]
fn case_folding_first_upper() {
    assert_eq!(analyze(CAT_ATT, "Cat"), "^Cat/Cat<n>$");
}

#[test]
fn all_caps_analysis() {
    assert_eq!(analyze(CAT_ATT, "CAT"), "^CAT/CAT<n>$");
}

#[test]
fn unknown_word() {
    assert_eq!(analyze(CAT_ATT, "dog"), "^dog/*dog$");
}

#[test]
fn blank_preservation() {
    assert_eq!(
        analyze(CAT_ATT, "cat [note] cat"),
        "^cat/cat<n>$ [note] ^cat/cat<n>$"
    );
}

#[test]
fn non_lexical_characters_pass_through() {
    assert_eq!(analyze(CAT_ATT, "cat."), "^cat/cat<n>$.");
    assert_eq!(analyze(CAT_ATT, "cat cat"), "^cat/cat<n>$ ^cat/cat<n>$");
}

#[test]
fn escaped_characters_in_input() {
    // An escaped dollar is an ordinary (non-alphabetic) character.
    assert_eq!(analyze(CAT_ATT, "cat\\$"), "^cat/cat<n>$\\$");
}

#[test]
fn generation_inverse() {
    assert_eq!(
        generate(CAT_ATT, "^cat<n>$", GenerationMode::Unknown),
        "cat"
    );
}

#[test]
fn generation_recovers_case() {
    assert_eq!(
        generate(CAT_ATT, "^Cat<n>$", GenerationMode::Unknown),
        "Cat"
    );
}

#[test]
fn generation_passes_interunit_material() {
    assert_eq!(
        generate(CAT_ATT, "one ^cat<n>$ two", GenerationMode::Unknown),
        "one cat two"
    );
}

#[test]
fn generation_marks_unmatched_forms() {
    assert_eq!(
        generate(CAT_ATT, "^dog<n>$", GenerationMode::Unknown),
        "#dog"
    );
    assert_eq!(
        generate(CAT_ATT, "^dog<n>$", GenerationMode::All),
        "#dog<n>"
    );
    assert_eq!(
        generate(CAT_ATT, "^dog<n>$", GenerationMode::Clean),
        "dog"
    );
}

#[test]
fn generation_unknown_words_pass_through() {
    assert_eq!(
        generate(CAT_ATT, "^*perro$", GenerationMode::Unknown),
        "*perro"
    );
    assert_eq!(
        generate(CAT_ATT, "^*perro$", GenerationMode::Clean),
        "perro"
    );
}

#[test]
fn tagged_generation_wraps_units() {
    assert_eq!(
        generate(CAT_ATT, "^cat<n>$", GenerationMode::Tagged),
        "^cat/cat<n>$"
    );
}

#[test]
fn null_flush_segmentation() {
    let mut processor = loaded(&compile(CAT_ATT, false));
    processor.init_analysis().unwrap();
    processor.set_null_flush(true);
    let out = analyze_with(&mut processor, "cat\0dog\0");
    assert_eq!(out, "^cat/cat<n>$\0^dog/*dog$\0");
}

#[test]
fn null_flush_keeps_engine_usable_between_segments() {
    let mut processor = loaded(&compile(CAT_ATT, false));
    processor.init_analysis().unwrap();
    processor.set_null_flush(true);
    let out = analyze_with(&mut processor, "cat\0cat cat\0cat\0");
    assert_eq!(
        out,
        "^cat/cat<n>$\0^cat/cat<n>$ ^cat/cat<n>$\0^cat/cat<n>$\0"
    );
}

#[test]
fn weights_are_displayed_on_request() {
    let att = "0\t1\tc\tc\t0.5\n1\t2\ta\ta\n2\t3\tt\tt\n3\t4\t@0@\t<n>\n4\t0.25";
    let mut processor = loaded(&compile(att, false));
    processor.init_analysis().unwrap();
    processor.set_display_weights_mode(true);
    let out = analyze_with(&mut processor, "cat");
    assert_eq!(out, "^cat/cat<n><W:0.750000>$");
}

#[test]
fn analysis_generation_round_trip() {
    let words = ["cat", "aat"];
    for word in words {
        let analysed = analyze(CAT_ATT, word);
        // ^word/word<n>$ -> feed the lexical side to generation.
        let lexical = analysed
            .split('/')
            .nth(1)
            .unwrap()
            .trim_end_matches('$')
            .to_string();
        let surface = generate(CAT_ATT, &format!("^{lexical}$"), GenerationMode::Unknown);
        assert_eq!(surface, word);
    }
}

#[test]
fn legacy_dictionary_without_header_loads() {
    use morfo_fst::compression;

    let bytes = compile(CAT_ATT, false);
    // Re-read as a dictionary and re-write by hand without the header,
    // weightless.
    let dictionary =
        morfo_comp::dictionary::Dictionary::read(&mut Cursor::new(bytes)).unwrap();
    let mut legacy = Vec::new();
    compression::write_string(&dictionary.letters, &mut legacy).unwrap();
    dictionary.alphabet.write(&mut legacy).unwrap();
    compression::write_vlen(dictionary.sections.len() as u64, &mut legacy).unwrap();
    for (name, section) in &dictionary.sections {
        compression::write_string(name, &mut legacy).unwrap();
        section.write(&mut legacy, false).unwrap();
    }

    let mut processor = loaded(&legacy);
    processor.init_analysis().unwrap();
    assert_eq!(analyze_with(&mut processor, "cat"), "^cat/cat<n>$");
}

#[test]
fn unknown_feature_flags_are_fatal() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"LTTB");
    bytes.extend_from_slice(&(0x4u64).to_le_bytes());
    let mut processor = FstProcessor::new();
    assert!(processor.load(&mut Cursor::new(bytes)).is_err());
}

#[test]
fn biltrans_translates_and_queues_tags() {
    let mut processor = loaded(&compile(BIDIX_ATT, false));
    processor.init_biltrans();

    assert_eq!(processor.biltrans("^cat<n>$", true), "^gato<n>$");
    // A tag past the bidix match point rides along unconsumed.
    assert_eq!(processor.biltrans("^cat<n><f>$", true), "^gato<n><f>$");
    // Unknown words pass through, untranslatable words get marked.
    assert_eq!(processor.biltrans("^*dog$", true), "^*dog$");
    assert_eq!(processor.biltrans("^dog<n>$", true), "^@dog<n>$");
}

#[test]
fn biltrans_with_queue_reports_queue_length() {
    let mut processor = loaded(&compile(BIDIX_ATT, false));
    processor.init_biltrans();
    let (out, queue_len) = processor.biltrans_with_queue("^cat<n><f>$", true);
    assert_eq!(out, "^gato<n><f>$");
    assert_eq!(queue_len, 3);

    let (out, queue_len) = processor.biltrans_with_queue("^cat<n>$", true);
    assert_eq!(out, "^gato<n>$");
    assert_eq!(queue_len, 0);
}

#[test]
fn biltrans_full_returns_real_result_by_default() {
    let mut processor = loaded(&compile(BIDIX_ATT, false));
    processor.init_biltrans();
    assert_eq!(processor.biltrans_full("^cat<n>$", true), "^gato<n>$");

    // The legacy guard is reproducible on demand.
    processor.set_compat_trim_short(true);
    assert_eq!(processor.biltrans_full("^cat<n>$", true), "^$");
}

#[test]
fn bilingual_stream_mode() {
    let mut processor = loaded(&compile(BIDIX_ATT, false));
    processor.init_biltrans();
    let mut input = InputStream::new(BufReader::new(
        "^cat<n>$ ^*dog$".as_bytes(),
    ));
    let mut output = Vec::new();
    processor
        .bilingual(&mut input, &mut output, GenerationMode::Unknown)
        .unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "^cat<n>/gato<n>$ ^*dog/*dog$"
    );
}

#[test]
fn trimmed_dictionary_drops_untranslatable_words() {
    let mono = compile(CAT_DOG_ATT, false);
    let bidix = compile(BIDIX_ATT, false);
    let (trimmed, _) = trim(&mut Cursor::new(mono), &mut Cursor::new(bidix)).unwrap();

    let mut bytes = Vec::new();
    trimmed.write(&mut bytes).unwrap();
    let mut processor = loaded(&bytes);
    processor.init_analysis().unwrap();

    assert_eq!(
        analyze_with(&mut processor, "cat dog"),
        "^cat/cat<n>$ ^dog/*dog$"
    );
}

#[test]
fn compound_decomposition_splits_unknowns() {
    let mut processor = loaded(&compile(CAT_ATT, false));
    processor.init_decomposition().unwrap();
    let out = analyze_with(&mut processor, "catcat");
    assert_eq!(out, "^catcat/cat<n>+cat<n>$");
}

#[test]
fn postgeneration_rewrites_triggered_segments() {
    // ~el -> del, committed on the following blank.
    let att = "0\t1\t~\td\n1\t2\te\te\n2\t3\tl\tl\n3\t4\t@_SPACE_@\t@_SPACE_@\n4";
    let mut processor = loaded(&compile(att, false));
    processor.init_postgeneration();
    let mut input = InputStream::new(BufReader::new("de ~el mar".as_bytes()));
    let mut output = Vec::new();
    processor.postgeneration(&mut input, &mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "de del mar");
}

#[test]
fn postgeneration_flushes_unmatched_triggers() {
    let att = "0\t1\t~\td\n1\t2\te\te\n2\t3\tl\tl\n3\t4\t@_SPACE_@\t@_SPACE_@\n4";
    let mut processor = loaded(&compile(att, false));
    processor.init_postgeneration();
    let mut input = InputStream::new(BufReader::new("~xy z".as_bytes()));
    let mut output = Vec::new();
    processor.postgeneration(&mut input, &mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "xy z");
}

#[test]
fn intergeneration_rewrites_without_wblank_machinery() {
    let att = "0\t1\t~\td\n1\t2\te\te\n2\t3\tl\tl\n3\t4\t@_SPACE_@\t@_SPACE_@\n4";
    let mut processor = loaded(&compile(att, false));
    processor.init_postgeneration();
    let mut input = InputStream::new(BufReader::new("de ~el mar".as_bytes()));
    let mut output = Vec::new();
    processor.intergeneration(&mut input, &mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "de del mar");
}

#[test]
fn transliteration_rewrites_spans() {
    let att = "0\t1\ta\tb\n1";
    let mut processor = loaded(&compile(att, false));
    processor.init_postgeneration();
    let mut input = InputStream::new(BufReader::new("a a.".as_bytes()));
    let mut output = Vec::new();
    processor.transliteration(&mut input, &mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "b b.");
}

#[test]
fn biltrans_without_queue_drops_trailing_tags() {
    let mut processor = loaded(&compile(BIDIX_ATT, false));
    processor.init_biltrans();
    assert_eq!(
        processor.biltrans_without_queue("^cat<n><f>$", true),
        "^gato<n>$"
    );
    assert_eq!(
        processor.biltrans_without_queue("^dog<n>$", true),
        "^@dog<n>$"
    );
}

#[test]
fn tm_analysis_abstracts_numbers() {
    let att = "0\t1\tx\tx\n1\t2\t@_SPACE_@\t@_SPACE_@\n2\t3\t<n>\t<n>\n3";
    let mut processor = loaded(&compile(att, false));
    processor.init_tm_analysis();
    let mut input = InputStream::new(BufReader::new("x 42.".as_bytes()));
    let mut output = Vec::new();
    processor.tm_analysis(&mut input, &mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "[x 42].");
}

#[test]
fn sao_tags_unknown_runs() {
    let mut processor = loaded(&compile(CAT_ATT, false));
    processor.init_sao().unwrap();
    let mut input = InputStream::new(BufReader::new("cat dog".as_bytes()));
    let mut output = Vec::new();
    processor.sao(&mut input, &mut output).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), "cat<n> <d>dog</d>");
}

#[test]
fn determinism_across_runs() {
    let first = analyze(CAT_ATT, "cat dog cat [x] cat.");
    let second = analyze(CAT_ATT, "cat dog cat [x] cat.");
    assert_eq!(first, second);
}

#[test]
fn invalid_dictionary_is_rejected() {
    // An entry with an empty left side makes the initial state final.
    let att = "0\t1\t@0@\t<n>\n1";
    let mut compiler = AttCompiler::new();
    // The epsilon prelude into this FST immediately violates the epsilon
    // classification rules.
    assert!(compiler.parse(att, false).is_err());
}
