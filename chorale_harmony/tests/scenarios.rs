// End-to-end scenarios for the part writer.
//
// Each test builds a constraint list the way a caller would (parsed notes
// and numerals), runs `PartWriter::voice_all`, and checks the first results
// against the rules they must satisfy. Only the public API is used.

use chorale_harmony::params::Modulation;
use chorale_harmony::rules::RuleBook;
use chorale_harmony::{
    Chord, CompleteChord, HarmonizerParameters, HarmonyError, IncompleteChord, PartWriter, PartWriterParameters,
    PartWritingParameters, Voice, VoiceSlot, YieldOrdering,
};
use chorale_theory::{Interval, Mode, RomanNumeral, Scale};

fn c_major() -> Scale {
    "C major".parse().unwrap()
}

fn writer(harmonizer: HarmonizerParameters, writing: &PartWritingParameters) -> PartWriter {
    PartWriter::new(harmonizer, PartWriterParameters::default(), writing).unwrap()
}

fn basic_writer() -> PartWriter {
    writer(HarmonizerParameters::with_sets(&["basic"]), &PartWritingParameters::default())
}

fn numerals(texts: &[&str]) -> Vec<IncompleteChord> {
    texts
        .iter()
        .map(|t| IncompleteChord::new().with_numeral(RomanNumeral::parse(t, c_major()).unwrap()))
        .collect()
}

fn melody(voice: Voice, notes: &[&str]) -> Vec<IncompleteChord> {
    notes
        .iter()
        .map(|n| IncompleteChord::new().with_voice(voice, VoiceSlot::parse(n).unwrap()))
        .collect()
}

fn names(chorale: &[CompleteChord]) -> Vec<String> {
    chorale.iter().map(|c| c.numeral.name().to_string()).collect()
}

/// Every rule failure anywhere in `chorale`, as (position, rule).
fn violations(rules: &RuleBook, chorale: &[CompleteChord]) -> Vec<(usize, String)> {
    let mut found = Vec::new();
    for (position, chord) in chorale.iter().enumerate() {
        let previous: Vec<&dyn Chord> = chorale[..position]
            .iter()
            .rev()
            .take(rules.lookback())
            .map(|c| c as &dyn Chord)
            .collect();
        for rule in rules.check_all(chord, &previous) {
            found.push((position, rule.to_string()));
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_authentic_cadence_numerals() {
    let writer = basic_writer();
    let solutions = writer.voice_all(&numerals(&["I", "V", "I"]), c_major()).unwrap();
    let first = solutions.first().expect("I V I must be voiceable");
    assert_eq!(names(&first), ["I", "V", "I"]);
    let failures = violations(writer.rules(), &first);
    assert!(failures.is_empty(), "first result breaks rules: {failures:?}");
    assert!(
        !failures.iter().any(|(_, rule)| rule == "parallel_perfects"),
        "no parallel fifths or octaves"
    );
}

#[test]
fn test_soprano_melody_is_kept() {
    let writer = basic_writer();
    let solutions = writer
        .voice_all(&melody(Voice::Soprano, &["E4", "D4", "E4"]), c_major())
        .unwrap();
    let first = solutions.first().expect("E D E harmonizes with the basic set");
    let soprano: Vec<String> = first.iter().map(|c| c.get(Voice::Soprano).to_string()).collect();
    assert_eq!(soprano, ["E4", "D4", "E4"]);
    assert_eq!(first.len(), 3);
}

#[test]
fn test_augmented_second_has_no_solution() {
    let writer = basic_writer();
    match writer.voice_all(&melody(Voice::Soprano, &["C5", "B4", "Ab4"]), c_major()) {
        Err(HarmonyError::Preflight { position, rule }) => {
            assert_eq!(position, 2);
            assert_eq!(rule, "melodic_intervals");
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("B4 to Ab4 must be refused before the search starts"),
    }
}

#[test]
fn test_pivot_modulation_to_dominant() {
    let harmonizer = HarmonizerParameters {
        can_modulate: true,
        modulations_allowed: vec![Modulation {
            interval: Interval::PERFECT_FIFTH,
            mode: Mode::Major,
        }],
        ..HarmonizerParameters::default()
    };
    let writer = writer(harmonizer, &PartWritingParameters::default());
    let mut constraints = numerals(&["I", "V/ii", "V", "I"]);
    constraints[1] = constraints[1].clone().with_flag("pivot", true);

    let solutions = writer.voice_all(&constraints, c_major()).unwrap();
    let first = solutions.first().expect("V/ii pivots to V/V in G");
    let g_major: Scale = "G major".parse().unwrap();
    assert!(first[1].numeral.flags().is_set("pivot"), "pivot chord is flagged");
    assert_eq!(first[2].numeral.scale(), g_major);
    assert_eq!(first[3].numeral.scale(), g_major);
    assert_eq!(names(&first[2..]), ["V", "I"]);
}

#[test]
fn test_caching_does_not_change_first_result() {
    let constraints = melody(Voice::Soprano, &["G4", "A4", "G4", "F4", "E4"]);
    let cached = basic_writer();
    let uncached = writer(
        HarmonizerParameters {
            disable_caching: true,
            ..HarmonizerParameters::with_sets(&["basic"])
        },
        &PartWritingParameters::default(),
    );
    let a = cached.voice_all(&constraints, c_major()).unwrap().first();
    let b = uncached.voice_all(&constraints, c_major()).unwrap().first();
    assert!(a.is_some());
    assert_eq!(a, b);
}

#[test]
fn test_results_are_deterministic() {
    let constraints = numerals(&["I", "IV", "V", "I"]);
    let first_run: Vec<Vec<CompleteChord>> = basic_writer()
        .voice_all(&constraints, c_major())
        .unwrap()
        .iter()
        .take(3)
        .collect();
    let second_run: Vec<Vec<CompleteChord>> = basic_writer()
        .voice_all(&constraints, c_major())
        .unwrap()
        .iter()
        .take(3)
        .collect();
    assert_eq!(first_run, second_run);
}

#[test]
fn test_disabled_rule_is_never_reported() {
    let writing = PartWritingParameters::default().without_rule("parallel_perfects");
    let writer = writer(HarmonizerParameters::with_sets(&["basic"]), &writing);
    assert!(!writer.rules().names().any(|n| n == "parallel_perfects"));

    let parallel: Vec<CompleteChord> = [("I", ["C5", "G4", "E4", "C3"]), ("ii", ["D5", "A4", "F4", "D3"])]
        .into_iter()
        .map(|(numeral, notes)| CompleteChord {
            numeral: RomanNumeral::parse(numeral, c_major()).unwrap(),
            notes: notes.map(|n| n.parse().unwrap()),
        })
        .collect();
    let failures = violations(writer.rules(), &parallel);
    assert!(!failures.iter().any(|(_, rule)| rule == "parallel_perfects"));
}

#[test]
fn test_every_result_passes_the_rules() {
    let writer = basic_writer();
    let constraints = melody(Voice::Soprano, &["E5", "D5", "C5", "D5", "C5"]);
    let solutions = writer.voice_all(&constraints, c_major()).unwrap();
    let mut checked = 0;
    for chorale in solutions.iter().take(5) {
        assert_eq!(chorale.len(), constraints.len());
        let failures = violations(writer.rules(), &chorale);
        assert!(failures.is_empty(), "{failures:?} in {}", names(&chorale).join(" "));
        checked += 1;
    }
    assert!(checked > 0, "a simple stepwise melody must harmonize");
}

#[test]
fn test_depth_ordering_finds_a_result() {
    let writer = PartWriter::new(
        HarmonizerParameters::with_sets(&["basic"]),
        PartWriterParameters {
            yield_ordering: YieldOrdering::DepthBest,
        },
        &PartWritingParameters::default(),
    )
    .unwrap();
    let solutions = writer.voice_all(&numerals(&["I", "vi", "IV", "V", "I"]), c_major()).unwrap();
    let first = solutions.first().expect("a plain cadential phrase");
    assert_eq!(names(&first), ["I", "vi", "IV", "V", "I"]);
}
