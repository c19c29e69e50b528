// Chorale Harmonizer
//
// Four-voice (SATB) chorale harmonization in the common-practice style.
// Given per-position constraints (any mix of fixed notes, pitch classes,
// roman numerals and flags such as cadence labels) it searches for complete
// chorales that follow the progression tables, obey the hard voice-leading
// rules, and rank well on the soft preferences.
//
// Two searches are stacked: the harmonizer chooses roman numerals, the part
// writer voices them. Both produce lazy, memoized trees that are explored
// depth first, so the first result is cheap and callers stop whenever they
// have enough.
//
// Architecture:
// - lazy.rs: Memoized multi-consumer sequences and search forests
// - chord.rs: Voices, voice slots, constraint / harmonized / complete chords
// - matching.rs: Chord patterns that both test and generate numerals
// - tables.rs: Named progression, expansion and substitution rule sets
// - harmonizer.rs: Roman-numeral search with caching and modulation
// - rules.rs: Hard voice-leading rules and the per-config rule book
// - preferences.rs: Soft preferences and lazy lexicographic scores
// - part_writer.rs: Pre-flight, voicing search, voiceability pruning
// - ordering.rs: Greedy / global-best / depth-best result orderings
// - params.rs: serde configuration records
// - midi.rs: MIDI file output from finished chorales
// - error.rs: Fatal errors (configuration, input, pre-flight)
//
// Output is deterministic: identical constraints and configuration always
// produce the same sequence of results.

pub mod chord;
pub mod error;
pub mod harmonizer;
pub mod lazy;
pub mod matching;
pub mod midi;
pub mod ordering;
pub mod params;
pub mod part_writer;
pub mod preferences;
pub mod rules;
pub mod tables;

pub use chord::{Chord, CompleteChord, HarmonizedChord, IncompleteChord, Voice, VoiceSlot};
pub use error::HarmonyError;
pub use harmonizer::Harmonizer;
pub use params::{HarmonizerParameters, PartWriterParameters, PartWritingParameters, YieldOrdering};
pub use part_writer::{PartWriter, Solutions};
