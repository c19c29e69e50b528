// Chorale theory primitives.
//
// Value types the harmonizer and part writer are built on. Everything here
// is immutable once constructed; "changing" a roman numeral produces a new
// one via `RomanNumeral::with`.
//
// - note.rs: letters, accidentals, spelled pitch classes, absolute notes
// - interval.rs: spelled intervals, measuring and transposition
// - scale.rs: major/minor keys and scale-degree lookups
// - roman.rs: roman-numeral chords (text grammar, derived chord tones,
//   diatonic reinterpretation, key changes)
// - error.rs: construction errors

pub mod error;
pub mod interval;
pub mod note;
pub mod roman;
pub mod scale;

pub use error::TheoryError;
pub use interval::Interval;
pub use note::{Letter, Note, PitchClass};
pub use roman::{AppliedTarget, ChordQuality, Flags, RomanNumeral, RomanNumeralParams, RomanNumeralUpdate};
pub use scale::{Mode, Scale};
