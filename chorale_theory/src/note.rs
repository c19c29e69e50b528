// Spelled pitches: letters, accidentals, pitch classes and absolute notes.
//
// Chorale harmony cares about spelling, not just MIDI numbers: a C# and a
// Db sound the same but belong to different chords, and an augmented second
// (Ab up to B) is a different melodic interval than a minor third (G# up to
// B). So every pitch here carries its letter and accidental, and MIDI is
// derived from them rather than the other way around.
//
// `PitchClass` is a spelled pitch without octave (what a "pitch-class only"
// voice constraint holds). `Note` adds the octave and orders by MIDI pitch.
//
// See also: `interval.rs` for measuring and transposing, `scale.rs` for
// degree lookups.

use crate::error::TheoryError;
use crate::interval::Interval;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The seven natural note letters, in scale order starting from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    pub const ALL: [Letter; 7] = [
        Letter::C,
        Letter::D,
        Letter::E,
        Letter::F,
        Letter::G,
        Letter::A,
        Letter::B,
    ];

    /// Position within C D E F G A B (0-6).
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Letter at a (possibly negative or >6) step count from C.
    pub fn from_index(index: i32) -> Letter {
        Letter::ALL[index.rem_euclid(7) as usize]
    }

    /// Semitones above C of the natural letter.
    pub fn semitone(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    fn from_char(c: char) -> Option<Letter> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }
}

fn accidental_text(accidental: i8) -> String {
    match accidental.cmp(&0) {
        Ordering::Greater => "#".repeat(accidental as usize),
        Ordering::Less => "b".repeat(accidental.unsigned_abs() as usize),
        Ordering::Equal => String::new(),
    }
}

/// Split `text` into letter, accidental and the remaining suffix.
fn parse_spelling(text: &str) -> Option<(Letter, i8, &str)> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    let letter = Letter::from_char(first)?;
    let mut accidental: i8 = 0;
    let mut rest_start = first.len_utf8();
    for (i, c) in chars {
        match c {
            '#' => accidental += 1,
            'b' => accidental -= 1,
            _ => {
                rest_start = i;
                break;
            }
        }
        if accidental.abs() > 2 {
            return None;
        }
        rest_start = i + c.len_utf8();
    }
    Some((letter, accidental, &text[rest_start..]))
}

/// A spelled pitch class: letter plus accidental, no octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PitchClass {
    pub letter: Letter,
    /// Sharps positive, flats negative.
    pub accidental: i8,
}

impl PitchClass {
    pub fn new(letter: Letter, accidental: i8) -> Self {
        PitchClass { letter, accidental }
    }

    /// Semitone class 0-11 (C = 0).
    pub fn semitone(&self) -> i32 {
        (self.letter.semitone() + self.accidental as i32).rem_euclid(12)
    }

    /// Same sounding pitch class regardless of spelling.
    pub fn is_enharmonic(&self, other: &PitchClass) -> bool {
        self.semitone() == other.semitone()
    }

    /// Place this pitch class in a given octave.
    pub fn in_octave(&self, octave: i8) -> Note {
        Note::new(self.letter, self.accidental, octave)
    }

    /// Transpose upward, keeping spelling correct for the interval.
    pub fn transpose_up(&self, interval: Interval) -> PitchClass {
        self.in_octave(4).transpose_up(interval).pitch_class()
    }

    /// Transpose downward, keeping spelling correct for the interval.
    pub fn transpose_down(&self, interval: Interval) -> PitchClass {
        self.in_octave(4).transpose_down(interval).pitch_class()
    }

    /// The same letter raised or lowered by `delta` semitones.
    pub fn altered(&self, delta: i8) -> PitchClass {
        PitchClass::new(self.letter, self.accidental + delta)
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter.as_char(), accidental_text(self.accidental))
    }
}

impl FromStr for PitchClass {
    type Err = TheoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_spelling(s.trim()) {
            Some((letter, accidental, "")) => Ok(PitchClass::new(letter, accidental)),
            _ => Err(TheoryError::InvalidNote(s.to_string())),
        }
    }
}

/// An absolute, spelled pitch.
///
/// Ordered by sounding pitch (MIDI number); enharmonic equivalents fall
/// back to letter position so the order stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub letter: Letter,
    pub accidental: i8,
    /// Scientific octave: C4 is middle C.
    pub octave: i8,
}

impl Note {
    pub fn new(letter: Letter, accidental: i8, octave: i8) -> Self {
        Note {
            letter,
            accidental,
            octave,
        }
    }

    pub fn pitch_class(&self) -> PitchClass {
        PitchClass::new(self.letter, self.accidental)
    }

    /// MIDI note number (C4 = 60).
    pub fn midi(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.letter.semitone() + self.accidental as i32
    }

    /// Diatonic step count from C0, ignoring accidentals.
    pub fn step(&self) -> i32 {
        self.octave as i32 * 7 + self.letter.index()
    }

    /// Place `pitch_class` in the octave whose MIDI pitch lies nearest to
    /// `midi` (ties resolve downward).
    pub fn nearest(pitch_class: PitchClass, midi: i32) -> Note {
        let base = pitch_class.in_octave(4);
        let shift = (midi - base.midi()) as f64 / 12.0;
        let octave = 4 + shift.round() as i32;
        let mut note = pitch_class.in_octave(octave as i8);
        if note.midi() - midi == 6 {
            note.octave -= 1;
        }
        note
    }

    pub fn transpose_up(&self, interval: Interval) -> Note {
        self.transpose_by(interval.steps() as i32, interval.semitones())
    }

    pub fn transpose_down(&self, interval: Interval) -> Note {
        self.transpose_by(-(interval.steps() as i32), -interval.semitones())
    }

    fn transpose_by(&self, steps: i32, semitones: i32) -> Note {
        let step = self.step() + steps;
        let letter = Letter::from_index(step);
        let octave = step.div_euclid(7);
        let natural = (octave + 1) * 12 + letter.semitone();
        let accidental = self.midi() + semitones - natural;
        Note::new(letter, accidental as i8, octave as i8)
    }
}

impl Ord for Note {
    fn cmp(&self, other: &Self) -> Ordering {
        self.midi()
            .cmp(&other.midi())
            .then_with(|| self.step().cmp(&other.step()))
    }
}

impl PartialOrd for Note {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class(), self.octave)
    }
}

impl FromStr for Note {
    type Err = TheoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TheoryError::InvalidNote(s.to_string());
        let (letter, accidental, rest) = parse_spelling(s.trim()).ok_or_else(invalid)?;
        let octave: i8 = rest.parse().map_err(|_| invalid())?;
        if !(-1..=9).contains(&octave) {
            return Err(invalid());
        }
        Ok(Note::new(letter, accidental, octave))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        for text in ["C4", "F#3", "Bb2", "Ebb5", "G##4", "B-1"] {
            let note: Note = text.parse().unwrap();
            assert_eq!(note.to_string(), text);
        }
        assert!("H4".parse::<Note>().is_err());
        assert!("C".parse::<Note>().is_err());
        assert!("Cbbb4".parse::<Note>().is_err());
    }

    #[test]
    fn test_midi_numbers() {
        assert_eq!("C4".parse::<Note>().unwrap().midi(), 60);
        assert_eq!("A4".parse::<Note>().unwrap().midi(), 69);
        assert_eq!("B#3".parse::<Note>().unwrap().midi(), 60);
        assert_eq!("Cb4".parse::<Note>().unwrap().midi(), 59);
    }

    #[test]
    fn test_ordering_is_by_pitch() {
        let b3: Note = "B3".parse().unwrap();
        let c4: Note = "C4".parse().unwrap();
        let cb4: Note = "Cb4".parse().unwrap();
        assert!(b3 < c4);
        assert!(cb4 < c4);
        assert!(b3 < cb4, "enharmonics order by letter position");
    }

    #[test]
    fn test_nearest_placement() {
        let e: PitchClass = "E".parse().unwrap();
        assert_eq!(Note::nearest(e, 62).to_string(), "E4");
        assert_eq!(Note::nearest(e, 70).to_string(), "E4");
        assert_eq!(Note::nearest(e, 71).to_string(), "E5");
        assert_eq!(Note::nearest(e, 55).to_string(), "E3");
    }

    #[test]
    fn test_pitch_class_enharmonic() {
        let cs: PitchClass = "C#".parse().unwrap();
        let db: PitchClass = "Db".parse().unwrap();
        assert!(cs.is_enharmonic(&db));
        assert_ne!(cs, db);
    }

    #[test]
    fn test_long_accidental_run_is_an_error() {
        let sharps = format!("C{}4", "#".repeat(200));
        assert!(matches!(sharps.parse::<Note>(), Err(TheoryError::InvalidNote(_))));
        let flats = format!("E{}", "b".repeat(200));
        assert!(matches!(flats.parse::<PitchClass>(), Err(TheoryError::InvalidNote(_))));
    }
}
