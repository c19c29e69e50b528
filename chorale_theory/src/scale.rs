// Major and minor keys.
//
// Common-practice chorales are in major or minor keys, not the church modes.
// Minor keys are stored as natural minor; the raised leading tone is applied
// only where functional harmony wants it (chords built on the dominant and
// the leading tone), which is what `chord_tone` encodes.
//
// Used by roman.rs to find chord roots and by the part writer's rules to
// find leading tones and scale degrees.

use crate::error::TheoryError;
use crate::interval::Interval;
use crate::note::PitchClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    /// Semitone offsets from the tonic to each scale degree (1-7).
    pub fn intervals(self) -> [i32; 7] {
        match self {
            Mode::Major => [0, 2, 4, 5, 7, 9, 11],
            Mode::Minor => [0, 2, 3, 5, 7, 8, 10],
        }
    }
}

/// A key: tonic pitch class plus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scale {
    pub tonic: PitchClass,
    pub mode: Mode,
}

impl Scale {
    pub fn new(tonic: PitchClass, mode: Mode) -> Self {
        Scale { tonic, mode }
    }

    pub fn major(tonic: PitchClass) -> Self {
        Scale::new(tonic, Mode::Major)
    }

    pub fn minor(tonic: PitchClass) -> Self {
        Scale::new(tonic, Mode::Minor)
    }

    /// Natural scale degree `degree` (1-7; wraps beyond 7).
    pub fn degree(&self, degree: u8) -> PitchClass {
        let index = (degree as i32 - 1).rem_euclid(7);
        let letter = crate::note::Letter::from_index(self.tonic.letter.index() + index);
        let target = self.tonic.semitone() + self.mode.intervals()[index as usize];
        let mut accidental = (target - letter.semitone()).rem_euclid(12);
        if accidental > 6 {
            accidental -= 12;
        }
        PitchClass::new(letter, accidental as i8)
    }

    /// The tone `offset` scale steps above the root of the chord on
    /// `chord_degree`, with the minor-key leading tone raised inside
    /// dominant and leading-tone chords.
    pub fn chord_tone(&self, chord_degree: u8, offset: u8) -> PitchClass {
        let degree = (chord_degree as i32 - 1 + offset as i32).rem_euclid(7) as u8 + 1;
        let tone = self.degree(degree);
        if self.mode == Mode::Minor && degree == 7 && matches!(chord_degree, 5 | 7) {
            tone.altered(1)
        } else {
            tone
        }
    }

    /// The leading tone (raised seventh in minor).
    pub fn leading_tone(&self) -> PitchClass {
        match self.mode {
            Mode::Major => self.degree(7),
            Mode::Minor => self.degree(7).altered(1),
        }
    }

    /// Scale degree and chromatic alteration of a spelled pitch class,
    /// measured by letter distance from the tonic.
    pub fn degree_of(&self, pitch_class: PitchClass) -> (u8, i8) {
        let degree = (pitch_class.letter.index() - self.tonic.letter.index()).rem_euclid(7) as u8 + 1;
        let natural = self.degree(degree);
        (degree, pitch_class.accidental - natural.accidental)
    }

    /// Whether the spelled pitch class belongs to the (natural) scale.
    pub fn contains(&self, pitch_class: PitchClass) -> bool {
        self.degree_of(pitch_class).1 == 0
    }

    /// The key whose tonic lies `interval` above this tonic.
    pub fn transposed(&self, interval: Interval, mode: Mode) -> Scale {
        Scale::new(self.tonic.transpose_up(interval), mode)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            Mode::Major => "major",
            Mode::Minor => "minor",
        };
        write!(f, "{} {}", self.tonic, mode)
    }
}

impl FromStr for Scale {
    type Err = TheoryError;

    /// Parses `"C major"`, `"F# minor"`; a bare tonic means major.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TheoryError::InvalidScale(s.to_string());
        let mut parts = s.split_whitespace();
        let tonic: PitchClass = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let mode = match parts.next().map(|m| m.to_ascii_lowercase()) {
            None => Mode::Major,
            Some(m) if m == "major" => Mode::Major,
            Some(m) if m == "minor" => Mode::Minor,
            Some(_) => return Err(invalid()),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Scale::new(tonic, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(s: &str) -> Scale {
        s.parse().unwrap()
    }

    fn names(scale: &Scale) -> Vec<String> {
        (1..=7).map(|d| scale.degree(d).to_string()).collect()
    }

    #[test]
    fn test_major_degrees() {
        assert_eq!(names(&scale("C major")), ["C", "D", "E", "F", "G", "A", "B"]);
        assert_eq!(names(&scale("Eb major")), ["Eb", "F", "G", "Ab", "Bb", "C", "D"]);
        assert_eq!(names(&scale("F# major")), ["F#", "G#", "A#", "B", "C#", "D#", "E#"]);
    }

    #[test]
    fn test_minor_degrees_and_leading_tone() {
        let c_minor = scale("C minor");
        assert_eq!(names(&c_minor), ["C", "D", "Eb", "F", "G", "Ab", "Bb"]);
        assert_eq!(c_minor.leading_tone().to_string(), "B");
        // Third of V in minor is the raised leading tone
        assert_eq!(c_minor.chord_tone(5, 2).to_string(), "B");
        // but the fifth of III keeps the natural seventh
        assert_eq!(c_minor.chord_tone(3, 4).to_string(), "Bb");
    }

    #[test]
    fn test_degree_of() {
        let c = scale("C major");
        assert_eq!(c.degree_of("Bb".parse().unwrap()), (7, -1));
        assert_eq!(c.degree_of("G".parse().unwrap()), (5, 0));
        assert!(!c.contains("F#".parse().unwrap()));
    }

    #[test]
    fn test_transposed_key() {
        let g = scale("C major").transposed(Interval::PERFECT_FIFTH, Mode::Major);
        assert_eq!(g, scale("G major"));
        assert_eq!(g.to_string(), "G major");
    }
}
