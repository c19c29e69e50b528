// Spelled intervals.
//
// An interval is a pair (generic size, semitones): a major third is 2 letter
// steps and 4 semitones, a diminished fourth is 3 steps and 4 semitones.
// Quality (P/M/m/A/d) is derived from the pair. Keeping the generic size is
// what lets the part writer tell an augmented second from a minor third.
//
// Also carries the MIDI-level helpers the voice-leading rules use (interval
// class, perfect consonance), which only look at semitones.

use crate::error::TheoryError;
use crate::note::Note;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semitones of the major/perfect interval for each simple size.
const REFERENCE: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    DoublyDiminished,
    Diminished,
    Minor,
    Perfect,
    Major,
    Augmented,
    DoublyAugmented,
}

impl Quality {
    fn symbol(self) -> &'static str {
        match self {
            Quality::DoublyDiminished => "dd",
            Quality::Diminished => "d",
            Quality::Minor => "m",
            Quality::Perfect => "P",
            Quality::Major => "M",
            Quality::Augmented => "A",
            Quality::DoublyAugmented => "AA",
        }
    }
}

fn is_perfect_class(simple_steps: u8) -> bool {
    matches!(simple_steps, 0 | 3 | 4)
}

/// An undirected spelled interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    steps: u8,
    semitones: i32,
}

impl Interval {
    pub const UNISON: Interval = Interval::from_parts(0, 0);
    pub const MINOR_SECOND: Interval = Interval::from_parts(1, 1);
    pub const MAJOR_SECOND: Interval = Interval::from_parts(1, 2);
    pub const MINOR_THIRD: Interval = Interval::from_parts(2, 3);
    pub const MAJOR_THIRD: Interval = Interval::from_parts(2, 4);
    pub const PERFECT_FOURTH: Interval = Interval::from_parts(3, 5);
    pub const DIMINISHED_FIFTH: Interval = Interval::from_parts(4, 6);
    pub const PERFECT_FIFTH: Interval = Interval::from_parts(4, 7);
    pub const AUGMENTED_FIFTH: Interval = Interval::from_parts(4, 8);
    pub const DIMINISHED_SEVENTH: Interval = Interval::from_parts(6, 9);
    pub const MINOR_SEVENTH: Interval = Interval::from_parts(6, 10);
    pub const MAJOR_SEVENTH: Interval = Interval::from_parts(6, 11);
    pub const OCTAVE: Interval = Interval::from_parts(7, 12);

    /// Build from letter steps (0 = unison) and semitones.
    pub const fn from_parts(steps: u8, semitones: i32) -> Interval {
        Interval { steps, semitones }
    }

    /// Build from a quality and an interval number (1 = unison, 8 = octave).
    pub fn new(quality: Quality, number: u8) -> Result<Interval, TheoryError> {
        let invalid = || TheoryError::InvalidInterval(format!("{}{}", quality.symbol(), number));
        if number == 0 {
            return Err(invalid());
        }
        let steps = number - 1;
        let simple = steps % 7;
        let reference = REFERENCE[simple as usize] + 12 * (steps / 7) as i32;
        let offset = if is_perfect_class(simple) {
            match quality {
                Quality::DoublyDiminished => -2,
                Quality::Diminished => -1,
                Quality::Perfect => 0,
                Quality::Augmented => 1,
                Quality::DoublyAugmented => 2,
                Quality::Major | Quality::Minor => return Err(invalid()),
            }
        } else {
            match quality {
                Quality::DoublyDiminished => -3,
                Quality::Diminished => -2,
                Quality::Minor => -1,
                Quality::Major => 0,
                Quality::Augmented => 1,
                Quality::DoublyAugmented => 2,
                Quality::Perfect => return Err(invalid()),
            }
        };
        Ok(Interval::from_parts(steps, reference + offset))
    }

    /// Measure the interval between two notes, whichever is higher.
    pub fn between(a: &Note, b: &Note) -> Interval {
        let (low, high) = if (b.step(), b.midi()) >= (a.step(), a.midi()) {
            (a, b)
        } else {
            (b, a)
        };
        let steps = high.step() - low.step();
        Interval::from_parts(steps as u8, high.midi() - low.midi())
    }

    /// Generic size in letter steps (0 = unison, 2 = third, 7 = octave).
    pub fn steps(&self) -> u8 {
        self.steps
    }

    /// Interval number as written (1 = unison, 3 = third).
    pub fn number(&self) -> u8 {
        self.steps + 1
    }

    pub fn semitones(&self) -> i32 {
        self.semitones
    }

    pub fn is_compound(&self) -> bool {
        self.steps >= 7
    }

    /// Reduce a compound interval to within an octave (an octave stays an octave).
    pub fn simple(&self) -> Interval {
        if self.steps < 7 || (self.steps == 7 && self.semitones == 12) {
            return *self;
        }
        let octaves = self.steps / 7;
        Interval::from_parts(self.steps % 7, self.semitones - 12 * octaves as i32)
    }

    /// Quality, or `None` for intervals beyond doubly augmented/diminished.
    pub fn quality(&self) -> Option<Quality> {
        let simple = self.steps % 7;
        let reference = REFERENCE[simple as usize] + 12 * (self.steps / 7) as i32;
        let offset = self.semitones - reference;
        if is_perfect_class(simple) {
            match offset {
                -2 => Some(Quality::DoublyDiminished),
                -1 => Some(Quality::Diminished),
                0 => Some(Quality::Perfect),
                1 => Some(Quality::Augmented),
                2 => Some(Quality::DoublyAugmented),
                _ => None,
            }
        } else {
            match offset {
                -3 => Some(Quality::DoublyDiminished),
                -2 => Some(Quality::Diminished),
                -1 => Some(Quality::Minor),
                0 => Some(Quality::Major),
                1 => Some(Quality::Augmented),
                2 => Some(Quality::DoublyAugmented),
                _ => None,
            }
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quality() {
            Some(q) => write!(f, "{}{}", q.symbol(), self.number()),
            None => write!(f, "?{}({})", self.number(), self.semitones),
        }
    }
}

impl FromStr for Interval {
    type Err = TheoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| TheoryError::InvalidInterval(s.to_string()))?;
        let quality = match &s[..split] {
            "dd" => Quality::DoublyDiminished,
            "d" => Quality::Diminished,
            "m" => Quality::Minor,
            "P" => Quality::Perfect,
            "M" => Quality::Major,
            "A" => Quality::Augmented,
            "AA" => Quality::DoublyAugmented,
            _ => return Err(TheoryError::InvalidInterval(s.to_string())),
        };
        let number: u8 = s[split..]
            .parse()
            .map_err(|_| TheoryError::InvalidInterval(s.to_string()))?;
        Interval::new(quality, number)
    }
}

impl TryFrom<String> for Interval {
    type Error = TheoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}

/// Semitone-level helpers over MIDI pitches.
pub mod semitone {
    /// Interval class (0-11) of the distance between two MIDI pitches.
    pub fn interval_class(a: i32, b: i32) -> i32 {
        (b - a).abs() % 12
    }

    /// Unison, octave or fifth (and their compounds).
    pub fn is_perfect_consonance(a: i32, b: i32) -> bool {
        matches!(interval_class(a, b), 0 | 7)
    }

    /// Motion of one voice: -1 down, 0 oblique, 1 up.
    pub fn direction(from: i32, to: i32) -> i32 {
        (to - from).signum()
    }
}
