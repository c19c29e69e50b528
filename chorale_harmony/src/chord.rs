// Voices, voice slots and the three chord variants.
//
// A chord moves through three degrees of completeness as the search runs:
//
// - `IncompleteChord`: a user constraint. Any voice may be unconstrained,
//   pitch-class only ("some E") or fully specified ("E4"); the roman numeral,
//   scale and flags are optional.
// - `HarmonizedChord`: the harmonizer has chosen a roman numeral; voices are
//   carried over from the constraint and may still be unknown. The part
//   writer also uses this type for partially voiced chords while it binds
//   one voice at a time.
// - `CompleteChord`: all four voices are concrete notes.
//
// All three implement `Chord`, which is what the hard rules and
// preferences read, so a rule written once works on constraints (pre-flight),
// partial voicings (search pruning) and finished chords.
//
// Voice slots are always in SATB order. Reconciliation never edits a chord;
// it returns a new one or `None`.

use chorale_theory::{Flags, Note, PitchClass, RomanNumeral, Scale};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Voice index in SATB order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Soprano = 0,
    Alto = 1,
    Tenor = 2,
    Bass = 3,
}

impl Voice {
    pub const ALL: [Voice; 4] = [Voice::Soprano, Voice::Alto, Voice::Tenor, Voice::Bass];

    /// Order in which the part writer binds voices: outer voices first so
    /// spacing and parallel checks prune before the inner-voice loops.
    pub const SEARCH_ORDER: [Voice; 4] = [Voice::Bass, Voice::Soprano, Voice::Alto, Voice::Tenor];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Hard MIDI floor and ceiling.
    pub fn range(self) -> (i32, i32) {
        match self {
            Voice::Soprano => (60, 79), // C4-G5
            Voice::Alto => (53, 72),    // F3-C5
            Voice::Tenor => (48, 67),   // C3-G4
            Voice::Bass => (40, 60),    // E2-C4
        }
    }

    /// Comfortable sub-range; the register preference penalizes leaving it.
    pub fn core(self) -> (i32, i32) {
        match self {
            Voice::Soprano => (62, 74), // D4-D5
            Voice::Alto => (55, 67),    // G3-G4
            Voice::Tenor => (50, 62),   // D3-D4
            Voice::Bass => (43, 55),    // G2-G3
        }
    }

    pub fn center(self) -> i32 {
        let (low, high) = self.core();
        (low + high) / 2
    }

    pub fn name(self) -> &'static str {
        match self {
            Voice::Soprano => "soprano",
            Voice::Alto => "alto",
            Voice::Tenor => "tenor",
            Voice::Bass => "bass",
        }
    }
}

/// What is known about one voice of a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceSlot {
    #[default]
    Unconstrained,
    PitchClass(PitchClass),
    Pitch(Note),
}

impl VoiceSlot {
    pub fn pitch_class(&self) -> Option<PitchClass> {
        match self {
            VoiceSlot::Unconstrained => None,
            VoiceSlot::PitchClass(pc) => Some(*pc),
            VoiceSlot::Pitch(note) => Some(note.pitch_class()),
        }
    }

    pub fn note(&self) -> Option<Note> {
        match self {
            VoiceSlot::Pitch(note) => Some(*note),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, VoiceSlot::Unconstrained)
    }

    /// Parse `E4` (pitch), `E` (pitch class) or `_` / `-` (unconstrained).
    pub fn parse(text: &str) -> Result<VoiceSlot, chorale_theory::TheoryError> {
        let text = text.trim();
        if text.is_empty() || text == "_" || text == "-" {
            return Ok(VoiceSlot::Unconstrained);
        }
        if text.ends_with(|c: char| c.is_ascii_digit()) {
            Ok(VoiceSlot::Pitch(text.parse()?))
        } else {
            Ok(VoiceSlot::PitchClass(text.parse()?))
        }
    }

    /// Whether `note` is allowed in this slot.
    pub fn admits(&self, note: &Note) -> bool {
        match self {
            VoiceSlot::Unconstrained => true,
            VoiceSlot::PitchClass(pc) => note.pitch_class() == *pc,
            VoiceSlot::Pitch(n) => n == note,
        }
    }
}

impl fmt::Display for VoiceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceSlot::Unconstrained => f.write_str("_"),
            VoiceSlot::PitchClass(pc) => write!(f, "{pc}"),
            VoiceSlot::Pitch(note) => write!(f, "{note}"),
        }
    }
}

/// Capabilities shared by every chord variant.
pub trait Chord {
    fn slots(&self) -> [VoiceSlot; 4];

    fn numeral(&self) -> Option<&RomanNumeral>;

    fn flags(&self) -> &Flags;

    fn slot(&self, voice: Voice) -> VoiceSlot {
        self.slots()[voice.index()]
    }

    fn note(&self, voice: Voice) -> Option<Note> {
        self.slot(voice).note()
    }

    fn notes(&self) -> [Option<Note>; 4] {
        self.slots().map(|s| s.note())
    }

    fn midi(&self, voice: Voice) -> Option<i32> {
        self.note(voice).map(|n| n.midi())
    }

    fn is_complete(&self) -> bool {
        self.notes().iter().all(Option::is_some)
    }
}

/// A user constraint for one position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IncompleteChord {
    pub voices: [VoiceSlot; 4],
    pub numeral: Option<RomanNumeral>,
    /// Pins the key at this position (only compared when set).
    pub scale: Option<Scale>,
    pub flags: Flags,
}

impl IncompleteChord {
    pub fn new() -> Self {
        IncompleteChord::default()
    }

    pub fn with_voice(mut self, voice: Voice, slot: VoiceSlot) -> Self {
        self.voices[voice.index()] = slot;
        self
    }

    pub fn with_numeral(mut self, numeral: RomanNumeral) -> Self {
        self.numeral = Some(numeral);
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_flag(mut self, name: &str, value: bool) -> Self {
        self.flags.set(name, value);
        self
    }

    /// Flags as the harmonizer should see them: the constraint's own flags
    /// merged over any carried by its numeral.
    pub fn all_flags(&self) -> Option<Flags> {
        match &self.numeral {
            Some(n) => n.flags().merge(&self.flags),
            None => Some(self.flags.clone()),
        }
    }
}

impl Chord for IncompleteChord {
    fn slots(&self) -> [VoiceSlot; 4] {
        self.voices
    }

    fn numeral(&self) -> Option<&RomanNumeral> {
        self.numeral.as_ref()
    }

    fn flags(&self) -> &Flags {
        &self.flags
    }
}

/// A chord whose roman numeral is decided; voices may be unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HarmonizedChord {
    pub numeral: RomanNumeral,
    pub voices: [VoiceSlot; 4],
}

impl HarmonizedChord {
    pub fn new(numeral: RomanNumeral) -> Self {
        HarmonizedChord {
            numeral,
            voices: [VoiceSlot::Unconstrained; 4],
        }
    }

    pub fn with_voices(numeral: RomanNumeral, voices: [VoiceSlot; 4]) -> Self {
        HarmonizedChord { numeral, voices }
    }

    /// A partial voicing with the given voices bound.
    pub fn voiced(numeral: RomanNumeral, notes: [Option<Note>; 4]) -> Self {
        HarmonizedChord {
            numeral,
            voices: notes.map(|n| n.map_or(VoiceSlot::Unconstrained, VoiceSlot::Pitch)),
        }
    }

    /// All four voices bound.
    pub fn completed(&self) -> Option<CompleteChord> {
        let [s, a, t, b] = self.notes();
        Some(CompleteChord {
            numeral: self.numeral.clone(),
            notes: [s?, a?, t?, b?],
        })
    }
}

impl Chord for HarmonizedChord {
    fn slots(&self) -> [VoiceSlot; 4] {
        self.voices
    }

    fn numeral(&self) -> Option<&RomanNumeral> {
        Some(&self.numeral)
    }

    fn flags(&self) -> &Flags {
        self.numeral.flags()
    }
}

impl fmt::Display for HarmonizedChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.numeral)?;
        for slot in &self.voices {
            write!(f, " {slot}")?;
        }
        Ok(())
    }
}

/// A fully voiced chord.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteChord {
    pub numeral: RomanNumeral,
    pub notes: [Note; 4],
}

impl CompleteChord {
    pub fn get(&self, voice: Voice) -> Note {
        self.notes[voice.index()]
    }

    pub fn pitch(&self, voice: Voice) -> i32 {
        self.get(voice).midi()
    }
}

impl Chord for CompleteChord {
    fn slots(&self) -> [VoiceSlot; 4] {
        self.notes.map(VoiceSlot::Pitch)
    }

    fn numeral(&self) -> Option<&RomanNumeral> {
        Some(&self.numeral)
    }

    fn flags(&self) -> &Flags {
        self.numeral.flags()
    }
}

impl fmt::Display for CompleteChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [s, a, t, b] = self.notes;
        write!(f, "{}: {s} {a} {t} {b}", self.numeral)
    }
}

/// Previously voiced chords, most recent first. Persistent: extending a
/// history shares the tail with every other branch that extended it.
#[derive(Debug, Clone, Default)]
pub struct History(Option<Rc<HistoryNode>>);

#[derive(Debug)]
struct HistoryNode {
    chord: CompleteChord,
    earlier: History,
    len: usize,
}

impl History {
    pub fn new() -> Self {
        History(None)
    }

    pub fn push(&self, chord: CompleteChord) -> History {
        History(Some(Rc::new(HistoryNode {
            chord,
            earlier: self.clone(),
            len: self.len() + 1,
        })))
    }

    pub fn last(&self) -> Option<&CompleteChord> {
        self.0.as_deref().map(|node| &node.chord)
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |node| node.len)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &CompleteChord> {
        let mut cursor = self.0.as_deref();
        std::iter::from_fn(move || {
            let node = cursor?;
            cursor = node.earlier.0.as_deref();
            Some(&node.chord)
        })
    }

    /// Up to `count` most recent chords, most recent first.
    pub fn recent(&self, count: usize) -> Vec<&CompleteChord> {
        self.iter().take(count).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c_major() -> Scale {
        "C".parse().unwrap()
    }

    fn complete(numeral: &str, notes: [&str; 4]) -> CompleteChord {
        CompleteChord {
            numeral: RomanNumeral::parse(numeral, c_major()).unwrap(),
            notes: notes.map(|n| n.parse().unwrap()),
        }
    }

    #[test]
    fn test_voice_slot_parsing() {
        assert_eq!(VoiceSlot::parse("_").unwrap(), VoiceSlot::Unconstrained);
        assert!(matches!(VoiceSlot::parse("E4").unwrap(), VoiceSlot::Pitch(_)));
        assert!(matches!(VoiceSlot::parse("Eb").unwrap(), VoiceSlot::PitchClass(_)));
        assert!(VoiceSlot::parse("H2").is_err());
    }

    #[test]
    fn test_slot_admits() {
        let e = VoiceSlot::parse("E").unwrap();
        assert!(e.admits(&"E3".parse().unwrap()));
        assert!(!e.admits(&"Fb3".parse().unwrap()), "spelling matters");
        assert!(VoiceSlot::Unconstrained.admits(&"C4".parse().unwrap()));
    }

    #[test]
    fn test_harmonized_completion() {
        let numeral = RomanNumeral::parse("I", c_major()).unwrap();
        let partial = HarmonizedChord::voiced(numeral.clone(), [Some("E5".parse().unwrap()), None, None, None]);
        assert!(partial.completed().is_none());
        assert!(!partial.is_complete());
        let notes = ["E5", "G4", "C4", "C3"].map(|n| Some(n.parse().unwrap()));
        let full = HarmonizedChord::voiced(numeral, notes).completed().unwrap();
        assert_eq!(full.to_string(), "I: E5 G4 C4 C3");
    }

    #[test]
    fn test_history_shares_tails() {
        let base = History::new().push(complete("I", ["E5", "G4", "C4", "C3"]));
        let left = base.push(complete("V", ["D5", "G4", "B3", "G2"]));
        let right = base.push(complete("IV", ["F5", "A4", "C4", "F2"]));
        assert_eq!(left.len(), 2);
        assert_eq!(right.last().unwrap().numeral.name(), "IV");
        let names: Vec<&str> = left.iter().map(|c| c.numeral.name()).collect();
        assert_eq!(names, ["V", "I"]);
        assert_eq!(base.len(), 1, "extending must not change the shared prefix");
    }

    #[test]
    fn test_constraint_flags_merge() {
        let numeral = RomanNumeral::parse("V", c_major()).unwrap().with_flag("pivot", true);
        let constraint = IncompleteChord::new().with_numeral(numeral).with_flag("pac", true);
        let flags = constraint.all_flags().unwrap();
        assert!(flags.is_set("pivot") && flags.is_set("pac"));
        let clash = constraint.clone().with_flag("pivot", false);
        assert!(clash.all_flags().is_none());
    }
}
