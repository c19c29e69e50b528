// Roman-numeral chords.
//
// A `RomanNumeral` names a chord by scale degree, quality, inversion,
// optional seventh and optional applied (secondary) key, relative to a
// governing `Scale`. Construction derives and caches the spelled chord
// tones and the canonical text name, so downstream code never recomputes
// them.
//
// Text grammar: `[b|#]<numeral>[+|o|0][<figure>][/<applied>]`, e.g. `V65`,
// `bVII42`, `viio7`, `vii07`, `V/V`, `V7/ii`. Upper-case numerals are major
// (or augmented with `+`), lower-case minor (or diminished with `o`; `0`
// marks a half-diminished seventh). Figures: `6`, `64` for triads and `7`,
// `65`, `43`, `42` for sevenths. The applied target keeps its written case,
// which selects the mode of the applied key.
//
// Values are immutable. `with` returns an updated copy; `diatonicized`
// re-derives quality from the key; `relative_to_scale` spells the same
// sounding chord in another key (used for pivot chords).

use crate::error::TheoryError;
use crate::interval::Interval;
use crate::note::{Note, PitchClass};
use crate::scale::{Mode, Scale};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

const NUMERALS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChordQuality {
    Major,
    Minor,
    Augmented,
    Diminished,
}

impl ChordQuality {
    /// Third and fifth above the root.
    fn triad(self) -> [Interval; 2] {
        match self {
            ChordQuality::Major => [Interval::MAJOR_THIRD, Interval::PERFECT_FIFTH],
            ChordQuality::Minor => [Interval::MINOR_THIRD, Interval::PERFECT_FIFTH],
            ChordQuality::Diminished => [Interval::MINOR_THIRD, Interval::DIMINISHED_FIFTH],
            ChordQuality::Augmented => [Interval::MAJOR_THIRD, Interval::AUGMENTED_FIFTH],
        }
    }

    fn from_triad(third: Interval, fifth: Interval) -> Option<ChordQuality> {
        [
            ChordQuality::Major,
            ChordQuality::Minor,
            ChordQuality::Diminished,
            ChordQuality::Augmented,
        ]
        .into_iter()
        .find(|q| q.triad() == [third, fifth])
    }

    fn is_upper_case(self) -> bool {
        matches!(self, ChordQuality::Major | ChordQuality::Augmented)
    }
}

/// The key a secondary chord is borrowed from: a degree of the governing
/// scale, taken as the tonic of a major or minor key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppliedTarget {
    pub degree: u8,
    pub mode: Mode,
}

/// Free-form boolean annotations (`pivot`, `sequence`, `pac`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(BTreeMap<String, bool>);

impl Flags {
    pub fn new() -> Self {
        Flags::default()
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.get(name).copied()
    }

    /// True only when the flag is present and set.
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name) == Some(true)
    }

    pub fn set(&mut self, name: &str, value: bool) {
        self.0.insert(name.to_string(), value);
    }

    pub fn with(mut self, name: &str, value: bool) -> Self {
        self.set(name, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Union of two flag maps, or `None` if they disagree on any flag both
    /// specify.
    pub fn merge(&self, other: &Flags) -> Option<Flags> {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            match merged.get(name) {
                Some(existing) if existing != value => return None,
                _ => merged.set(name, value),
            }
        }
        Some(merged)
    }
}

/// Structural parameters of a roman numeral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RomanNumeralParams {
    /// Scale degree of the root, 1-7.
    pub degree: u8,
    /// Chromatic alteration of the root (`b` = -1, `#` = +1).
    pub accidental: i8,
    pub quality: ChordQuality,
    /// 0 = root position, 1 = first inversion, 2 = second, 3 = third.
    pub inversion: u8,
    pub seventh: bool,
    /// Distinguishes the fully diminished seventh from the half-diminished.
    pub fully_diminished: bool,
    pub applied: Option<AppliedTarget>,
    pub flags: Flags,
    pub scale: Scale,
}

impl RomanNumeralParams {
    /// A root-position triad with no alterations.
    pub fn triad(degree: u8, quality: ChordQuality, scale: Scale) -> Self {
        RomanNumeralParams {
            degree,
            accidental: 0,
            quality,
            inversion: 0,
            seventh: false,
            fully_diminished: false,
            applied: None,
            flags: Flags::new(),
            scale,
        }
    }
}

/// Partial update for `RomanNumeral::with`; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct RomanNumeralUpdate {
    pub degree: Option<u8>,
    pub accidental: Option<i8>,
    pub quality: Option<ChordQuality>,
    pub inversion: Option<u8>,
    pub seventh: Option<bool>,
    pub fully_diminished: Option<bool>,
    pub applied: Option<Option<AppliedTarget>>,
    pub flags: Option<Flags>,
    pub scale: Option<Scale>,
}

/// An immutable roman-numeral chord with cached chord tones and name.
#[derive(Debug, Clone)]
pub struct RomanNumeral {
    params: RomanNumeralParams,
    root: PitchClass,
    intervals: Vec<Interval>,
    tones: Vec<PitchClass>,
    name: String,
}

impl PartialEq for RomanNumeral {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

impl Eq for RomanNumeral {}

impl Hash for RomanNumeral {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.params.hash(state);
    }
}

impl RomanNumeral {
    pub fn new(params: RomanNumeralParams) -> Result<RomanNumeral, TheoryError> {
        validate(&params)?;
        let root = chord_root(&params);
        let mut intervals = params.quality.triad().to_vec();
        if params.seventh {
            intervals.push(seventh_interval(&params));
        }
        let tones = std::iter::once(root)
            .chain(intervals.iter().map(|iv| root.transpose_up(*iv)))
            .collect();
        let name = render_name(&params);
        Ok(RomanNumeral {
            params,
            root,
            intervals,
            tones,
            name,
        })
    }

    /// Parse the text grammar against a governing scale.
    pub fn parse(text: &str, scale: Scale) -> Result<RomanNumeral, TheoryError> {
        let malformed = || TheoryError::MalformedNumeral(text.to_string());
        let (main, applied_text) = match text.trim().split_once('/') {
            Some((main, applied)) => (main, Some(applied)),
            None => (text.trim(), None),
        };

        let mut rest = main;
        let mut accidental: i8 = 0;
        while let Some(c) = rest.chars().next() {
            match c {
                'b' => accidental -= 1,
                '#' => accidental += 1,
                _ => break,
            }
            if accidental.abs() > 2 {
                return Err(malformed());
            }
            rest = &rest[1..];
        }

        let numeral_len = rest
            .find(|c: char| !matches!(c, 'I' | 'V' | 'i' | 'v'))
            .unwrap_or(rest.len());
        let (degree, upper) = parse_numeral(&rest[..numeral_len]).ok_or_else(malformed)?;
        rest = &rest[numeral_len..];

        let mark = rest.chars().next().filter(|c| matches!(c, '+' | 'o' | '0'));
        if mark.is_some() {
            rest = &rest[1..];
        }
        let (inversion, seventh) = match rest {
            "" => (0, false),
            "6" => (1, false),
            "64" => (2, false),
            "7" => (0, true),
            "65" => (1, true),
            "43" => (2, true),
            "42" => (3, true),
            _ => return Err(malformed()),
        };
        let quality = match (mark, upper) {
            (None, true) => ChordQuality::Major,
            (None, false) => ChordQuality::Minor,
            (Some('+'), true) => ChordQuality::Augmented,
            (Some('o'), false) => ChordQuality::Diminished,
            (Some('0'), false) if seventh => ChordQuality::Diminished,
            _ => return Err(malformed()),
        };

        let applied = match applied_text {
            None => None,
            Some(t) => {
                let (degree, upper) = parse_numeral(t).ok_or_else(malformed)?;
                if degree == 1 {
                    return Err(malformed());
                }
                let mode = if upper { Mode::Major } else { Mode::Minor };
                Some(AppliedTarget { degree, mode })
            }
        };

        RomanNumeral::new(RomanNumeralParams {
            degree,
            accidental,
            quality,
            inversion,
            seventh,
            fully_diminished: mark == Some('o') && seventh,
            applied,
            flags: Flags::new(),
            scale,
        })
    }

    pub fn params(&self) -> &RomanNumeralParams {
        &self.params
    }

    pub fn degree(&self) -> u8 {
        self.params.degree
    }

    pub fn accidental(&self) -> i8 {
        self.params.accidental
    }

    pub fn quality(&self) -> ChordQuality {
        self.params.quality
    }

    pub fn inversion(&self) -> u8 {
        self.params.inversion
    }

    pub fn has_seventh(&self) -> bool {
        self.params.seventh
    }

    pub fn fully_diminished(&self) -> bool {
        self.params.fully_diminished
    }

    pub fn applied(&self) -> Option<AppliedTarget> {
        self.params.applied
    }

    pub fn flags(&self) -> &Flags {
        &self.params.flags
    }

    pub fn scale(&self) -> Scale {
        self.params.scale
    }

    /// Canonical text name (without key or flags).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> PitchClass {
        self.root
    }

    /// Interval stack above the root (third, fifth, optional seventh).
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Chord tones, root first.
    pub fn tones(&self) -> &[PitchClass] {
        &self.tones
    }

    /// Interval from the root up to the bass.
    pub fn inversion_interval(&self) -> Interval {
        match self.params.inversion {
            0 => Interval::UNISON,
            n => self.intervals[n as usize - 1],
        }
    }

    /// The chord tone that belongs in the bass.
    pub fn bass(&self) -> PitchClass {
        self.tones[self.params.inversion as usize]
    }

    pub fn seventh_tone(&self) -> Option<PitchClass> {
        self.tones.get(3).copied()
    }

    pub fn contains(&self, pitch_class: PitchClass) -> bool {
        self.tones.contains(&pitch_class)
    }

    /// The key this chord functions in: the applied key if any, else the
    /// governing scale.
    pub fn key(&self) -> Scale {
        key_of(&self.params)
    }

    /// Dominant or leading-tone chord of its (possibly applied) key.
    pub fn is_dominant_function(&self) -> bool {
        matches!(
            (self.params.degree, self.params.quality, self.params.accidental),
            (5, ChordQuality::Major, 0) | (7, ChordQuality::Diminished, 0)
        )
    }

    /// Leading tone of the key this chord is dominant to, if it is one.
    pub fn leading_tone(&self) -> Option<PitchClass> {
        self.is_dominant_function().then(|| self.key().leading_tone())
    }

    pub fn with(&self, update: RomanNumeralUpdate) -> Result<RomanNumeral, TheoryError> {
        let p = &self.params;
        RomanNumeral::new(RomanNumeralParams {
            degree: update.degree.unwrap_or(p.degree),
            accidental: update.accidental.unwrap_or(p.accidental),
            quality: update.quality.unwrap_or(p.quality),
            inversion: update.inversion.unwrap_or(p.inversion),
            seventh: update.seventh.unwrap_or(p.seventh),
            fully_diminished: update.fully_diminished.unwrap_or(p.fully_diminished),
            applied: update.applied.unwrap_or(p.applied),
            flags: update.flags.unwrap_or_else(|| p.flags.clone()),
            scale: update.scale.unwrap_or(p.scale),
        })
    }

    /// Copy with one flag changed. Flags never affect chord tones.
    pub fn with_flag(&self, name: &str, value: bool) -> RomanNumeral {
        let mut copy = self.clone();
        copy.params.flags.set(name, value);
        copy
    }

    /// Copy with the flag map replaced.
    pub fn with_flags(&self, flags: Flags) -> RomanNumeral {
        let mut copy = self.clone();
        copy.params.flags = flags;
        copy
    }

    /// Re-derive quality, seventh type and root spelling from the key,
    /// keeping degree, inversion, seventh and applied target. `None` when
    /// the key's tones do not form a recognizable chord of this shape.
    pub fn diatonicized(&self) -> Option<RomanNumeral> {
        let key = self.key();
        let degree = self.params.degree;
        let root = key.chord_tone(degree, 0).in_octave(4);
        let above = |offset: u8| {
            let pc = key.chord_tone(degree, offset);
            let step = root.step() + offset as i32;
            let note = Note::new(pc.letter, pc.accidental, step.div_euclid(7) as i8);
            Interval::between(&root, &note)
        };
        let quality = ChordQuality::from_triad(above(2), above(4))?;
        let fully_diminished = self.params.seventh
            && quality == ChordQuality::Diminished
            && above(6) == Interval::DIMINISHED_SEVENTH;
        let candidate = RomanNumeral::new(RomanNumeralParams {
            accidental: 0,
            quality,
            fully_diminished,
            ..self.params.clone()
        })
        .ok()?;
        let expected: Vec<PitchClass> = [0u8, 2, 4, 6]
            .iter()
            .take(candidate.tones.len())
            .map(|&offset| key.chord_tone(degree, offset))
            .collect();
        (candidate.tones == expected).then_some(candidate)
    }

    /// Spell the same sounding chord as a numeral of `scale`: a plain
    /// diatonic numeral if one exists, else an applied dominant, else a
    /// chromatically altered degree. Flags are kept.
    pub fn relative_to_scale(&self, scale: Scale) -> Option<RomanNumeral> {
        let (degree, _) = scale.degree_of(self.root);
        let mut plain = RomanNumeralParams {
            degree,
            accidental: 0,
            applied: None,
            scale,
            ..self.params.clone()
        };
        let unaltered_root = chord_root(&plain);
        plain.accidental = self.root.accidental - unaltered_root.accidental;
        plain.fully_diminished = self.params.fully_diminished;
        let plain = RomanNumeral::new(plain).ok().filter(|c| c.tones == self.tones);

        if let Some(candidate) = &plain {
            let diatonic = candidate.accidental() == 0
                && candidate
                    .diatonicized()
                    .is_some_and(|d| d.tones == candidate.tones);
            if diatonic {
                return plain;
            }
        }

        let applied_degree = match self.params.quality {
            ChordQuality::Major => 5,
            ChordQuality::Diminished => 7,
            _ => return plain,
        };
        for target in 2..=7u8 {
            let target_triad = RomanNumeral::new(RomanNumeralParams::triad(
                target,
                ChordQuality::Major,
                scale,
            ))
            .ok()
            .and_then(|t| t.diatonicized());
            let mode = match target_triad.map(|t| t.quality()) {
                Some(ChordQuality::Major) => Mode::Major,
                Some(ChordQuality::Minor) => Mode::Minor,
                _ => continue,
            };
            let candidate = RomanNumeral::new(RomanNumeralParams {
                degree: applied_degree,
                accidental: 0,
                applied: Some(AppliedTarget {
                    degree: target,
                    mode,
                }),
                scale,
                ..self.params.clone()
            });
            if let Ok(candidate) = candidate
                && candidate.tones == self.tones
            {
                return Some(candidate);
            }
        }
        plain
    }
}

impl fmt::Display for RomanNumeral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn parse_numeral(text: &str) -> Option<(u8, bool)> {
    let upper = text.chars().all(|c| c.is_ascii_uppercase());
    let lower = text.chars().all(|c| c.is_ascii_lowercase());
    if text.is_empty() || !(upper || lower) {
        return None;
    }
    let normalized = text.to_ascii_uppercase();
    let index = NUMERALS.iter().position(|n| *n == normalized)?;
    Some((index as u8 + 1, upper))
}

fn validate(p: &RomanNumeralParams) -> Result<(), TheoryError> {
    if !(1..=7).contains(&p.degree) {
        return Err(TheoryError::OutOfRange(format!("degree {}", p.degree)));
    }
    let max_inversion = if p.seventh { 3 } else { 2 };
    if p.inversion > max_inversion {
        return Err(TheoryError::OutOfRange(format!("inversion {}", p.inversion)));
    }
    if p.accidental.abs() > 2 {
        return Err(TheoryError::OutOfRange(format!("accidental {}", p.accidental)));
    }
    if p.fully_diminished && !(p.seventh && p.quality == ChordQuality::Diminished) {
        return Err(TheoryError::OutOfRange(
            "fully diminished requires a diminished seventh chord".to_string(),
        ));
    }
    if let Some(target) = p.applied {
        let legal = matches!(
            (p.degree, p.quality, p.accidental),
            (5, ChordQuality::Major, 0) | (7, ChordQuality::Diminished, 0)
        );
        if !legal || !(2..=7).contains(&target.degree) {
            return Err(TheoryError::IllegalApplied(render_name(p)));
        }
    }
    Ok(())
}

fn key_of(p: &RomanNumeralParams) -> Scale {
    match p.applied {
        Some(target) => Scale::new(p.scale.degree(target.degree), target.mode),
        None => p.scale,
    }
}

fn chord_root(p: &RomanNumeralParams) -> PitchClass {
    let key = key_of(p);
    let mut root = key.degree(p.degree);
    if key.mode == Mode::Minor && p.degree == 7 && p.quality == ChordQuality::Diminished {
        root = root.altered(1);
    }
    root.altered(p.accidental)
}

fn seventh_interval(p: &RomanNumeralParams) -> Interval {
    match p.quality {
        ChordQuality::Major if p.degree == 5 || p.applied.is_some() => Interval::MINOR_SEVENTH,
        ChordQuality::Major => Interval::MAJOR_SEVENTH,
        ChordQuality::Minor | ChordQuality::Augmented => Interval::MINOR_SEVENTH,
        ChordQuality::Diminished if p.fully_diminished => Interval::DIMINISHED_SEVENTH,
        ChordQuality::Diminished => Interval::MINOR_SEVENTH,
    }
}

fn render_name(p: &RomanNumeralParams) -> String {
    let mut name = String::new();
    let accidental = if p.accidental < 0 { "b" } else { "#" };
    name.push_str(&accidental.repeat(p.accidental.unsigned_abs() as usize));
    let numeral = NUMERALS[(p.degree.clamp(1, 7) - 1) as usize];
    if p.quality.is_upper_case() {
        name.push_str(numeral);
    } else {
        name.push_str(&numeral.to_ascii_lowercase());
    }
    match p.quality {
        ChordQuality::Augmented => name.push('+'),
        ChordQuality::Diminished if p.seventh && !p.fully_diminished => name.push('0'),
        ChordQuality::Diminished => name.push('o'),
        _ => {}
    }
    let figure = match (p.seventh, p.inversion) {
        (false, 0) => "",
        (false, 1) => "6",
        (false, _) => "64",
        (true, 0) => "7",
        (true, 1) => "65",
        (true, 2) => "43",
        (true, _) => "42",
    };
    name.push_str(figure);
    if let Some(target) = p.applied {
        name.push('/');
        let numeral = NUMERALS[(target.degree.clamp(1, 7) - 1) as usize];
        match target.mode {
            Mode::Major => name.push_str(numeral),
            Mode::Minor => name.push_str(&numeral.to_ascii_lowercase()),
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c_major() -> Scale {
        "C major".parse().unwrap()
    }

    fn numeral(text: &str, scale: Scale) -> RomanNumeral {
        RomanNumeral::parse(text, scale).unwrap()
    }

    fn tones(n: &RomanNumeral) -> Vec<String> {
        n.tones().iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_name_round_trip() {
        for text in [
            "I", "i6", "V42/V", "bVII6", "vii07", "viio7", "viio6", "V65", "ii43", "IV64",
            "III+", "V7/ii", "viio7/V", "#iv0", "#ivo7",
        ] {
            let parsed = RomanNumeral::parse(text, c_major());
            if text == "#iv0" {
                assert!(parsed.is_err(), "half-diminished triad is not a chord");
                continue;
            }
            assert_eq!(parsed.unwrap().name(), text);
        }
    }

    #[test]
    fn test_empty_update_keeps_name() {
        for text in ["V42/V", "bVII6", "vii07", "iv", "I64"] {
            let n = numeral(text, c_major());
            assert_eq!(n.with(RomanNumeralUpdate::default()).unwrap().name(), n.name());
        }
    }

    #[test]
    fn test_malformed_text() {
        for text in ["", "X", "Vi", "V8", "v+", "Io", "V/", "V/I", "V/x"] {
            assert!(RomanNumeral::parse(text, c_major()).is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn test_long_accidental_run_is_malformed() {
        for text in [format!("{}V", "b".repeat(200)), format!("{}IV", "#".repeat(200)), "bbbII".to_string()] {
            let err = RomanNumeral::parse(&text, c_major()).unwrap_err();
            assert!(matches!(err, TheoryError::MalformedNumeral(_)), "{err}");
        }
        assert!(RomanNumeral::parse("bbII", c_major()).is_ok());
    }

    #[test]
    fn test_applied_must_be_dominant() {
        let err = RomanNumeral::parse("IV/V", c_major()).unwrap_err();
        assert!(matches!(err, TheoryError::IllegalApplied(_)));
        assert!(RomanNumeral::parse("ii/V", c_major()).is_err());
    }

    #[test]
    fn test_chord_tones() {
        let c = c_major();
        assert_eq!(tones(&numeral("V7", c)), ["G", "B", "D", "F"]);
        assert_eq!(tones(&numeral("V/ii", c)), ["A", "C#", "E"]);
        assert_eq!(tones(&numeral("viio7/V", c)), ["F#", "A", "C", "Eb"]);
        assert_eq!(tones(&numeral("bVII", c)), ["Bb", "D", "F"]);
        assert_eq!(tones(&numeral("vii07", c)), ["B", "D", "F", "A"]);
        assert_eq!(tones(&numeral("IV7", c)), ["F", "A", "C", "E"]);

        let a_minor: Scale = "A minor".parse().unwrap();
        assert_eq!(tones(&numeral("V", a_minor)), ["E", "G#", "B"]);
        assert_eq!(tones(&numeral("viio7", a_minor)), ["G#", "B", "D", "F"]);
        assert_eq!(tones(&numeral("VII", a_minor)), ["G", "B", "D"]);
    }

    #[test]
    fn test_bass_and_inversion_interval() {
        let n = numeral("V65", c_major());
        assert_eq!(n.bass().to_string(), "B");
        assert_eq!(n.inversion_interval(), Interval::MAJOR_THIRD);
        assert_eq!(numeral("I64", c_major()).bass().to_string(), "G");
    }

    #[test]
    fn test_diatonicized() {
        let c = c_major();
        let ii = numeral("II", c).diatonicized().unwrap();
        assert_eq!(ii.name(), "ii");
        let vii7 = numeral("VII7", c).diatonicized().unwrap();
        assert_eq!(vii7.name(), "vii07");

        let a_minor: Scale = "A minor".parse().unwrap();
        assert_eq!(numeral("vii7", a_minor).diatonicized().unwrap().name(), "viio7");
        assert_eq!(numeral("v", a_minor).diatonicized().unwrap().name(), "V");
        assert_eq!(numeral("II", a_minor).diatonicized().unwrap().name(), "iio");
        // Chords on the seventh degree of minor take the raised leading tone.
        assert_eq!(numeral("VII7", a_minor).diatonicized().unwrap().name(), "viio7");
    }

    #[test]
    fn test_relative_to_scale() {
        let c = c_major();
        let g: Scale = "G major".parse().unwrap();
        let pivot = numeral("V/ii", c).with_flag("pivot", true);
        let in_g = pivot.relative_to_scale(g).unwrap();
        assert_eq!(in_g.name(), "V/V");
        assert!(in_g.flags().is_set("pivot"));
        assert_eq!(numeral("V", c).relative_to_scale(g).unwrap().name(), "I");
        assert_eq!(numeral("vi6", c).relative_to_scale(g).unwrap().name(), "ii6");
        assert_eq!(numeral("ii", c).relative_to_scale(g).unwrap().name(), "v");
        assert_eq!(numeral("IV", c).relative_to_scale(g).unwrap().name(), "bVII");
    }

    #[test]
    fn test_flags_merge() {
        let a = Flags::new().with("pivot", true);
        let b = Flags::new().with("sequence", true);
        let merged = a.merge(&b).unwrap();
        assert!(merged.is_set("pivot") && merged.is_set("sequence"));
        assert!(a.merge(&Flags::new().with("pivot", false)).is_none());
    }
}
