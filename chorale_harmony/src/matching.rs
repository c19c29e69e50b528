// Matching rules: chord patterns that can both test and generate.
//
// A `MatchingRule` describes a family of roman numerals: a scale degree, the
// inversions allowed, whether a seventh is required, an optional applied
// target. Progression, expansion and substitution tables are written in
// terms of these patterns, and the harmonizer uses them two ways:
//
// - `check(chord, rule)` tests a concrete numeral (is the previous chord a
//   match for this progression's source?).
// - `yield_chords(rule, scale)` enumerates concrete numerals, one per allowed
//   inversion, in the governing scale.
//
// Diatonic rules (`MatchingRule::diatonic`) ignore quality when testing and
// re-derive it from the scale when generating, so "5" means V in major and
// V (raised leading tone) in minor. As-is rules (`MatchingRule::as_is`) use
// the literal quality, for borrowed and chromatic chords. Applied rules name
// only the target degree; the applied key's mode is read off the scale.

use chorale_theory::{AppliedTarget, ChordQuality, Flags, Mode, RomanNumeral, RomanNumeralParams, Scale};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingRule {
    /// `None` matches any degree (source patterns only; yields nothing).
    pub degree: Option<u8>,
    pub accidental: i8,
    pub quality: ChordQuality,
    pub inversions: Vec<u8>,
    /// `None` accepts chords with or without a seventh; generation then
    /// builds a triad.
    pub seventh: Option<bool>,
    /// Target degree of an applied chord.
    pub applied: Option<u8>,
    /// Extra fully-diminished requirement. Unset in the built-in tables.
    pub fully_diminished: Option<bool>,
    /// Use `quality` literally instead of deriving it from the scale.
    pub exact_quality: bool,
}

impl MatchingRule {
    /// Diatonic triad on `degree`, root position.
    pub fn diatonic(degree: u8) -> Self {
        MatchingRule {
            degree: Some(degree),
            accidental: 0,
            quality: ChordQuality::Major,
            inversions: vec![0],
            seventh: Some(false),
            applied: None,
            fully_diminished: None,
            exact_quality: false,
        }
    }

    /// Chord with a fixed quality, e.g. the major V of an applied key.
    pub fn as_is(degree: u8, quality: ChordQuality) -> Self {
        MatchingRule {
            quality,
            exact_quality: true,
            ..MatchingRule::diatonic(degree)
        }
    }

    /// Any chord at all; useful as a progression source.
    pub fn any() -> Self {
        MatchingRule {
            degree: None,
            inversions: vec![0, 1, 2, 3],
            seventh: None,
            ..MatchingRule::diatonic(1)
        }
    }

    pub fn inversions(mut self, inversions: &[u8]) -> Self {
        self.inversions = inversions.to_vec();
        self
    }

    pub fn any_inversion(self) -> Self {
        self.inversions(&[0, 1, 2, 3])
    }

    pub fn seventh(mut self, seventh: Option<bool>) -> Self {
        self.seventh = seventh;
        self
    }

    pub fn applied_to(mut self, target: u8) -> Self {
        self.applied = Some(target);
        self
    }

    pub fn accidental(mut self, accidental: i8) -> Self {
        self.accidental = accidental;
        self
    }
}

/// Whether `chord` belongs to the family `rule` describes. Any mismatch
/// fails.
pub fn check(chord: &RomanNumeral, rule: &MatchingRule) -> bool {
    if rule.degree.is_some_and(|d| d != chord.degree()) {
        return false;
    }
    if rule.degree.is_some() && rule.accidental != chord.accidental() {
        return false;
    }
    if rule.exact_quality && rule.quality != chord.quality() {
        return false;
    }
    if !rule.inversions.contains(&chord.inversion()) {
        return false;
    }
    if rule.seventh.is_some_and(|s| s != chord.has_seventh()) {
        return false;
    }
    if rule.degree.is_some() && rule.applied != chord.applied().map(|a| a.degree) {
        return false;
    }
    if rule
        .fully_diminished
        .is_some_and(|f| f != chord.fully_diminished())
    {
        return false;
    }
    true
}

/// Mode of the key built on `degree` of `scale`, if that degree carries a
/// major or minor triad.
fn applied_mode(degree: u8, scale: Scale) -> Option<Mode> {
    let triad = RomanNumeral::new(RomanNumeralParams::triad(degree, ChordQuality::Major, scale)).ok()?;
    match triad.diatonicized()?.quality() {
        ChordQuality::Major => Some(Mode::Major),
        ChordQuality::Minor => Some(Mode::Minor),
        _ => None,
    }
}

/// Concrete numerals in `scale` for every inversion `rule` allows, in the
/// rule's inversion order. Inversions that cannot be spelled are skipped.
/// Restartable: each call enumerates afresh.
pub fn yield_chords(rule: &MatchingRule, scale: Scale) -> impl Iterator<Item = RomanNumeral> + use<> {
    let rule = rule.clone();
    let applied = match rule.applied {
        Some(target) => applied_mode(target, scale).map(|mode| Some(AppliedTarget { degree: target, mode })),
        None => Some(None),
    };
    let degree = rule.degree.zip(applied);
    rule.inversions.clone().into_iter().filter_map(move |inversion| {
        let (degree, applied) = degree?;
        let seventh = rule.seventh.unwrap_or(false);
        let fully_diminished = rule.fully_diminished.unwrap_or(false)
            && seventh
            && rule.quality == ChordQuality::Diminished;
        let numeral = RomanNumeral::new(RomanNumeralParams {
            degree,
            accidental: rule.accidental,
            quality: rule.quality,
            inversion,
            seventh,
            fully_diminished,
            applied,
            flags: Flags::new(),
            scale,
        })
        .ok()?;
        if rule.exact_quality {
            Some(numeral)
        } else {
            numeral.diatonicized()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(s: &str) -> Scale {
        s.parse().unwrap()
    }

    fn names(rule: &MatchingRule, s: &str) -> Vec<String> {
        yield_chords(rule, scale(s)).map(|n| n.name().to_string()).collect()
    }

    #[test]
    fn test_diatonic_yields_follow_the_key() {
        let five = MatchingRule::diatonic(5).inversions(&[0, 1]);
        assert_eq!(names(&five, "C major"), ["V", "V6"]);
        assert_eq!(names(&five, "A minor"), ["V", "V6"]);
        let two = MatchingRule::diatonic(2);
        assert_eq!(names(&two, "C major"), ["ii"]);
        assert_eq!(names(&two, "A minor"), ["iio"]);
    }

    #[test]
    fn test_sevenths_and_inversions() {
        let v7 = MatchingRule::diatonic(5).seventh(Some(true)).any_inversion();
        assert_eq!(names(&v7, "C major"), ["V7", "V65", "V43", "V42"]);
        // A triad has no third inversion.
        let triad = MatchingRule::diatonic(1).any_inversion();
        assert_eq!(names(&triad, "C major"), ["I", "I6", "I64"]);
    }

    #[test]
    fn test_applied_yields() {
        let v_of_ii = MatchingRule::as_is(5, ChordQuality::Major).applied_to(2);
        let chords: Vec<RomanNumeral> = yield_chords(&v_of_ii, scale("C major")).collect();
        assert_eq!(chords.len(), 1);
        assert_eq!(chords[0].name(), "V/ii");
        let tones: Vec<String> = chords[0].tones().iter().map(|t| t.to_string()).collect();
        assert_eq!(tones, ["A", "C#", "E"]);
        // vii is diminished in major, so it cannot be tonicized.
        let v_of_vii = MatchingRule::as_is(5, ChordQuality::Major).applied_to(7);
        assert!(yield_chords(&v_of_vii, scale("C major")).next().is_none());
    }

    #[test]
    fn test_check_ignores_quality_for_diatonic_rules() {
        let c = scale("C major");
        let v7 = RomanNumeral::parse("V7", c).unwrap();
        assert!(check(&v7, &MatchingRule::diatonic(5).seventh(None)));
        assert!(!check(&v7, &MatchingRule::diatonic(5)), "seventh required absent");
        let minor_v = RomanNumeral::parse("v", c).unwrap();
        assert!(check(&minor_v, &MatchingRule::diatonic(5)));
        assert!(!check(&minor_v, &MatchingRule::as_is(5, ChordQuality::Major)));
    }

    #[test]
    fn test_check_applied_and_accidentals() {
        let c = scale("C major");
        let applied = RomanNumeral::parse("V/V", c).unwrap();
        assert!(!check(&applied, &MatchingRule::diatonic(5)));
        assert!(check(&applied, &MatchingRule::as_is(5, ChordQuality::Major).applied_to(5)));
        let borrowed = RomanNumeral::parse("bVII", c).unwrap();
        assert!(!check(&borrowed, &MatchingRule::diatonic(7)));
        assert!(check(&borrowed, &MatchingRule::as_is(7, ChordQuality::Major).accidental(-1)));
        assert!(check(&borrowed, &MatchingRule::any()));
    }

    #[test]
    fn test_any_yields_nothing() {
        assert!(yield_chords(&MatchingRule::any(), scale("C major")).next().is_none());
    }
}
