// Progression, expansion and substitution tables.
//
// Static data describing common-practice chord syntax:
//
// - Progressions: which chord may follow which (source pattern -> target
//   pattern). "Stay on the previous chord" is always allowed and is not
//   listed here.
// - Expansions: chords that may be interpolated between a source and a
//   target without changing the progression (a cadential 6/4 before V, a
//   passing V4/3 between I and I6).
// - Substitutions: chords that may stand in for a target (V7 for V, ii6 for
//   IV).
//
// Tables come in named sets ("basic", "applied", "cadential", "tonic",
// "sevenths", "predominant"), built once per process and shared. Callers
// choose sets by name through `HarmonizerParameters`, or hand a `RuleTables`
// of their own to the harmonizer.

use crate::error::HarmonyError;
use crate::matching::MatchingRule;
use chorale_theory::ChordQuality;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressionRule {
    pub source: MatchingRule,
    pub target: MatchingRule,
}

/// Which ends of a step an expansion must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionKind {
    /// Only the target: the inserted chords lead into it.
    Prefix,
    /// Only the source: the inserted chords prolong it.
    Suffix,
    /// Both ends.
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionRule {
    pub name: &'static str,
    pub kind: ExpansionKind,
    pub source: Option<MatchingRule>,
    pub target: Option<MatchingRule>,
    /// Patterns for the inserted chords, in order.
    pub insert: Vec<MatchingRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionRule {
    pub name: &'static str,
    pub target: MatchingRule,
    pub substitute: MatchingRule,
}

/// The rules one harmonizer run consults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTables {
    pub progressions: Vec<ProgressionRule>,
    pub expansions: Vec<ExpansionRule>,
    pub substitutions: Vec<SubstitutionRule>,
}

impl RuleTables {
    pub fn new() -> Self {
        RuleTables::default()
    }

    /// Look up named sets. Each set contributes whichever kinds of rule it
    /// has; order of `names` is registration order.
    pub fn from_names<S: AsRef<str>>(
        progressions: &[S],
        expansions: &[S],
        substitutions: &[S],
    ) -> Result<RuleTables, HarmonyError> {
        let mut tables = RuleTables::new();
        for name in progressions {
            tables.progressions.extend(named(name.as_ref())?.progressions.iter().cloned());
        }
        for name in expansions {
            tables.expansions.extend(named(name.as_ref())?.expansions.iter().cloned());
        }
        for name in substitutions {
            tables.substitutions.extend(named(name.as_ref())?.substitutions.iter().cloned());
        }
        Ok(tables)
    }

    pub fn with_progression(mut self, rule: ProgressionRule) -> Self {
        self.progressions.push(rule);
        self
    }

    pub fn with_expansion(mut self, rule: ExpansionRule) -> Self {
        self.expansions.push(rule);
        self
    }

    pub fn with_substitution(mut self, rule: SubstitutionRule) -> Self {
        self.substitutions.push(rule);
        self
    }
}

pub const SET_NAMES: [&str; 6] = ["basic", "applied", "cadential", "tonic", "sevenths", "predominant"];

/// A named built-in set.
pub fn named(name: &str) -> Result<&'static RuleTables, HarmonyError> {
    match name {
        "basic" => Ok(&BASIC),
        "applied" => Ok(&APPLIED),
        "cadential" => Ok(&CADENTIAL),
        "tonic" => Ok(&TONIC),
        "sevenths" => Ok(&SEVENTHS),
        "predominant" => Ok(&PREDOMINANT),
        _ => Err(HarmonyError::UnknownRuleSet(name.to_string())),
    }
}

static BASIC: LazyLock<RuleTables> = LazyLock::new(basic);
static APPLIED: LazyLock<RuleTables> = LazyLock::new(applied);
static CADENTIAL: LazyLock<RuleTables> = LazyLock::new(cadential);
static TONIC: LazyLock<RuleTables> = LazyLock::new(tonic);
static SEVENTHS: LazyLock<RuleTables> = LazyLock::new(sevenths);
static PREDOMINANT: LazyLock<RuleTables> = LazyLock::new(predominant);

/// Source patterns accept any inversion and an optional seventh, so V7 and
/// V6 progress like V.
fn source(degree: u8) -> MatchingRule {
    MatchingRule::diatonic(degree).any_inversion().seventh(None)
}

/// Diatonic root-position and first-inversion triads.
fn target(degree: u8) -> MatchingRule {
    MatchingRule::diatonic(degree).inversions(&[0, 1])
}

fn progression(from: u8, to: &[u8]) -> impl Iterator<Item = ProgressionRule> + '_ {
    to.iter().map(move |&t| ProgressionRule {
        source: source(from),
        target: target(t),
    })
}

fn basic() -> RuleTables {
    let mut tables = RuleTables::new();
    let moves: [(u8, &[u8]); 7] = [
        (1, &[4, 5, 6, 2, 3, 7]),
        (2, &[5, 7]),
        (3, &[6, 4]),
        (4, &[5, 2, 7, 1]),
        (5, &[1, 6]),
        (6, &[2, 4, 5]),
        (7, &[1]),
    ];
    for (from, to) in moves {
        tables.progressions.extend(progression(from, to));
    }
    // Arpeggiating the tonic: I <-> I6.
    tables.progressions.push(ProgressionRule {
        source: MatchingRule::diatonic(1).inversions(&[0]),
        target: MatchingRule::diatonic(1).inversions(&[1]),
    });
    tables.progressions.push(ProgressionRule {
        source: MatchingRule::diatonic(1).inversions(&[1]),
        target: MatchingRule::diatonic(1).inversions(&[0]),
    });
    tables
}

fn applied_dominant(target: u8) -> MatchingRule {
    MatchingRule::as_is(5, ChordQuality::Major)
        .applied_to(target)
        .inversions(&[0, 1])
}

fn applied_leading_tone(target: u8) -> MatchingRule {
    MatchingRule::as_is(7, ChordQuality::Diminished)
        .applied_to(target)
        .inversions(&[1])
}

fn applied() -> RuleTables {
    let mut tables = RuleTables::new();
    for target_degree in 2..=6u8 {
        for tonicizer in [applied_dominant(target_degree), applied_leading_tone(target_degree)] {
            tables.progressions.push(ProgressionRule {
                source: MatchingRule::any(),
                target: tonicizer.clone(),
            });
            tables.progressions.push(ProgressionRule {
                source: tonicizer.any_inversion().seventh(None),
                target: target(target_degree),
            });
        }
    }
    tables
}

fn cadential() -> RuleTables {
    RuleTables::new().with_expansion(ExpansionRule {
        name: "cadential 6/4",
        kind: ExpansionKind::Prefix,
        source: None,
        target: Some(MatchingRule::diatonic(5).seventh(None)),
        insert: vec![MatchingRule::diatonic(1).inversions(&[2])],
    })
}

fn tonic() -> RuleTables {
    let root = MatchingRule::diatonic(1).inversions(&[0]);
    let first = MatchingRule::diatonic(1).inversions(&[1]);
    let passing_v43 = MatchingRule::diatonic(5).seventh(Some(true)).inversions(&[2]);
    let passing_vii6 = MatchingRule::diatonic(7).inversions(&[1]);
    let mut tables = RuleTables::new();
    for (from, to) in [(&root, &first), (&first, &root)] {
        for passing in [&passing_v43, &passing_vii6] {
            tables.expansions.push(ExpansionRule {
                name: "passing tonic",
                kind: ExpansionKind::Full,
                source: Some(from.clone()),
                target: Some(to.clone()),
                insert: vec![passing.clone()],
            });
        }
    }
    // Neighboring IV6/4 under a held tonic.
    tables.expansions.push(ExpansionRule {
        name: "tonic neighbor",
        kind: ExpansionKind::Suffix,
        source: Some(root.clone()),
        target: None,
        insert: vec![MatchingRule::diatonic(4).inversions(&[2]), root],
    });
    tables
}

fn sevenths() -> RuleTables {
    let mut tables = RuleTables::new();
    for degree in [5u8, 2, 7] {
        for inversion in 0..=2u8 {
            tables.substitutions.push(SubstitutionRule {
                name: "add seventh",
                target: MatchingRule::diatonic(degree).inversions(&[inversion]),
                substitute: MatchingRule::diatonic(degree)
                    .seventh(Some(true))
                    .inversions(&[inversion]),
            });
        }
    }
    tables
}

fn predominant() -> RuleTables {
    RuleTables::new()
        .with_substitution(SubstitutionRule {
            name: "ii6 for IV",
            target: MatchingRule::diatonic(4),
            substitute: MatchingRule::diatonic(2).inversions(&[1]),
        })
        .with_substitution(SubstitutionRule {
            name: "ii65 for IV",
            target: MatchingRule::diatonic(4),
            substitute: MatchingRule::diatonic(2).seventh(Some(true)).inversions(&[1]),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{check, yield_chords};
    use chorale_theory::{RomanNumeral, Scale};

    fn c_major() -> Scale {
        "C major".parse().unwrap()
    }

    #[test]
    fn test_every_set_name_resolves() {
        for name in SET_NAMES {
            assert!(named(name).is_ok(), "{name} should be a built-in set");
        }
        assert!(matches!(named("baroque"), Err(HarmonyError::UnknownRuleSet(_))));
    }

    #[test]
    fn test_from_names_concatenates_in_order() {
        let tables = RuleTables::from_names(&["basic", "applied"], &["cadential"], &[]).unwrap();
        let basic_len = named("basic").unwrap().progressions.len();
        assert_eq!(tables.progressions[..basic_len], named("basic").unwrap().progressions[..]);
        assert_eq!(tables.expansions.len(), 1);
        assert!(tables.substitutions.is_empty());
    }

    #[test]
    fn test_dominant_progresses_to_tonic_first() {
        let v7 = RomanNumeral::parse("V7", c_major()).unwrap();
        let targets: Vec<String> = BASIC
            .progressions
            .iter()
            .filter(|rule| check(&v7, &rule.source))
            .flat_map(|rule| yield_chords(&rule.target, c_major()))
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(targets, ["I", "I6", "vi", "vi6"]);
    }

    #[test]
    fn test_applied_chords_resolve_to_their_target() {
        let v_of_v = RomanNumeral::parse("V7/V", c_major()).unwrap();
        // Skip the "anything may be tonicized" entries; only resolutions.
        let targets: Vec<String> = APPLIED
            .progressions
            .iter()
            .filter(|rule| rule.source.degree.is_some() && check(&v_of_v, &rule.source))
            .flat_map(|rule| yield_chords(&rule.target, c_major()))
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(targets, ["V", "V6"]);
    }

    #[test]
    fn test_cadential_six_four_targets_dominant() {
        let rule = &CADENTIAL.expansions[0];
        let v7 = RomanNumeral::parse("V7", c_major()).unwrap();
        assert!(check(&v7, rule.target.as_ref().unwrap()));
        let inserted: Vec<String> = yield_chords(&rule.insert[0], c_major())
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(inserted, ["I64"]);
    }
}
