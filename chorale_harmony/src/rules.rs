// Hard voice-leading rules.
//
// Every rule is a named predicate, either over one chord (`Singular`) or
// over a chord plus its predecessors (`Sequence`, predecessors most recent
// first). Rules read chords through the `Chord` trait and treat any voice
// whose pitch is not known yet as passing, so the same rule prunes partial
// voicings during the search, validates user constraints in pre-flight and
// checks finished chords.
//
// Singular rules: voice_range, correct_notes, leading_tone_doubling,
// seventh_doubling, completeness, spacing, cadential64_doubling.
// Sequence rules: parallel_perfects, hidden_fifths, voice_overlap,
// leading_tone_resolution, seventh_resolution, melodic_intervals,
// cadential64, cadence, sequence.
//
// `RuleBook` resolves a `PartWritingParameters` into the ordered list of
// enabled rules once; disabled rules are dropped there and never invoked.
// `check_all` / `check_singular` lazily yield failing rule names in
// registration order.
//
// See also: `preferences.rs` for the soft counterpart, `part_writer.rs` for
// where rules prune the search.

use crate::chord::{Chord, Voice};
use crate::error::HarmonyError;
use crate::params::{PartWritingParameters, RuleSetting};
use chorale_theory::interval::semitone;
use chorale_theory::{Interval, Note, PitchClass, RomanNumeral};
use tracing::debug;

pub type SingularCheck = fn(&dyn Chord, u32) -> bool;
pub type SequenceCheck = fn(&dyn Chord, &[&dyn Chord], u32) -> bool;

#[derive(Clone, Copy, Debug)]
pub enum Predicate {
    Singular(SingularCheck),
    Sequence(SequenceCheck),
}

/// A registered hard rule. `default_scope` is the look-back used when the
/// configuration enables the rule without a number.
#[derive(Clone, Debug)]
pub struct HardRule {
    pub name: String,
    pub default_scope: u32,
    pub predicate: Predicate,
}

impl HardRule {
    pub fn singular(name: &str, check: SingularCheck) -> Self {
        HardRule {
            name: name.to_string(),
            default_scope: 0,
            predicate: Predicate::Singular(check),
        }
    }

    pub fn sequence(name: &str, default_scope: u32, check: SequenceCheck) -> Self {
        HardRule {
            name: name.to_string(),
            default_scope,
            predicate: Predicate::Sequence(check),
        }
    }

    pub fn is_singular(&self) -> bool {
        matches!(self.predicate, Predicate::Singular(_))
    }
}

/// Built-in rules in registration order.
pub fn default_rules() -> Vec<HardRule> {
    vec![
        HardRule::singular("voice_range", voice_range),
        HardRule::singular("correct_notes", correct_notes),
        HardRule::singular("leading_tone_doubling", leading_tone_doubling),
        HardRule::singular("seventh_doubling", seventh_doubling),
        HardRule::singular("completeness", completeness),
        HardRule::singular("spacing", spacing),
        HardRule::singular("cadential64_doubling", cadential64_doubling),
        HardRule::sequence("parallel_perfects", 1, parallel_perfects),
        HardRule::sequence("hidden_fifths", 1, hidden_fifths),
        HardRule::sequence("voice_overlap", 1, voice_overlap),
        HardRule::sequence("leading_tone_resolution", 2, leading_tone_resolution),
        HardRule::sequence("seventh_resolution", 2, seventh_resolution),
        HardRule::sequence("melodic_intervals", 1, melodic_intervals),
        HardRule::sequence("cadential64", 1, cadential64),
        HardRule::sequence("cadence", 1, cadence),
        HardRule::sequence("sequence", 2, sequence),
    ]
}

#[derive(Clone, Debug)]
struct ActiveRule {
    name: String,
    scope: u32,
    predicate: Predicate,
}

/// The enabled rules of one configuration, in evaluation order.
#[derive(Clone, Debug)]
pub struct RuleBook {
    active: Vec<ActiveRule>,
    lookback: usize,
}

impl RuleBook {
    pub fn new(params: &PartWritingParameters) -> Result<RuleBook, HarmonyError> {
        let registered = params.registered_rules();
        if let Some(unknown) = params
            .rules
            .keys()
            .find(|name| !registered.iter().any(|r| &r.name == *name))
        {
            return Err(HarmonyError::UnknownRule(unknown.clone()));
        }
        let mut active = Vec::new();
        for rule in registered {
            let setting = params
                .rules
                .get(&rule.name)
                .copied()
                .unwrap_or(RuleSetting::Enabled(true));
            if !setting.is_enabled() {
                debug!(rule = %rule.name, "hard rule disabled");
                continue;
            }
            active.push(ActiveRule {
                scope: setting.scope_or(rule.default_scope),
                name: rule.name,
                predicate: rule.predicate,
            });
        }
        let lookback = active
            .iter()
            .filter(|r| matches!(r.predicate, Predicate::Sequence(_)))
            .map(|r| r.scope as usize + 1)
            .max()
            .unwrap_or(1)
            .max(2);
        Ok(RuleBook { active, lookback })
    }

    /// How many previous chords sequence rules may look at.
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(|r| r.name.as_str())
    }

    /// Names of failing rules, singular and sequence, in order.
    pub fn check_all<'a>(
        &'a self,
        chord: &'a dyn Chord,
        previous: &'a [&'a dyn Chord],
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.active.iter().filter_map(move |rule| {
            let passes = match rule.predicate {
                Predicate::Singular(check) => check(chord, rule.scope),
                Predicate::Sequence(check) => check(chord, previous, rule.scope),
            };
            (!passes).then_some(rule.name.as_str())
        })
    }

    /// Names of failing single-chord rules, in order.
    pub fn check_singular<'a>(&'a self, chord: &'a dyn Chord) -> impl Iterator<Item = &'a str> + 'a {
        self.active.iter().filter_map(move |rule| match rule.predicate {
            Predicate::Singular(check) => (!check(chord, rule.scope)).then_some(rule.name.as_str()),
            Predicate::Sequence(_) => None,
        })
    }

    pub fn test_all(&self, chord: &dyn Chord, previous: &[&dyn Chord]) -> bool {
        self.check_all(chord, previous).next().is_none()
    }

    pub fn test_singular(&self, chord: &dyn Chord) -> bool {
        self.check_singular(chord).next().is_none()
    }
}

// ── Helpers ──

fn known_notes(chord: &dyn Chord) -> impl Iterator<Item = (Voice, Note)> + '_ {
    Voice::ALL
        .into_iter()
        .filter_map(move |v| chord.note(v).map(|n| (v, n)))
}

/// How many voices hold `pc` (pitch-class-only slots count).
fn count(chord: &dyn Chord, pc: PitchClass) -> usize {
    chord
        .slots()
        .iter()
        .filter(|s| s.pitch_class() == Some(pc))
        .count()
}

fn all_pitch_classes_known(chord: &dyn Chord) -> bool {
    chord.slots().iter().all(|s| s.pitch_class().is_some())
}

/// Notes of `voice` in the previous and current chord, when both are known.
fn motion(chord: &dyn Chord, previous: &dyn Chord, voice: Voice) -> Option<(Note, Note)> {
    Some((previous.note(voice)?, chord.note(voice)?))
}

pub fn is_cadential64(numeral: &RomanNumeral) -> bool {
    numeral.degree() == 1
        && numeral.inversion() == 2
        && !numeral.has_seventh()
        && numeral.applied().is_none()
        && numeral.accidental() == 0
}

fn is_plain(numeral: &RomanNumeral, degree: u8) -> bool {
    numeral.degree() == degree && numeral.applied().is_none() && numeral.accidental() == 0
}

/// How many immediately preceding chords hold `note` in `voice` while
/// still containing `tone`.
fn held_for(previous: &[&dyn Chord], voice: Voice, note: Note, tone: PitchClass) -> u32 {
    previous
        .iter()
        .take_while(|c| c.note(voice) == Some(note) && c.numeral().is_some_and(|n| n.contains(tone)))
        .count() as u32
}

// ── Singular rules ──

fn voice_range(chord: &dyn Chord, _: u32) -> bool {
    known_notes(chord).all(|(voice, note)| {
        let (low, high) = voice.range();
        (low..=high).contains(&note.midi())
    })
}

fn correct_notes(chord: &dyn Chord, _: u32) -> bool {
    let Some(numeral) = chord.numeral() else {
        return true;
    };
    let members = chord
        .slots()
        .iter()
        .filter_map(|s| s.pitch_class())
        .all(|pc| numeral.contains(pc));
    let bass = chord
        .slot(Voice::Bass)
        .pitch_class()
        .is_none_or(|pc| pc == numeral.bass());
    members && bass
}

fn leading_tone_doubling(chord: &dyn Chord, _: u32) -> bool {
    match chord.numeral().and_then(|n| n.leading_tone()) {
        Some(lt) => count(chord, lt) <= 1,
        None => true,
    }
}

fn seventh_doubling(chord: &dyn Chord, _: u32) -> bool {
    match chord.numeral().and_then(|n| n.seventh_tone()) {
        Some(seventh) => count(chord, seventh) <= 1,
        None => true,
    }
}

/// Root and third always present; sevenths keep their seventh. The fifth
/// may be dropped only in root position, with the root tripled (triads) or
/// doubled (sevenths).
fn completeness(chord: &dyn Chord, _: u32) -> bool {
    let Some(numeral) = chord.numeral() else {
        return true;
    };
    if !all_pitch_classes_known(chord) {
        return true;
    }
    let tones = numeral.tones();
    let counts: Vec<usize> = tones.iter().map(|t| count(chord, *t)).collect();
    if counts[0] == 0 || counts[1] == 0 {
        return false;
    }
    if numeral.has_seventh() && counts[3] == 0 {
        return false;
    }
    if counts[2] == 0 {
        let tripled = if numeral.has_seventh() { 2 } else { 3 };
        return numeral.inversion() == 0 && counts[0] == tripled;
    }
    true
}

/// Adjacent upper voices within an octave; no voice above the one over it.
fn spacing(chord: &dyn Chord, _: u32) -> bool {
    let midi = Voice::ALL.map(|v| chord.midi(v));
    for pair in [(0, 1), (1, 2)] {
        if let (Some(upper), Some(lower)) = (midi[pair.0], midi[pair.1])
            && upper - lower > 12
        {
            return false;
        }
    }
    for i in 0..4 {
        for j in (i + 1)..4 {
            if let (Some(upper), Some(lower)) = (midi[i], midi[j])
                && upper < lower
            {
                return false;
            }
        }
    }
    true
}

/// The cadential 6/4 doubles its bass.
fn cadential64_doubling(chord: &dyn Chord, _: u32) -> bool {
    match chord.numeral() {
        Some(numeral) if is_cadential64(numeral) && all_pitch_classes_known(chord) => {
            count(chord, numeral.bass()) >= 2
        }
        _ => true,
    }
}

// ── Sequence rules ──

/// No consecutive fifths or octaves (parallel or contrary) between any two
/// voices that both move.
fn parallel_perfects(chord: &dyn Chord, previous: &[&dyn Chord], _: u32) -> bool {
    let Some(prev) = previous.first() else {
        return true;
    };
    for i in 0..4 {
        for j in (i + 1)..4 {
            let (Some((pi, ci)), Some((pj, cj))) =
                (motion(chord, *prev, Voice::ALL[i]), motion(chord, *prev, Voice::ALL[j]))
            else {
                continue;
            };
            if pi == ci || pj == cj {
                continue;
            }
            let before = semitone::interval_class(pi.midi(), pj.midi());
            let after = semitone::interval_class(ci.midi(), cj.midi());
            if before == after && semitone::is_perfect_consonance(ci.midi(), cj.midi()) {
                return false;
            }
        }
    }
    true
}

/// Outer voices may reach a fifth or octave by similar motion only if the
/// soprano moves by step.
fn hidden_fifths(chord: &dyn Chord, previous: &[&dyn Chord], _: u32) -> bool {
    let Some(prev) = previous.first() else {
        return true;
    };
    let (Some((ps, cs)), Some((pb, cb))) =
        (motion(chord, *prev, Voice::Soprano), motion(chord, *prev, Voice::Bass))
    else {
        return true;
    };
    let (ps, cs, pb, cb) = (ps.midi(), cs.midi(), pb.midi(), cb.midi());
    let arriving = semitone::is_perfect_consonance(cs, cb)
        && semitone::interval_class(ps, pb) != semitone::interval_class(cs, cb);
    let similar = semitone::direction(ps, cs) != 0 && semitone::direction(ps, cs) == semitone::direction(pb, cb);
    !(arriving && similar && (cs - ps).abs() > 2)
}

/// No voice moves past where its neighbor just was.
fn voice_overlap(chord: &dyn Chord, previous: &[&dyn Chord], _: u32) -> bool {
    let Some(prev) = previous.first() else {
        return true;
    };
    for pair in Voice::ALL.windows(2) {
        let (upper, lower) = (pair[0], pair[1]);
        if let (Some(lower_now), Some(upper_before)) = (chord.midi(lower), prev.midi(upper))
            && lower_now > upper_before
        {
            return false;
        }
        if let (Some(upper_now), Some(lower_before)) = (chord.midi(upper), prev.midi(lower))
            && upper_now < lower_before
        {
            return false;
        }
    }
    true
}

/// A leading tone rises by step to its tonic when the next chord has one.
/// It may be held for up to `scope` chords while it stays a chord tone; in
/// an inner voice it may fall to the fifth of the tonic chord.
fn leading_tone_resolution(chord: &dyn Chord, previous: &[&dyn Chord], scope: u32) -> bool {
    let Some(prev) = previous.first() else {
        return true;
    };
    let (Some(prev_numeral), Some(numeral)) = (prev.numeral(), chord.numeral()) else {
        return true;
    };
    let Some(lt) = prev_numeral.leading_tone() else {
        return true;
    };
    let key = prev_numeral.key();
    for voice in Voice::ALL {
        let Some((before, now)) = motion(chord, *prev, voice) else {
            continue;
        };
        if before.pitch_class() != lt {
            continue;
        }
        if before == now {
            if !numeral.contains(lt) || held_for(previous, voice, before, lt) >= scope {
                return false;
            }
            continue;
        }
        if !numeral.contains(key.tonic) {
            continue;
        }
        if now.midi() - before.midi() == 1 && now.pitch_class() == key.tonic {
            continue;
        }
        let inner = matches!(voice, Voice::Alto | Voice::Tenor);
        let drop = before.midi() - now.midi();
        if inner && numeral.root() == key.tonic && now.pitch_class() == key.degree(5) && (3..=4).contains(&drop) {
            continue;
        }
        return false;
    }
    true
}

/// A chord seventh falls by step, or is held while it remains a chord tone
/// for up to `scope` chords. The seventh of a passing V4/3 may rise to I6.
fn seventh_resolution(chord: &dyn Chord, previous: &[&dyn Chord], scope: u32) -> bool {
    let Some(prev) = previous.first() else {
        return true;
    };
    let (Some(prev_numeral), Some(numeral)) = (prev.numeral(), chord.numeral()) else {
        return true;
    };
    let Some(seventh) = prev_numeral.seventh_tone() else {
        return true;
    };
    let passing = prev_numeral.inversion() == 2 && is_plain(numeral, 1) && numeral.inversion() == 1;
    for voice in Voice::ALL {
        let Some((before, now)) = motion(chord, *prev, voice) else {
            continue;
        };
        if before.pitch_class() != seventh {
            continue;
        }
        if before == now {
            if !numeral.contains(seventh) || held_for(previous, voice, before, seventh) >= scope {
                return false;
            }
            continue;
        }
        let fall = before.midi() - now.midi();
        if (1..=2).contains(&fall) || (passing && (1..=2).contains(&-fall)) {
            continue;
        }
        return false;
    }
    true
}

/// No augmented seconds, no diminished sevenths, nothing wider than an
/// octave, and octave leaps only falling in the bass.
fn melodic_intervals(chord: &dyn Chord, previous: &[&dyn Chord], _: u32) -> bool {
    let Some(prev) = previous.first() else {
        return true;
    };
    known_notes(chord).all(|(voice, now)| {
        let Some(before) = prev.note(voice) else {
            return true;
        };
        let interval = Interval::between(&before, &now);
        let simple = interval.simple();
        if (simple.steps(), simple.semitones()) == (1, 3) || (simple.steps(), simple.semitones()) == (6, 9) {
            return false;
        }
        let leap = (now.midi() - before.midi()).abs();
        match leap.cmp(&12) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => voice == Voice::Bass && now.midi() < before.midi(),
            std::cmp::Ordering::Greater => false,
        }
    })
}

/// A cadential 6/4 is not approached from a dominant and resolves to a
/// root-position V over the same bass (an octave leap is allowed).
fn cadential64(chord: &dyn Chord, previous: &[&dyn Chord], _: u32) -> bool {
    let Some(numeral) = chord.numeral() else {
        return true;
    };
    let Some(prev) = previous.first() else {
        return true;
    };
    let Some(prev_numeral) = prev.numeral() else {
        return true;
    };
    if is_cadential64(numeral) && prev_numeral.is_dominant_function() {
        return false;
    }
    if is_cadential64(prev_numeral) {
        let resolves = is_plain(numeral, 5) && numeral.inversion() == 0 && numeral.is_dominant_function();
        let same_bass = match (prev.note(Voice::Bass), chord.note(Voice::Bass)) {
            (Some(before), Some(now)) => before.pitch_class() == now.pitch_class(),
            _ => true,
        };
        return resolves && same_bass;
    }
    true
}

/// Cadence flags (`pac`, `iac`, `hc`, `dc`) fix the arrival chord and its
/// soprano degree, and the approach chord when that one is harmonized.
///
/// - `pac`: root-position V to root-position I, soprano on 1.
/// - `iac`: V or vii° to I, with at least one of inverted I, vii° approach,
///   inverted V or soprano off the tonic.
/// - `hc`: root-position V triad, soprano on 2, 5 or the leading tone, not
///   approached from the same dominant.
/// - `dc`: V to root-position vi, soprano on 1 or 3.
fn cadence(chord: &dyn Chord, previous: &[&dyn Chord], _: u32) -> bool {
    let flags = chord.flags();
    let wanted: Vec<&str> = ["pac", "iac", "hc", "dc"]
        .into_iter()
        .filter(|f| flags.is_set(f))
        .collect();
    if wanted.is_empty() {
        return true;
    }
    let Some(numeral) = chord.numeral() else {
        return true;
    };
    let key = numeral.key();
    let soprano = chord.slot(Voice::Soprano).pitch_class();
    let soprano_on = |pcs: &[PitchClass]| soprano.is_none_or(|pc| pcs.contains(&pc));
    let prev_numeral = previous.first().and_then(|p| p.numeral());
    let approach = |test: &dyn Fn(&RomanNumeral) -> bool| prev_numeral.is_none_or(test);
    let authentic = |p: &RomanNumeral| p.is_dominant_function() && p.applied().is_none();
    let root_dominant = |p: &RomanNumeral| p.degree() == 5 && p.inversion() == 0;

    wanted.into_iter().all(|kind| match kind {
        "pac" => {
            is_plain(numeral, 1)
                && numeral.inversion() == 0
                && soprano_on(&[key.tonic])
                && approach(&|p: &RomanNumeral| authentic(p) && root_dominant(p))
        }
        "iac" => {
            let imperfect = numeral.inversion() != 0
                || prev_numeral.is_none_or(|p| !root_dominant(p))
                || soprano.is_none_or(|pc| pc != key.tonic);
            is_plain(numeral, 1) && imperfect && approach(&authentic)
        }
        "hc" => {
            is_plain(numeral, 5)
                && numeral.inversion() == 0
                && !numeral.has_seventh()
                && soprano_on(&[key.degree(2), key.degree(5), key.leading_tone()])
                && approach(&|p: &RomanNumeral| !authentic(p))
        }
        _ => {
            is_plain(numeral, 6)
                && numeral.inversion() == 0
                && soprano_on(&[key.tonic, key.degree(3)])
                && approach(&|p: &RomanNumeral| is_plain(p, 5))
        }
    })
}

/// Inside a labelled sequence each chord repeats the voicing (chord member
/// per voice) of the chord two back.
fn sequence(chord: &dyn Chord, previous: &[&dyn Chord], _: u32) -> bool {
    if !chord.flags().is_set("sequence") {
        return true;
    }
    let Some(model) = previous.get(1) else {
        return true;
    };
    if !model.flags().is_set("sequence") {
        return true;
    }
    let (Some(numeral), Some(model_numeral)) = (chord.numeral(), model.numeral()) else {
        return true;
    };
    let member = |numeral: &RomanNumeral, pc: PitchClass| numeral.tones().iter().position(|t| *t == pc);
    Voice::ALL.into_iter().all(|voice| match (chord.slot(voice).pitch_class(), model.slot(voice).pitch_class()) {
        (Some(now), Some(then)) => member(numeral, now) == member(model_numeral, then),
        _ => true,
    })
}
