// Chord choice: the harmonizer.
//
// Given per-position constraints, produces a lazy tree of roman-numeral
// groups. Each step from a previous chord offers:
//
// 1. Every progression target reachable from it (registration order), then
//    staying on the previous chord.
// 2. For each target, the target itself and then its substitutes.
// 3. For each of those, expansion groups (interpolated chords + the chord),
//    longest first, then the bare chord.
// 4. With modulation enabled and no key pinned at this position, the same
//    groups again with the last chord reinterpreted in each allowed key:
//    the chord keeps its old-key spelling, gains `pivot = true`, and the
//    search continues from its new-key reading.
//
// A pivot group whose chords also complete the passage without modulating
// is flagged `avoidable`, so preferences can rank it below the plain group.
//
// Groups longer than the remaining constraints are dropped. Every chord of
// a group is reconciled against its constraint (`reconcile`); a group with
// any mismatch is discarded. A group that does not reach the end is kept
// only if its own continuation is non-empty, so dead branches never reach
// consumers.
//
// Continuations are memoized by (position, previous numeral). Cached
// forests reach the cache only through a `Weak`, so the cache does not keep
// itself alive; the `Harmonization` returned to callers owns it.

use crate::chord::{HarmonizedChord, IncompleteChord, Voice};
use crate::error::HarmonyError;
use crate::lazy::{Forest, Node};
use crate::matching::{MatchingRule, check, yield_chords};
use crate::params::HarmonizerParameters;
use crate::tables::{ExpansionKind, ExpansionRule, RuleTables};
use chorale_theory::{ChordQuality, Flags, Mode, RomanNumeral, RomanNumeralParams, Scale};
use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Consecutive chords chosen in one step.
pub type Group = Vec<HarmonizedChord>;

type Cache = RefCell<HashMap<(usize, RomanNumeral), Forest<Group>>>;

/// Cache hit and miss counters, shared by every search of one harmonizer.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl CacheStats {
    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    pub fn misses(&self) -> usize {
        self.misses.get()
    }
}

/// The tree of harmonizations for one constraint list. Holds the
/// continuation cache for as long as the tree is in use.
pub struct Harmonization {
    forest: Forest<Group>,
    _cache: Option<Rc<Cache>>,
}

impl Harmonization {
    pub fn forest(&self) -> &Forest<Group> {
        &self.forest
    }

    /// Every complete harmonization, flattened to one chord per position.
    pub fn sequences(&self) -> impl Iterator<Item = Vec<HarmonizedChord>> + use<> {
        self.forest.paths().map(|groups| groups.into_iter().flatten().collect())
    }
}

pub struct Harmonizer {
    params: HarmonizerParameters,
    tables: Rc<RuleTables>,
    stats: Rc<CacheStats>,
}

impl Harmonizer {
    pub fn new(params: HarmonizerParameters) -> Result<Harmonizer, HarmonyError> {
        let tables = Rc::new(params.resolve_tables()?);
        debug!(
            progressions = tables.progressions.len(),
            expansions = tables.expansions.len(),
            substitutions = tables.substitutions.len(),
            "harmonizer tables resolved"
        );
        Ok(Harmonizer {
            params,
            tables,
            stats: Rc::new(CacheStats::default()),
        })
    }

    pub fn params(&self) -> &HarmonizerParameters {
        &self.params
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// All harmonizations of `constraints` starting in `scale`. Empty when
    /// the first constraint fits neither its own numeral nor the tonic.
    pub fn harmonize(&self, constraints: &[IncompleteChord], scale: Scale) -> Harmonization {
        let cache = (!self.params.disable_caching).then(|| Rc::new(Cache::default()));
        let search = Rc::new(Search {
            params: self.params.clone(),
            tables: Rc::clone(&self.tables),
            constraints: constraints.to_vec(),
            stats: Rc::clone(&self.stats),
        });
        let weak = cache.as_ref().map(Rc::downgrade);
        let forest = match constraints.first() {
            None => Forest::empty(),
            Some(first) => {
                let start = match &first.numeral {
                    Some(numeral) => Some(numeral.clone()),
                    None => tonic(scale),
                };
                match start.and_then(|start| reconcile(first, &start).map(|chord| (start, chord))) {
                    None => {
                        debug!("first constraint does not reconcile with its starting chord");
                        Forest::empty()
                    }
                    Some((_, chord)) if constraints.len() == 1 => Forest::from_vec(vec![Node::leaf(vec![chord])]),
                    Some((start, chord)) => {
                        let rest = search.continuation(weak, 1, without_flags(&start));
                        Forest::new(std::iter::once(Node::branch(vec![chord], rest)))
                            .pruned()
                    }
                }
            }
        };
        Harmonization { forest, _cache: cache }
    }
}

/// The default first chord: a tonic triad in the key's mode.
pub fn tonic(scale: Scale) -> Option<RomanNumeral> {
    let quality = match scale.mode {
        Mode::Major => ChordQuality::Major,
        Mode::Minor => ChordQuality::Minor,
    };
    RomanNumeral::new(RomanNumeralParams::triad(1, quality, scale)).ok()
}

/// Fit `numeral` to a constraint: known pitch classes must be chord tones,
/// a known bass must be the chord's bass, any numeral fields the
/// constraint gives must agree, and flags must merge. The key is compared
/// only when the constraint pins one.
pub fn reconcile(constraint: &IncompleteChord, numeral: &RomanNumeral) -> Option<HarmonizedChord> {
    let flags = constraint.all_flags()?.merge(numeral.flags())?;
    for voice in Voice::ALL {
        let Some(pc) = constraint.voices[voice.index()].pitch_class() else {
            continue;
        };
        if !numeral.contains(pc) || (voice == Voice::Bass && pc != numeral.bass()) {
            return None;
        }
    }
    if let Some(wanted) = &constraint.numeral {
        let same = wanted.degree() == numeral.degree()
            && wanted.accidental() == numeral.accidental()
            && wanted.quality() == numeral.quality()
            && wanted.inversion() == numeral.inversion()
            && wanted.has_seventh() == numeral.has_seventh()
            && wanted.fully_diminished() == numeral.fully_diminished()
            && wanted.applied().map(|a| a.degree) == numeral.applied().map(|a| a.degree);
        if !same {
            return None;
        }
    }
    if constraint.scale.is_some_and(|scale| scale != numeral.scale()) {
        return None;
    }
    Some(HarmonizedChord::with_voices(numeral.with_flags(flags), constraint.voices))
}

fn without_flags(numeral: &RomanNumeral) -> RomanNumeral {
    numeral.with_flags(Flags::new())
}

/// Same chord in the same key, with flags that do not contradict.
fn reproduces(chord: &RomanNumeral, wanted: &RomanNumeral) -> bool {
    without_flags(chord) == without_flags(wanted) && chord.flags().merge(wanted.flags()).is_some()
}

/// A candidate step: the chords to emit and the chord to continue from.
type Candidate = (Vec<RomanNumeral>, RomanNumeral);

struct Search {
    params: HarmonizerParameters,
    tables: Rc<RuleTables>,
    constraints: Vec<IncompleteChord>,
    stats: Rc<CacheStats>,
}

impl Search {
    fn remaining(&self, position: usize) -> usize {
        self.constraints.len().saturating_sub(position)
    }

    /// Progression targets from `previous`, then `previous` itself.
    fn targets(&self, previous: &RomanNumeral) -> Vec<RomanNumeral> {
        let scale = previous.scale();
        let mut targets: Vec<RomanNumeral> = Vec::new();
        let reachable = self
            .tables
            .progressions
            .iter()
            .filter(|rule| check(previous, &rule.source))
            .flat_map(|rule| yield_chords(&rule.target, scale));
        for target in reachable.chain(std::iter::once(without_flags(previous))) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    fn substitutes(&self, target: &RomanNumeral) -> Vec<RomanNumeral> {
        let mut chords = vec![target.clone()];
        for rule in &self.tables.substitutions {
            if !check(target, &rule.target) {
                continue;
            }
            for substitute in yield_chords(&rule.substitute, target.scale()) {
                if !chords.contains(&substitute) {
                    chords.push(substitute);
                }
            }
        }
        chords
    }

    /// Expansion groups ending on `chord`, longest first, then `[chord]`.
    fn expansions(&self, previous: &RomanNumeral, chord: &RomanNumeral) -> Vec<Vec<RomanNumeral>> {
        let fits = |rule: &Option<MatchingRule>, numeral: &RomanNumeral| {
            rule.as_ref().is_none_or(|r| check(numeral, r))
        };
        let mut rules: Vec<&ExpansionRule> = self.tables.expansions.iter().collect();
        rules.sort_by_key(|rule| Reverse(rule.insert.len()));
        let mut groups = Vec::new();
        for rule in rules {
            let applies = match rule.kind {
                ExpansionKind::Prefix => fits(&rule.target, chord),
                ExpansionKind::Suffix => fits(&rule.source, previous),
                ExpansionKind::Full => fits(&rule.source, previous) && fits(&rule.target, chord),
            };
            if !applies {
                continue;
            }
            let mut inserts: Vec<Vec<RomanNumeral>> = vec![Vec::new()];
            for pattern in &rule.insert {
                let options: Vec<RomanNumeral> = yield_chords(pattern, chord.scale()).collect();
                inserts = inserts
                    .into_iter()
                    .flat_map(|prefix| {
                        options.iter().map(move |option| {
                            let mut extended = prefix.clone();
                            extended.push(option.clone());
                            extended
                        })
                    })
                    .collect();
            }
            for mut group in inserts {
                if group.is_empty() {
                    continue;
                }
                group.push(chord.clone());
                trace!(expansion = rule.name, "expansion applies");
                groups.push(group);
            }
        }
        groups.push(vec![chord.clone()]);
        groups
    }

    /// Every candidate step from `previous` at `position`, before
    /// reconciliation.
    fn next_harmony(&self, position: usize, previous: &RomanNumeral) -> Vec<Candidate> {
        let remaining = self.remaining(position);
        let mut plain: Vec<Vec<RomanNumeral>> = Vec::new();
        for target in self.targets(previous) {
            for chord in self.substitutes(&target) {
                for group in self.expansions(previous, &chord) {
                    if group.len() <= remaining && !plain.contains(&group) {
                        plain.push(group);
                    }
                }
            }
        }

        let modulating = self.params.can_modulate
            && self
                .constraints
                .get(position)
                .is_some_and(|constraint| constraint.scale.is_none());
        let mark = |group: &[RomanNumeral]| -> Vec<RomanNumeral> {
            if self.params.can_modulate {
                group.iter().map(|c| c.with_flag("pivot", false)).collect()
            } else {
                group.to_vec()
            }
        };

        let mut candidates: Vec<Candidate> = Vec::new();
        for group in &plain {
            if let Some(last) = group.last() {
                candidates.push((mark(group.as_slice()), without_flags(last)));
            }
        }

        if modulating {
            for group in &plain {
                let Some((last, lead)) = group.split_last() else {
                    continue;
                };
                let here = last.scale();
                for modulation in &self.params.modulations_allowed {
                    let key = here.transposed(modulation.interval, modulation.mode);
                    if key == here {
                        continue;
                    }
                    let Some(reading) = last.relative_to_scale(key) else {
                        continue;
                    };
                    let mut chords = mark(lead);
                    chords.push(last.with_flag("pivot", true));
                    trace!(pivot = %last, key = %key, reading = %reading, "modulation candidate");
                    candidates.push((chords, without_flags(&reading)));
                }
            }
        }

        if !self.params.use_progressions
            && let Some(wanted) = self.constraints.get(position).and_then(|c| c.numeral.as_ref())
        {
            let reproduced = candidates
                .iter()
                .any(|(chords, _)| chords.first().is_some_and(|first| reproduces(first, wanted)));
            if !reproduced {
                candidates.push((vec![wanted.clone()], without_flags(wanted)));
            }
        }
        candidates
    }

    /// Candidates whose every chord reconciles with its constraint.
    fn matching_harmony(&self, position: usize, previous: &RomanNumeral) -> Vec<(Group, RomanNumeral)> {
        self.next_harmony(position, previous)
            .into_iter()
            .filter_map(|(chords, next)| {
                let group = chords
                    .iter()
                    .enumerate()
                    .map(|(offset, chord)| reconcile(self.constraints.get(position + offset)?, chord))
                    .collect::<Option<Group>>()?;
                Some((group, next))
            })
            .collect()
    }

    /// The subtree of harmonizations from `position` onward after
    /// `previous`, shared through the cache when one is alive.
    fn continuation(self: &Rc<Self>, cache: Option<Weak<Cache>>, position: usize, previous: RomanNumeral) -> Forest<Group> {
        let live = cache.as_ref().and_then(Weak::upgrade);
        let key = (position, previous);
        if let Some(live) = &live
            && let Some(hit) = live.borrow().get(&key)
        {
            self.stats.hits.set(self.stats.hits.get() + 1);
            return hit.clone();
        }
        self.stats.misses.set(self.stats.misses.get() + 1);

        let search = Rc::clone(self);
        let (position, previous) = key.clone();
        let weak = cache.clone();
        let forest = Forest::deferred(move || {
            let total = search.constraints.len();
            let matches = search.matching_harmony(position, &previous);
            let mut unmodulated: Vec<Vec<RomanNumeral>> = Vec::new();
            matches.into_iter().filter_map(move |(mut group, next)| {
                let reached = position + group.len();
                let shape: Vec<RomanNumeral> = group.iter().map(|c| without_flags(&c.numeral)).collect();
                let pivot = group.last().is_some_and(|c| c.numeral.flags().is_set("pivot"));
                if pivot
                    && unmodulated.contains(&shape)
                    && let Some(last) = group.last_mut()
                {
                    last.numeral = last.numeral.with_flag("avoidable", true);
                }
                let node = if reached >= total {
                    Node::leaf(group)
                } else {
                    let rest = search.continuation(weak.clone(), reached, next);
                    if rest.is_empty() {
                        trace!(position, reached, "dead branch pruned");
                        return None;
                    }
                    Node::branch(group, rest)
                };
                if !pivot {
                    unmodulated.push(shape);
                }
                Some(node)
            })
        });
        if let Some(live) = live {
            live.borrow_mut().insert(key, forest.clone());
        }
        forest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::VoiceSlot;
    use crate::params::Modulation;
    use chorale_theory::Interval;

    fn c_major() -> Scale {
        "C major".parse().unwrap()
    }

    fn numeral(text: &str) -> RomanNumeral {
        RomanNumeral::parse(text, c_major()).unwrap()
    }

    fn with_numerals(texts: &[&str]) -> Vec<IncompleteChord> {
        texts
            .iter()
            .map(|t| IncompleteChord::new().with_numeral(numeral(t)))
            .collect()
    }

    fn names(chords: &[HarmonizedChord]) -> Vec<String> {
        chords.iter().map(|c| c.numeral.name().to_string()).collect()
    }

    #[test]
    fn test_reconcile_checks_voices_and_fields() {
        let five = numeral("V");
        let soprano_b = IncompleteChord::new().with_voice(Voice::Soprano, VoiceSlot::parse("B4").unwrap());
        assert!(reconcile(&soprano_b, &five).is_some());
        assert!(reconcile(&soprano_b, &numeral("I")).is_none(), "B is not in I");
        let bass_b = IncompleteChord::new().with_voice(Voice::Bass, VoiceSlot::parse("B2").unwrap());
        assert!(reconcile(&bass_b, &five).is_none(), "root-position V has G in the bass");
        assert!(reconcile(&bass_b, &numeral("V6")).is_some());
        let wants_seventh = IncompleteChord::new().with_numeral(numeral("V7"));
        assert!(reconcile(&wants_seventh, &five).is_none());
    }

    #[test]
    fn test_reconcile_merges_flags() {
        let constraint = IncompleteChord::new().with_flag("pac", true);
        let chord = reconcile(&constraint, &numeral("I")).unwrap();
        assert!(chord.numeral.flags().is_set("pac"));
        let clash = reconcile(&constraint, &numeral("I").with_flag("pac", false));
        assert!(clash.is_none());
    }

    #[test]
    fn test_supplied_numerals_are_followed() {
        let harmonizer = Harmonizer::new(HarmonizerParameters::with_sets(&["basic"])).unwrap();
        let result = harmonizer.harmonize(&with_numerals(&["I", "IV", "V", "I"]), c_major());
        let first = result.sequences().next().expect("I IV V I is a basic progression");
        assert_eq!(names(&first), ["I", "IV", "V", "I"]);
    }

    #[test]
    fn test_impossible_progression_is_empty() {
        let harmonizer = Harmonizer::new(HarmonizerParameters::with_sets(&["basic"])).unwrap();
        let result = harmonizer.harmonize(&with_numerals(&["I", "V", "IV"]), c_major());
        assert!(result.forest().is_empty(), "V does not progress to IV");
        let mismatched = IncompleteChord::new().with_voice(Voice::Bass, VoiceSlot::parse("D3").unwrap());
        assert!(harmonizer.harmonize(&[mismatched], c_major()).forest().is_empty());
    }

    #[test]
    fn test_without_progressions_supplied_numerals_are_accepted() {
        let params = HarmonizerParameters {
            use_progressions: false,
            ..HarmonizerParameters::with_sets(&["basic"])
        };
        let harmonizer = Harmonizer::new(params).unwrap();
        let result = harmonizer.harmonize(&with_numerals(&["I", "V", "IV"]), c_major());
        let first = result.sequences().next().expect("fallback yields the supplied numeral");
        assert_eq!(names(&first), ["I", "V", "IV"]);
    }

    #[test]
    fn test_without_progressions_conflicting_flags_are_kept() {
        let params = HarmonizerParameters {
            use_progressions: false,
            can_modulate: true,
            modulations_allowed: Vec::new(),
            ..HarmonizerParameters::with_sets(&["basic"])
        };
        let harmonizer = Harmonizer::new(params).unwrap();
        let constraints = vec![
            IncompleteChord::new().with_numeral(numeral("I")),
            IncompleteChord::new().with_numeral(numeral("V").with_flag("pivot", true)),
        ];
        let result = harmonizer.harmonize(&constraints, c_major());
        let first = result
            .sequences()
            .next()
            .expect("a generated V marked as no pivot must not hide the supplied one");
        assert_eq!(names(&first), ["I", "V"]);
        assert!(first[1].numeral.flags().is_set("pivot"));
    }

    #[test]
    fn test_reproduces_compares_structure_and_flags() {
        let five = numeral("V");
        assert!(reproduces(&five, &five.with_flag("pac", true)));
        assert!(!reproduces(&five.with_flag("pivot", false), &five.with_flag("pivot", true)));
        assert!(!reproduces(&five, &numeral("V7")));
        let g_major: Scale = "G major".parse().unwrap();
        assert!(!reproduces(&five, &RomanNumeral::parse("V", g_major).unwrap()));
    }

    #[test]
    fn test_expansion_fills_two_positions() {
        let harmonizer = Harmonizer::new(HarmonizerParameters::with_sets(&["basic", "cadential"])).unwrap();
        let mut constraints = with_numerals(&["I", "IV"]);
        constraints.push(IncompleteChord::new());
        constraints.push(IncompleteChord::new().with_numeral(numeral("V")));
        let result = harmonizer.harmonize(&constraints, c_major());
        let found = result.sequences().any(|seq| names(&seq) == ["I", "IV", "I64", "V"]);
        assert!(found, "the cadential 6/4 should be interpolated before V");
    }

    #[test]
    fn test_free_positions_are_filled() {
        let harmonizer = Harmonizer::new(HarmonizerParameters::with_sets(&["basic"])).unwrap();
        let constraints = vec![IncompleteChord::new(); 3];
        let result = harmonizer.harmonize(&constraints, c_major());
        let first = result.sequences().next().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].numeral.name(), "I");
    }

    #[test]
    fn test_cache_is_shared_and_optional() {
        let constraints = vec![IncompleteChord::new(); 4];
        let cached = Harmonizer::new(HarmonizerParameters::with_sets(&["basic"])).unwrap();
        let all_cached: Vec<Vec<String>> = cached
            .harmonize(&constraints, c_major())
            .sequences()
            .map(|s| names(&s))
            .collect();
        assert!(cached.stats().hits() > 0, "converging branches should hit the cache");

        let params = HarmonizerParameters {
            disable_caching: true,
            ..HarmonizerParameters::with_sets(&["basic"])
        };
        let uncached = Harmonizer::new(params).unwrap();
        let all_uncached: Vec<Vec<String>> = uncached
            .harmonize(&constraints, c_major())
            .sequences()
            .map(|s| names(&s))
            .collect();
        assert_eq!(all_cached, all_uncached);
        assert_eq!(uncached.stats().hits(), 0);
    }

    #[test]
    fn test_pivot_modulation() {
        let params = HarmonizerParameters {
            can_modulate: true,
            modulations_allowed: vec![Modulation {
                interval: Interval::PERFECT_FIFTH,
                mode: Mode::Major,
            }],
            ..HarmonizerParameters::default()
        };
        let harmonizer = Harmonizer::new(params).unwrap();
        let mut constraints = with_numerals(&["I", "V/ii", "V", "I"]);
        constraints[1] = constraints[1].clone().with_flag("pivot", true);
        let result = harmonizer.harmonize(&constraints, c_major());
        let first = result.sequences().next().expect("pivot through V/ii = V/V in G");
        let g_major: Scale = "G major".parse().unwrap();
        assert!(first[1].numeral.flags().is_set("pivot"));
        assert!(!first[1].numeral.flags().is_set("avoidable"), "only the pivot reading fits");
        assert_eq!(first[2].numeral.scale(), g_major);
        assert_eq!(first[3].numeral.scale(), g_major);
        assert_eq!(names(&first[2..]), ["V", "I"]);
    }

    #[test]
    fn test_pivot_with_plain_alternative_is_avoidable() {
        let params = HarmonizerParameters {
            can_modulate: true,
            modulations_allowed: vec![Modulation {
                interval: Interval::PERFECT_FIFTH,
                mode: Mode::Major,
            }],
            ..HarmonizerParameters::with_sets(&["basic"])
        };
        let harmonizer = Harmonizer::new(params).unwrap();
        let result = harmonizer.harmonize(&with_numerals(&["I", "V"]), c_major());
        let sequences: Vec<Group> = result.sequences().collect();
        let plain = sequences
            .iter()
            .position(|seq| !seq[1].numeral.flags().is_set("pivot"))
            .expect("I V needs no modulation");
        let pivot = sequences
            .iter()
            .position(|seq| seq[1].numeral.flags().is_set("pivot"))
            .expect("V also reads as I in G");
        assert!(plain < pivot);
        assert!(sequences[pivot][1].numeral.flags().is_set("avoidable"));
    }
}
