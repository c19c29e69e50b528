// Voicing: the part writer.
//
// Turns the harmonizer's tree of roman-numeral groups into a tree of fully
// voiced chords, one chord per level, so both searches interleave depth
// first and nothing is voiced before a consumer asks for it.
//
// Per chord, candidate notes are generated voice by voice in
// `Voice::SEARCH_ORDER` (bass, soprano, alto, tenor). With no previous chord
// a voice ranges over every chord tone in every octave of its range,
// nearest the range center first; after a previous chord it ranges over the
// chord tones in the three octaves around its previous note, smallest leap
// first. After each voice is bound the partial chord is run through the
// hard rules, so a failing bass never reaches the inner-voice loops.
//
// Before any of that, `voice_all` runs a pre-flight over the constraints
// themselves and refuses outright if one already breaks a rule, and drops
// harmonizer branches containing an adjacent pair with no voicing at all
// (memoized per pair). The pair check ignores earlier history, so it only
// ever drops pairs that no history could voice.

use crate::chord::{Chord, CompleteChord, HarmonizedChord, History, IncompleteChord, Voice};
use crate::error::HarmonyError;
use crate::harmonizer::{Group, Harmonization, Harmonizer, reconcile, tonic};
use crate::lazy::{Forest, Node};
use crate::ordering::order;
use crate::params::{HarmonizerParameters, PartWriterParameters, PartWritingParameters};
use crate::preferences::PreferenceBook;
use crate::rules::RuleBook;
use chorale_theory::{Note, RomanNumeral, Scale};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Candidate notes for one voice of `chord`, best first.
pub fn voice_candidates(chord: &HarmonizedChord, voice: Voice, previous: Option<&CompleteChord>) -> Vec<Note> {
    let slot = chord.voices[voice.index()];
    if let Some(note) = slot.note() {
        return vec![note];
    }
    let pitch_classes = match slot.pitch_class() {
        Some(pc) => vec![pc],
        None if voice == Voice::Bass => vec![chord.numeral.bass()],
        None => chord.numeral.tones().to_vec(),
    };
    let (low, high) = voice.range();
    let in_range = |note: &Note| (low..=high).contains(&note.midi());
    let mut notes: Vec<Note> = match previous {
        None => pitch_classes
            .iter()
            .flat_map(|pc| (0..=8).map(move |octave| pc.in_octave(octave)))
            .filter(in_range)
            .collect(),
        Some(previous) => {
            let from = previous.pitch(voice);
            pitch_classes
                .iter()
                .flat_map(|pc| {
                    let near = Note::nearest(*pc, from);
                    [-1, 0, 1].map(|shift| pc.in_octave(near.octave + shift))
                })
                .filter(in_range)
                .collect()
        }
    };
    let anchor = previous.map_or(voice.center(), |p| p.pitch(voice));
    notes.sort_by_key(|note| ((note.midi() - anchor).abs(), note.midi()));
    notes.dedup();
    notes
}

/// Depth-first search over the voicings of one chord. Yields only chords
/// that pass every enabled hard rule against the given history.
pub struct VoicingSearch {
    rules: Rc<RuleBook>,
    numeral: RomanNumeral,
    previous: Vec<CompleteChord>,
    options: [Vec<Note>; 4],
    cursor: [usize; 4],
    bound: [Option<Note>; 4],
    depth: usize,
    done: bool,
}

impl VoicingSearch {
    pub fn new(rules: Rc<RuleBook>, chord: &HarmonizedChord, history: &History) -> Self {
        let last = history.last();
        let options = Voice::SEARCH_ORDER.map(|voice| voice_candidates(chord, voice, last));
        let done = options.iter().any(Vec::is_empty);
        let previous = history.recent(rules.lookback()).into_iter().cloned().collect();
        VoicingSearch {
            rules,
            numeral: chord.numeral.clone(),
            previous,
            options,
            cursor: [0; 4],
            bound: [None; 4],
            depth: 0,
            done,
        }
    }
}

impl Iterator for VoicingSearch {
    type Item = CompleteChord;

    fn next(&mut self) -> Option<CompleteChord> {
        let previous: Vec<&dyn Chord> = self.previous.iter().map(|c| c as &dyn Chord).collect();
        while !self.done {
            let depth = self.depth;
            let voice = Voice::SEARCH_ORDER[depth];
            let Some(&note) = self.options[depth].get(self.cursor[depth]) else {
                self.bound[voice.index()] = None;
                self.cursor[depth] = 0;
                if depth == 0 {
                    self.done = true;
                } else {
                    self.depth -= 1;
                }
                continue;
            };
            self.cursor[depth] += 1;
            self.bound[voice.index()] = Some(note);
            let partial = HarmonizedChord::voiced(self.numeral.clone(), self.bound);
            if !self.rules.test_all(&partial, &previous) {
                continue;
            }
            if depth + 1 == Voice::SEARCH_ORDER.len() {
                return partial.completed();
            }
            self.depth += 1;
        }
        None
    }
}

/// Shared state of one `voice_all` call.
struct Voicer {
    rules: Rc<RuleBook>,
}

impl Voicer {
    fn voicings(&self, chord: &HarmonizedChord, history: &History) -> VoicingSearch {
        VoicingSearch::new(Rc::clone(&self.rules), chord, history)
    }

    /// Whether `after` can be voiced following any voicing of `before`.
    fn pair_is_voiceable(&self, before: &HarmonizedChord, after: &HarmonizedChord) -> bool {
        self.voicings(before, &History::new())
            .any(|voiced| self.voicings(after, &History::new().push(voiced)).next().is_some())
    }
}

/// Voicings of the chords of `groups`, one chord per level.
fn voice_forest(voicer: Rc<Voicer>, groups: Forest<Group>, history: History) -> Forest<CompleteChord> {
    Forest::deferred(move || {
        groups.iter().flat_map(move |node| {
            let group = Rc::new(node.value);
            voice_group(Rc::clone(&voicer), group, 0, node.rest, history.clone()).iter()
        })
    })
}

fn voice_group(
    voicer: Rc<Voicer>,
    group: Rc<Group>,
    index: usize,
    rest: Option<Forest<Group>>,
    history: History,
) -> Forest<CompleteChord> {
    Forest::deferred(move || {
        let voicings = voicer.voicings(&group[index], &history);
        voicings.map(move |voiced| {
            let extended = history.push(voiced.clone());
            if index + 1 < group.len() {
                let deeper = voice_group(Rc::clone(&voicer), Rc::clone(&group), index + 1, rest.clone(), extended);
                return Node::branch(voiced, deeper);
            }
            match &rest {
                None => Node::leaf(voiced),
                Some(rest) => Node::branch(voiced, voice_forest(Rc::clone(&voicer), rest.clone(), extended)),
            }
        })
    })
}

/// Complete voicings of one constraint list, in the configured order.
pub struct Solutions {
    forest: Forest<CompleteChord>,
    len: usize,
    _harmonization: Option<Harmonization>,
}

impl Solutions {
    fn empty() -> Self {
        Solutions {
            forest: Forest::empty(),
            len: 0,
            _harmonization: None,
        }
    }

    /// Every solution, lazily. Restartable: each call starts over and
    /// replays what earlier calls already computed.
    pub fn iter(&self) -> impl Iterator<Item = Vec<CompleteChord>> + use<> {
        self.forest.paths_of_weight(self.len, |_: &CompleteChord| 1)
    }

    pub fn first(&self) -> Option<Vec<CompleteChord>> {
        self.iter().next()
    }

    pub fn forest(&self) -> &Forest<CompleteChord> {
        &self.forest
    }
}

pub struct PartWriter {
    harmonizer: Harmonizer,
    rules: Rc<RuleBook>,
    preferences: Rc<PreferenceBook>,
    params: PartWriterParameters,
}

impl PartWriter {
    pub fn new(
        harmonizer: HarmonizerParameters,
        writer: PartWriterParameters,
        writing: &PartWritingParameters,
    ) -> Result<PartWriter, HarmonyError> {
        Ok(PartWriter {
            harmonizer: Harmonizer::new(harmonizer)?,
            rules: Rc::new(RuleBook::new(writing)?),
            preferences: Rc::new(PreferenceBook::new(writing)?),
            params: writer,
        })
    }

    pub fn harmonizer(&self) -> &Harmonizer {
        &self.harmonizer
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    /// Refuse constraint lists that already break a hard rule: each
    /// constraint alone, each against the constraints before it, and a
    /// numeral-less first constraint against the default tonic.
    pub fn preflight(&self, constraints: &[IncompleteChord], scale: Scale) -> Result<(), HarmonyError> {
        let fail = |position: usize, rule: &str| -> Result<(), HarmonyError> {
            warn!(position, rule, "constraints rejected before search");
            Err(HarmonyError::Preflight {
                position,
                rule: rule.to_string(),
            })
        };
        for (position, constraint) in constraints.iter().enumerate() {
            if let Some(rule) = self.rules.check_singular(constraint).next() {
                return fail(position, rule);
            }
            let previous: Vec<&dyn Chord> = constraints[..position]
                .iter()
                .rev()
                .map(|c| c as &dyn Chord)
                .collect();
            if let Some(rule) = self.rules.check_all(constraint, &previous).next() {
                return fail(position, rule);
            }
        }
        if let Some(first) = constraints.first()
            && first.numeral.is_none()
            && tonic(scale).and_then(|t| reconcile(first, &t)).is_none()
        {
            return fail(0, "starting_tonic");
        }
        debug!(constraints = constraints.len(), "pre-flight passed");
        Ok(())
    }

    /// Every complete voicing of `constraints` in `scale`.
    pub fn voice_all(&self, constraints: &[IncompleteChord], scale: Scale) -> Result<Solutions, HarmonyError> {
        if constraints.is_empty() {
            return Ok(Solutions::empty());
        }
        self.preflight(constraints, scale)?;
        let harmonization = self.harmonizer.harmonize(constraints, scale);
        let voicer = Rc::new(Voicer {
            rules: Rc::clone(&self.rules),
        });

        let memo: RefCell<HashMap<(HarmonizedChord, HarmonizedChord), bool>> = RefCell::default();
        let checker = Rc::clone(&voicer);
        let voiceable = move |parent: Option<&Group>, group: &Group| {
            let mut chords: Vec<&HarmonizedChord> = parent.and_then(|p| p.last()).into_iter().collect();
            chords.extend(group.iter());
            if chords.len() == 1 {
                return checker.voicings(chords[0], &History::new()).next().is_some();
            }
            chords.windows(2).all(|pair| {
                let key = (pair[0].clone(), pair[1].clone());
                if let Some(known) = memo.borrow().get(&key) {
                    return *known;
                }
                let result = checker.pair_is_voiceable(pair[0], pair[1]);
                if !result {
                    debug!(before = %pair[0], after = %pair[1], "no voicing connects this pair");
                }
                memo.borrow_mut().insert(key, result);
                result
            })
        };
        let groups = harmonization.forest().filter_with(None, Rc::new(voiceable));
        let voiced = voice_forest(voicer, groups, History::new());
        let forest = order(voiced, self.params.yield_ordering, Rc::clone(&self.preferences));
        Ok(Solutions {
            forest,
            len: constraints.len(),
            _harmonization: Some(harmonization),
        })
    }
}
