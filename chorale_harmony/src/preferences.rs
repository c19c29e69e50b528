// Soft voicing preferences and lazily evaluated score vectors.
//
// A preference scores one complete chord, optionally against the chord
// before it: 0 is neutral, negative a penalty, positive a bonus. A
// `PreferenceBook` fixes which preferences run and in what priority order;
// a chord's score is the vector of those values, compared lexicographically
// with higher first.
//
// Scores are computed on demand. `LazyScore` fills its vector only as far
// as a comparison needs, so the expensive tail preferences (motion) run
// only to break ties.
//
// See also: `ordering.rs`, which sorts voicing siblings by these scores.

use crate::chord::{CompleteChord, Voice};
use crate::error::HarmonyError;
use crate::params::PartWritingParameters;
use crate::rules::is_cadential64;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

pub type Scorer = fn(&CompleteChord, Option<&CompleteChord>) -> i32;

#[derive(Clone, Debug)]
pub struct Preference {
    pub name: String,
    pub scorer: Scorer,
}

impl Preference {
    pub fn new(name: &str, scorer: Scorer) -> Self {
        Preference {
            name: name.to_string(),
            scorer,
        }
    }
}

/// Evaluation order of the built-in preferences, highest priority first.
pub const DEFAULT_ORDER: [&str; 9] = [
    "doubling",
    "voice_crossing",
    "register",
    "shared_pitches",
    "sequence_reward",
    "modulation",
    "octave_bass_leap",
    "chord_repetition",
    "motion",
];

pub fn default_preferences() -> Vec<Preference> {
    vec![
        Preference::new("doubling", doubling),
        Preference::new("voice_crossing", voice_crossing),
        Preference::new("register", register),
        Preference::new("shared_pitches", shared_pitches),
        Preference::new("sequence_reward", sequence_reward),
        Preference::new("modulation", modulation),
        Preference::new("octave_bass_leap", octave_bass_leap),
        Preference::new("chord_repetition", chord_repetition),
        Preference::new("motion", motion),
    ]
}

/// Root-position triads prefer a doubled root, then fifth, then third.
fn doubling(chord: &CompleteChord, _: Option<&CompleteChord>) -> i32 {
    let numeral = &chord.numeral;
    if numeral.has_seventh() || numeral.inversion() != 0 {
        return 0;
    }
    let count = |index: usize| {
        chord
            .notes
            .iter()
            .filter(|n| n.pitch_class() == numeral.tones()[index])
            .count()
    };
    if count(0) >= 2 {
        0
    } else if count(2) >= 2 {
        -1
    } else if count(1) >= 2 {
        -2
    } else {
        0
    }
}

/// Voices sounding below the voice written under them, or moving past
/// where a neighbor just was.
fn voice_crossing(chord: &CompleteChord, previous: Option<&CompleteChord>) -> i32 {
    let crossed = Voice::ALL
        .windows(2)
        .filter(|pair| chord.pitch(pair[0]) < chord.pitch(pair[1]))
        .count();
    let overlapped = previous.map_or(0, |prev| {
        Voice::ALL
            .windows(2)
            .filter(|pair| chord.pitch(pair[1]) > prev.pitch(pair[0]) || chord.pitch(pair[0]) < prev.pitch(pair[1]))
            .count()
    });
    -((crossed + overlapped) as i32)
}

fn register(chord: &CompleteChord, _: Option<&CompleteChord>) -> i32 {
    let outside = Voice::ALL
        .into_iter()
        .filter(|v| {
            let (low, high) = v.core();
            !(low..=high).contains(&chord.pitch(*v))
        })
        .count();
    -(outside as i32)
}

/// Unisons between voices thin the texture.
fn shared_pitches(chord: &CompleteChord, _: Option<&CompleteChord>) -> i32 {
    let mut unisons = 0;
    for i in 0..4 {
        for j in (i + 1)..4 {
            if chord.notes[i].midi() == chord.notes[j].midi() {
                unisons += 1;
            }
        }
    }
    -unisons
}

fn sequence_reward(chord: &CompleteChord, _: Option<&CompleteChord>) -> i32 {
    i32::from(chord.numeral.flags().is_set("sequence"))
}

/// Modulating costs one; a pivot that is not a predominant-type chord
/// (ii, IV, vi) costs two; a pivot the passage did not need costs three.
fn modulation(chord: &CompleteChord, _: Option<&CompleteChord>) -> i32 {
    let numeral = &chord.numeral;
    if !numeral.flags().is_set("pivot") {
        return 0;
    }
    if numeral.flags().is_set("avoidable") {
        -3
    } else if matches!(numeral.degree(), 2 | 4 | 6) && numeral.applied().is_none() {
        -1
    } else {
        -2
    }
}

/// An octave leap in the bass is welcome out of a cadential 6/4 or into a
/// cadence.
fn octave_bass_leap(chord: &CompleteChord, previous: Option<&CompleteChord>) -> i32 {
    let Some(previous) = previous else {
        return 0;
    };
    if (chord.pitch(Voice::Bass) - previous.pitch(Voice::Bass)).abs() != 12 {
        return 0;
    }
    let flags = chord.numeral.flags();
    let juncture = is_cadential64(&previous.numeral) || flags.is_set("pac") || flags.is_set("hc");
    i32::from(juncture)
}

fn chord_repetition(chord: &CompleteChord, previous: Option<&CompleteChord>) -> i32 {
    match previous {
        Some(previous)
            if previous.numeral.name() == chord.numeral.name()
                && previous.numeral.scale() == chord.numeral.scale() =>
        {
            -1
        }
        _ => 0,
    }
}

/// Total melodic distance travelled by all four voices.
fn motion(chord: &CompleteChord, previous: Option<&CompleteChord>) -> i32 {
    let Some(previous) = previous else {
        return 0;
    };
    let travelled: i32 = Voice::ALL
        .into_iter()
        .map(|v| (chord.pitch(v) - previous.pitch(v)).abs())
        .sum();
    -travelled
}

/// The enabled preferences of one configuration, in priority order.
#[derive(Clone, Debug, Default)]
pub struct PreferenceBook {
    ordered: Vec<Preference>,
}

impl PreferenceBook {
    /// Preferences in `preference_order` first, then any other enabled
    /// registered preference in registration order. Disabled ones are
    /// dropped.
    pub fn new(params: &PartWritingParameters) -> Result<PreferenceBook, HarmonyError> {
        let registered = params.registered_preferences();
        let known = |name: &String| registered.iter().any(|p| &p.name == name);
        if let Some(unknown) = params
            .preferences
            .keys()
            .chain(params.preference_order.iter())
            .find(|name| !known(*name))
        {
            return Err(HarmonyError::UnknownPreference(unknown.clone()));
        }
        let enabled = |p: &&Preference| params.preferences.get(&p.name).copied().unwrap_or(true);
        let mut ordered: Vec<Preference> = Vec::new();
        for name in &params.preference_order {
            if let Some(p) = registered.iter().filter(enabled).find(|p| &p.name == name)
                && !ordered.iter().any(|o| o.name == p.name)
            {
                ordered.push(p.clone());
            }
        }
        for p in registered.iter().filter(enabled) {
            if !ordered.iter().any(|o| o.name == p.name) {
                ordered.push(p.clone());
            }
        }
        Ok(PreferenceBook { ordered })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// A lazy score for `chord` following `previous`.
    pub fn score(self: &Rc<Self>, chord: &CompleteChord, previous: Option<&CompleteChord>) -> LazyScore {
        LazyScore {
            book: Rc::clone(self),
            chord: chord.clone(),
            previous: previous.cloned(),
            computed: RefCell::new(Vec::new()),
        }
    }
}

/// A preference vector filled in on demand. Each entry is computed at most
/// once.
#[derive(Debug)]
pub struct LazyScore {
    book: Rc<PreferenceBook>,
    chord: CompleteChord,
    previous: Option<CompleteChord>,
    computed: RefCell<Vec<i32>>,
}

impl LazyScore {
    pub fn len(&self) -> usize {
        self.book.len()
    }

    pub fn is_empty(&self) -> bool {
        self.book.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<i32> {
        let mut computed = self.computed.borrow_mut();
        while computed.len() <= index {
            let preference = self.book.ordered.get(computed.len())?;
            computed.push((preference.scorer)(&self.chord, self.previous.as_ref()));
        }
        Some(computed[index])
    }

    /// How many entries have been evaluated so far.
    pub fn evaluated(&self) -> usize {
        self.computed.borrow().len()
    }

    /// The fully evaluated vector.
    pub fn to_vec(&self) -> Vec<i32> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// Lexicographic comparison, higher scores greater, evaluating only up
    /// to the first difference.
    pub fn compare(&self, other: &LazyScore) -> Ordering {
        let len = self.len().max(other.len());
        for index in 0..len {
            let ordering = self.get(index).unwrap_or(0).cmp(&other.get(index).unwrap_or(0));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}
