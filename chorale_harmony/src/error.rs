// Errors surfaced by the harmonizer and part writer.
//
// Only fatal conditions live here: bad configuration, malformed input and a
// constraint list that pre-flight proves impossible. A chord that does not
// fit a constraint, a voicing that breaks a rule, and a search that finds
// nothing are ordinary outcomes (filtered iterators, empty results).

use chorale_theory::TheoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarmonyError {
    #[error("unknown rule set {0:?}")]
    UnknownRuleSet(String),

    #[error("unknown hard rule {0:?}")]
    UnknownRule(String),

    #[error("unknown preference {0:?}")]
    UnknownPreference(String),

    #[error("constraint {position} cannot be satisfied: fails {rule}")]
    Preflight { position: usize, rule: String },

    #[error("bad input: {0}")]
    Input(String),

    #[error(transparent)]
    Theory(#[from] TheoryError),

    #[error("config I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MIDI: {0}")]
    Midi(String),
}
