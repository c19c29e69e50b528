// Construction errors for music primitives.
//
// These are data errors (bad spelling, illegal numeral), surfaced to the
// caller immediately. A chord that merely fails to fit a key is not an
// error; those paths return `Option`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TheoryError {
    #[error("invalid note spelling: {0:?}")]
    InvalidNote(String),

    #[error("invalid interval: {0:?}")]
    InvalidInterval(String),

    #[error("invalid key: {0:?}")]
    InvalidScale(String),

    #[error("malformed roman numeral: {0:?}")]
    MalformedNumeral(String),

    #[error("applied chord {0} must be a major V or a diminished vii")]
    IllegalApplied(String),

    #[error("roman numeral field out of range: {0}")]
    OutOfRange(String),
}
