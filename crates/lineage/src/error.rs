//! Error types for parsing and evaluation.

use crate::position::PosIdx;
use std::ops::Range;
use thiserror::Error;

/// Result type alias for evaluation.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Errors raised while evaluating (and forcing) values.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// Record arena refused a capacity its 32-bit size field cannot hold
    #[error("attribute set of size {size} is too big")]
    AttrSetTooLarge { size: usize },

    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String, pos: PosIdx },

    #[error("attribute '{name}' missing")]
    MissingAttribute { name: String, pos: PosIdx },

    #[error("expected a value of type {expected} but found {actual}")]
    TypeError {
        expected: &'static str,
        actual: &'static str,
        pos: PosIdx,
    },

    #[error("attempt to call something which is not a function but {actual}")]
    NotAFunction { actual: &'static str, pos: PosIdx },

    #[error("infinite recursion encountered")]
    InfiniteRecursion { pos: PosIdx },

    #[error("division by zero")]
    DivisionByZero { pos: PosIdx },

    #[error("integer overflow in arithmetic operation")]
    IntegerOverflow { pos: PosIdx },

    #[error("list index {index} is out of bounds for a list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize, pos: PosIdx },

    #[error("evaluation nested deeper than the maximum call depth of {max}")]
    MaxCallDepthExceeded { max: u32, pos: PosIdx },
}

impl EvalError {
    /// Position the error was raised at, `PosIdx::NONE` if there is none.
    pub fn pos(&self) -> PosIdx {
        match self {
            EvalError::AttrSetTooLarge { .. } => PosIdx::NONE,
            EvalError::UndefinedVariable { pos, .. }
            | EvalError::MissingAttribute { pos, .. }
            | EvalError::TypeError { pos, .. }
            | EvalError::NotAFunction { pos, .. }
            | EvalError::InfiniteRecursion { pos }
            | EvalError::DivisionByZero { pos }
            | EvalError::IntegerOverflow { pos }
            | EvalError::IndexOutOfBounds { pos, .. }
            | EvalError::MaxCallDepthExceeded { pos, .. } => *pos,
        }
    }
}

/// A parse problem with the byte range it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub reason: String,
    pub span: Range<usize>,
}

/// Everything that can go wrong between source text and a value.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{} parse error(s)", .0.len())]
    Parse(Vec<Diagnostic>),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
