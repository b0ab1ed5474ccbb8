//! Parse-time error surface.
//!
//! Every fallible entry point into the parser returns a [`ParseError`],
//! which always carries the 0-based byte offset at which the problem was
//! detected. Evaluation is total and never returns an error (see the crate
//! root docs).

use std::error::Error as StdError;
use thiserror::Error;

/// Something went wrong while building an expression tree from text.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("byte {offset}: failed to parse atom: {source}")]
    AtomParseFailed {
        offset: usize,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("byte {offset}: '{byte}' is not a recognised operator")]
    BadOperator { offset: usize, byte: char },

    #[error("byte {offset}: comparison is not followed by a numeric limit")]
    EmptyLimit { offset: usize },

    #[error("byte {offset}: unbalanced parentheses")]
    BraceMismatch { offset: usize },

    #[error("byte {offset}: {found} operands remain on the stack, expected exactly 1")]
    OperatorMismatch { offset: usize, found: usize },

    #[error("byte {offset}: unary operator has no operand")]
    UnaryMissingOperand { offset: usize },

    #[error("byte {offset}: binary operator has fewer than two operands")]
    BinaryMissingOperand { offset: usize },
}

impl ParseError {
    /// The byte offset at which this error was detected.
    pub fn offset(&self) -> usize {
        match *self {
            ParseError::AtomParseFailed { offset, .. }
            | ParseError::BadOperator { offset, .. }
            | ParseError::EmptyLimit { offset }
            | ParseError::BraceMismatch { offset }
            | ParseError::OperatorMismatch { offset, .. }
            | ParseError::UnaryMissingOperand { offset }
            | ParseError::BinaryMissingOperand { offset } => offset,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
