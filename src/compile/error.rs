//! Compiler error types
//!
//! Any error aborts the whole compile; no partial SQL is ever returned.
//! Non-fatal conditions (a sampling stride that is not an exact multiple of
//! the slot step, for instance) are reported as [`Advisory`] values riding
//! along with the successful result — the compiler never writes to a
//! user-facing stream itself.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while compiling a record-set specification
#[derive(Error, Debug)]
pub enum CompileError {
    /// Malformed bracket/range/duration grammar, unterminated quoted string
    /// or raw query, or a time-literal boundary that stays ambiguous after
    /// backtracking
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },

    /// Unknown series or keyword, a non-prime non-slotted keyword used as a
    /// prime-key filter, or more positional brackets than declared prime keys
    #[error("Schema error: {0}")]
    Schema(String),

    /// Duration or stride syntax applied to a keyword type that cannot
    /// carry it
    #[error("Type error: {0}")]
    Type(String),

    /// Slotted keyword whose base/step metadata is missing or degenerate
    #[error("Slot resolution error: {0}")]
    SlotResolution(String),
}

impl CompileError {
    pub(crate) fn syntax(message: impl Into<String>, offset: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            offset,
        }
    }
}

/// Result type for compiler operations
pub type CompileResult<T> = Result<T, CompileError>;

/// A non-fatal notice produced during compilation
///
/// The compile still succeeds; the adjusted value named in the message was
/// used in the generated SQL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    /// Keyword the notice concerns
    pub keyword: String,
    /// Human-readable description of the adjustment
    pub message: String,
}

impl Advisory {
    pub(crate) fn new(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            message: message.into(),
        }
    }
}
