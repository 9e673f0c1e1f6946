//! Error kinds, runtime errors, and control-flow sentinels.
//!
//! Scripts observe errors through `except KIND:` arms, so every failure the
//! runtime can produce carries one of the [`ErrorKind`] variants. `return`
//! and `break` are not errors; they travel through the same channel as
//! [`Control`] sentinels so statement execution has a single result type,
//! but they are never convertible into a script-visible error accidentally.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{token::Pos, value::Value};

/// Result alias for interpreter-internal statement/expression execution.
pub(crate) type Flow<T> = Result<T, Control>;

/// Result alias for the public API surface.
pub type RunResult<T> = Result<T, OrchidError>;

/// Script-visible error classification.
///
/// The string form is the name scripts match with `except KIND:`; strum keeps
/// the table in one place for both `Display` and `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    LexError,
    ParseError,
    RuntimeError,
    TypeError,
    ValidationError,
    PermissionDenied,
    ToolNotFound,
    Timeout,
    CyclicDependency,
    ImportError,
    UserError,
}

impl ErrorKind {
    /// Whether an error of kind `self` is caught by an `except handler:` arm.
    ///
    /// The hierarchy is flat: kinds match by name only.
    #[must_use]
    pub fn caught_by(self, handler: Self) -> bool {
        self == handler
    }
}

/// A runtime error with kind, message, and the source position it was
/// raised at (when one is known).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchidError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<Pos>,
}

impl OrchidError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pos: None,
        }
    }

    /// Attaches a source position, keeping an existing one if already set —
    /// the innermost position is the useful one.
    #[must_use]
    pub fn at(mut self, pos: Pos) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }
}

impl fmt::Display for OrchidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(pos) = self.pos {
            write!(f, " ({pos})")?;
        }
        Ok(())
    }
}

impl std::error::Error for OrchidError {}

/// Non-local exits during execution.
///
/// `Return` and `Break` are ordinary control flow; only `Raise` carries a
/// real error. Code that unwinds state on failure must not treat the first
/// two as failures (an atomic block, for instance, commits on `Return`).
#[derive(Debug, Clone)]
pub(crate) enum Control {
    Return(Value),
    Break,
    Raise(OrchidError),
}

impl Control {
    /// Converts a control sentinel that escaped to the top level into the
    /// error the host sees.
    pub fn into_error(self) -> OrchidError {
        match self {
            Self::Raise(err) => err,
            Self::Return(_) => OrchidError::new(ErrorKind::RuntimeError, "'return' outside macro or agent"),
            Self::Break => OrchidError::new(ErrorKind::RuntimeError, "'break' outside loop"),
        }
    }
}

impl From<OrchidError> for Control {
    fn from(err: OrchidError) -> Self {
        Self::Raise(err)
    }
}

/// Shorthand for raising from interpreter code.
pub(crate) fn raise<T>(kind: ErrorKind, message: impl Into<String>, pos: Pos) -> Flow<T> {
    Err(Control::Raise(OrchidError::new(kind, message).at(pos)))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn kind_round_trips_through_name() {
        for kind in [
            ErrorKind::LexError,
            ErrorKind::TypeError,
            ErrorKind::CyclicDependency,
            ErrorKind::UserError,
        ] {
            assert_eq!(ErrorKind::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn display_carries_position() {
        let err = OrchidError::new(ErrorKind::TypeError, "boom").at(Pos::new(3, 7));
        assert_eq!(err.to_string(), "TypeError: boom (line 3, col 7)");
    }
}
