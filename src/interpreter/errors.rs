//! Interpreter Error Taxonomy
//!
//! One integrated error type for everything the driver can hit at
//! runtime, with the exit-code policy from the shell's conventions:
//! syntax and redirection failures exit 2, expansion failures exit 1,
//! command-not-found exits 127.

use thiserror::Error;

use crate::expansion::arithmetic::ArithmeticError;
use crate::expansion::parameter::ExpansionError;
use crate::parser::types::ParseException;

#[derive(Debug, Clone, Error)]
pub enum InterpreterError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{0}")]
    Parse(#[from] ParseException),

    #[error("{0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("{0}")]
    Expansion(#[from] ExpansionError),

    #[error("{name}: command not found")]
    CommandNotFound {
        name: String,
        /// Up to three nearest-name candidates, by edit distance.
        suggestions: Vec<String>,
    },

    #[error("{0}: readonly variable")]
    ReadonlyVariable(String),

    #[error("{0}: redirection failed")]
    Redirection(String),

    /// Broken internal invariant. Logged and mapped to exit 1; never a
    /// crash.
    #[error("internal error: {0}")]
    Internal(String),
}

impl InterpreterError {
    /// Exit code this error maps to at a statement boundary.
    pub fn exit_code(&self) -> i32 {
        match self {
            InterpreterError::Syntax(_) | InterpreterError::Parse(_) => 2,
            InterpreterError::Arithmetic(_) => 2,
            InterpreterError::Redirection(_) => 2,
            InterpreterError::Expansion(ExpansionError::RequiredParameter { .. }) => 1,
            InterpreterError::Expansion(_) => 1,
            InterpreterError::CommandNotFound { .. } => 127,
            InterpreterError::ReadonlyVariable(_) => 1,
            InterpreterError::Internal(_) => 1,
        }
    }

    /// Errors that abort the surrounding script block rather than just
    /// the current statement.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InterpreterError::Expansion(ExpansionError::RequiredParameter { .. })
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(InterpreterError::Syntax("x".into()).exit_code(), 2);
        assert_eq!(
            InterpreterError::CommandNotFound { name: "x".into(), suggestions: vec![] }.exit_code(),
            127
        );
        assert_eq!(InterpreterError::ReadonlyVariable("x".into()).exit_code(), 1);
        assert_eq!(InterpreterError::Arithmetic(ArithmeticError::DivisionByZero).exit_code(), 2);
    }

    #[test]
    fn test_required_parameter_is_fatal() {
        let err = InterpreterError::Expansion(ExpansionError::RequiredParameter {
            name: "x".into(),
            message: "unset".into(),
        });
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 1);
        assert!(!InterpreterError::Syntax("x".into()).is_fatal());
    }
}
