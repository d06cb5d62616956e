use std::{error::Error, fmt::Display};

use crate::lexer::Span;

use super::types::Type;

/// A diagnostic from the checker. The rendered message always begins with
/// `Type Error`; expected/actual types are embedded when known.
#[derive(Debug, Clone)]
pub struct TypeError {
    pub message: String,
    pub expected: Option<Type>,
    pub actual: Option<Type>,
    pub span: Span,
}

impl TypeError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        TypeError {
            message: message.into(),
            expected: None,
            actual: None,
            span,
        }
    }

    pub fn mismatch(expected: Type, actual: Type, span: Span) -> Self {
        TypeError {
            message: format!("type '{actual}' is not assignable to type '{expected}'"),
            expected: Some(expected),
            actual: Some(actual),
            span,
        }
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Type Error: {} ({}:{})",
            self.message, self.span.start.0, self.span.start.1
        )
    }
}

impl Error for TypeError {}
