//! Error types, diagnostics, and result aliases for the runtime.
//!
//! Every failure raised while evaluating is an [`EvalError`]: a structured
//! [`ErrorKind`] that callers can branch on, plus an [`ErrorMessage`] made of
//! plain and highlighted fragments that hosts render however they like.

mod message;

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::evaluator::value::ValueType;

pub use message::{ErrorMessage, MessagePart};

/// Result alias used throughout the runtime
pub type EvalResult<T> = Result<T, EvalError>;

/// The structured part of an evaluation error
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// An operand had the wrong type. `expected` may be empty when no single
    /// type would have been acceptable.
    TypeMismatch {
        expected: Vec<ValueType>,
        got: ValueType,
    },
    /// `abort` was called with a user message
    Abort { message: String },
    /// Any other failure, identified by a stable machine-readable code
    Other { message: String, code: String },
    MissingAttribute { attr_path: Vec<String> },
    AttributeAlreadyDefined { attr_path: Vec<String> },
    FunctionCallWithoutArgument { argument: String },
    CouldntFindVariable { name: String },
    /// A builtin that exists in the language but not in this runtime
    Unimplemented { builtin: String },
}

impl ErrorKind {
    /// Stable code identifying this kind of error
    pub fn code(&self) -> &str {
        match self {
            ErrorKind::TypeMismatch { .. } => "type-mismatch",
            ErrorKind::Abort { .. } => "abort",
            ErrorKind::Other { code, .. } => code,
            ErrorKind::MissingAttribute { .. } => "missing-attribute",
            ErrorKind::AttributeAlreadyDefined { .. } => "attribute-already-defined",
            ErrorKind::FunctionCallWithoutArgument { .. } => "function-call-without-argument",
            ErrorKind::CouldntFindVariable { .. } => "couldnt-find-variable",
            ErrorKind::Unimplemented { .. } => "unimplemented",
        }
    }
}

/// Main error type for evaluation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: ErrorMessage,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: ErrorMessage) -> Self {
        Self { kind, message }
    }

    /// Create a TypeMismatch error with the default message
    /// ("Expected a list, but got an int").
    pub fn type_mismatch(expected: Vec<ValueType>, got: ValueType) -> Self {
        let message = ErrorMessage::new()
            .plain("Expected ")
            .value_types(&expected)
            .plain(", but got ")
            .value_type(got);
        Self::type_mismatch_with(expected, got, message)
    }

    /// Create a TypeMismatch error with a custom message
    pub fn type_mismatch_with(
        expected: Vec<ValueType>,
        got: ValueType,
        message: ErrorMessage,
    ) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, got }, message)
    }

    /// A type mismatch where no particular type was expected
    pub fn invalid_type(got: ValueType, message: ErrorMessage) -> Self {
        Self::type_mismatch_with(Vec::new(), got, message)
    }

    /// Create an Abort error
    pub fn abort(message: impl Into<String>) -> Self {
        let message = message.into();
        let rendered = ErrorMessage::new()
            .plain("Evaluation aborted with the following error message: '")
            .highlighted(message.clone())
            .plain("'");
        Self::new(ErrorKind::Abort { message }, rendered)
    }

    /// Create an Other error with a code
    pub fn other(message: impl Into<String>, code: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorKind::Other {
                message: message.clone(),
                code: code.into(),
            },
            ErrorMessage::new().plain(message),
        )
    }

    /// Create an Other error from an already-built message
    pub fn other_with(message: ErrorMessage, code: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Other {
                message: message.to_string(),
                code: code.into(),
            },
            message,
        )
    }

    /// Create a MissingAttribute error
    pub fn missing_attribute(attr_path: Vec<String>) -> Self {
        let message = ErrorMessage::new()
            .plain("Attribute '")
            .highlighted(attr_path.join("."))
            .plain("' is missing");
        Self::new(ErrorKind::MissingAttribute { attr_path }, message)
    }

    /// Create an AttributeAlreadyDefined error
    pub fn attribute_already_defined(attr_path: Vec<String>) -> Self {
        let message = ErrorMessage::new()
            .plain("Attribute '")
            .highlighted(attr_path.join("."))
            .plain("' already defined");
        Self::new(ErrorKind::AttributeAlreadyDefined { attr_path }, message)
    }

    /// Create a FunctionCallWithoutArgument error
    pub fn function_call_without_argument(argument: impl Into<String>) -> Self {
        let argument = argument.into();
        let message = ErrorMessage::new()
            .plain("Function call is missing required argument '")
            .highlighted(argument.clone())
            .plain("'");
        Self::new(ErrorKind::FunctionCallWithoutArgument { argument }, message)
    }

    /// Create a CouldntFindVariable error
    pub fn couldnt_find_variable(name: impl Into<String>) -> Self {
        let name = name.into();
        let message = ErrorMessage::new()
            .plain("Couldn't find variable '")
            .highlighted(name.clone())
            .plain("'");
        Self::new(ErrorKind::CouldntFindVariable { name }, message)
    }

    /// Create an Unimplemented error for a builtin
    pub fn unimplemented(builtin: impl Into<String>) -> Self {
        let builtin = builtin.into();
        let message = ErrorMessage::new()
            .plain("The builtin '")
            .highlighted(builtin.clone())
            .plain("' is not implemented");
        Self::new(ErrorKind::Unimplemented { builtin }, message)
    }

    /// Get the stable code of this error
    pub fn code(&self) -> &str {
        self.kind.code()
    }
}

impl Diagnostic for EvalError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match &self.kind {
            ErrorKind::MissingAttribute { .. } => "use `or` to provide a default value",
            ErrorKind::AttributeAlreadyDefined { .. } => {
                "only attribute sets can be defined more than once"
            }
            ErrorKind::Unimplemented { .. } => {
                "this builtin needs host capabilities the runtime does not provide"
            }
            ErrorKind::Other { code, .. } if code == "infinite-recursion" => {
                "a value depends on itself"
            }
            _ => return None,
        };
        Some(Box::new(help))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_message() {
        let err = EvalError::abort("foo");
        assert_eq!(
            err.to_string(),
            "Evaluation aborted with the following error message: 'foo'"
        );
        assert_eq!(
            err.kind,
            ErrorKind::Abort {
                message: "foo".into()
            }
        );
    }

    #[test]
    fn test_attribute_messages() {
        let missing = EvalError::missing_attribute(vec!["a".into(), "b".into()]);
        assert_eq!(missing.to_string(), "Attribute 'a.b' is missing");

        let defined = EvalError::attribute_already_defined(vec!["a".into(), "b".into()]);
        assert_eq!(defined.to_string(), "Attribute 'a.b' already defined");
        assert_eq!(defined.code(), "attribute-already-defined");
    }

    #[test]
    fn test_type_mismatch_default_message() {
        let err = EvalError::type_mismatch(vec![ValueType::List], ValueType::Int);
        assert_eq!(err.to_string(), "Expected a list, but got an int");

        let err = EvalError::type_mismatch(vec![ValueType::Int, ValueType::Float], ValueType::Set);
        assert_eq!(err.to_string(), "Expected an int or a float, but got a set");
    }

    #[test]
    fn test_other_keeps_code() {
        let err = EvalError::other("boom", "some-code");
        assert_eq!(err.code(), "some-code");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_variable_and_argument_messages() {
        assert_eq!(
            EvalError::couldnt_find_variable("x").to_string(),
            "Couldn't find variable 'x'"
        );
        assert_eq!(
            EvalError::function_call_without_argument("y").to_string(),
            "Function call is missing required argument 'y'"
        );
    }

    #[test]
    fn test_diagnostic_code() {
        let err = EvalError::unimplemented("readFile");
        let code = Diagnostic::code(&err).map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("unimplemented"));
        assert!(Diagnostic::help(&err).is_some());
    }
}
