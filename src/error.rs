//! Error types for every stage: registration, parsing, binding, sampling and reporting.
//!
//! Configuration-time failures (`RegistrationError`, `SyntaxError`,
//! `BindError`, `DirectiveError`, `DurationError`) are fatal before the first
//! tick. `SampleError` is the only error a compiled `Sampler` can produce; the
//! reporting loop wraps it in `ReportError::Sample` together with the field
//! that failed.

use crate::report::Field;
use std::path::PathBuf;
use thiserror::Error;

/// Registering a callable or domain failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("cannot re-register '{0}': the name is already in use")]
    Duplicate(String),
    #[error("'{0}' is not a valid callable or domain name")]
    InvalidName(String),
    #[error("callable '{callable}' references unknown domain '{domain}'")]
    UnknownDomain { callable: String, domain: String },
    #[error("cannot compile parameter '{parameter}' of '{callable}': {reason}")]
    UnsupportedParameter { callable: String, parameter: String, reason: &'static str },
    #[error("domain '{domain}' is invalid: {reason}")]
    InvalidDomain { domain: String, reason: String },
}

/// Expression text does not match the grammar.
///
/// `offset` is a byte offset into `text`; the grammar is ASCII so it doubles
/// as a column for any input that could have been valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected} at offset {offset} in {text:?}")]
pub struct SyntaxError {
    pub offset: usize,
    pub expected: String,
    pub text: String,
}

impl SyntaxError {
    /// Render the source line with a caret under the offending position.
    ///
    /// ```text
    /// 2 * ncores(logical)
    ///            ^ expected "physical" | "all"
    /// ```
    pub fn render(&self) -> String {
        let column = self.text.get(..self.offset).map_or(self.offset, |prefix| prefix.chars().count());
        format!("{}\n{}^ expected {}", self.text, " ".repeat(column), self.expected)
    }
}

/// A parsed expression cannot be bound against the registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("unknown callable '{0}'")]
    UnknownCallable(String),
    #[error("'{0}' has required parameters and cannot be used without arguments")]
    MissingArguments(String),
    #[error("'{name}' expects {} argument(s), got {found}", describe_arity(.expected, .variadic))]
    Arity { name: String, expected: usize, variadic: bool, found: usize },
    #[error("'{tag}' is not a literal of domain '{domain}'")]
    UnknownTag { domain: String, tag: String },
    #[error("parameter '{parameter}' of '{name}' expects a literal of domain '{domain}'")]
    ExpectedTag { name: String, parameter: String, domain: String },
    #[error("literal '{tag}' of domain '{domain}' cannot be used as a number")]
    UnexpectedTag { domain: String, tag: String },
}

fn describe_arity(expected: &usize, variadic: &bool) -> String {
    if *variadic { format!("at least {expected}") } else { expected.to_string() }
}

/// A schedule directive assigns a non-integer weight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("weight for '{name}' must be an integer, got {value:?}")]
pub struct DirectiveError {
    pub name: String,
    pub value: String,
}

/// A duration literal such as `12`, `17.5s` or `2m` is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("{unit:?} is not a valid time unit in {literal:?} - expected one of '', 's', 'm', 'h'")]
    UnknownUnit { unit: String, literal: String },
    #[error("{0:?} is not a number")]
    InvalidNumber(String),
    #[error("duration {0:?} must be finite and not negative")]
    OutOfRange(String),
}

/// Anything that can go wrong turning user configuration into runtime values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    Duration(#[from] DurationError),
}

/// The expression configured for one output field is invalid.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid expression for --{}", .field.option_name())]
pub struct FieldError {
    pub field: Field,
    #[source]
    pub source: ConfigError,
}

/// A sensor failed while being sampled.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
    #[error("argument {index} of the call is not a {expected}")]
    Argument { index: usize, expected: &'static str },
    #[error("{0}")]
    Failed(String),
}

/// The reporting loop stopped abnormally.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("sampling --{} failed", .field.option_name())]
    Sample {
        field: Field,
        #[source]
        source: SampleError,
    },
    #[error("failed to write report")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_renders_caret_under_offset() {
        let err = SyntaxError { offset: 4, expected: "a number".to_string(), text: "1 + ?".to_string() };
        assert_eq!(err.render(), "1 + ?\n    ^ expected a number");
    }

    #[test]
    fn arity_message_mentions_variadic_minimum() {
        let err = BindError::Arity { name: "max".to_string(), expected: 2, variadic: true, found: 1 };
        assert_eq!(err.to_string(), "'max' expects at least 2 argument(s), got 1");
    }
}
