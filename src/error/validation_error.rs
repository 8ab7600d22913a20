//! Argument validation errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// What went wrong with a single argument.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationErrorKind {
    #[error("required positional argument is missing")]
    Missing,
    #[error("cannot parse {value} as {expected}: {reason}")]
    Unparseable {
        expected: String,
        value: Value,
        reason: String,
    },
    #[error("{value} is not one of the allowed choices {choices}")]
    NotInChoices { value: Value, choices: Value },
    #[error("expected {expected} value(s), found {found}")]
    WrongCount { expected: String, found: usize },
    #[error("argument is not declared by the layer")]
    UnknownArgument,
    #[error("{count} positional value(s) beyond the declared arguments")]
    ExtraPositional { count: usize },
}

/// A single argument problem, located by binding index and layer name when
/// it was found while validating a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    pub argument: String,
    #[serde(flatten)]
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(argument: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            binding: None,
            layer: None,
            argument: argument.into(),
            kind,
        }
    }

    /// Attach the binding position and layer name.
    pub fn at(mut self, binding: usize, layer: impl Into<String>) -> Self {
        self.binding = Some(binding);
        self.layer = Some(layer.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(binding) = self.binding {
            write!(f, "binding {}", binding)?;
            if let Some(layer) = &self.layer {
                write!(f, " ({})", layer)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "argument '{}': {}", self.argument, self.kind)
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_without_location() {
        let err = ValidationError::new("count", ValidationErrorKind::Missing);
        assert_eq!(
            err.to_string(),
            "argument 'count': required positional argument is missing"
        );
    }

    #[test]
    fn test_display_with_location() {
        let err = ValidationError::new(
            "multiplier",
            ValidationErrorKind::Unparseable {
                expected: "float".into(),
                value: json!("x"),
                reason: "invalid float literal".into(),
            },
        )
        .at(1, "Double Value");
        let msg = err.to_string();
        assert!(msg.starts_with("binding 1 (Double Value): argument 'multiplier'"));
        assert!(msg.contains("cannot parse \"x\" as float"));
    }

    #[test]
    fn test_not_in_choices_display() {
        let kind = ValidationErrorKind::NotInChoices {
            value: json!("red"),
            choices: json!(["green", "blue"]),
        };
        assert_eq!(
            kind.to_string(),
            "\"red\" is not one of the allowed choices [\"green\",\"blue\"]"
        );
    }

    #[test]
    fn test_serde_roundtrip_keeps_kind_tag() {
        let err = ValidationError::new("n", ValidationErrorKind::ExtraPositional { count: 2 })
            .at(0, "layer");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], json!("extra_positional"));
        assert_eq!(value["count"], json!(2));
        let back: ValidationError = serde_json::from_value(value).unwrap();
        assert_eq!(back, err);
    }
}
