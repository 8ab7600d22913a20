//! Value parsers: turn raw argument values into typed values.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// The parsing rule attached to an argument descriptor.
///
/// Raw values come from stack documents or the command line, so the numeric
/// and boolean parsers also accept their string spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueParser {
    /// Identity: the raw value is used as-is.
    #[default]
    #[serde(alias = "none", alias = "identity")]
    Any,
    #[serde(alias = "str")]
    String,
    #[serde(alias = "int")]
    Integer,
    Float,
    #[serde(alias = "bool")]
    Boolean,
    /// A filesystem path; backslash separators are normalized to `/`.
    Path,
    /// A JSON document given as a string; non-string values pass through.
    Json,
}

impl ValueParser {
    pub fn name(&self) -> &'static str {
        match self {
            ValueParser::Any => "any",
            ValueParser::String => "string",
            ValueParser::Integer => "integer",
            ValueParser::Float => "float",
            ValueParser::Boolean => "boolean",
            ValueParser::Path => "path",
            ValueParser::Json => "json",
        }
    }

    /// Parse one raw value. The error is a human-readable reason.
    pub fn parse(&self, raw: &Value) -> Result<Value, String> {
        match self {
            ValueParser::Any => Ok(raw.clone()),
            ValueParser::String => match raw {
                Value::String(s) => Ok(Value::String(s.clone())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(format!("expected a string, got {}", type_name(other))),
            },
            ValueParser::Integer => parse_integer(raw).map(Value::from),
            ValueParser::Float => {
                let f = parse_float(raw)?;
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| "not a finite number".to_string())
            }
            ValueParser::Boolean => parse_boolean(raw).map(Value::Bool),
            ValueParser::Path => match raw {
                Value::String(s) => Ok(Value::String(s.replace('\\', "/"))),
                other => Err(format!("expected a path string, got {}", type_name(other))),
            },
            ValueParser::Json => match raw {
                Value::String(s) => serde_json::from_str(s).map_err(|e| e.to_string()),
                other => Ok(other.clone()),
            },
        }
    }
}

fn parse_integer(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(format!("{} is not an integer", n)),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid integer literal ({})", e)),
        other => Err(format!("expected an integer, got {}", type_name(other))),
    }
}

fn parse_float(raw: &Value) -> Result<f64, String> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("{} is not representable as a float", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid float literal ({})", e)),
        other => Err(format!("expected a number, got {}", type_name(other))),
    }
}

fn parse_boolean(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("{} is not a boolean", n)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(format!("'{}' is not a boolean", s)),
        },
        other => Err(format!("expected a boolean, got {}", type_name(other))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
