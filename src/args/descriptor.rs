//! Argument descriptors.
//!
//! A layer declares its positional arguments as an ordered list and its
//! keyword arguments as an ordered mapping. Each descriptor knows how to turn
//! a raw value (as written in a stack document) into the typed value handed
//! to the layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parser::ValueParser;
use crate::error::{ValidationError, ValidationErrorKind};

/// How many values an argument takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    /// Exactly one value.
    #[default]
    Single,
    /// Zero or one value (`?`).
    #[serde(alias = "?")]
    Optional,
    /// A non-empty list (`+`).
    #[serde(alias = "+")]
    OneOrMore,
    /// A possibly empty list (`*`).
    #[serde(alias = "*")]
    ZeroOrMore,
    /// A list of exactly `n` values.
    Exactly(usize),
}

impl Multiplicity {
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Multiplicity::OneOrMore | Multiplicity::ZeroOrMore | Multiplicity::Exactly(_)
        )
    }

    fn accepts_count(&self, count: usize) -> bool {
        match self {
            Multiplicity::OneOrMore => count >= 1,
            Multiplicity::Exactly(n) => count == *n,
            _ => true,
        }
    }

    fn expected(&self) -> String {
        match self {
            Multiplicity::Single => "1".into(),
            Multiplicity::Optional => "0 or 1".into(),
            Multiplicity::OneOrMore => "1 or more".into(),
            Multiplicity::ZeroOrMore => "0 or more".into(),
            Multiplicity::Exactly(n) => n.to_string(),
        }
    }
}

/// How repeated assignments to a keyword argument combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgAction {
    /// A new value replaces the previous one.
    #[default]
    #[serde(alias = "store")]
    Replace,
    /// Each new value is appended to a list of previous values.
    Append,
}

/// Positional or keyword, with the keyword-only attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgRole {
    Positional,
    Keyword { default: Value, action: ArgAction },
}

/// Declares a single positional or keyword parameter of a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgDescriptor {
    name: String,
    description: String,
    parser: ValueParser,
    choices: Option<Vec<Value>>,
    multiplicity: Multiplicity,
    role: ArgRole,
}

impl ArgDescriptor {
    /// A positional argument: no default, must be supplied at bind time.
    pub fn positional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parser: ValueParser::Any,
            choices: None,
            multiplicity: Multiplicity::Single,
            role: ArgRole::Positional,
        }
    }

    /// A keyword argument falling back to `default` when unset.
    pub fn keyword(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parser: ValueParser::Any,
            choices: None,
            multiplicity: Multiplicity::Single,
            role: ArgRole::Keyword {
                default,
                action: ArgAction::Replace,
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parser(mut self, parser: ValueParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn multiplicity(mut self, multiplicity: Multiplicity) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    /// Set the keyword action. Ignored for positional arguments.
    pub fn action(mut self, action: ArgAction) -> Self {
        if let ArgRole::Keyword { action: current, .. } = &mut self.role {
            *current = action;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_description(&self) -> &str {
        &self.description
    }

    pub fn get_parser(&self) -> ValueParser {
        self.parser
    }

    pub fn get_choices(&self) -> Option<&[Value]> {
        self.choices.as_deref()
    }

    pub fn get_multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    pub fn role(&self) -> &ArgRole {
        &self.role
    }

    pub fn is_positional(&self) -> bool {
        matches!(self.role, ArgRole::Positional)
    }

    pub fn default_value(&self) -> Option<&Value> {
        match &self.role {
            ArgRole::Keyword { default, .. } => Some(default),
            ArgRole::Positional => None,
        }
    }

    pub fn get_action(&self) -> ArgAction {
        match &self.role {
            ArgRole::Keyword { action, .. } => *action,
            ArgRole::Positional => ArgAction::Replace,
        }
    }

    /// Whether a positional argument may be left unset.
    pub fn is_required(&self) -> bool {
        self.is_positional()
            && !matches!(
                self.multiplicity,
                Multiplicity::Optional | Multiplicity::ZeroOrMore
            )
    }

    /// Parse a raw value, checking multiplicity and choices.
    pub fn parse(&self, raw: &Value) -> Result<Value, ValidationError> {
        if !self.multiplicity.is_list() {
            return self.parse_one(raw);
        }
        let items: Vec<&Value> = match raw {
            Value::Array(items) => items.iter().collect(),
            scalar => vec![scalar],
        };
        if !self.multiplicity.accepts_count(items.len()) {
            return Err(self.error(ValidationErrorKind::WrongCount {
                expected: self.multiplicity.expected(),
                found: items.len(),
            }));
        }
        items
            .into_iter()
            .map(|item| self.parse_one(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    /// Resolve a bound value, or fall back to the default / report it missing.
    pub fn resolve(&self, bound: Option<&Value>) -> Result<Value, ValidationError> {
        if let Some(raw) = bound {
            return self.parse(raw);
        }
        match &self.role {
            ArgRole::Keyword { default, .. } if default.is_null() => Ok(Value::Null),
            ArgRole::Keyword { default, .. } => self.parse(default),
            ArgRole::Positional => match self.multiplicity {
                Multiplicity::Optional => Ok(Value::Null),
                Multiplicity::ZeroOrMore => Ok(Value::Array(Vec::new())),
                _ => Err(self.error(ValidationErrorKind::Missing)),
            },
        }
    }

    fn parse_one(&self, raw: &Value) -> Result<Value, ValidationError> {
        let parsed = self.parser.parse(raw).map_err(|reason| {
            self.error(ValidationErrorKind::Unparseable {
                expected: self.parser.name().to_string(),
                value: raw.clone(),
                reason,
            })
        })?;
        if let Some(choices) = &self.choices {
            let allowed = choices
                .iter()
                .any(|choice| self.parser.parse(choice).map_or(false, |c| c == parsed));
            if !allowed {
                return Err(self.error(ValidationErrorKind::NotInChoices {
                    value: parsed,
                    choices: Value::Array(choices.clone()),
                }));
            }
        }
        Ok(parsed)
    }

    fn error(&self, kind: ValidationErrorKind) -> ValidationError {
        ValidationError::new(self.name.clone(), kind)
    }
}
