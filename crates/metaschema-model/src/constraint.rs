//! Constraint declarations attached to definitions
//!
//! Constraints are carried as declared. Target paths and test expressions
//! are opaque [`MetapathExpression`] values; nothing in this crate evaluates
//! them.

use crate::instance::MaxOccurs;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a constraint violation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Debug,
    Informational,
    Warning,
    #[default]
    Error,
    Critical,
}

impl Level {
    /// Parse the declared level keyword
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CRITICAL" => Some(Self::Critical),
            "ERROR" => Some(Self::Error),
            "WARNING" => Some(Self::Warning),
            "INFORMATIONAL" => Some(Self::Informational),
            "DEBUG" => Some(Self::Debug),
            _ => None,
        }
    }
}

/// A string-backed path or test expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetapathExpression(String);

impl MetapathExpression {
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    /// The expression selecting the context item itself
    pub fn context() -> Self {
        Self(".".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MetapathExpression {
    fn default() -> Self {
        Self::context()
    }
}

impl fmt::Display for MetapathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One permitted value of an allowed-values constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A key component of an index or uniqueness constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeyField {
    pub target: MetapathExpression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// The rule a constraint expresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConstraintKind {
    #[serde(rename_all = "kebab-case")]
    AllowedValues {
        values: Vec<AllowedValue>,
        #[serde(default)]
        allow_other: bool,
    },
    #[serde(rename_all = "kebab-case")]
    Matches {
        #[serde(default)]
        regex: Option<String>,
        #[serde(default)]
        datatype: Option<String>,
    },
    #[serde(rename_all = "kebab-case")]
    HasCardinality {
        #[serde(default)]
        min_occurs: Option<u32>,
        #[serde(default)]
        max_occurs: Option<MaxOccurs>,
    },
    #[serde(rename_all = "kebab-case")]
    Index {
        name: String,
        key_fields: Vec<KeyField>,
    },
    #[serde(rename_all = "kebab-case")]
    IsUnique { key_fields: Vec<KeyField> },
    #[serde(rename_all = "kebab-case")]
    IndexHasKey {
        name: String,
        key_fields: Vec<KeyField>,
    },
    Expect { test: MetapathExpression },
}

impl ConstraintKind {
    /// The keyword naming this kind of constraint
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::AllowedValues { .. } => "allowed-values",
            Self::Matches { .. } => "matches",
            Self::HasCardinality { .. } => "has-cardinality",
            Self::Index { .. } => "index",
            Self::IsUnique { .. } => "is-unique",
            Self::IndexHasKey { .. } => "index-has-key",
            Self::Expect { .. } => "expect",
        }
    }
}

/// A declared constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub target: MetapathExpression,
    #[serde(flatten)]
    pub kind: ConstraintKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Constraint {
    /// Create a constraint at `ERROR` level targeting the context item
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            id: None,
            level: Level::default(),
            target: MetapathExpression::context(),
            kind,
            message: None,
            remarks: None,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = MetapathExpression::new(target);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
