//! Threshold expression parsing.
//!
//! Grammar: comma-separated clauses `<identifier> <op> <number>` with
//! `op` one of `<=`, `>=`, `<`, `>`, `==`. Whitespace around tokens is
//! ignored and empty clauses (e.g. a trailing comma) are skipped. A single
//! malformed clause rejects the whole expression.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

static CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(<=|>=|==|<|>)\s*([-+]?(?:[0-9]+\.?[0-9]*|\.[0-9]+))$")
        .expect("clause pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "==")]
    Eq,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Eq => "==",
        }
    }

    fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "<=" => Some(Self::Le),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            ">" => Some(Self::Gt),
            "==" => Some(Self::Eq),
            _ => None,
        }
    }

    /// Whether `actual <op> threshold` holds.
    pub fn holds(&self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::Le => actual <= threshold,
            Self::Ge => actual >= threshold,
            Self::Lt => actual < threshold,
            Self::Gt => actual > threshold,
            Self::Eq => actual == threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub metric: String,
    pub operator: Operator,
    pub threshold: f64,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.metric, self.operator, self.threshold)
    }
}

/// Ordered constraints parsed from one expression. Duplicate metric names
/// are kept and evaluated independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet(Vec<Constraint>);

impl ConstraintSet {
    pub fn parse(expr: &str) -> Result<Self, ParseError> {
        if expr.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut constraints = Vec::new();
        for clause in expr.split(',').map(str::trim) {
            if clause.is_empty() {
                continue;
            }
            constraints.push(parse_clause(clause)?);
        }

        if constraints.is_empty() {
            return Err(ParseError::NoConstraints);
        }
        Ok(Self(constraints))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Constraint> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::str::FromStr for ConstraintSet {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'a> IntoIterator for &'a ConstraintSet {
    type Item = &'a Constraint;
    type IntoIter = std::slice::Iter<'a, Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn parse_clause(clause: &str) -> Result<Constraint, ParseError> {
    let caps = CLAUSE
        .captures(clause)
        .ok_or_else(|| ParseError::InvalidClause(clause.to_string()))?;

    let operator = Operator::from_symbol(&caps[2])
        .ok_or_else(|| ParseError::InvalidClause(clause.to_string()))?;
    let threshold = caps[3]
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| ParseError::InvalidThreshold {
            clause: clause.to_string(),
            value: caps[3].to_string(),
        })?;

    Ok(Constraint {
        metric: caps[1].to_string(),
        operator,
        threshold,
    })
}
