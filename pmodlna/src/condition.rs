//! Évaluation des conditions de profil.
//!
//! A condition compares one media attribute with a literal taken from a
//! profile template. Literals are parsed and regexes compiled once, when the
//! template is loaded; evaluation is a pure function of the compiled
//! condition and the attribute value.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, RuleLocation};
use crate::media::{AttributeValue, MediaDescriptor, Property, ValueType};

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    LessThanEqual,
    GreaterThanEqual,
    /// Membership in a `|` separated list of values.
    EqualsAny,
    Regex,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::LessThanEqual => "less_than_equal",
            Operator::GreaterThanEqual => "greater_than_equal",
            Operator::EqualsAny => "equals_any",
            Operator::Regex => "regex",
        }
    }

    fn is_inequality(self) -> bool {
        matches!(self, Operator::LessThanEqual | Operator::GreaterThanEqual)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition as written in a profile template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub condition: Operator,
    pub property: Property,
    pub value: String,
    /// When set, an unknown attribute fails the condition whatever the operator.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl Literal {
    fn matches(&self, value: AttributeValue<'_>) -> bool {
        match (self, value) {
            (Literal::Number(l), AttributeValue::Number(v)) => (l - v).abs() < 1e-9,
            (Literal::Text(l), AttributeValue::Text(v)) => v.eq_ignore_ascii_case(l),
            (Literal::Flag(l), AttributeValue::Flag(v)) => *l == v,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Equals(Literal),
    NotEquals(Literal),
    AtMost(f64),
    AtLeast(f64),
    AnyOf(Vec<Literal>),
    Matches(Regex),
}

/// Compiled condition, ready to be evaluated against media attributes.
#[derive(Debug, Clone, Serialize)]
pub struct Condition {
    pub operator: Operator,
    pub property: Property,
    /// Literal as written in the template.
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip)]
    predicate: Predicate,
}

impl Condition {
    pub(crate) fn compile(spec: &ConditionSpec, at: RuleLocation<'_>) -> Result<Self, ProfileError> {
        let property = spec.property;
        let raw = spec.value.trim();

        let predicate = match spec.condition {
            Operator::Equals => Predicate::Equals(parse_literal(property, raw, at)?),
            Operator::NotEquals => Predicate::NotEquals(parse_literal(property, raw, at)?),
            Operator::LessThanEqual | Operator::GreaterThanEqual => {
                if property.value_type() != ValueType::Number {
                    return Err(at.operator_mismatch(spec.condition, property));
                }
                let limit = parse_number(property, raw, at)?;
                if spec.condition == Operator::LessThanEqual {
                    Predicate::AtMost(limit)
                } else {
                    Predicate::AtLeast(limit)
                }
            }
            Operator::EqualsAny => {
                if property.value_type() == ValueType::Flag {
                    return Err(at.operator_mismatch(spec.condition, property));
                }
                let values = raw
                    .split('|')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| parse_literal(property, v, at))
                    .collect::<Result<Vec<_>, _>>()?;
                if values.is_empty() {
                    return Err(at.empty_list());
                }
                Predicate::AnyOf(values)
            }
            Operator::Regex => {
                if property.value_type() != ValueType::Text {
                    return Err(at.operator_mismatch(spec.condition, property));
                }
                let re = RegexBuilder::new(raw)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| at.invalid_regex(raw, e))?;
                Predicate::Matches(re)
            }
        };

        Ok(Self {
            operator: spec.condition,
            property,
            value: raw.to_string(),
            required: spec.required,
            predicate,
        })
    }

    /// Evaluates the condition against an attribute value.
    ///
    /// An unknown attribute satisfies inequalities (unless the condition is
    /// required) and fails every other operator.
    pub fn evaluate(&self, value: Option<AttributeValue<'_>>) -> bool {
        let Some(value) = value else {
            return self.operator.is_inequality() && !self.required;
        };

        match (&self.predicate, value) {
            (Predicate::Equals(l), v) => l.matches(v),
            (Predicate::NotEquals(l), v) => !l.matches(v),
            (Predicate::AtMost(limit), AttributeValue::Number(v)) => v <= *limit,
            (Predicate::AtLeast(limit), AttributeValue::Number(v)) => v >= *limit,
            (Predicate::AnyOf(values), v) => values.iter().any(|l| l.matches(v)),
            (Predicate::Matches(re), AttributeValue::Text(v)) => re.is_match(v),
            _ => false,
        }
    }

    /// Evaluates the condition against the attribute it refers to.
    pub fn evaluate_media(&self, media: &MediaDescriptor) -> bool {
        self.evaluate(media.attribute(self.property))
    }

    /// Upper bound enforced by a `less_than_equal` condition.
    pub fn upper_bound(&self) -> Option<f64> {
        match self.predicate {
            Predicate::AtMost(limit) => Some(limit),
            _ => None,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.operator, self.value)
    }
}

fn parse_number(property: Property, raw: &str, at: RuleLocation<'_>) -> Result<f64, ProfileError> {
    raw.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| at.invalid_number(property, raw))
}

fn parse_literal(property: Property, raw: &str, at: RuleLocation<'_>) -> Result<Literal, ProfileError> {
    match property.value_type() {
        ValueType::Number => parse_number(property, raw, at).map(Literal::Number),
        ValueType::Flag => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Literal::Flag(true)),
            "false" => Ok(Literal::Flag(false)),
            _ => Err(at.invalid_flag(property, raw)),
        },
        ValueType::Text => Ok(Literal::Text(raw.to_string())),
    }
}
