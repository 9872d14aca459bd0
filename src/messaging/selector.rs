//! # Property Selectors
//!
//! Broker-evaluated predicates over message properties. Only the forms the stubber
//! and its tests need are supported:
//!
//! - `<property> IS NULL`
//! - `<property> IS NOT NULL`
//! - `<property> = <literal>` where the literal is `'text'`, `TRUE`, `FALSE`,
//!   an integer or a decimal
//!
//! Keywords are case-insensitive.

use std::fmt;
use std::str::FromStr;

use crate::constants::PROCESSED_PROPERTY;
use crate::messaging::errors::BrokerError;
use crate::messaging::message::{Message, PropertyValue};

/// Parsed selector expression
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    IsNull(String),
    IsNotNull(String),
    Equals(String, PropertyValue),
}

impl Selector {
    /// Selector that only accepts messages the stubber has not republished yet
    pub fn not_processed() -> Self {
        Self::IsNull(PROCESSED_PROPERTY.to_string())
    }

    pub fn parse(expression: &str) -> Result<Self, BrokerError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(BrokerError::invalid_selector(expression, "expression is empty"));
        }

        if let Some((property, literal)) = trimmed.split_once('=') {
            let property = parse_identifier(expression, property.trim())?;
            let value = parse_literal(expression, literal.trim())?;
            return Ok(Self::Equals(property, value));
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
        match upper.as_slice() {
            [_, is, null] if is == "IS" && null == "NULL" => {
                Ok(Self::IsNull(parse_identifier(expression, tokens[0])?))
            }
            [_, is, not, null] if is == "IS" && not == "NOT" && null == "NULL" => {
                Ok(Self::IsNotNull(parse_identifier(expression, tokens[0])?))
            }
            _ => Err(BrokerError::invalid_selector(
                expression,
                "expected '<property> IS [NOT] NULL' or '<property> = <literal>'",
            )),
        }
    }

    /// Name of the property the selector inspects
    pub fn property(&self) -> &str {
        match self {
            Self::IsNull(name) | Self::IsNotNull(name) | Self::Equals(name, _) => name,
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::IsNull(name) => !message.has_property(name),
            Self::IsNotNull(name) => message.has_property(name),
            Self::Equals(name, expected) => message
                .property(name)
                .is_some_and(|actual| values_equal(actual, expected)),
        }
    }
}

impl FromStr for Selector {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsNull(name) => write!(f, "{name} IS NULL"),
            Self::IsNotNull(name) => write!(f, "{name} IS NOT NULL"),
            Self::Equals(name, PropertyValue::Bool(value)) => {
                write!(f, "{name} = {}", if *value { "TRUE" } else { "FALSE" })
            }
            Self::Equals(name, value) => write!(f, "{name} = {value}"),
        }
    }
}

fn parse_identifier(expression: &str, token: &str) -> Result<String, BrokerError> {
    let mut chars = token.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
    if valid_start && valid_rest {
        Ok(token.to_string())
    } else {
        Err(BrokerError::invalid_selector(
            expression,
            format!("invalid property name '{token}'"),
        ))
    }
}

fn parse_literal(expression: &str, token: &str) -> Result<PropertyValue, BrokerError> {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        let inner = &token[1..token.len() - 1];
        return Ok(PropertyValue::String(inner.replace("''", "'")));
    }
    match token.to_ascii_uppercase().as_str() {
        "TRUE" => return Ok(PropertyValue::Bool(true)),
        "FALSE" => return Ok(PropertyValue::Bool(false)),
        _ => {}
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(PropertyValue::Long(value));
    }
    if let Ok(value) = token.parse::<f64>() {
        return Ok(PropertyValue::Double(value));
    }
    Err(BrokerError::invalid_selector(
        expression,
        format!("invalid literal '{token}'"),
    ))
}

fn values_equal(actual: &PropertyValue, expected: &PropertyValue) -> bool {
    match (actual, expected) {
        (PropertyValue::String(a), PropertyValue::String(b)) => a == b,
        (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a == b,
        (a, b) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        },
    }
}
