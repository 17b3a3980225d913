//! Label matchers.
//!
//! A [`Matcher`] is a single `name <op> value` predicate over an alert's
//! labels. Regex matchers are compiled once, when the matcher is built, and
//! are anchored at both ends: `job=~"api"` matches `api` but not `api-2`.
//! Evaluation is infallible; a label missing from the set compares as the
//! empty string.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SuppressError};
use crate::types::Labels;
use crate::validation::validate_label_name;

/// Comparison operators for label matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOperator {
    /// Exact equality (`=`).
    #[serde(rename = "=")]
    Equal,
    /// Exact inequality (`!=`).
    #[serde(rename = "!=")]
    NotEqual,
    /// Full-string regex match (`=~`).
    #[serde(rename = "=~")]
    Regex,
    /// Negated full-string regex match (`!~`).
    #[serde(rename = "!~")]
    NotRegex,
}

impl MatchOperator {
    /// Returns the operator as a string symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Regex => "=~",
            Self::NotRegex => "!~",
        }
    }

    /// Returns true for the regex operators.
    #[must_use]
    pub const fn is_regex(&self) -> bool {
        matches!(self, Self::Regex | Self::NotRegex)
    }
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_symbol())
    }
}

/// Serialized form of a [`Matcher`]; the compiled regex is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MatcherSpec {
    name: String,
    operator: MatchOperator,
    value: String,
}

/// A single label predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MatcherSpec", into = "MatcherSpec")]
pub struct Matcher {
    name: String,
    operator: MatchOperator,
    value: String,
    regex: Option<Regex>,
}

impl Matcher {
    /// Creates a matcher, compiling the regex for `=~` and `!~`.
    ///
    /// # Errors
    ///
    /// Returns `SuppressError::InvalidMatcher` if the label name is malformed
    /// or the regex does not compile.
    pub fn new(
        name: impl Into<String>,
        operator: MatchOperator,
        value: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let value = value.into();

        let invalid = |reason: String| SuppressError::InvalidMatcher {
            matcher: format!("{name}{operator}\"{value}\""),
            reason,
        };

        validate_label_name("name", &name).map_err(|e| invalid(e.to_string()))?;

        let regex = if operator.is_regex() {
            // The bare pattern must compile alone so it cannot close the anchor group.
            Regex::new(&value).map_err(|e| invalid(e.to_string()))?;
            let anchored = format!("^(?:{value})$");
            Some(Regex::new(&anchored).map_err(|e| invalid(e.to_string()))?)
        } else {
            None
        };

        Ok(Self {
            name,
            operator,
            value,
            regex,
        })
    }

    /// Creates an `=` matcher.
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::new(name, MatchOperator::Equal, value)
    }

    /// Creates an `=~` matcher.
    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        Self::new(name, MatchOperator::Regex, pattern)
    }

    /// The label name this matcher inspects.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The comparison operator.
    #[must_use]
    pub const fn operator(&self) -> MatchOperator {
        self.operator
    }

    /// The comparison value (a pattern for regex operators).
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Evaluates the matcher against a label set.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        let actual = labels.get(&self.name).map_or("", String::as_str);
        match self.operator {
            MatchOperator::Equal => actual == self.value,
            MatchOperator::NotEqual => actual != self.value,
            MatchOperator::Regex => self.regex.as_ref().is_some_and(|re| re.is_match(actual)),
            MatchOperator::NotRegex => !self.regex.as_ref().is_some_and(|re| re.is_match(actual)),
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.operator == other.operator && self.value == other.value
    }
}

impl Eq for Matcher {}

impl TryFrom<MatcherSpec> for Matcher {
    type Error = SuppressError;

    fn try_from(spec: MatcherSpec) -> Result<Self> {
        Self::new(spec.name, spec.operator, spec.value)
    }
}

impl From<Matcher> for MatcherSpec {
    fn from(matcher: Matcher) -> Self {
        Self {
            name: matcher.name,
            operator: matcher.operator,
            value: matcher.value,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let escaped = self.value.replace('\\', "\\\\").replace('"', "\\\"");
        write!(f, "{}{}\"{}\"", self.name, self.operator, escaped)
    }
}

impl FromStr for Matcher {
    type Err = SuppressError;

    /// Parses `name="value"`, `name!="value"`, `name=~"re"` or `name!~"re"`.
    /// Quotes around the value are optional.
    fn from_str(input: &str) -> Result<Self> {
        let invalid = |reason: &str| SuppressError::InvalidMatcher {
            matcher: input.to_string(),
            reason: reason.to_string(),
        };

        let input_trimmed = input.trim();
        let op_start = input_trimmed
            .find(['=', '!'])
            .ok_or_else(|| invalid("missing operator"))?;
        let (name, rest) = input_trimmed.split_at(op_start);

        let (operator, raw_value) = [
            MatchOperator::Regex,
            MatchOperator::NotRegex,
            MatchOperator::NotEqual,
            MatchOperator::Equal,
        ]
        .into_iter()
        .find_map(|op| rest.strip_prefix(op.as_symbol()).map(|v| (op, v)))
        .ok_or_else(|| invalid("unknown operator"))?;

        let value = unquote(raw_value.trim()).ok_or_else(|| invalid("unterminated quote"))?;
        Self::new(name.trim(), operator, value)
    }
}

/// Strips surrounding double quotes and resolves `\"` and `\\` escapes.
fn unquote(raw: &str) -> Option<String> {
    let Some(inner) = raw.strip_prefix('"') else {
        return Some(raw.to_string());
    };
    let inner = inner.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Evaluates a single matcher against a label set.
#[must_use]
pub fn matches(matcher: &Matcher, labels: &Labels) -> bool {
    matcher.matches(labels)
}

/// Returns true if every matcher matches. An empty list matches everything.
#[must_use]
pub fn match_all(matchers: &[Matcher], labels: &Labels) -> bool {
    matchers.iter().all(|m| m.matches(labels))
}
