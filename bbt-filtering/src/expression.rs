// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::FilterParseError, parsing::parse};
use std::{collections::BTreeSet, fmt};

/// A parsed tag filter expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagExpr {
    /// True if the case declares this tag.
    Tag(String),
    /// Negation.
    Not(Box<TagExpr>),
    /// Conjunction.
    And(Box<TagExpr>, Box<TagExpr>),
    /// Disjunction.
    Or(Box<TagExpr>, Box<TagExpr>),
    /// An expression written inside parentheses.
    Parens(Box<TagExpr>),
}

impl TagExpr {
    /// Evaluates the expression against a set of declared tags.
    pub fn matches(&self, tags: &BTreeSet<&str>) -> bool {
        match self {
            Self::Tag(name) => tags.contains(name.as_str()),
            Self::Not(expr) => !expr.matches(tags),
            Self::And(a, b) => a.matches(tags) && b.matches(tags),
            Self::Or(a, b) => a.matches(tags) || b.matches(tags),
            Self::Parens(expr) => expr.matches(tags),
        }
    }

    /// Collects every tag mentioned by the expression.
    pub fn referenced_tags<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Tag(name) => {
                out.insert(name);
            }
            Self::Not(expr) | Self::Parens(expr) => expr.referenced_tags(out),
            Self::And(a, b) | Self::Or(a, b) => {
                a.referenced_tags(out);
                b.referenced_tags(out);
            }
        }
    }
}

impl fmt::Display for TagExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(name) => write!(f, "{name}"),
            Self::Not(expr) => write!(f, "not {expr}"),
            Self::And(a, b) => write!(f, "{a} and {b}"),
            Self::Or(a, b) => write!(f, "{a} or {b}"),
            Self::Parens(expr) => write!(f, "({expr})"),
        }
    }
}

/// A tag filter as supplied on the command line.
///
/// An empty (or all-whitespace) filter selects every case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagFilter {
    input: String,
    expr: Option<TagExpr>,
}

impl TagFilter {
    /// Parses a filter expression.
    pub fn parse(input: impl Into<String>) -> Result<Self, FilterParseError> {
        let input = input.into();
        let expr = if input.trim().is_empty() {
            None
        } else {
            Some(parse(&input)?)
        };
        Ok(Self { input, expr })
    }

    /// Returns a filter that selects every case.
    pub fn any() -> Self {
        Self {
            input: String::new(),
            expr: None,
        }
    }

    /// The filter as it was written.
    pub fn as_str(&self) -> &str {
        &self.input
    }

    /// The parsed expression, or `None` if this filter selects everything.
    pub fn expr(&self) -> Option<&TagExpr> {
        self.expr.as_ref()
    }

    /// Returns true if this filter selects every case.
    pub fn is_any(&self) -> bool {
        self.expr.is_none()
    }

    /// Returns true if a case declaring `tags` is selected.
    ///
    /// The order of `tags` and any duplicates within it do not affect the result.
    pub fn matches<I, S>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(expr) = &self.expr else {
            return true;
        };
        let tags: Vec<S> = tags.into_iter().collect();
        let set: BTreeSet<&str> = tags.iter().map(|tag| tag.as_ref()).collect();
        expr.matches(&set)
    }

    /// Returns every tag the filter mentions.
    pub fn referenced_tags(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        if let Some(expr) = &self.expr {
            expr.referenced_tags(&mut out);
        }
        out
    }
}

impl Default for TagFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.input)
    }
}
