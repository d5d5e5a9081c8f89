// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while parsing tag filter expressions.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// An error that occurred while parsing a tag filter expression.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("failed to parse tag filter expression")]
pub struct FilterParseError {
    /// The input that failed to parse.
    #[source_code]
    pub input: String,

    /// The location of the error within the input.
    #[label("{}", reason)]
    pub span: SourceSpan,

    /// What went wrong.
    pub reason: ParseErrorReason,
}

impl FilterParseError {
    pub(crate) fn new(input: &str, offset: usize, reason: ParseErrorReason) -> Self {
        // Point at the next character, or at the end of the input.
        let len = input[offset..].chars().next().map_or(0, char::len_utf8);
        Self {
            input: input.to_owned(),
            span: (offset, len).into(),
            reason,
        }
    }
}

/// The reason a tag filter expression failed to parse.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseErrorReason {
    /// A tag, `not` or `(` was expected.
    #[error("expected a tag, `not` or `(`")]
    ExpectedExpression,

    /// A parenthesized group was not closed.
    #[error("expected `)`")]
    ExpectedCloseParen,

    /// Input remained after a complete expression.
    #[error("unexpected input after expression")]
    TrailingInput,
}
