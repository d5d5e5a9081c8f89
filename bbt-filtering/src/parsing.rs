// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parser for tag filter expressions.
//!
//! The grammar, from lowest to highest precedence:
//!
//! ```text
//! or    := and ("or" and)*
//! and   := unary ("and" unary)*
//! unary := "not" unary | atom
//! atom  := "(" or ")" | tag
//! ```
//!
//! A tag is any run of characters other than whitespace and parentheses that is not one of the
//! keywords `and`, `or` and `not`. Binary operators are left-associative.

use crate::{
    errors::{FilterParseError, ParseErrorReason},
    expression::TagExpr,
};
use winnow::{
    ascii::multispace0,
    combinator::{alt, cut_err, delimited, eof, preceded, repeat, terminated},
    error::{ContextError, StrContext, StrContextValue},
    stream::LocatingSlice,
    token::take_while,
    ModalParser, ModalResult, Parser,
};

type Input<'i> = LocatingSlice<&'i str>;

const KEYWORDS: &[&str] = &["and", "or", "not"];

const EXPRESSION_LABEL: &str = "expression";
const END_LABEL: &str = "end of expression";

pub(crate) fn parse(input: &str) -> Result<TagExpr, FilterParseError> {
    let mut parser = terminated(
        parse_or,
        ws(eof.context(StrContext::Label(END_LABEL))),
    );
    parser
        .parse(LocatingSlice::new(input))
        .map_err(|err| FilterParseError::new(input, err.offset(), reason_for(err.inner())))
}

fn reason_for(err: &ContextError) -> ParseErrorReason {
    for context in err.context() {
        match context {
            StrContext::Expected(StrContextValue::CharLiteral(')')) => {
                return ParseErrorReason::ExpectedCloseParen;
            }
            StrContext::Label(label) if *label == END_LABEL => {
                return ParseErrorReason::TrailingInput;
            }
            _ => {}
        }
    }
    ParseErrorReason::ExpectedExpression
}

fn ws<'i, O, P>(inner: P) -> impl ModalParser<Input<'i>, O, ContextError>
where
    P: ModalParser<Input<'i>, O, ContextError>,
{
    preceded(multispace0, inner)
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')'
}

fn word<'i>(input: &mut Input<'i>) -> ModalResult<&'i str> {
    take_while(1.., is_word_char).parse_next(input)
}

fn keyword<'i>(kw: &'static str) -> impl ModalParser<Input<'i>, &'i str, ContextError> {
    ws(word.verify(move |w: &str| w == kw))
}

fn parse_tag(input: &mut Input<'_>) -> ModalResult<TagExpr> {
    ws(word.verify(|w: &str| !KEYWORDS.contains(&w)))
        .map(|w: &str| TagExpr::Tag(w.to_owned()))
        .parse_next(input)
}

fn parse_parens(input: &mut Input<'_>) -> ModalResult<TagExpr> {
    delimited(
        ws('('),
        cut_err(parse_or),
        cut_err(ws(')')).context(StrContext::Expected(StrContextValue::CharLiteral(')'))),
    )
    .map(|expr| TagExpr::Parens(Box::new(expr)))
    .parse_next(input)
}

fn parse_atom(input: &mut Input<'_>) -> ModalResult<TagExpr> {
    alt((parse_parens, parse_tag))
        .context(StrContext::Label(EXPRESSION_LABEL))
        .parse_next(input)
}

fn parse_unary(input: &mut Input<'_>) -> ModalResult<TagExpr> {
    alt((
        preceded(keyword("not"), cut_err(parse_unary)).map(|expr| TagExpr::Not(Box::new(expr))),
        parse_atom,
    ))
    .parse_next(input)
}

fn parse_and(input: &mut Input<'_>) -> ModalResult<TagExpr> {
    let first = parse_unary.parse_next(input)?;
    repeat(0.., preceded(keyword("and"), cut_err(parse_unary)))
        .fold(
            move || first.clone(),
            |acc, rhs| TagExpr::And(Box::new(acc), Box::new(rhs)),
        )
        .parse_next(input)
}

fn parse_or(input: &mut Input<'_>) -> ModalResult<TagExpr> {
    let first = parse_and.parse_next(input)?;
    repeat(0.., preceded(keyword("or"), cut_err(parse_and)))
        .fold(
            move || first.clone(),
            |acc, rhs| TagExpr::Or(Box::new(acc), Box::new(rhs)),
        )
        .parse_next(input)
}
