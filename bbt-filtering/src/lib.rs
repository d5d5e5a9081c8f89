// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing and evaluation of tag filter expressions used to select bbt cases.
//!
//! A filter expression is built from tag identifiers combined with `and`, `or`, `not` and
//! parentheses, for example `(tag0 or tag1) and not slow`. A case is selected if the expression
//! evaluates to true when every tag the case declares is true and every other tag is false.
//!
//! The grammar is closed: nothing besides these boolean operators is ever evaluated.

pub mod errors;
mod expression;
mod parsing;

pub use expression::{TagExpr, TagFilter};
