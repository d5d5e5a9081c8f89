// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assertion helpers for case code.
//!
//! Each helper returns an [`AssertionError`] on failure and logs the failure, so that it shows up
//! in the case's captured output next to whatever led up to it. Equality helpers compare the
//! `Display` renderings of their arguments, which lets cases compare a number against the text
//! printed by the program under test.
//!
//! ```
//! use bbt_runner::{assertions::ensure_eq, CaseResult};
//!
//! fn check_count(output: &str) -> CaseResult {
//!     ensure_eq(output.trim(), 3)?;
//!     Ok(())
//! }
//! # check_count("3\n").unwrap();
//! ```

pub use crate::errors::AssertionError;
use crate::stopwatch::StopwatchStart;
use globset::Glob;
use std::{fmt, thread, time::Duration};

/// The default timeout for [`eventually`] and [`eventually_eq`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The default polling interval for [`eventually`] and [`eventually_eq`].
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

fn fail(err: AssertionError) -> Result<(), AssertionError> {
    tracing::error!(target: "bbt::assert", "Assert failed: {err}");
    Err(err)
}

/// Expects `value` to be true.
pub fn ensure_true(value: bool) -> Result<(), AssertionError> {
    if value {
        return Ok(());
    }
    fail(AssertionError::Bool {
        expected: true,
        actual: false,
    })
}

/// Expects `value` to be false.
pub fn ensure_false(value: bool) -> Result<(), AssertionError> {
    if !value {
        return Ok(());
    }
    fail(AssertionError::Bool {
        expected: false,
        actual: true,
    })
}

/// Expects `left` and `right` to render the same.
pub fn ensure_eq(left: impl fmt::Display, right: impl fmt::Display) -> Result<(), AssertionError> {
    let (left, right) = (left.to_string(), right.to_string());
    if left == right {
        return Ok(());
    }
    fail(AssertionError::NotEqual { left, right })
}

/// Expects `left` and `right` to render differently.
pub fn ensure_ne(left: impl fmt::Display, right: impl fmt::Display) -> Result<(), AssertionError> {
    let (left, right) = (left.to_string(), right.to_string());
    if left != right {
        return Ok(());
    }
    fail(AssertionError::Equal { left, right })
}

fn glob_matches(value: &str, pattern: &str) -> Result<bool, AssertionError> {
    let glob = Glob::new(pattern).map_err(|err| AssertionError::InvalidPattern {
        pattern: pattern.to_owned(),
        message: err.kind().to_string(),
    })?;
    Ok(glob.compile_matcher().is_match(value))
}

/// Expects `value` to match the glob `pattern`, for example `"*connected*"`.
pub fn ensure_match(value: impl fmt::Display, pattern: &str) -> Result<(), AssertionError> {
    let value = value.to_string();
    if glob_matches(&value, pattern)? {
        return Ok(());
    }
    fail(AssertionError::NoMatch {
        value,
        pattern: pattern.to_owned(),
    })
}

/// Expects `value` not to match the glob `pattern`.
pub fn ensure_not_match(value: impl fmt::Display, pattern: &str) -> Result<(), AssertionError> {
    let value = value.to_string();
    if !glob_matches(&value, pattern)? {
        return Ok(());
    }
    fail(AssertionError::Match {
        value,
        pattern: pattern.to_owned(),
    })
}

/// Expects `result` to be an error whose message is `expected`.
pub fn ensure_error<T, E: fmt::Display>(
    result: Result<T, E>,
    expected: &str,
) -> Result<(), AssertionError> {
    match result {
        Ok(_) => fail(AssertionError::NoError {
            expected: expected.to_owned(),
        }),
        Err(err) => {
            let actual = err.to_string();
            if actual == expected {
                return Ok(());
            }
            fail(AssertionError::WrongError {
                expected: expected.to_owned(),
                actual,
            })
        }
    }
}

/// Polls `condition` every `interval` until it returns true, failing after `timeout`.
pub fn eventually(
    timeout: Duration,
    interval: Duration,
    mut condition: impl FnMut() -> bool,
) -> Result<(), AssertionError> {
    let stopwatch = StopwatchStart::now();
    loop {
        if condition() {
            return Ok(());
        }
        if stopwatch.elapsed() > timeout {
            return fail(AssertionError::Timeout {
                timeout,
                last: None,
            });
        }
        thread::sleep(interval);
    }
}

/// Polls `left` every `interval` until it renders the same as `right`, failing after `timeout`.
pub fn eventually_eq<L: fmt::Display>(
    timeout: Duration,
    interval: Duration,
    mut left: impl FnMut() -> L,
    right: impl fmt::Display,
) -> Result<(), AssertionError> {
    let right = right.to_string();
    let stopwatch = StopwatchStart::now();
    loop {
        let value = left().to_string();
        if value == right {
            return Ok(());
        }
        if stopwatch.elapsed() > timeout {
            let last = format!("[{value}] != [{right}]");
            return fail(AssertionError::Timeout {
                timeout,
                last: Some(last),
            });
        }
        thread::sleep(interval);
    }
}
