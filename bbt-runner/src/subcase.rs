// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcases: nested, individually reported units of work inside a case.

use crate::{
    context::{HookScope, RuntimeContext},
    errors::{CaseError, CaseResult, SubcaseFailure},
    reporter::RunEvent,
    stopwatch::StopwatchStart,
};
use camino::Utf8PathBuf;
use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
};

/// The rendered name of a subcase: a qualifier followed by its arguments.
///
/// ```
/// use bbt_runner::SubcaseName;
///
/// let name = SubcaseName::new("sync::check_keys").arg("count", 100).arg("db", "'main'");
/// assert_eq!(name.to_string(), r#"sync::check_keys(count=100, db="main")"#);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubcaseName {
    qualifier: String,
    args: Vec<(String, String)>,
}

impl SubcaseName {
    /// Creates a name with no arguments.
    pub fn new(qualifier: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            args: Vec::new(),
        }
    }

    /// Adds an argument.
    ///
    /// Values that start with the current working directory are shown relative to it.
    pub fn arg(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let value = relativize(value.to_string());
        self.args.push((key.into(), value));
        self
    }

    /// Adds an argument made up of a list of values, rendered as `[v1, v2, ...]`.
    pub fn list_arg<I>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let values: Vec<_> = values
            .into_iter()
            .map(|v| format!("'{}'", relativize(v.to_string())))
            .collect();
        self.args.push((key.into(), format!("[{}]", values.join(", "))));
        self
    }
}

impl fmt::Display for SubcaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<_> = self
            .args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let rendered = format!("{}({})", self.qualifier, args.join(", "));
        f.write_str(&rendered.replace('\'', "\""))
    }
}

impl From<&str> for SubcaseName {
    fn from(qualifier: &str) -> Self {
        Self::new(qualifier)
    }
}

impl From<String> for SubcaseName {
    fn from(qualifier: String) -> Self {
        Self::new(qualifier)
    }
}

fn relativize(value: String) -> String {
    let Some(cwd) = std::env::current_dir()
        .ok()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
    else {
        return value;
    };
    match value.strip_prefix(cwd.as_str()) {
        Some(rest) => format!(".{rest}"),
        None => value,
    }
}

/// A subcase, ready to run.
#[derive(Clone, Debug)]
pub struct Subcase {
    name: SubcaseName,
    skip: bool,
}

impl Subcase {
    /// Creates a new subcase.
    pub fn new(name: impl Into<SubcaseName>) -> Self {
        Self {
            name: name.into(),
            skip: false,
        }
    }

    /// Marks the subcase as skipped.
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Runs the subcase.
    ///
    /// Returns `Ok(None)` if the subcase is skipped, and the body's return value if it passed.
    /// On failure, the body's error (if any) comes first followed by errors from hooks registered
    /// inside the subcase. If the run is stopping, an empty failure is returned to unwind the
    /// enclosing case.
    ///
    /// The run lock, if held, is released while the body runs.
    pub fn run<'run, T, F>(
        self,
        ctx: &mut RuntimeContext<'run>,
        body: F,
    ) -> Result<Option<T>, SubcaseFailure>
    where
        F: FnOnce(&mut RuntimeContext<'run>) -> CaseResult<T>,
    {
        let name = self.name.to_string();
        if self.skip {
            ctx.emit(RunEvent::SubcaseSkipped { name: &name });
            return Ok(None);
        }

        tracing::info!(target: "bbt::subcase", "Testing subcase: {name}");
        let stopwatch = StopwatchStart::now();

        let was_locked = ctx.release_lock();
        let scope = ctx.enter_subcase();
        let outcome = catch_unwind(AssertUnwindSafe(|| body(&mut *ctx)));
        let hook_errors = ctx.run_exit_hooks(HookScope::Active);
        ctx.exit_subcase(scope);

        if was_locked && ctx.lock().stop_asap {
            tracing::debug!(subcase = %name, "run stopping, unwinding case");
            return Err(SubcaseFailure::stopping());
        }

        let (value, mut errors) = match outcome {
            Ok(Ok(value)) => (Some(value), Vec::new()),
            Ok(Err(failure)) => (None, failure.into_errors()),
            Err(payload) => (None, vec![CaseError::from_panic(payload)]),
        };
        errors.extend(hook_errors);

        let time_taken = stopwatch.elapsed();
        match value {
            Some(value) if errors.is_empty() => {
                ctx.emit(RunEvent::SubcaseFinished {
                    name: &name,
                    passed: true,
                    time_taken,
                });
                Ok(Some(value))
            }
            _ => {
                ctx.emit(RunEvent::SubcaseFinished {
                    name: &name,
                    passed: false,
                    time_taken,
                });
                Err(SubcaseFailure::new(errors))
            }
        }
    }
}

impl<'run> RuntimeContext<'run> {
    /// Runs a subcase. Shorthand for `Subcase::new(name).run(self, body)`.
    pub fn subcase<T, F>(
        &mut self,
        name: impl Into<SubcaseName>,
        body: F,
    ) -> Result<Option<T>, SubcaseFailure>
    where
        F: FnOnce(&mut RuntimeContext<'run>) -> CaseResult<T>,
    {
        Subcase::new(name).run(self, body)
    }
}
