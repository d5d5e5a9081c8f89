// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cases, the registry of case entry points, and the case state machine.

use crate::{
    capture::{with_case_output, OutputMode},
    context::{HookScope, RuntimeContext},
    discovery::normalize_case_id,
    errors::{CaseError, CaseResult, DirectRunError, WorkDirError},
    reporter::{RunEvent, SkipReason, StopReason},
    runner::{ErrorRecord, RunSummary, RunnerBuilder},
    signal::{InterruptController, SignalHandlerKind},
    stopwatch::StopwatchStart,
};
use camino::Utf8Path;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs, io,
    panic::{catch_unwind, AssertUnwindSafe},
    time::Duration,
};

type CaseBody = Box<dyn Fn(&mut RuntimeContext<'_>) -> CaseResult>;

/// A case, as returned by a case file's entry point.
///
/// ```
/// # mod case_file {
/// use bbt_runner::{Case, CaseResult, RuntimeContext};
///
/// fn body(ctx: &mut RuntimeContext<'_>) -> CaseResult {
///     std::fs::write(ctx.case_dir().join("data.txt"), "hello")?;
///     Ok(())
/// }
///
/// pub fn main() -> Case {
///     Case::new(body).tags(["smoke", "fs"])
/// }
/// # }
/// # fn main() {
/// #     let _case = case_file::main();
/// # }
/// ```
pub struct Case {
    body: CaseBody,
    tags: BTreeSet<String>,
    skip: bool,
}

impl Case {
    /// Creates a new case with the given body.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut RuntimeContext<'_>) -> CaseResult + 'static,
    {
        Self {
            body: Box::new(body),
            tags: BTreeSet::new(),
            skip: false,
        }
    }

    /// Adds tags to the case.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Marks the case as skipped.
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// The tags declared by this case.
    pub fn declared_tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Returns true if this case is marked as skipped.
    pub fn is_skipped(&self) -> bool {
        self.skip
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("tags", &self.tags)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

/// The entry point of a case file.
pub type EntryPoint = fn() -> Case;

/// Maps case identifiers to their entry points.
///
/// Identifiers are case file paths relative to the directory bbt is run from, for example
/// `cases/sync/basic.rs`. A harness binary includes its case files as modules and registers each
/// one's entry point here.
#[derive(Clone, Default)]
pub struct CaseRegistry {
    entries: BTreeMap<String, EntryPoint>,
}

impl CaseRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry point, replacing any earlier registration for the same case.
    pub fn register(&mut self, case: impl AsRef<str>, entry: EntryPoint) -> &mut Self {
        let id = normalize_case_id(Utf8Path::new(case.as_ref()));
        if self.entries.insert(id, entry).is_some() {
            tracing::warn!(case = case.as_ref(), "entry point registered twice");
        }
        self
    }

    /// Builder-style version of [`register`](Self::register).
    pub fn with(mut self, case: impl AsRef<str>, entry: EntryPoint) -> Self {
        self.register(case, entry);
        self
    }

    /// Looks up the entry point for a case.
    pub fn get(&self, case: &str) -> Option<EntryPoint> {
        self.entries.get(case).copied()
    }

    /// Iterates over registered case identifiers in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// The number of registered cases.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs a single case outside of a scheduled run, with output streamed to stdout.
    ///
    /// Returns the run summary. See [`run_direct`](Self::run_direct) for a version that exits the
    /// process.
    pub fn try_run_direct(&self, case: &str) -> Result<RunSummary, DirectRunError> {
        let mut builder = RunnerBuilder::default();
        builder.set_verbose(true);
        let runner = builder.build(vec![normalize_case_id(Utf8Path::new(case))], self)?;
        let interrupts = InterruptController::new(SignalHandlerKind::Noop)?;
        let mut reporter = crate::reporter::RunReporter::new(io::stdout());
        Ok(runner.execute(&interrupts, move |event| {
            if let Err(err) = reporter.report_event(event) {
                tracing::warn!("error writing to stdout: {err}");
            }
        }))
    }

    /// Runs a single case outside of a scheduled run and exits the process.
    ///
    /// Exits with status 0 if the case passed or was skipped, and 1 otherwise.
    pub fn run_direct(&self, case: &str) -> ! {
        match self.try_run_direct(case) {
            Ok(summary) if summary.is_success() => std::process::exit(0),
            Ok(_) => std::process::exit(1),
            Err(err) => {
                tracing::error!("{err}");
                eprintln!("error: {err}");
                std::process::exit(1)
            }
        }
    }
}

impl fmt::Debug for CaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// What a worker does after running a case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CaseOutcome {
    /// Claim the next case.
    Continue,
    /// Stop claiming cases.
    Stop,
}

/// Runs one claimed case to completion. Called with the run lock held.
pub(crate) fn run_case(ctx: &mut RuntimeContext<'_>, entry: EntryPoint) -> CaseOutcome {
    let run = ctx.run;
    let name = ctx.name().to_owned();
    let index = ctx.case().index();
    let total = run.cases.len();

    let case = match catch_unwind(entry) {
        Ok(case) => case,
        Err(payload) => {
            // The entry point itself panicked: nothing to run, but the case still failed.
            let errors = vec![CaseError::from_panic(payload)];
            return finish_case(ctx, errors, None, Duration::ZERO);
        }
    };

    let skip_reason = if case.skip {
        Some(SkipReason::Declared)
    } else if !run.options.filter.matches(&case.tags) {
        Some(SkipReason::Filter)
    } else if run.options.start_from.is_some_and(|start| index < start) {
        Some(SkipReason::BeforeStartFrom)
    } else {
        None
    };
    if let Some(reason) = skip_reason {
        let state = ctx.lock();
        state.skipped += 1;
        state.emit(RunEvent::CaseSkipped {
            name: &name,
            index,
            total,
            reason,
        });
        return CaseOutcome::Continue;
    }

    let Case { body, tags, .. } = case;
    ctx.set_tags(tags);
    let worker = ctx.worker();
    ctx.lock().emit(RunEvent::CaseStarted {
        name: &name,
        worker,
        parallel: run.options.parallel,
    });

    let stopwatch = StopwatchStart::now();
    let mode = if run.options.verbose {
        OutputMode::Stream {
            ansi: run.options.colorize,
        }
    } else {
        OutputMode::Capture
    };
    let (errors, output) = with_case_output(mode, |dispatch| {
        ctx.set_dispatch(Some(dispatch.clone()));
        let mut errors = match prepare_case_dir(ctx.case_dir()) {
            Ok(()) => match catch_unwind(AssertUnwindSafe(|| body(&mut *ctx))) {
                Ok(Ok(())) => Vec::new(),
                Ok(Err(failure)) => failure.into_errors(),
                Err(payload) => vec![CaseError::from_panic(payload)],
            },
            Err(err) => vec![CaseError::new(err)],
        };
        errors.extend(ctx.run_exit_hooks(HookScope::All));
        ctx.set_dispatch(None);
        errors
    });

    finish_case(ctx, errors, output, stopwatch.elapsed())
}

fn finish_case(
    ctx: &mut RuntimeContext<'_>,
    errors: Vec<CaseError>,
    output: Option<String>,
    time_taken: Duration,
) -> CaseOutcome {
    let run = ctx.run;
    let worker = ctx.worker();
    let name = ctx.name().to_owned();
    let index = ctx.case().index();
    let total = run.cases.len();

    let state = ctx.lock();
    if state.stop_asap {
        state.emit(RunEvent::WorkerStopped {
            worker,
            case: &name,
            reason: StopReason::Requested { time_taken },
        });
        return CaseOutcome::Stop;
    }

    let passed = errors.is_empty();
    if passed {
        state.passed += 1;
    } else {
        state.failed += 1;
    }
    state.emit(RunEvent::CaseFinished {
        name: &name,
        index,
        total,
        passed,
        time_taken,
    });
    if passed {
        return CaseOutcome::Continue;
    }

    state.errors.push(ErrorRecord {
        case: name.clone(),
        errors,
        output,
    });
    if run.options.dont_stop {
        CaseOutcome::Continue
    } else {
        state.stop_asap = true;
        state.emit(RunEvent::WorkerStopped {
            worker,
            case: &name,
            reason: StopReason::Error,
        });
        CaseOutcome::Stop
    }
}

fn prepare_case_dir(dir: &Utf8Path) -> Result<(), WorkDirError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(WorkDirError::new(dir, err)),
    }
    fs::create_dir_all(dir).map_err(|err| WorkDirError::new(dir, err))
}
