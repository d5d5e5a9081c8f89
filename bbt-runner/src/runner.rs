// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The scheduler: runs cases on a pool of workers.
//!
//! All mutable run state lives in a single [`SharedState`] behind one lock. Workers claim cases
//! by reading and incrementing a shared cursor, so cases are claimed strictly in order while
//! completion order across workers is unspecified.

use crate::{
    case::{run_case, CaseOutcome, CaseRegistry, EntryPoint},
    context::{CaseInfo, RuntimeContext},
    discovery::normalize_case_id,
    errors::{CaseError, MissingEntryPointError, RunnerBuildError, WorkDirError},
    reporter::RunEvent,
    signal::InterruptController,
    stopwatch::StopwatchStart,
};
use bbt_filtering::TagFilter;
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{fmt, fs, io, time::Duration};

/// Builds an [`Orchestrator`].
#[derive(Clone, Debug)]
pub struct RunnerBuilder {
    parallel: usize,
    dont_stop: bool,
    verbose: bool,
    colorize: bool,
    filter: TagFilter,
    flags: Vec<String>,
    start_from: Option<String>,
    tmp_dir: Utf8PathBuf,
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self {
            parallel: 1,
            dont_stop: false,
            verbose: false,
            colorize: false,
            filter: TagFilter::any(),
            flags: Vec::new(),
            start_from: None,
            tmp_dir: Utf8PathBuf::from("tmp"),
        }
    }
}

impl RunnerBuilder {
    /// Sets the number of workers.
    pub fn set_parallel(&mut self, parallel: usize) -> &mut Self {
        self.parallel = parallel;
        self
    }

    /// Keeps running after a case fails, instead of stopping every worker.
    pub fn set_dont_stop(&mut self, dont_stop: bool) -> &mut Self {
        self.dont_stop = dont_stop;
        self
    }

    /// Streams case output to stdout instead of capturing it. Requires a single worker.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Uses ANSI colors for streamed case output.
    pub fn set_colorize(&mut self, colorize: bool) -> &mut Self {
        self.colorize = colorize;
        self
    }

    /// Sets the tag filter.
    pub fn set_filter(&mut self, filter: TagFilter) -> &mut Self {
        self.filter = filter;
        self
    }

    /// Sets the flags made available to case code.
    pub fn set_flags(&mut self, flags: impl IntoIterator<Item = String>) -> &mut Self {
        self.flags = flags.into_iter().collect();
        self
    }

    /// Skips every case that sorts before `case`.
    pub fn set_start_from(&mut self, case: Option<String>) -> &mut Self {
        self.start_from = case;
        self
    }

    /// Sets the root of per-case working directories.
    pub fn set_tmp_dir(&mut self, tmp_dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    /// Validates options and creates an orchestrator for `cases`.
    ///
    /// Case identifiers are normalized and sorted before use.
    pub fn build(
        self,
        cases: Vec<String>,
        registry: &CaseRegistry,
    ) -> Result<Orchestrator<'_>, RunnerBuildError> {
        if self.parallel == 0 {
            return Err(RunnerBuildError::ZeroParallel);
        }
        if self.verbose && self.parallel > 1 {
            return Err(RunnerBuildError::VerboseWithParallel {
                parallel: self.parallel,
            });
        }

        let mut cases: Vec<_> = cases
            .iter()
            .map(|case| normalize_case_id(Utf8Path::new(case)))
            .collect();
        cases.sort();
        let start_from = match &self.start_from {
            Some(case) => {
                let normalized = normalize_case_id(Utf8Path::new(case));
                let pos = cases.iter().position(|c| *c == normalized).ok_or_else(|| {
                    RunnerBuildError::UnknownStartFrom { case: case.clone() }
                })?;
                Some(pos + 1)
            }
            None => None,
        };

        let tmp_dir = absolute_dir(&self.tmp_dir)?;

        let run_pool = ThreadPoolBuilder::new()
            // The main run_pool closure will need its own thread.
            .num_threads(self.parallel + 1)
            .thread_name(|idx| format!("bbt-worker-{idx}"))
            .build()
            .map_err(RunnerBuildError::ThreadPool)?;

        Ok(Orchestrator {
            cases,
            registry,
            options: RunOptions {
                parallel: self.parallel,
                dont_stop: self.dont_stop,
                verbose: self.verbose,
                colorize: self.colorize,
                filter: self.filter,
                flags: self.flags,
                start_from,
                tmp_dir,
            },
            run_pool,
        })
    }
}

fn absolute_dir(dir: &Utf8Path) -> Result<Utf8PathBuf, RunnerBuildError> {
    if dir.is_absolute() {
        return Ok(dir.to_owned());
    }
    let cwd = std::env::current_dir().map_err(RunnerBuildError::CurrentDir)?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|path| RunnerBuildError::NonUtf8CurrentDir { path })?;
    Ok(cwd.join(dir))
}

/// Validated run options.
#[derive(Clone, Debug)]
pub(crate) struct RunOptions {
    pub(crate) parallel: usize,
    pub(crate) dont_stop: bool,
    pub(crate) verbose: bool,
    pub(crate) colorize: bool,
    pub(crate) filter: TagFilter,
    pub(crate) flags: Vec<String>,
    /// 1-based dispatch index of the first case to run.
    pub(crate) start_from: Option<usize>,
    pub(crate) tmp_dir: Utf8PathBuf,
}

/// Runs a sorted list of cases on a pool of workers.
pub struct Orchestrator<'a> {
    cases: Vec<String>,
    registry: &'a CaseRegistry,
    pub(crate) options: RunOptions,
    run_pool: ThreadPool,
}

impl<'a> Orchestrator<'a> {
    /// The cases in dispatch order.
    pub fn cases(&self) -> &[String] {
        &self.cases
    }

    /// The absolute root of per-case working directories.
    pub fn tmp_dir(&self) -> &Utf8Path {
        &self.options.tmp_dir
    }

    /// The case runs start from, if one was requested.
    pub fn start_from(&self) -> Option<&str> {
        let index = self.options.start_from?;
        self.cases.get(index - 1).map(String::as_str)
    }

    /// The working directory a case runs in.
    pub fn case_dir(&self, case: &str) -> Utf8PathBuf {
        case_dir(&self.options.tmp_dir, case)
    }

    /// Removes the root of per-case working directories, if it exists.
    pub fn clean_tmp_dir(&self) -> Result<(), WorkDirError> {
        match fs::remove_dir_all(&self.options.tmp_dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(WorkDirError::new(&self.options.tmp_dir, err)),
        }
    }

    /// Executes the cases, calling `callback` with each event.
    ///
    /// The callback is invoked with the run lock held. Blocks until every worker has exited.
    pub fn execute<F>(&self, interrupts: &InterruptController, callback: F) -> RunSummary
    where
        F: FnMut(RunEvent<'_>) + Send + 'static,
    {
        let stopwatch = StopwatchStart::now();
        let run = Run {
            cases: &self.cases,
            registry: self.registry,
            options: &self.options,
            state: Mutex::new(SharedState::new(Box::new(callback))),
        };
        run.state.lock().emit(RunEvent::RunStarted {
            total: self.cases.len(),
            parallel: self.options.parallel,
        });

        // Workers hold a sender each. Once they've all exited, the receiver is disconnected.
        let (done_sender, done_receiver) = crossbeam_channel::bounded::<()>(0);
        let interrupt_receiver = interrupts.receiver();
        let run_ref = &run;

        self.run_pool.scope(move |run_scope| {
            for worker in 1..=self.options.parallel {
                let done_sender = done_sender.clone();
                run_scope.spawn(move |_| {
                    worker_loop(run_ref, worker);
                    drop(done_sender);
                });
            }
            drop(done_sender);

            loop {
                crossbeam_channel::select! {
                    recv(done_receiver) -> msg => {
                        if msg.is_err() {
                            // All workers have exited.
                            break;
                        }
                    }
                    recv(interrupt_receiver) -> msg => {
                        if msg.is_ok() {
                            run_ref.handle_interrupt();
                        }
                    }
                }
            }
        });

        let mut state = run.state.into_inner();
        let summary = RunSummary {
            total: self.cases.len(),
            passed: state.passed,
            failed: state.failed,
            skipped: state.skipped,
            errors: std::mem::take(&mut state.errors),
            interrupted: state.interrupts > 0,
            fatal: state.fatal.take(),
            time_taken: stopwatch.elapsed(),
        };
        state.emit(RunEvent::RunFinished { summary: &summary });
        summary
    }
}

impl fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cases", &self.cases)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

pub(crate) fn case_dir(tmp_dir: &Utf8Path, case: &str) -> Utf8PathBuf {
    let stem = Utf8Path::new(case).with_extension("");
    tmp_dir.join(stem.as_str().replace('/', "."))
}

/// The state of one execution, shared by every worker.
pub(crate) struct Run<'a> {
    pub(crate) cases: &'a [String],
    pub(crate) registry: &'a CaseRegistry,
    pub(crate) options: &'a RunOptions,
    pub(crate) state: Mutex<SharedState>,
}

impl Run<'_> {
    fn handle_interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupts += 1;
        state.stop_asap = true;
        if state.interrupts == 1 {
            state.emit(RunEvent::Interrupted);
        }
    }
}

type EventCallback = Box<dyn FnMut(RunEvent<'_>) + Send>;

/// Mutable run state. Only accessed with the run lock held.
pub(crate) struct SharedState {
    /// The number of cases claimed so far; the next case to claim.
    pub(crate) case_index: usize,
    pub(crate) passed: usize,
    pub(crate) failed: usize,
    pub(crate) skipped: usize,
    pub(crate) errors: Vec<ErrorRecord>,
    pub(crate) stop_asap: bool,
    pub(crate) interrupts: usize,
    pub(crate) fatal: Option<MissingEntryPointError>,
    callback: EventCallback,
}

impl SharedState {
    fn new(callback: EventCallback) -> Self {
        Self {
            case_index: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
            stop_asap: false,
            interrupts: 0,
            fatal: None,
            callback,
        }
    }

    pub(crate) fn emit(&mut self, event: RunEvent<'_>) {
        (self.callback)(event)
    }
}

enum Claim {
    Case { index: usize, entry: EntryPoint },
    Exhausted,
    Stopped,
    MissingEntryPoint,
}

fn worker_loop(run: &Run<'_>, worker: usize) {
    let mut ctx = RuntimeContext::new(run, worker);
    tracing::debug!(worker, "worker started");

    loop {
        let claim = {
            let state = ctx.lock();
            if state.stop_asap {
                Claim::Stopped
            } else {
                let index = state.case_index;
                state.case_index += 1;
                match run.cases.get(index) {
                    None => Claim::Exhausted,
                    Some(case) => match run.registry.get(case) {
                        Some(entry) => Claim::Case { index, entry },
                        None => {
                            state.stop_asap = true;
                            state
                                .fatal
                                .get_or_insert_with(|| MissingEntryPointError { case: case.clone() });
                            state.emit(RunEvent::MissingEntryPoint { worker, case });
                            Claim::MissingEntryPoint
                        }
                    },
                }
            }
        };

        match claim {
            Claim::Case { index, entry } => {
                let name = &run.cases[index];
                ctx.bind_case(CaseInfo::new(
                    name.clone(),
                    index + 1,
                    case_dir(&run.options.tmp_dir, name),
                ));
                if run_case(&mut ctx, entry) == CaseOutcome::Stop {
                    break;
                }
                // Let the interrupt handler and other workers in between cases.
                ctx.release_lock_fair();
            }
            Claim::Exhausted => {
                ctx.lock().emit(RunEvent::WorkerFinished { worker });
                break;
            }
            Claim::Stopped | Claim::MissingEntryPoint => break,
        }
    }

    ctx.release_lock();
    tracing::debug!(worker, "worker exited");
}

/// A failed case, with everything needed to report it.
#[derive(Debug)]
pub struct ErrorRecord {
    /// The case identifier.
    pub case: String,
    /// The errors raised: the body's error first, then hook errors.
    pub errors: Vec<CaseError>,
    /// Output captured while the case ran, or `None` if output was streamed.
    pub output: Option<String>,
}

/// The results of a run.
#[derive(Debug)]
pub struct RunSummary {
    /// The number of cases in the run.
    pub total: usize,
    /// The number of cases that passed.
    pub passed: usize,
    /// The number of cases that failed.
    pub failed: usize,
    /// The number of cases that were skipped.
    pub skipped: usize,
    /// Failed cases, in the order they were recorded.
    pub errors: Vec<ErrorRecord>,
    /// Whether the operator interrupted the run.
    pub interrupted: bool,
    /// The error that aborted the run, if any.
    pub fatal: Option<MissingEntryPointError>,
    /// How long the run took.
    pub time_taken: Duration,
}

impl RunSummary {
    /// Returns true if no case failed and the run wasn't aborted.
    ///
    /// An interrupted run with no failures is still a success.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.fatal.is_none()
    }

    /// The number of cases whose outcome was recorded.
    pub fn finished_count(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}
