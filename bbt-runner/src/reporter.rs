// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting of run progress and results.
//!
//! The runner emits [`RunEvent`]s while holding the run lock, so events never interleave.
//! [`RunReporter`] renders them as human-readable lines.

use crate::runner::{Orchestrator, RunSummary};
use owo_colors::{OwoColorize, Style};
use std::{
    backtrace::BacktraceStatus,
    fmt,
    io::{self, Write},
    time::Duration,
};

/// An event that occurred during a run.
#[derive(Debug)]
#[non_exhaustive]
pub enum RunEvent<'a> {
    /// The run is about to start dispatching cases.
    RunStarted {
        /// The number of cases in the run.
        total: usize,
        /// The number of workers.
        parallel: usize,
    },

    /// A case was skipped.
    CaseSkipped {
        /// The case identifier.
        name: &'a str,
        /// The 1-based dispatch index.
        index: usize,
        /// The number of cases in the run.
        total: usize,
        /// Why the case was skipped.
        reason: SkipReason,
    },

    /// A case started running.
    CaseStarted {
        /// The case identifier.
        name: &'a str,
        /// The worker running the case.
        worker: usize,
        /// The number of workers.
        parallel: usize,
    },

    /// A case finished running and its outcome was recorded.
    CaseFinished {
        /// The case identifier.
        name: &'a str,
        /// The 1-based dispatch index.
        index: usize,
        /// The number of cases in the run.
        total: usize,
        /// Whether the case passed.
        passed: bool,
        /// How long the case took.
        time_taken: Duration,
    },

    /// A subcase was skipped.
    SubcaseSkipped {
        /// The rendered subcase name.
        name: &'a str,
    },

    /// A subcase finished running.
    SubcaseFinished {
        /// The rendered subcase name.
        name: &'a str,
        /// Whether the subcase passed.
        passed: bool,
        /// How long the subcase took.
        time_taken: Duration,
    },

    /// A worker stopped before running out of cases.
    WorkerStopped {
        /// The worker.
        worker: usize,
        /// The case the worker was running.
        case: &'a str,
        /// Why the worker stopped.
        reason: StopReason,
    },

    /// A worker ran out of cases.
    WorkerFinished {
        /// The worker.
        worker: usize,
    },

    /// A case had no registered entry point. The run stops.
    MissingEntryPoint {
        /// The worker that claimed the case.
        worker: usize,
        /// The case identifier.
        case: &'a str,
    },

    /// The operator interrupted the run. No new cases will be claimed.
    Interrupted,

    /// The run finished: every worker has exited.
    RunFinished {
        /// The final results.
        summary: &'a RunSummary,
    },
}

/// The reason a case was skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The case declared itself skipped.
    Declared,
    /// The tag filter rejected the case.
    Filter,
    /// The case comes before the start-from case.
    BeforeStartFrom,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared => write!(f, "declared skip"),
            Self::Filter => write!(f, "filtered out"),
            Self::BeforeStartFrom => write!(f, "before start-from case"),
        }
    }
}

/// The reason a worker stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// A stop was requested while the case was running.
    Requested {
        /// How long the case had been running.
        time_taken: Duration,
    },
    /// The case failed and the run stops on the first failure.
    Error,
}

#[derive(Debug, Default, Clone)]
struct Styles {
    is_colorized: bool,
    count: Style,
    name: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    notice: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.is_colorized = true;
        self.count = Style::new().bold();
        self.name = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().magenta().bold();
        self.notice = Style::new().magenta().bold();
    }
}

/// Renders [`RunEvent`]s to a writer.
pub struct RunReporter<W> {
    writer: W,
    styles: Styles,
}

impl<W: Write> RunReporter<W> {
    /// Creates a new reporter writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            styles: Styles::default(),
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Writes out a single event.
    pub fn report_event(&mut self, event: RunEvent<'_>) -> io::Result<()> {
        let styles = &self.styles;
        let w = &mut self.writer;
        match event {
            RunEvent::RunStarted { total, parallel } => {
                tracing::debug!(total, parallel, "run started");
            }
            RunEvent::CaseSkipped {
                name,
                index,
                total,
                reason,
            } => {
                tracing::debug!(case = name, %reason, "skipping case");
                writeln!(
                    w,
                    "{} {} {}",
                    format_args!("[{index}/{total}]").style(styles.count),
                    "skip".style(styles.skip),
                    name.style(styles.name),
                )?;
            }
            RunEvent::CaseStarted {
                name,
                worker,
                parallel,
            } => {
                if parallel == 1 {
                    writeln!(w, "\nTesting: {}", name.style(styles.name))?;
                } else {
                    writeln!(
                        w,
                        "Start testing: {} in worker {worker}",
                        name.style(styles.name)
                    )?;
                }
            }
            RunEvent::CaseFinished {
                name,
                index,
                total,
                passed,
                time_taken,
            } => {
                let status = if passed {
                    "ok".style(styles.pass)
                } else {
                    "error".style(styles.fail)
                };
                writeln!(
                    w,
                    "{} {status} {}",
                    format_args!("[{index}/{total}]").style(styles.count),
                    format_args!("{name} ({})", DisplaySecs(time_taken)).style(styles.name),
                )?;
            }
            RunEvent::SubcaseSkipped { name } => {
                writeln!(w, "{} skip {name}", "◼".style(styles.skip))?;
            }
            RunEvent::SubcaseFinished {
                name,
                passed,
                time_taken,
            } => {
                let marker = if passed {
                    "✓".style(styles.pass)
                } else {
                    "✗".style(styles.fail)
                };
                writeln!(w, "{marker} {name} ({})", DisplaySecs(time_taken))?;
            }
            RunEvent::WorkerStopped {
                worker,
                case,
                reason,
            } => match reason {
                StopReason::Requested { time_taken } => writeln!(
                    w,
                    "{}",
                    format_args!(
                        "worker {worker} stopped at {case} after {}",
                        DisplaySecs(time_taken)
                    )
                    .style(styles.pass)
                )?,
                StopReason::Error => writeln!(
                    w,
                    "{}",
                    format_args!("worker {worker} stopped at {case} because of error")
                        .style(styles.fail)
                )?,
            },
            RunEvent::WorkerFinished { worker } => {
                writeln!(
                    w,
                    "{}",
                    format_args!("worker {worker} finished").style(styles.pass)
                )?;
            }
            RunEvent::MissingEntryPoint { worker, case } => {
                writeln!(
                    w,
                    "{}",
                    format_args!("{case} has no registered entry point (worker {worker})")
                        .style(styles.fail)
                )?;
            }
            RunEvent::Interrupted => {
                writeln!(
                    w,
                    "\n{}\n",
                    "Interrupted! Press Ctrl-C again to exit immediately.".style(styles.notice)
                )?;
            }
            RunEvent::RunFinished { summary } => {
                self.write_summary(summary)?;
            }
        }
        Ok(())
    }

    /// Echoes the options a run was configured with.
    pub fn report_options(&mut self, runner: &Orchestrator<'_>) -> io::Result<()> {
        let options = &runner.options;
        let name = self.styles.name;
        let w = &mut self.writer;

        writeln!(w, "{}", "Options:".style(name))?;
        writeln!(w, "  cases: {}", runner.cases().len())?;
        writeln!(w, "  parallel: {}", options.parallel)?;
        writeln!(w, "  dont-stop: {}", options.dont_stop)?;
        writeln!(w, "  verbose: {}", options.verbose)?;
        if !options.filter.is_any() {
            writeln!(w, "  filter: {}", options.filter)?;
        }
        if !options.flags.is_empty() {
            writeln!(w, "  flags: {}", options.flags.join(", "))?;
        }
        if let Some(case) = runner.start_from() {
            writeln!(w, "  start-from: {case}")?;
        }
        writeln!(w, "  tmp-dir: {}", options.tmp_dir)?;
        w.flush()
    }

    fn write_summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        let styles = &self.styles;
        let w = &mut self.writer;

        writeln!(w, "\n{:>17}\n", "The End")?;
        writeln!(
            w,
            "Total {} cases, {} {}, {} {}, {} {}.",
            summary.total,
            summary.passed,
            "passed".style(styles.pass),
            summary.skipped,
            "skipped".style(styles.skip),
            summary.failed,
            "failed".style(styles.fail),
        )?;
        if let Some(fatal) = &summary.fatal {
            writeln!(w, "{}: {fatal}", "fatal".style(styles.fail))?;
        }

        for record in &summary.errors {
            let banner = format!(" Error in case: {} ", record.case);
            if styles.is_colorized {
                writeln!(w, "{}", format_args!("{banner:─^80}").style(styles.fail))?;
            } else {
                writeln!(w, "\n{}", banner.trim())?;
            }
            if let Some(output) = &record.output {
                writeln!(w, "{}", "Output:".style(styles.fail))?;
                write!(w, "{output}")?;
                if !output.is_empty() && !output.ends_with('\n') {
                    writeln!(w)?;
                }
            }
            for (i, error) in record.errors.iter().enumerate() {
                writeln!(w, "{}", format_args!("Error{i}:").style(styles.fail))?;
                writeln!(w, "{error}")?;
                let backtrace = error.backtrace();
                if backtrace.status() == BacktraceStatus::Captured {
                    writeln!(w, "{}", format_args!("Backtrace{i}:").style(styles.fail))?;
                    writeln!(w, "{backtrace}")?;
                }
            }
        }

        w.flush()
    }
}

struct DisplaySecs(Duration);

impl fmt::Display for DisplaySecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} seconds", self.0.as_secs_f64())
    }
}
