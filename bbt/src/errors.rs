// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use bbt_filtering::errors::FilterParseError;
use bbt_runner::errors::*;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Documented exit codes for `bbt` failures.
///
/// Unknown or unexpected failures always result in exit code 1.
pub enum BbtExitCode {}

impl BbtExitCode {
    /// No errors occurred and bbt exited normally.
    pub const OK: i32 = 0;

    /// One or more cases failed.
    pub const CASES_FAILED: i32 = 100;

    /// A discovered case file had no registered entry point.
    pub const MISSING_ENTRY_POINT: i32 = 104;

    /// A user issue happened while setting up a bbt invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// The tag filter expression could not be parsed.
    pub const INVALID_FILTER: i32 = 94;

    /// The configuration could not be read.
    pub const CONFIG_ERROR: i32 = 97;
}

// The #[error()] strings are placeholders: errors are meant to be printed with display_to_stderr,
// which adds context and colors.

/// An error that bbt knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("error reading current directory")]
    CurrentDir {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    NonUtf8CurrentDir { path: std::path::PathBuf },
    #[error("config read error")]
    ConfigRead {
        #[from]
        err: ConfigReadError,
    },
    #[error("filter parse error")]
    FilterParse {
        #[from]
        err: FilterParseError,
    },
    #[error("case discovery error")]
    Discovery {
        #[from]
        err: DiscoveryError,
    },
    #[error("runner build error")]
    RunnerBuild {
        #[from]
        err: RunnerBuildError,
    },
    #[error("working directory error")]
    WorkDir {
        #[from]
        err: WorkDirError,
    },
    #[error("signal handler setup error")]
    SignalHandlerSetup {
        #[from]
        err: SignalHandlerSetupError,
    },
    #[error("error writing output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
    #[error("missing entry point")]
    MissingEntryPoint {
        #[from]
        err: MissingEntryPointError,
    },
    #[error("cases failed")]
    CasesFailed { failed: usize },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDir { .. }
            | Self::NonUtf8CurrentDir { .. }
            | Self::Discovery { .. }
            | Self::RunnerBuild { .. }
            | Self::WorkDir { .. }
            | Self::SignalHandlerSetup { .. }
            | Self::WriteOutput { .. } => BbtExitCode::SETUP_ERROR,
            Self::ConfigRead { .. } => BbtExitCode::CONFIG_ERROR,
            Self::FilterParse { .. } => BbtExitCode::INVALID_FILTER,
            Self::MissingEntryPoint { .. } => BbtExitCode::MISSING_ENTRY_POINT,
            Self::CasesFailed { .. } => BbtExitCode::CASES_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let highlight = styles.highlight;
        let (message, source): (String, Option<&(dyn Error + 'static)>) = match self {
            Self::CurrentDir { err } => (
                "could not read the current directory".to_owned(),
                Some(err),
            ),
            Self::NonUtf8CurrentDir { path } => (
                format!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(highlight)
                ),
                None,
            ),
            Self::FilterParse { err } => {
                // miette renders the expression with the failing span underlined.
                eprintln!("{:?}", miette::Report::new(err.clone()));
                return;
            }
            Self::ConfigRead { err } => (err.to_string(), err.source()),
            Self::Discovery { err } => (err.to_string(), err.source()),
            Self::RunnerBuild { err } => (err.to_string(), err.source()),
            Self::WorkDir { err } => (err.to_string(), err.source()),
            Self::SignalHandlerSetup { err } => (err.to_string(), err.source()),
            Self::WriteOutput { err } => ("error writing output".to_owned(), Some(err)),
            Self::MissingEntryPoint { err } => (
                format!(
                    "case file `{}` has no registered entry point (is it included in the harness?)",
                    err.case.style(highlight)
                ),
                None,
            ),
            Self::CasesFailed { failed } => {
                let plural = if *failed == 1 { "case" } else { "cases" };
                (format!("run failed: {failed} {plural} failed"), None)
            }
        };

        tracing::error!("{}", with_causes(message, source));
    }
}

/// Appends the chain of errors starting at `source` to `message`, one per line.
fn with_causes(mut message: String, mut source: Option<&(dyn Error + 'static)>) -> String {
    if source.is_some() {
        message.push_str("\ncaused by:");
    }
    while let Some(err) = source {
        message.push_str("\n  - ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}
