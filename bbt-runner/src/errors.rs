// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by bbt-runner.
//!
//! There are two families here. [`CaseError`], [`SubcaseFailure`] and [`CaseFailure`] carry
//! failures raised by case code and are collected into the run's error records. The remaining
//! types are setup errors that abort a run before (or instead of) executing cases.

use camino::Utf8PathBuf;
use std::{any::Any, backtrace::Backtrace, error::Error as StdError, fmt};
use thiserror::Error;

/// A single error raised by a case body, a subcase body or an exit hook.
///
/// Carries the error along with the backtrace captured at the point it was converted.
pub struct CaseError {
    error: Box<dyn StdError + Send + Sync + 'static>,
    backtrace: Backtrace,
}

impl CaseError {
    /// Wraps an error, capturing a backtrace.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::from_boxed(Box::new(error))
    }

    /// Creates an error out of a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageError(message.into()))
    }

    /// Wraps an already boxed error, capturing a backtrace.
    pub fn from_boxed(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self {
            error,
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "(non-string panic payload)".to_owned()
        };
        Self::new(PanicError { message })
    }

    /// The underlying error.
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.error
    }

    /// Attempts to downcast the underlying error to a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref()
    }

    /// The backtrace captured when this error was created.
    ///
    /// Capturing follows `RUST_BACKTRACE` and `RUST_LIB_BACKTRACE`.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        let mut source = self.error.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }
        Ok(())
    }
}

impl fmt::Debug for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// The aggregate failure of a subcase.
///
/// Holds the subcase body's error (if any) followed by the errors raised by the subcase's exit
/// hooks. An empty list means the subcase was unwound because the run is stopping.
#[derive(Debug, Default)]
pub struct SubcaseFailure {
    errors: Vec<CaseError>,
}

impl SubcaseFailure {
    pub(crate) fn new(errors: Vec<CaseError>) -> Self {
        Self { errors }
    }

    pub(crate) fn stopping() -> Self {
        Self::default()
    }

    /// The collected errors, in the order they were raised.
    pub fn errors(&self) -> &[CaseError] {
        &self.errors
    }

    /// Returns true if this failure carries no errors, which happens when the run is stopping.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consumes self, returning the collected errors.
    pub fn into_errors(self) -> Vec<CaseError> {
        self.errors
    }
}

impl fmt::Display for SubcaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subcase failed with {} error(s)", self.errors.len())
    }
}

/// The error type returned by case bodies, subcase bodies and exit hooks.
///
/// `?` converts any standard error, a [`CaseError`] or a [`SubcaseFailure`] into this type.
#[derive(Debug)]
pub enum CaseFailure {
    /// A single error.
    Error(CaseError),
    /// A failed subcase, unpacked into its errors by whoever collects it.
    Subcase(SubcaseFailure),
}

impl CaseFailure {
    /// Creates a failure out of a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Error(CaseError::msg(message))
    }

    /// Flattens this failure into a list of errors.
    pub fn into_errors(self) -> Vec<CaseError> {
        match self {
            Self::Error(error) => vec![error],
            Self::Subcase(failure) => failure.into_errors(),
        }
    }
}

impl<E> From<E> for CaseFailure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Error(CaseError::new(error))
    }
}

impl From<CaseError> for CaseFailure {
    fn from(error: CaseError) -> Self {
        Self::Error(error)
    }
}

impl From<SubcaseFailure> for CaseFailure {
    fn from(failure: SubcaseFailure) -> Self {
        Self::Subcase(failure)
    }
}

/// The result type of case bodies, subcase bodies and exit hooks.
pub type CaseResult<T = ()> = Result<T, CaseFailure>;

/// An error built from a message.
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct MessageError(pub String);

/// A panic caught while running case code.
#[derive(Clone, Debug, Error)]
#[error("panicked: {message}")]
pub struct PanicError {
    /// The panic message.
    pub message: String,
}

/// An error that occurred while validating run options.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerBuildError {
    /// Verbose output was requested together with more than one worker.
    #[error("cannot use verbose output with --parallel {parallel} (must be 1)")]
    VerboseWithParallel {
        /// The requested parallelism.
        parallel: usize,
    },

    /// Parallelism was set to zero.
    #[error("--parallel must be at least 1")]
    ZeroParallel,

    /// The start-from case was not among the discovered cases.
    #[error("start-from case `{case}` was not found among the discovered cases")]
    UnknownStartFrom {
        /// The requested case.
        case: String,
    },

    /// The worker pool could not be created.
    #[error("error building worker pool")]
    ThreadPool(#[source] rayon::ThreadPoolBuildError),

    /// The current directory could not be determined.
    #[error("error getting current directory")]
    CurrentDir(#[source] std::io::Error),

    /// The current directory is not valid UTF-8.
    #[error("current directory `{}` is not valid UTF-8", .path.display())]
    NonUtf8CurrentDir {
        /// The current directory.
        path: std::path::PathBuf,
    },
}

/// An error that occurred while reading configuration.
#[derive(Debug, Error)]
#[error("failed to read bbt configuration{}", .path.as_ref().map(|p| format!(" at `{p}`")).unwrap_or_default())]
pub struct ConfigReadError {
    path: Option<Utf8PathBuf>,
    #[source]
    err: config::ConfigError,
}

impl ConfigReadError {
    pub(crate) fn new(path: Option<Utf8PathBuf>, err: config::ConfigError) -> Self {
        Self { path, err }
    }

    /// The config file that failed to load, if the failure was tied to a file.
    pub fn path(&self) -> Option<&camino::Utf8Path> {
        self.path.as_deref()
    }
}

/// An error that occurred while discovering case files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The path is neither a file nor a directory.
    #[error("`{path}` is not a file or directory")]
    NotFound {
        /// The path that was passed in.
        path: Utf8PathBuf,
    },

    /// A directory could not be walked.
    #[error("error walking `{path}`")]
    Walk {
        /// The root being walked.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },

    /// A discovered path was not valid UTF-8.
    #[error("case path `{}` is not valid UTF-8", .path.display())]
    NonUtf8Path {
        /// The offending path.
        path: std::path::PathBuf,
    },
}

/// A discovered case has no registered entry point.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("case file `{case}` has no registered entry point")]
pub struct MissingEntryPointError {
    /// The case identifier.
    pub case: String,
}

/// An error that occurred while preparing a working directory.
#[derive(Debug, Error)]
#[error("failed to prepare working directory `{path}`")]
pub struct WorkDirError {
    path: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl WorkDirError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self {
            path: path.into(),
            err,
        }
    }

    /// The directory that could not be prepared.
    pub fn path(&self) -> &camino::Utf8Path {
        &self.path
    }
}

/// An error that prevented a direct case run from starting.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DirectRunError {
    /// The run could not be set up.
    #[error(transparent)]
    Build(#[from] RunnerBuildError),

    /// Signal handling could not be set up.
    #[error(transparent)]
    Signal(#[from] SignalHandlerSetupError),
}

/// An error that occurred while setting up signal handling.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurred while starting or controlling a launched process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LauncherError {
    /// The executable does not exist.
    #[error("executable `{program}` not found")]
    ExecutableNotFound {
        /// The program path.
        program: Utf8PathBuf,
    },

    /// An I/O error occurred while spawning or signaling the process.
    #[error("error {action} process `{program}`")]
    Io {
        /// What was being done.
        action: &'static str,
        /// The program.
        program: Utf8PathBuf,
        /// The underlying error.
        #[source]
        err: std::io::Error,
    },

    /// The process did not exit within the timeout after being asked to stop, and was killed.
    #[error("process {pid} (`{program}`) did not exit within {timeout:?} and was killed")]
    StopTimeout {
        /// The process id.
        pid: u32,
        /// The program.
        program: Utf8PathBuf,
        /// How long we waited.
        timeout: std::time::Duration,
    },

    /// The process did not exit within the timeout.
    #[error("process {pid} (`{program}`) still running after {timeout:?}")]
    WaitTimeout {
        /// The process id.
        pid: u32,
        /// The program.
        program: Utf8PathBuf,
        /// How long we waited.
        timeout: std::time::Duration,
    },
}

/// A failed assertion from [`assertions`](crate::assertions).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssertionError {
    /// A value was expected to be true or false.
    #[error("[{actual}] != [{expected}]")]
    Bool {
        /// The expected value.
        expected: bool,
        /// The actual value.
        actual: bool,
    },

    /// Two values were expected to render the same.
    #[error("[{left}] != [{right}]")]
    NotEqual {
        /// The left-hand side.
        left: String,
        /// The right-hand side.
        right: String,
    },

    /// Two values were expected to render differently.
    #[error("[{left}] == [{right}]")]
    Equal {
        /// The left-hand side.
        left: String,
        /// The right-hand side.
        right: String,
    },

    /// A value was expected to match a glob pattern.
    #[error("[{value}] not match [{pattern}]")]
    NoMatch {
        /// The value.
        value: String,
        /// The glob pattern.
        pattern: String,
    },

    /// A value was expected not to match a glob pattern.
    #[error("[{value}] match [{pattern}]")]
    Match {
        /// The value.
        value: String,
        /// The glob pattern.
        pattern: String,
    },

    /// A glob pattern was invalid.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// The glob pattern.
        pattern: String,
        /// The parser's message.
        message: String,
    },

    /// An operation was expected to fail, but succeeded.
    #[error("expected error `{expected}`, but no error was raised")]
    NoError {
        /// The expected message.
        expected: String,
    },

    /// An operation failed with an unexpected message.
    #[error("expected error `{expected}`, but got `{actual}`")]
    WrongError {
        /// The expected message.
        expected: String,
        /// The actual message.
        actual: String,
    },

    /// A condition didn't become true in time.
    #[error("assert timeout after {timeout:?}{}", .last.as_ref().map(|l| format!(", {l}")).unwrap_or_default())]
    Timeout {
        /// How long the condition was polled for.
        timeout: std::time::Duration,
        /// The last failed comparison, if any.
        last: Option<String>,
    },
}
