// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bbt_runner::{
    reporter::{RunEvent, SkipReason, StopReason},
    signal::{InterruptController, SignalHandlerKind},
    CaseRegistry, RunSummary, RunnerBuilder,
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    sync::{Arc, Mutex},
};

/// An owned copy of the interesting parts of a [`RunEvent`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Recorded {
    Skipped(String, SkipReason),
    Started(String),
    Finished(String, bool),
    SubcaseSkipped(String),
    SubcaseFinished(String, bool),
    Stopped(String, bool),
    MissingEntryPoint(String),
    Interrupted,
}

impl Recorded {
    fn from_event(event: &RunEvent<'_>) -> Option<Self> {
        let recorded = match event {
            RunEvent::CaseSkipped { name, reason, .. } => Self::Skipped(name.to_string(), *reason),
            RunEvent::CaseStarted { name, .. } => Self::Started(name.to_string()),
            RunEvent::CaseFinished { name, passed, .. } => Self::Finished(name.to_string(), *passed),
            RunEvent::SubcaseSkipped { name } => Self::SubcaseSkipped(name.to_string()),
            RunEvent::SubcaseFinished { name, passed, .. } => {
                Self::SubcaseFinished(name.to_string(), *passed)
            }
            RunEvent::WorkerStopped { case, reason, .. } => Self::Stopped(
                case.to_string(),
                matches!(reason, StopReason::Requested { .. }),
            ),
            RunEvent::MissingEntryPoint { case, .. } => Self::MissingEntryPoint(case.to_string()),
            RunEvent::Interrupted => Self::Interrupted,
            _ => return None,
        };
        Some(recorded)
    }
}

/// The outcome of a run under a scratch directory.
pub(crate) struct Executed {
    pub(crate) summary: RunSummary,
    pub(crate) events: Vec<Recorded>,
    pub(crate) temp: Utf8TempDir,
}

impl Executed {
    /// The working directory that was used for `case`.
    pub(crate) fn case_dir(&self, case: &str) -> Utf8PathBuf {
        let stem = Utf8Path::new(case).with_extension("");
        self.temp.path().join("tmp").join(stem.as_str().replace('/', "."))
    }

    pub(crate) fn started(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Recorded::Started(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The messages of every error recorded for `case`.
    pub(crate) fn error_messages(&self, case: &str) -> Vec<String> {
        self.summary
            .errors
            .iter()
            .filter(|record| record.case == case)
            .flat_map(|record| record.errors.iter().map(|err| err.to_string()))
            .collect()
    }
}

/// Runs `cases` from `registry` with a fresh tmp dir.
pub(crate) fn execute(
    registry: &CaseRegistry,
    cases: &[&str],
    configure: impl FnOnce(&mut RunnerBuilder),
) -> Result<Executed> {
    let controller = InterruptController::new(SignalHandlerKind::Noop)?;
    execute_with(registry, cases, &controller, configure)
}

pub(crate) fn execute_with(
    registry: &CaseRegistry,
    cases: &[&str],
    controller: &InterruptController,
    configure: impl FnOnce(&mut RunnerBuilder),
) -> Result<Executed> {
    let temp = Utf8TempDir::new()?;
    let mut builder = RunnerBuilder::default();
    builder.set_tmp_dir(temp.path().join("tmp"));
    configure(&mut builder);

    let runner = builder.build(cases.iter().map(|c| c.to_string()).collect(), registry)?;
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let summary = runner.execute(controller, move |event| {
        if let Some(recorded) = Recorded::from_event(&event) {
            sink.lock().expect("not poisoned").push(recorded);
        }
    });

    let events = std::mem::take(&mut *events.lock().expect("not poisoned"));
    Ok(Executed {
        summary,
        events,
        temp,
    })
}

/// Appends a line to the `log` file in `dir`.
pub(crate) fn log_line(dir: &Utf8Path, line: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("log"))
        .expect("log opened");
    writeln!(file, "{line}").expect("log written");
}

pub(crate) fn read_log(dir: &Utf8Path) -> Vec<String> {
    fs::read_to_string(dir.join("log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}
