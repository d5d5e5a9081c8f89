// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-case output capture.
//!
//! Case code logs through `tracing`. While a case runs, a scoped dispatcher is installed on the
//! worker thread, and on any thread the case spawns through [`RuntimeContext::spawn`]. It either
//! writes into a buffer that is attached to the case's error record, or streams straight to stdout
//! in verbose mode.
//!
//! [`RuntimeContext::spawn`]: crate::RuntimeContext::spawn

use parking_lot::Mutex;
use std::{
    cell::Cell,
    io,
    sync::{Arc, Once},
};
use tracing::{level_filters::LevelFilter, Dispatch};
use tracing_subscriber::{filter::Targets, fmt::MakeWriter, prelude::*};

thread_local! {
    static IN_CASE: Cell<bool> = const { Cell::new(false) };
}

/// How output produced by case code is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputMode {
    /// Buffer output and attach it to the error record.
    Capture,
    /// Stream output to stdout as it is produced.
    Stream { ansi: bool },
}

#[derive(Clone, Debug, Default)]
struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    fn take_string(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureBuffer {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(self.0.clone())
    }
}

fn case_targets() -> Targets {
    // Engine internals stay out of case output unless they're important.
    Targets::new()
        .with_default(LevelFilter::DEBUG)
        .with_target("bbt_runner", LevelFilter::INFO)
}

/// Runs `f` with case output routed according to `mode`.
///
/// `f` is handed the case's dispatcher, which threads spawned by case code log through. Returns
/// the captured output in [`OutputMode::Capture`], and `None` when streaming.
pub(crate) fn with_case_output<R>(
    mode: OutputMode,
    f: impl FnOnce(&Dispatch) -> R,
) -> (R, Option<String>) {
    install_panic_hook();

    let (dispatch, buffer) = match mode {
        OutputMode::Capture => {
            let buffer = CaptureBuffer::default();
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(buffer.clone())
                .with_ansi(false)
                .with_target(false)
                .with_filter(case_targets());
            let dispatch = Dispatch::new(tracing_subscriber::registry().with(layer));
            (dispatch, Some(buffer))
        }
        OutputMode::Stream { ansi } => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(io::stdout)
                .with_ansi(ansi)
                .with_target(false)
                .with_filter(case_targets());
            (Dispatch::new(tracing_subscriber::registry().with(layer)), None)
        }
    };

    let ret = as_case_code(&dispatch, || f(&dispatch));
    (ret, buffer.map(|buffer| buffer.take_string()))
}

/// Runs `f` as case code on the current thread: events go to `dispatch`, and panics are logged
/// there instead of stderr.
pub(crate) fn as_case_code<R>(dispatch: &Dispatch, f: impl FnOnce() -> R) -> R {
    let _guard = InCaseGuard::enter();
    tracing::dispatcher::with_default(dispatch, f)
}

struct InCaseGuard {
    previous: bool,
}

impl InCaseGuard {
    fn enter() -> Self {
        Self {
            previous: IN_CASE.with(|c| c.replace(true)),
        }
    }
}

impl Drop for InCaseGuard {
    fn drop(&mut self) {
        IN_CASE.with(|c| c.set(self.previous));
    }
}

/// Routes panics raised by case code into the case's output instead of stderr.
///
/// Panics on other threads (or outside of case code) go to the previously installed hook.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if IN_CASE.with(Cell::get) {
                tracing::error!(target: "bbt::panic", "{info}");
            } else {
                previous(info);
            }
        }));
    });
}
