// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background threads owned by case code.
//!
//! Case bodies sometimes need work to happen alongside them: draining a launched process's
//! output, or driving load while the body checks results. [`RuntimeContext::spawn`] runs such work
//! on a named thread that logs into the case's output, and [`CaseThread::join`] hands back whatever
//! the thread returned, including a panic, as an ordinary case error.

use crate::{
    capture::as_case_code,
    context::RuntimeContext,
    errors::{CaseError, CaseResult},
};
use std::{
    fmt, io,
    thread::{self, JoinHandle},
};

/// A thread spawned by case code.
///
/// Errors raised by the thread only reach the case once it's joined. Dropping a `CaseThread`
/// detaches the thread and discards its result.
pub struct CaseThread<T> {
    name: String,
    handle: JoinHandle<CaseResult<T>>,
}

impl<T> CaseThread<T> {
    /// The name the thread was spawned with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once the thread's body has returned or panicked.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the thread to finish and returns its result.
    ///
    /// A panic in the thread is returned as a [`PanicError`](crate::errors::PanicError).
    pub fn join(self) -> CaseResult<T> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => Err(CaseError::from_panic(payload).into()),
        }
    }
}

impl<T> fmt::Debug for CaseThread<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseThread")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl RuntimeContext<'_> {
    /// Spawns a named thread running `f`.
    ///
    /// Events the thread logs, and any panic it raises, go to the current case's output. Join the
    /// returned [`CaseThread`] to collect its result:
    ///
    /// ```
    /// use bbt_runner::{Case, CaseResult, RuntimeContext};
    ///
    /// fn body(ctx: &mut RuntimeContext<'_>) -> CaseResult {
    ///     let watcher = ctx.spawn("watcher", || {
    ///         tracing::info!("watching");
    ///         Ok(42)
    ///     })?;
    ///     assert_eq!(watcher.join()?, 42);
    ///     Ok(())
    /// }
    ///
    /// # let _ = Case::new(body);
    /// ```
    pub fn spawn<T, F>(&self, name: impl Into<String>, f: F) -> io::Result<CaseThread<T>>
    where
        F: FnOnce() -> CaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let name = name.into();
        let dispatch = self.dispatch().cloned();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || match dispatch {
                Some(dispatch) => as_case_code(&dispatch, f),
                None => f(),
            })?;
        tracing::debug!(case = self.name(), thread = %name, "spawned case thread");
        Ok(CaseThread { name, handle })
    }
}
