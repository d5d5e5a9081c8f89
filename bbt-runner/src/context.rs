// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-worker runtime context.
//!
//! Each worker owns exactly one [`RuntimeContext`] and passes it to every case and subcase body
//! it runs. The context also owns the worker's hold on the run lock: case bodies run with the lock
//! held, and subcases release it around their bodies.

use crate::{
    errors::{CaseError, CaseResult},
    reporter::RunEvent,
    runner::{Run, SharedState},
};
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::MutexGuard;
use std::{
    collections::BTreeSet,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
};
use tracing::Dispatch;

type ExitHook = Box<dyn FnOnce() -> CaseResult>;

/// An ordered collection of cleanup actions for one scope.
#[derive(Default)]
pub struct ExitHookStack {
    hooks: Vec<ExitHook>,
}

impl ExitHookStack {
    /// Appends a hook.
    pub fn push<F>(&mut self, hook: F)
    where
        F: FnOnce() -> CaseResult + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    /// The number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook in registration order and clears the stack.
    ///
    /// A failing or panicking hook doesn't prevent later hooks from running. All errors are
    /// returned in the order they were raised.
    pub fn run(&mut self) -> Vec<CaseError> {
        let mut errors = Vec::new();
        for hook in std::mem::take(&mut self.hooks) {
            match catch_unwind(AssertUnwindSafe(hook)) {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => errors.extend(failure.into_errors()),
                Err(payload) => errors.push(CaseError::from_panic(payload)),
            }
        }
        errors
    }
}

impl fmt::Debug for ExitHookStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitHookStack")
            .field("len", &self.hooks.len())
            .finish()
    }
}

/// Which hook stacks [`RuntimeContext::run_exit_hooks`] runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookScope {
    /// The subcase stack inside a subcase, otherwise the case stack.
    Active,
    /// The subcase stack, then the case stack.
    All,
}

/// A read-only view of the case being run.
#[derive(Clone, Debug, Default)]
pub struct CaseInfo {
    name: String,
    index: usize,
    dir: Utf8PathBuf,
    tags: BTreeSet<String>,
}

impl CaseInfo {
    pub(crate) fn new(name: impl Into<String>, index: usize, dir: Utf8PathBuf) -> Self {
        Self {
            name: name.into(),
            index,
            dir,
            tags: BTreeSet::new(),
        }
    }

    /// The case identifier: its path relative to where discovery started.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The 1-based dispatch index of the case.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The case's working directory. Absolute, and empty when the case starts.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// The tags the case declares.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }
}

/// State owned by a single worker and passed to case code.
pub struct RuntimeContext<'run> {
    pub(crate) run: &'run Run<'run>,
    guard: Option<MutexGuard<'run, SharedState>>,
    worker: usize,
    case: CaseInfo,
    in_subcase: bool,
    case_hooks: ExitHookStack,
    subcase_hooks: ExitHookStack,
    dispatch: Option<Dispatch>,
}

impl<'run> RuntimeContext<'run> {
    pub(crate) fn new(run: &'run Run<'run>, worker: usize) -> Self {
        Self {
            run,
            guard: None,
            worker,
            case: CaseInfo::default(),
            in_subcase: false,
            case_hooks: ExitHookStack::default(),
            subcase_hooks: ExitHookStack::default(),
            dispatch: None,
        }
    }

    /// A snapshot of the current case.
    pub fn case(&self) -> &CaseInfo {
        &self.case
    }

    /// The current case's identifier.
    pub fn name(&self) -> &str {
        &self.case.name
    }

    /// The current case's working directory.
    pub fn case_dir(&self) -> &Utf8Path {
        &self.case.dir
    }

    /// The current case's tags.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.case.tags
    }

    /// The flags passed in by the operator.
    pub fn flags(&self) -> &[String] {
        &self.run.options.flags
    }

    /// Returns true if the operator passed in `flag`.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags().iter().any(|f| f == flag)
    }

    /// The 1-based id of the worker running this case.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Returns true while a subcase body is running.
    pub fn in_subcase(&self) -> bool {
        self.in_subcase
    }

    /// Registers a cleanup action for the active scope.
    ///
    /// Inside a subcase the hook runs when the subcase ends, otherwise when the case ends.
    pub fn add_exit_hook<F>(&mut self, hook: F)
    where
        F: FnOnce() -> CaseResult + 'static,
    {
        if self.in_subcase {
            self.subcase_hooks.push(hook);
        } else {
            self.case_hooks.push(hook);
        }
    }

    /// Runs and clears hook stacks, returning every error raised. Never fails directly.
    pub fn run_exit_hooks(&mut self, scope: HookScope) -> Vec<CaseError> {
        match scope {
            HookScope::Active if self.in_subcase => self.subcase_hooks.run(),
            HookScope::Active => self.case_hooks.run(),
            HookScope::All => {
                let mut errors = self.subcase_hooks.run();
                errors.extend(self.case_hooks.run());
                errors
            }
        }
    }

    /// Runs `f` with the run lock released, reacquiring it afterwards if it was held.
    ///
    /// Use this around slow operations in a case body so that other workers can make progress.
    pub fn unlocked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let was_locked = self.release_lock();
        let ret = f(self);
        if was_locked {
            self.lock();
        }
        ret
    }

    // ---
    // Helper methods
    // ---

    pub(crate) fn bind_case(&mut self, case: CaseInfo) {
        debug_assert!(self.case_hooks.is_empty() && self.subcase_hooks.is_empty());
        self.case = case;
        self.in_subcase = false;
    }

    /// The dispatcher case output goes to, while a case body runs.
    pub(crate) fn dispatch(&self) -> Option<&Dispatch> {
        self.dispatch.as_ref()
    }

    pub(crate) fn set_dispatch(&mut self, dispatch: Option<Dispatch>) {
        self.dispatch = dispatch;
    }

    pub(crate) fn set_tags(&mut self, tags: BTreeSet<String>) {
        self.case.tags = tags;
    }

    pub(crate) fn enter_subcase(&mut self) -> SubcaseScope {
        SubcaseScope {
            was_in_subcase: std::mem::replace(&mut self.in_subcase, true),
            outer_hooks: std::mem::take(&mut self.subcase_hooks),
        }
    }

    pub(crate) fn exit_subcase(&mut self, scope: SubcaseScope) {
        debug_assert!(self.subcase_hooks.is_empty());
        self.in_subcase = scope.was_in_subcase;
        self.subcase_hooks = scope.outer_hooks;
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.guard.is_some()
    }

    /// Acquires the run lock if not already held, and returns the shared state.
    pub(crate) fn lock(&mut self) -> &mut SharedState {
        let run = self.run;
        self.guard.get_or_insert_with(|| run.state.lock())
    }

    /// Releases the run lock. Returns true if it was held.
    pub(crate) fn release_lock(&mut self) -> bool {
        self.guard.take().is_some()
    }

    /// Releases the run lock, handing it to a waiting thread if there is one.
    pub(crate) fn release_lock_fair(&mut self) {
        if let Some(guard) = self.guard.take() {
            MutexGuard::unlock_fair(guard);
        }
    }

    /// Runs `f` against the shared state, holding the lock only for the duration of `f` if it
    /// wasn't already held.
    pub(crate) fn with_state<R>(&mut self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        match &mut self.guard {
            Some(guard) => f(guard),
            None => f(&mut self.run.state.lock()),
        }
    }

    pub(crate) fn emit(&mut self, event: RunEvent<'_>) {
        self.with_state(|state| state.emit(event));
    }
}

impl fmt::Debug for RuntimeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("worker", &self.worker)
            .field("case", &self.case)
            .field("in_subcase", &self.in_subcase)
            .field("locked", &self.guard.is_some())
            .field("case_hooks", &self.case_hooks)
            .field("subcase_hooks", &self.subcase_hooks)
            .finish()
    }
}

/// Saved state of the enclosing scope while a subcase runs.
pub(crate) struct SubcaseScope {
    was_in_subcase: bool,
    outer_hooks: ExitHookStack,
}
