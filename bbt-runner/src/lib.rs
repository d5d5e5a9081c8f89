// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for bbt, a runner for black-box test cases.
//!
//! A *case* is a file on disk whose entry point builds a [`Case`]: a body plus tags and a skip
//! flag. A harness binary registers each case file's entry point in a [`CaseRegistry`], then hands
//! the discovered case list to an [`Orchestrator`], which runs them on a pool of workers. Case
//! bodies receive a [`RuntimeContext`] that exposes the case's working directory, its tags, the
//! operator's flags, exit hooks for cleanup, and [`spawn`](RuntimeContext::spawn) for background
//! threads whose output and errors stay with the case. Bodies can split their work into
//! individually reported [`Subcase`]s, which release the run lock while they run so that other
//! workers can make progress.
//!
//! For the command-line front end, see the `bbt` crate.

pub mod assertions;
mod capture;
mod case;
pub mod config;
mod context;
pub mod discovery;
pub mod errors;
pub mod launcher;
pub mod reporter;
pub mod runner;
pub mod signal;
mod stopwatch;
mod subcase;
mod thread;

pub use case::{Case, CaseRegistry, EntryPoint};
pub use context::{CaseInfo, ExitHookStack, HookScope, RuntimeContext};
pub use errors::{CaseError, CaseFailure, CaseResult, SubcaseFailure};
pub use runner::{Orchestrator, RunSummary, RunnerBuilder};
pub use subcase::{Subcase, SubcaseName};
pub use thread::CaseThread;
