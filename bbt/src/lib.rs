// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! The command-line front end for bbt.
//!
//! bbt cases are compiled into a harness binary. The harness registers each case file's entry
//! point and hands control to [`main`]:
//!
//! ```no_run
//! use bbt_runner::{Case, CaseRegistry};
//!
//! fn smoke() -> Case {
//!     Case::new(|_ctx| Ok(())).tags(["smoke"])
//! }
//!
//! fn main() -> color_eyre::Result<()> {
//!     let registry = CaseRegistry::new().with("cases/smoke.rs", smoke);
//!     bbt::main(&registry)
//! }
//! ```
//!
//! The library interface is not stable beyond [`main`].

mod dispatch;
mod errors;
mod output;

use bbt_runner::CaseRegistry;
use clap::Parser;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{Color, OutputContext, StderrStyles, LOG_ENV};

/// Parses the command line, runs the selected cases from `registry`, and exits the process.
///
/// Only returns if error reporting could not be installed.
pub fn main(registry: &CaseRegistry) -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    let opts = BbtApp::parse();
    let output = opts.init_output();

    match opts.exec(registry, output) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}
