// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A harness for the sample cases under `demo/cases`. Run it from the `bbt` crate directory so
//! that discovered case identifiers match the registered ones:
//!
//! ```text
//! cargo run --bin bbt-demo -- demo/cases --filter smoke
//! ```

use bbt_runner::CaseRegistry;

#[path = "../../demo/cases/_common.rs"]
mod common;
#[path = "../../demo/cases/keys.rs"]
mod keys;
#[path = "../../demo/cases/process.rs"]
mod process;
#[path = "../../demo/cases/smoke.rs"]
mod smoke;
#[path = "../../demo/cases/wait.rs"]
mod wait;
#[path = "../../demo/cases/wip.rs"]
mod wip;

fn registry() -> CaseRegistry {
    CaseRegistry::new()
        .with("demo/cases/keys.rs", keys::main)
        .with("demo/cases/process.rs", process::main)
        .with("demo/cases/smoke.rs", smoke::main)
        .with("demo/cases/wait.rs", wait::main)
        .with("demo/cases/wip.rs", wip::main)
}

fn main() -> color_eyre::Result<()> {
    bbt::main(&registry())
}
