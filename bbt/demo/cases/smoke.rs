// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use bbt_runner::{assertions::ensure_eq, Case, CaseResult, RuntimeContext};
use std::fs;

pub fn main() -> Case {
    Case::new(body).tags(["smoke", "fs"])
}

fn body(ctx: &mut RuntimeContext<'_>) -> CaseResult {
    let path = ctx.case_dir().join("greeting.txt");
    fs::write(&path, "hello")?;
    tracing::info!("wrote {path}");
    ensure_eq(fs::read_to_string(&path)?, "hello")?;
    Ok(())
}
