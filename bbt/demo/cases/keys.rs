// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Writes key files of several sizes, each in its own subcase.

use crate::common::{count_lines, write_keys};
use bbt_runner::{
    assertions::ensure_eq, Case, CaseResult, RuntimeContext, Subcase, SubcaseName,
};
use std::fs;

pub fn main() -> Case {
    Case::new(body).tags(["smoke", "keys"])
}

fn body(ctx: &mut RuntimeContext<'_>) -> CaseResult {
    let dir = ctx.case_dir().to_owned();
    for count in [1, 10, 100] {
        ctx.subcase(
            SubcaseName::new("keys::write").arg("count", count),
            |ctx| {
                let path = dir.join(format!("keys-{count}"));
                write_keys(&path, count)?;
                let cleanup = path.clone();
                ctx.add_exit_hook(move || {
                    fs::remove_file(&cleanup)?;
                    Ok(())
                });
                ensure_eq(count_lines(&path)?, count)?;
                Ok(())
            },
        )?;
    }

    // Only runs when the operator passes `--flags large`.
    Subcase::new(SubcaseName::new("keys::write").arg("count", 100_000))
        .skip(!ctx.has_flag("large"))
        .run(ctx, |_| {
            let path = dir.join("keys-large");
            write_keys(&path, 100_000)?;
            ensure_eq(count_lines(&path)?, 100_000)?;
            Ok(())
        })?;
    Ok(())
}
