// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Starts a long-running program, waits for it to report readiness, then stops it.

use bbt_runner::{
    assertions::{eventually, DEFAULT_TIMEOUT},
    launcher::Launcher,
    Case, CaseResult, RuntimeContext,
};
use std::{fs, time::Duration};

pub fn main() -> Case {
    Case::new(body)
        .tags(["process", "slow"])
        .skip(cfg!(not(unix)))
}

fn body(ctx: &mut RuntimeContext<'_>) -> CaseResult {
    let work_dir = ctx.case_dir().join("server");
    let mut launcher = Launcher::start("sh", ["-c", "echo ready; exec sleep 30"], &work_dir)?;
    tracing::info!("started server with pid {}", launcher.pid());
    ctx.add_exit_hook(move || {
        launcher.stop(false)?;
        Ok(())
    });

    let stdout = work_dir.join("stdout");
    ctx.unlocked(|_| {
        eventually(DEFAULT_TIMEOUT, Duration::from_millis(50), || {
            fs::read_to_string(&stdout).is_ok_and(|out| out.contains("ready"))
        })
    })?;
    Ok(())
}
