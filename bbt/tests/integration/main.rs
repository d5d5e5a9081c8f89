// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs the `bbt-demo` harness end to end.

use bbt::BbtExitCode;
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::{eyre::Context, Result};
use pretty_assertions::assert_eq;
use std::process::{Command, Output};

#[cfg(unix)]
mod interrupt;

struct DemoCli {
    command: Command,
}

impl DemoCli {
    fn new(config_dir: &Utf8Path) -> Result<Self> {
        // Keep working directories out of the source tree.
        let config_file = config_dir.join("bbt.toml");
        std::fs::write(
            &config_file,
            format!("[run]\ntmp-dir = '{}'\n", config_dir.join("tmp")),
        )
        .wrap_err("failed to write config")?;

        let mut command = Command::new(env!("CARGO_BIN_EXE_bbt-demo"));
        command
            .current_dir(env!("CARGO_MANIFEST_DIR"))
            .env_remove("BBT_LOG")
            .args(["demo/cases", "--color", "never", "--config-file"])
            .arg(config_file.as_str());
        Ok(Self { command })
    }

    fn args<'a>(mut self, args: impl IntoIterator<Item = &'a str>) -> Self {
        self.command.args(args);
        self
    }

    fn run(mut self) -> Result<Output> {
        self.command.output().wrap_err("failed to run bbt-demo")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_list() -> Result<()> {
    let temp = Utf8TempDir::new()?;
    let output = DemoCli::new(temp.path())?
        .args(["--list", "--filter", "not slow"])
        .run()?;
    assert_eq!(output.status.code(), Some(BbtExitCode::OK), "{output:?}");
    assert_eq!(
        stdout(&output),
        "demo/cases/keys.rs [keys, smoke]\n\
         demo/cases/process.rs [process, slow] (filtered out)\n\
         demo/cases/smoke.rs [fs, smoke]\n\
         demo/cases/wait.rs [slow, wait] (filtered out)\n\
         demo/cases/wip.rs [replication] (skip)\n"
    );
    Ok(())
}

#[test]
fn test_run_smoke() -> Result<()> {
    let temp = Utf8TempDir::new()?;
    let output = DemoCli::new(temp.path())?
        .args(["--filter", "smoke", "--parallel", "2"])
        .run()?;
    assert_eq!(output.status.code(), Some(BbtExitCode::OK), "{output:?}");

    let stdout = stdout(&output);
    assert!(stdout.contains("  filter: smoke\n"), "options echoed:\n{stdout}");
    assert!(
        stdout.contains("Total 5 cases, 2 passed, 3 skipped, 0 failed."),
        "summary:\n{stdout}"
    );
    assert!(
        temp.path().join("tmp/demo.cases.smoke/greeting.txt").is_file(),
        "case directory kept after the run"
    );
    Ok(())
}

#[test]
fn test_invalid_filter() -> Result<()> {
    let temp = Utf8TempDir::new()?;
    let output = DemoCli::new(temp.path())?
        .args(["--filter", "smoke and"])
        .run()?;
    assert_eq!(output.status.code(), Some(BbtExitCode::INVALID_FILTER));
    Ok(())
}

#[test]
fn test_verbose_with_parallel() -> Result<()> {
    let temp = Utf8TempDir::new()?;
    let output = DemoCli::new(temp.path())?
        .args(["--verbose", "--parallel", "2"])
        .run()?;
    assert_eq!(output.status.code(), Some(BbtExitCode::SETUP_ERROR));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("cannot use verbose output"),
        "stderr:\n{stderr}"
    );
    Ok(())
}

#[test]
fn test_unknown_start_from() -> Result<()> {
    let temp = Utf8TempDir::new()?;
    let output = DemoCli::new(temp.path())?
        .args(["--start-from", "demo/cases/missing.rs"])
        .run()?;
    assert_eq!(output.status.code(), Some(BbtExitCode::SETUP_ERROR));
    Ok(())
}
