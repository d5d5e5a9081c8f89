// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sends SIGINT to a running harness.

use super::DemoCli;
use bbt::BbtExitCode;
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::{
    eyre::{bail, eyre, Context},
    Result,
};
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use std::{
    io::{BufRead, BufReader},
    process::{Child, ExitStatus, Stdio},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

const TIMEOUT: Duration = Duration::from_secs(30);

impl DemoCli {
    /// Starts bbt-demo in the background with stdout piped.
    fn spawn(mut self) -> Result<Child> {
        self.command
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .wrap_err("failed to start bbt-demo")
    }
}

struct RunningDemo {
    child: Child,
    lines: mpsc::Receiver<String>,
    seen: Vec<String>,
}

impl RunningDemo {
    /// Starts the `wait` case and returns once its body is running.
    fn start(temp: &Utf8Path) -> Result<Self> {
        let mut child = DemoCli::new(temp)?.args(["--filter", "wait"]).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre!("stdout is piped"))?;
        let (sender, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        let marker = temp.join("tmp/demo.cases.wait/started");
        let deadline = Instant::now() + TIMEOUT;
        while !marker.exists() {
            if Instant::now() > deadline {
                bail!("timed out waiting for {marker}");
            }
            thread::sleep(Duration::from_millis(20));
        }

        Ok(Self {
            child,
            lines,
            seen: Vec::new(),
        })
    }

    fn interrupt(&self) -> Result<()> {
        let pid = i32::try_from(self.child.id()).wrap_err("pid fits in an i32")?;
        kill(Pid::from_raw(pid), Signal::SIGINT).wrap_err("failed to send SIGINT")
    }

    fn wait_for_line(&mut self, needle: &str) -> Result<()> {
        let deadline = Instant::now() + TIMEOUT;
        while !self.seen.iter().any(|line| line.contains(needle)) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = self.lines.recv_timeout(remaining).wrap_err_with(|| {
                format!("waiting for {needle:?}, saw:\n{}", self.seen.join("\n"))
            })?;
            self.seen.push(line);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(ExitStatus, String)> {
        let status = self.child.wait().wrap_err("failed to wait for bbt-demo")?;
        // The reader thread hangs up at end of output.
        self.seen.extend(self.lines.iter());
        Ok((status, self.seen.join("\n")))
    }
}

#[test]
fn test_interrupt_finishes_gracefully() -> Result<()> {
    let temp = Utf8TempDir::new()?;
    let mut demo = RunningDemo::start(temp.path())?;
    demo.interrupt()?;
    demo.wait_for_line("Interrupted!")?;

    let (status, stdout) = demo.finish()?;
    assert_eq!(status.code(), Some(BbtExitCode::OK), "stdout:\n{stdout}");
    assert!(stdout.contains("The End"), "stdout:\n{stdout}");
    assert!(stdout.contains("Total 5 cases"), "stdout:\n{stdout}");
    Ok(())
}

#[test]
fn test_second_interrupt_exits_immediately() -> Result<()> {
    let temp = Utf8TempDir::new()?;
    let mut demo = RunningDemo::start(temp.path())?;
    demo.interrupt()?;
    demo.wait_for_line("Interrupted!")?;
    demo.interrupt()?;

    let (status, stdout) = demo.finish()?;
    assert!(!status.success(), "status: {status:?}\nstdout:\n{stdout}");
    assert!(!stdout.contains("The End"), "stdout:\n{stdout}");
    Ok(())
}
