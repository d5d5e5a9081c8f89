// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Starting and stopping the programs under test.
//!
//! A [`Launcher`] runs one external program in a working directory (typically a subdirectory of
//! the case directory) and appends its stdout and stderr to files named `stdout` and `stderr`
//! there.

use crate::{errors::LauncherError, stopwatch::StopwatchStart};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    fs::{self, File, OpenOptions},
    io, thread,
    time::Duration,
};

/// How long [`Launcher::stop`] waits for the process to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(20);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A running external program.
#[derive(Debug)]
pub struct Launcher {
    program: Utf8PathBuf,
    work_dir: Utf8PathBuf,
    handle: duct::Handle,
    pid: u32,
    started: bool,
}

impl Launcher {
    /// Starts `program` with `args` in `work_dir`, creating the directory if necessary.
    ///
    /// If `program` contains a path separator it must exist; otherwise it is looked up in `PATH`.
    pub fn start<I, S>(
        program: impl AsRef<Utf8Path>,
        args: I,
        work_dir: impl AsRef<Utf8Path>,
    ) -> Result<Self, LauncherError>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let program = program.as_ref().to_owned();
        let work_dir = work_dir.as_ref().to_owned();
        if program.components().count() > 1 && !program.exists() {
            tracing::error!("Executable {program} not found");
            return Err(LauncherError::ExecutableNotFound { program });
        }

        let io_err = |action: &'static str, err: io::Error| LauncherError::Io {
            action,
            program: program.clone(),
            err,
        };
        fs::create_dir_all(&work_dir).map_err(|err| io_err("preparing directory for", err))?;
        let stdout = append(&work_dir.join("stdout")).map_err(|err| io_err("redirecting", err))?;
        let stderr = append(&work_dir.join("stderr")).map_err(|err| io_err("redirecting", err))?;

        tracing::debug!("launcher start at {work_dir}");
        let handle = duct::cmd(program.as_std_path(), args)
            .dir(work_dir.as_std_path())
            .stdout_file(stdout)
            .stderr_file(stderr)
            .stdin_null()
            .unchecked()
            .start()
            .map_err(|err| io_err("starting", err))?;
        let pid = handle.pids().first().copied().unwrap_or_default();

        Ok(Self {
            program,
            work_dir,
            handle,
            pid,
            started: true,
        })
    }

    /// The process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The directory the process runs in.
    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }

    /// Returns true until the process has been stopped or waited for.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Stops the process, waiting up to [`DEFAULT_STOP_TIMEOUT`].
    ///
    /// See [`stop_with_timeout`](Self::stop_with_timeout).
    pub fn stop(&mut self, force: bool) -> Result<(), LauncherError> {
        self.stop_with_timeout(force, DEFAULT_STOP_TIMEOUT)
    }

    /// Stops the process: with SIGINT, or by killing it if `force` is true.
    ///
    /// If the process doesn't exit within `timeout` it is killed and an error is returned. Does
    /// nothing if the process was already stopped.
    pub fn stop_with_timeout(
        &mut self,
        force: bool,
        timeout: Duration,
    ) -> Result<(), LauncherError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        let stopwatch = StopwatchStart::now();
        tracing::debug!("try to stop process {}", self.pid);

        if force {
            self.kill()?;
        } else {
            self.interrupt()?;
        }

        if !self.poll_exit(timeout)? {
            tracing::error!(
                "Process {} is still running after {:?}, force kill it!",
                self.pid,
                timeout
            );
            self.kill()?;
            self.handle.wait().map_err(|err| self.io_err("waiting for", err))?;
            return Err(LauncherError::StopTimeout {
                pid: self.pid,
                program: self.program.clone(),
                timeout,
            });
        }

        tracing::debug!(
            "launcher stop at {} ({:.2} seconds)",
            self.work_dir,
            stopwatch.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Waits up to `timeout` for the process to exit on its own.
    pub fn wait(&mut self, timeout: Duration) -> Result<(), LauncherError> {
        if self.poll_exit(timeout)? {
            self.started = false;
            Ok(())
        } else {
            Err(LauncherError::WaitTimeout {
                pid: self.pid,
                program: self.program.clone(),
                timeout,
            })
        }
    }

    fn poll_exit(&self, timeout: Duration) -> Result<bool, LauncherError> {
        let stopwatch = StopwatchStart::now();
        loop {
            let exited = self
                .handle
                .try_wait()
                .map_err(|err| self.io_err("waiting for", err))?
                .is_some();
            if exited {
                return Ok(true);
            }
            if stopwatch.elapsed() >= timeout {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    #[cfg(unix)]
    fn interrupt(&self) -> Result<(), LauncherError> {
        use nix::{
            sys::signal::{kill, Signal},
            unistd::Pid,
        };

        let pid = Pid::from_raw(self.pid as i32);
        kill(pid, Signal::SIGINT).map_err(|errno| self.io_err("interrupting", errno.into()))
    }

    #[cfg(not(unix))]
    fn interrupt(&self) -> Result<(), LauncherError> {
        self.kill()
    }

    fn kill(&self) -> Result<(), LauncherError> {
        self.handle.kill().map_err(|err| self.io_err("killing", err))
    }

    fn io_err(&self, action: &'static str, err: io::Error) -> LauncherError {
        LauncherError::Io {
            action,
            program: self.program.clone(),
            err,
        }
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        if self.started {
            tracing::warn!(
                "Should stop process {}({}) before dropping its launcher",
                self.pid,
                self.work_dir
            );
        }
    }
}

fn append(path: &Utf8Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
