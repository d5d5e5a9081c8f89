// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for timing runs, cases, subcases and polling loops.

use std::time::{Duration, Instant};

/// The start state of a stopwatch.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchStart {
    instant: Instant,
}

impl StopwatchStart {
    pub(crate) fn now() -> Self {
        Self {
            instant: Instant::now(),
        }
    }

    #[inline]
    pub(crate) fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }
}
