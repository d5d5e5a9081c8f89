// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keeps a heartbeat going for a few seconds. Handy for trying out Ctrl-C.

use bbt_runner::{Case, CaseResult, RuntimeContext};
use std::{fs, thread, time::Duration};

const BEATS: u32 = 30;

pub fn main() -> Case {
    Case::new(body).tags(["slow", "wait"])
}

fn body(ctx: &mut RuntimeContext<'_>) -> CaseResult {
    let heartbeat = ctx.spawn("heartbeat", || {
        for beat in 1..=BEATS {
            tracing::info!("heartbeat {beat}/{BEATS}");
            thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    })?;
    fs::write(ctx.case_dir().join("started"), "")?;
    ctx.unlocked(|_| heartbeat.join())
}
