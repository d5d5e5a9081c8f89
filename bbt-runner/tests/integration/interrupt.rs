// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use bbt_runner::{
    signal::{InterruptController, InterruptHandle, SignalHandlerKind},
    Case, CaseRegistry, CaseResult, RuntimeContext,
};
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use std::{sync::OnceLock, thread, time::Duration};

static HANDLE: OnceLock<InterruptHandle> = OnceLock::new();

fn quick() -> Case {
    Case::new(|_| Ok(()))
}

fn interrupts_itself() -> Case {
    fn body(ctx: &mut RuntimeContext<'_>) -> CaseResult {
        ctx.subcase("wait_for_interrupt", |_| {
            if let Some(handle) = HANDLE.get() {
                handle.interrupt();
            }
            // The run lock is released here, so the interrupt is processed meanwhile.
            thread::sleep(Duration::from_millis(300));
            Ok(())
        })?;
        Ok(())
    }
    Case::new(body)
}

fn never_runs() -> Case {
    Case::new(|_| panic!("claimed after an interrupt"))
}

#[test]
fn test_interrupt_stops_gracefully() -> Result<()> {
    let controller = InterruptController::new(SignalHandlerKind::Noop)?;
    HANDLE
        .set(controller.handle())
        .expect("handle is only set by this test");

    let registry = CaseRegistry::new()
        .with("a.rs", quick)
        .with("b.rs", interrupts_itself)
        .with("c.rs", never_runs);
    let executed = execute_with(&registry, &["a.rs", "b.rs", "c.rs"], &controller, |_| {})?;

    assert_eq!(
        executed.events,
        [
            Recorded::Started("a.rs".to_owned()),
            Recorded::Finished("a.rs".to_owned(), true),
            Recorded::Started("b.rs".to_owned()),
            Recorded::Interrupted,
            Recorded::Stopped("b.rs".to_owned(), true),
        ]
    );
    let summary = &executed.summary;
    assert!(summary.interrupted);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.errors.is_empty(), "the interrupted case is not recorded");
    assert!(summary.is_success(), "an interrupt alone doesn't fail the run");
    Ok(())
}
