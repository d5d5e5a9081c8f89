// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use bbt_runner::{Case, CaseFailure, CaseRegistry};
use color_eyre::eyre::{eyre, Result};
use pretty_assertions::assert_eq;

#[test]
fn test_thread_error_fails_case() -> Result<()> {
    fn case() -> Case {
        Case::new(|ctx| {
            let worker = ctx.spawn("load", || -> Result<(), CaseFailure> {
                tracing::info!("from helper thread");
                Err(CaseFailure::msg("load generator failed"))
            })?;
            tracing::info!("from case body");
            worker.join()
        })
    }
    let registry = CaseRegistry::new().with("a.rs", case);
    let executed = execute(&registry, &["a.rs"], |_| {})?;

    assert_eq!(executed.summary.failed, 1);
    assert_eq!(executed.error_messages("a.rs"), ["load generator failed"]);
    let output = executed.summary.errors[0]
        .output
        .as_deref()
        .ok_or_else(|| eyre!("output was captured"))?;
    assert!(output.contains("from helper thread"), "output: {output}");
    assert!(output.contains("from case body"), "output: {output}");
    Ok(())
}

#[test]
fn test_thread_panic_fails_case() -> Result<()> {
    fn case() -> Case {
        Case::new(|ctx| {
            let watcher = ctx.spawn("watcher", || -> Result<(), CaseFailure> {
                panic!("watcher gave up");
            })?;
            watcher.join()
        })
    }
    let registry = CaseRegistry::new().with("a.rs", case);
    let executed = execute(&registry, &["a.rs"], |_| {})?;

    assert_eq!(executed.error_messages("a.rs"), ["panicked: watcher gave up"]);
    let output = executed.summary.errors[0].output.as_deref().unwrap_or_default();
    assert!(output.contains("watcher gave up"), "panic logged to the case: {output}");
    Ok(())
}

#[test]
fn test_thread_result_is_returned() -> Result<()> {
    fn case() -> Case {
        Case::new(|ctx| {
            let threads = (1..=3)
                .map(|n| ctx.spawn(format!("worker-{n}"), move || Ok(n * 10)))
                .collect::<Result<Vec<_>, _>>()?;
            assert_eq!(threads[1].name(), "worker-2");
            let mut total = 0;
            for thread in threads {
                total += thread.join()?;
            }
            assert_eq!(total, 60);
            Ok(())
        })
    }
    let registry = CaseRegistry::new().with("a.rs", case);
    let executed = execute(&registry, &["a.rs"], |_| {})?;
    assert_eq!(executed.summary.passed, 1);
    assert!(executed.summary.errors.is_empty());
    Ok(())
}
