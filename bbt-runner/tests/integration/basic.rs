// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use bbt_filtering::TagFilter;
use bbt_runner::{
    errors::RunnerBuildError, reporter::SkipReason, Case, CaseFailure, CaseRegistry, CaseResult,
    RuntimeContext,
};
use color_eyre::eyre::{ensure, Result};
use pretty_assertions::assert_eq;
use std::{fs, thread, time::Duration};

fn pass(_: &mut RuntimeContext<'_>) -> CaseResult {
    Ok(())
}

fn passing() -> Case {
    Case::new(pass)
}

fn failing() -> Case {
    Case::new(|_| Err(CaseFailure::msg("expected failure")))
}

#[test]
fn test_filter_selects_cases() -> Result<()> {
    fn both() -> Case {
        Case::new(pass).tags(["tag0", "tag1"])
    }
    fn only_tag0() -> Case {
        Case::new(pass).tags(["tag0"])
    }
    let registry = CaseRegistry::new()
        .with("cases/both.rs", both)
        .with("cases/only_tag0.rs", only_tag0);

    let executed = execute(
        &registry,
        &["cases/only_tag0.rs", "cases/both.rs"],
        |builder| {
            builder.set_filter(TagFilter::parse("tag0 and not tag1").expect("valid filter"));
        },
    )?;

    assert_eq!(
        executed.events,
        [
            Recorded::Skipped("cases/both.rs".to_owned(), SkipReason::Filter),
            Recorded::Started("cases/only_tag0.rs".to_owned()),
            Recorded::Finished("cases/only_tag0.rs".to_owned(), true),
        ]
    );
    assert_eq!(executed.summary.skipped, 1);
    assert_eq!(executed.summary.passed, 1);
    ensure!(
        !executed.case_dir("cases/both.rs").exists(),
        "skipped cases get no directory"
    );
    Ok(())
}

#[test]
fn test_start_from() -> Result<()> {
    let cases = ["c1.rs", "c2.rs", "c3.rs", "c4.rs", "c5.rs"];
    let mut registry = CaseRegistry::new();
    for case in cases {
        registry.register(case, passing);
    }

    let executed = execute(&registry, &cases, |builder| {
        builder.set_start_from(Some("c3.rs".to_owned()));
    })?;

    let skipped: Vec<_> = executed
        .events
        .iter()
        .filter_map(|event| match event {
            Recorded::Skipped(name, SkipReason::BeforeStartFrom) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, ["c1.rs", "c2.rs"]);
    assert_eq!(executed.started(), ["c3.rs", "c4.rs", "c5.rs"]);
    assert_eq!(executed.summary.skipped, 2);
    assert_eq!(executed.summary.passed, 3);
    assert!(executed.summary.is_success());
    Ok(())
}

#[test]
fn test_verbose_with_parallel_is_rejected() {
    fn must_not_run() -> Case {
        panic!("no case runs when options are invalid");
    }
    let registry = CaseRegistry::new().with("a.rs", must_not_run);
    let result = execute(&registry, &["a.rs"], |builder| {
        builder.set_parallel(2).set_verbose(true);
    });
    let err = result.err().expect("build fails");
    assert!(matches!(
        err.downcast_ref::<RunnerBuildError>(),
        Some(RunnerBuildError::VerboseWithParallel { parallel: 2 })
    ));
}

#[test]
fn test_stop_on_first_failure() -> Result<()> {
    let registry = CaseRegistry::new()
        .with("a.rs", passing)
        .with("b.rs", failing)
        .with("c.rs", passing);

    let executed = execute(&registry, &["a.rs", "b.rs", "c.rs"], |_| {})?;
    assert_eq!(executed.started(), ["a.rs", "b.rs"]);
    assert_eq!(
        executed.events.last(),
        Some(&Recorded::Stopped("b.rs".to_owned(), false))
    );
    assert_eq!(executed.summary.passed, 1);
    assert_eq!(executed.summary.failed, 1);
    assert_eq!(executed.error_messages("b.rs"), ["expected failure"]);
    assert!(!executed.summary.is_success());
    Ok(())
}

#[test]
fn test_dont_stop() -> Result<()> {
    let registry = CaseRegistry::new()
        .with("a.rs", failing)
        .with("b.rs", passing)
        .with("c.rs", failing);

    let executed = execute(&registry, &["a.rs", "b.rs", "c.rs"], |builder| {
        builder.set_dont_stop(true);
    })?;
    assert_eq!(executed.started(), ["a.rs", "b.rs", "c.rs"]);
    assert_eq!(executed.summary.failed, 2);
    assert_eq!(executed.summary.passed, 1);
    let failed: Vec<_> = executed
        .summary
        .errors
        .iter()
        .map(|record| record.case.as_str())
        .collect();
    assert_eq!(failed, ["a.rs", "c.rs"]);
    Ok(())
}

#[test]
fn test_missing_entry_point_is_fatal() -> Result<()> {
    let registry = CaseRegistry::new()
        .with("a.rs", passing)
        .with("c.rs", passing);

    let executed = execute(&registry, &["a.rs", "b.rs", "c.rs"], |builder| {
        builder.set_dont_stop(true);
    })?;
    assert_eq!(executed.started(), ["a.rs"]);
    assert!(executed
        .events
        .contains(&Recorded::MissingEntryPoint("b.rs".to_owned())));
    assert_eq!(
        executed.summary.fatal.as_ref().map(|err| err.case.as_str()),
        Some("b.rs")
    );
    assert!(!executed.summary.is_success());
    Ok(())
}

#[test]
fn test_declared_skip_and_panics() -> Result<()> {
    fn skipped() -> Case {
        Case::new(|_| panic!("skipped bodies never run")).skip(true)
    }
    fn panicking() -> Case {
        Case::new(|_| {
            tracing::info!("about to fail");
            panic!("boom");
        })
    }
    let registry = CaseRegistry::new()
        .with("a.rs", skipped)
        .with("b.rs", panicking);

    let executed = execute(&registry, &["a.rs", "b.rs"], |_| {})?;
    assert_eq!(
        executed.events[0],
        Recorded::Skipped("a.rs".to_owned(), SkipReason::Declared)
    );
    assert_eq!(executed.error_messages("b.rs"), ["panicked: boom"]);

    let record = &executed.summary.errors[0];
    let output = record.output.as_deref().expect("output was captured");
    assert!(output.contains("about to fail"), "output: {output}");
    assert!(output.contains("boom"), "panic message is captured: {output}");
    Ok(())
}

#[test]
fn test_case_dirs_start_empty() -> Result<()> {
    fn writes() -> Case {
        Case::new(|ctx| {
            let entries = fs::read_dir(ctx.case_dir())?.count();
            bbt_runner::assertions::ensure_eq(entries, 0)?;
            fs::write(ctx.case_dir().join("data"), ctx.name())?;
            Ok(())
        })
    }
    let registry = CaseRegistry::new().with("cases/sync/writes.rs", writes);

    let executed = execute(&registry, &["./cases/sync/writes.rs"], |_| {})?;
    assert!(executed.summary.is_success(), "{:?}", executed.summary);
    let dir = executed.case_dir("cases/sync/writes.rs");
    assert_eq!(dir.file_name(), Some("cases.sync.writes"));
    assert_eq!(fs::read_to_string(dir.join("data"))?, "cases/sync/writes.rs");
    Ok(())
}

#[test]
fn test_parallel_claims_are_unique_and_ordered() -> Result<()> {
    fn jittery() -> Case {
        Case::new(|ctx| {
            let name = ctx.name().to_owned();
            ctx.subcase("jitter", move |_| {
                let jitter = name.bytes().map(u64::from).sum::<u64>() % 7;
                thread::sleep(Duration::from_millis(jitter));
                Ok(())
            })?;
            Ok(())
        })
    }
    let cases: Vec<String> = (0..24).map(|i| format!("cases/c{i:02}.rs")).collect();
    let mut registry = CaseRegistry::new();
    for case in &cases {
        registry.register(case, jittery);
    }
    let case_refs: Vec<&str> = cases.iter().map(String::as_str).collect();

    let executed = execute(&registry, &case_refs, |builder| {
        builder.set_parallel(4);
    })?;

    // Claims happen in list order even though completion order varies.
    assert_eq!(executed.started(), case_refs);
    assert_eq!(executed.summary.passed, cases.len());
    assert_eq!(executed.summary.finished_count(), cases.len());
    Ok(())
}

#[test]
fn test_flags_are_visible() -> Result<()> {
    fn flagged() -> Case {
        Case::new(|ctx| {
            bbt_runner::assertions::ensure_true(ctx.has_flag("tls"))?;
            bbt_runner::assertions::ensure_false(ctx.has_flag("cluster"))?;
            bbt_runner::assertions::ensure_eq(ctx.flags().join(","), "tls,ipv6")?;
            Ok(())
        })
    }
    let registry = CaseRegistry::new().with("a.rs", flagged);
    let executed = execute(&registry, &["a.rs"], |builder| {
        builder.set_flags(["tls".to_owned(), "ipv6".to_owned()]);
    })?;
    assert!(executed.summary.is_success(), "{:?}", executed.summary);
    Ok(())
}
