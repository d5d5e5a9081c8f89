// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use bbt_runner::{Case, CaseFailure, CaseRegistry, HookScope, Subcase, SubcaseName};
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;

#[test]
fn test_body_error_then_hook_error() -> Result<()> {
    fn case() -> Case {
        Case::new(|ctx| {
            ctx.add_exit_hook(|| Err(CaseFailure::msg("Y")));
            Err(CaseFailure::msg("X"))
        })
    }
    let registry = CaseRegistry::new().with("a.rs", case);
    let executed = execute(&registry, &["a.rs"], |_| {})?;
    assert_eq!(executed.error_messages("a.rs"), ["X", "Y"]);
    assert_eq!(executed.summary.failed, 1);
    Ok(())
}

#[test]
fn test_hooks_all_run_after_failures() -> Result<()> {
    fn case() -> Case {
        Case::new(|ctx| {
            let dir = ctx.case_dir().to_owned();
            for name in ["first", "second", "third"] {
                let dir = dir.clone();
                ctx.add_exit_hook(move || {
                    log_line(&dir, name);
                    if name == "first" {
                        panic!("first hook panicked");
                    }
                    if name == "second" {
                        return Err(CaseFailure::msg("second hook failed"));
                    }
                    Ok(())
                });
            }
            Ok(())
        })
    }
    let registry = CaseRegistry::new().with("a.rs", case);
    let executed = execute(&registry, &["a.rs"], |_| {})?;
    assert_eq!(read_log(&executed.case_dir("a.rs")), ["first", "second", "third"]);
    assert_eq!(
        executed.error_messages("a.rs"),
        ["panicked: first hook panicked", "second hook failed"]
    );
    Ok(())
}

#[test]
fn test_subcase_hooks_fire_before_subcase_reports() -> Result<()> {
    fn case() -> Case {
        Case::new(|ctx| {
            let dir = ctx.case_dir().to_owned();
            let d = dir.clone();
            ctx.add_exit_hook(move || {
                log_line(&d, "case hook");
                Ok(())
            });

            let value = ctx.subcase(SubcaseName::new("outer").arg("n", 1), |ctx| {
                let d = dir.clone();
                ctx.add_exit_hook(move || {
                    log_line(&d, "outer hook");
                    Ok(())
                });
                ctx.subcase("inner", |ctx| {
                    assert!(ctx.in_subcase());
                    let d = dir.clone();
                    ctx.add_exit_hook(move || {
                        log_line(&d, "inner hook");
                        Ok(())
                    });
                    log_line(&dir, "inner body");
                    Ok(())
                })?;
                log_line(&dir, "outer body");
                Ok(42)
            })?;
            log_line(&dir, &format!("case body got {value:?}"));
            assert!(!ctx.in_subcase());
            Ok(())
        })
    }
    let registry = CaseRegistry::new().with("a.rs", case);
    let executed = execute(&registry, &["a.rs"], |_| {})?;
    assert!(executed.summary.is_success(), "{:?}", executed.summary);
    assert_eq!(
        read_log(&executed.case_dir("a.rs")),
        [
            "inner body",
            "inner hook",
            "outer body",
            "outer hook",
            "case body got Some(42)",
            "case hook",
        ]
    );
    let subcases: Vec<_> = executed
        .events
        .iter()
        .filter(|event| matches!(event, Recorded::SubcaseFinished(..)))
        .cloned()
        .collect();
    assert_eq!(
        subcases,
        [
            Recorded::SubcaseFinished("inner()".to_owned(), true),
            Recorded::SubcaseFinished("outer(n=1)".to_owned(), true),
        ]
    );
    Ok(())
}

#[test]
fn test_subcase_failures_are_unpacked() -> Result<()> {
    fn case() -> Case {
        Case::new(|ctx| {
            let skipped = Subcase::new("skipped")
                .skip(true)
                .run(ctx, |_| -> bbt_runner::CaseResult<u32> { panic!("never runs") })?;
            assert_eq!(skipped, None);

            ctx.subcase("failing", |ctx| -> bbt_runner::CaseResult {
                ctx.add_exit_hook(|| Err(CaseFailure::msg("subcase hook failed")));
                Err(CaseFailure::msg("subcase body failed"))
            })?;
            unreachable!("the failed subcase propagates with ?");
        })
    }
    let registry = CaseRegistry::new().with("a.rs", case);
    let executed = execute(&registry, &["a.rs"], |_| {})?;
    assert_eq!(
        executed.error_messages("a.rs"),
        ["subcase body failed", "subcase hook failed"]
    );
    assert!(executed
        .events
        .contains(&Recorded::SubcaseSkipped("skipped()".to_owned())));
    assert!(executed
        .events
        .contains(&Recorded::SubcaseFinished("failing()".to_owned(), false)));
    Ok(())
}

#[test]
fn test_run_exit_hooks_early() -> Result<()> {
    fn case() -> Case {
        Case::new(|ctx| {
            let dir = ctx.case_dir().to_owned();
            let d = dir.clone();
            ctx.add_exit_hook(move || {
                log_line(&d, "hook");
                Ok(())
            });
            let errors = ctx.run_exit_hooks(HookScope::Active);
            assert!(errors.is_empty());
            log_line(&dir, "after early run");
            Ok(())
        })
    }
    let registry = CaseRegistry::new().with("a.rs", case);
    let executed = execute(&registry, &["a.rs"], |_| {})?;
    assert_eq!(
        read_log(&executed.case_dir("a.rs")),
        ["hook", "after early run"],
        "hooks run once"
    );
    Ok(())
}
